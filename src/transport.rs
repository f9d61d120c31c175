//! Chat-completion transport.
//!
//! [`ChatTransport`] is the only network boundary of the crate. The conversation engine hands it
//! a system prompt and the perspective of the agent about to speak and gets back the assistant
//! text. [`OpenAiTransport`] implements it against any OpenAI-compatible `/chat/completions`
//! endpoint using a blocking `reqwest` client.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};

use crate::error::TransportError;

/// Author of a [`ChatMessage`] from the point of view of the model being called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// Instructions
    System,
    /// Anybody but the model
    User,
    /// The model itself
    Assistant,
}

/// One entry of the message list sent to the chat API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author role
    pub role: ChatRole,
    /// Text content
    pub content: String,
}

impl ChatMessage {
    /// A message authored by the user.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    /// A message authored by the model.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Model and sampling parameters applied to every request of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    /// Model identifier
    pub model: String,
    /// Sampling temperature, omitted when `None`
    pub temperature: Option<f32>,
    /// Nucleus sampling, omitted when `None`
    pub top_p: Option<f32>,
}

impl ModelSettings {
    /// Reasoning-style model families reject sampling parameters.
    pub fn supports_sampling(&self) -> bool {
        const REASONING_PREFIXES: [&str; 4] = ["o1", "o3", "o4", "gpt-5"];
        let model = self.model.to_lowercase();
        !REASONING_PREFIXES
            .iter()
            .any(|prefix| model.starts_with(prefix))
    }
}

/// A single chat-completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest<'a> {
    /// System prompt of the agent being called
    pub system_prompt: &'a str,
    /// Prior turns, as seen by that agent
    pub messages: &'a [ChatMessage],
    /// Model parameters
    pub settings: &'a ModelSettings,
}

/// Anything able to answer a chat-completion request.
///
/// Implementations must be usable from several match threads at once.
pub trait ChatTransport: Send + Sync {
    /// Returns the assistant text for `request`.
    fn complete(&self, request: &ChatRequest<'_>) -> Result<String, TransportError>;
}

#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

/// Client for OpenAI-compatible chat-completion endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiTransport {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiTransport {
    /// Default endpoint root.
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1";

    /// Creates a client with a wall-clock `timeout` on every call.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key: api_key.into(),
        })
    }

    /// Reads `OPENAI_API_KEY` and, optionally, `OPENAI_BASE_URL`.
    ///
    /// # Errors
    /// Returns [`TransportError::Authentication`] if no key is set.
    pub fn from_env(timeout: Duration) -> Result<Self, TransportError> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            TransportError::Authentication("OPENAI_API_KEY is not set".to_owned())
        })?;
        let base_url =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| Self::DEFAULT_BASE_URL.to_owned());
        Self::new(base_url, api_key, timeout)
    }

    fn body<'a>(request: &'a ChatRequest<'_>) -> CompletionBody<'a> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        messages.push(ChatMessage {
            role: ChatRole::System,
            content: request.system_prompt.to_owned(),
        });
        messages.extend(request.messages.iter().cloned());

        let sampling = request.settings.supports_sampling();
        CompletionBody {
            model: &request.settings.model,
            messages,
            temperature: request.settings.temperature.filter(|_| sampling),
            top_p: request.settings.top_p.filter(|_| sampling),
        }
    }
}

impl ChatTransport for OpenAiTransport {
    #[instrument(skip_all, fields(model = %request.settings.model, turns = request.messages.len()))]
    fn complete(&self, request: &ChatRequest<'_>) -> Result<String, TransportError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&Self::body(request))
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            debug!(%status, "chat completion rejected");
            return Err(TransportError::from_status(status.as_u16(), body));
        }

        let parsed: CompletionResponse = response
            .json()
            .map_err(|e| TransportError::Decode(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(TransportError::EmptyResponse)?;
        trace!(chars = content.len(), "chat completion received");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(model: &str) -> ModelSettings {
        ModelSettings {
            model: model.to_owned(),
            temperature: Some(0.7),
            top_p: Some(0.9),
        }
    }

    #[test]
    fn sampling_is_omitted_for_reasoning_models() {
        let settings = settings("o3-mini");
        let messages = [ChatMessage::user("hi")];
        let request = ChatRequest {
            system_prompt: "be brief",
            messages: &messages,
            settings: &settings,
        };
        let json = serde_json::to_value(OpenAiTransport::body(&request)).unwrap();
        assert!(json.get("temperature").is_none());
        assert!(json.get("top_p").is_none());
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
    }

    #[test]
    fn sampling_is_sent_for_chat_models() {
        let settings = settings("gpt-4o-mini");
        let request = ChatRequest {
            system_prompt: "",
            messages: &[],
            settings: &settings,
        };
        let json = serde_json::to_value(OpenAiTransport::body(&request)).unwrap();
        assert!((json["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
        assert!(json.get("top_p").is_some());
    }
}
