//! Error types shared by the transport, the match runner and the team collector.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Phrases that identify a credential problem in a provider error message.
/// A bare status code only counts as a whole word, so `199401` does not match.
static AUTHENTICATION_PHRASES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)invalid[ _]api[ _]key|incorrect api key|unauthorized|authentication|permission denied|\b401\b",
    )
    .expect("valid authentication regex")
});

/// Returns `true` if `message` looks like an authentication failure reported by the chat API.
///
/// Only used for errors without an HTTP status; when the status is known,
/// [`TransportError::from_status`] classifies by status alone.
pub fn is_authentication_error(message: &str) -> bool {
    AUTHENTICATION_PHRASES.is_match(message)
}

fn is_authentication_status(code: u16) -> bool {
    code == 401 || code == 403
}

/// Errors raised by a [`ChatTransport`](crate::transport::ChatTransport).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// Credentials were rejected. Retrying will not help.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The request could not be sent or timed out.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The API answered with a non-success status.
    #[error("chat API returned status {code}: {body}")]
    Status {
        /// HTTP status code
        code: u16,
        /// Response body, as text
        body: String,
    },

    /// The API answered without any assistant content.
    #[error("chat API returned no content")]
    EmptyResponse,

    /// The response body could not be decoded.
    #[error("could not decode chat API response: {0}")]
    Decode(String),
}

impl TransportError {
    /// Whether the orchestrator should retry the match after this error.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Authentication(_))
    }

    /// Builds the error matching an HTTP status and body.
    ///
    /// Only 401 and 403 are credential failures; the body is not inspected.
    pub fn from_status(code: u16, body: String) -> Self {
        if is_authentication_status(code) {
            TransportError::Authentication(format!("status {code}: {body}"))
        } else {
            TransportError::Status { code, body }
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let message = err.to_string();
        let authentication = match err.status() {
            Some(status) => is_authentication_status(status.as_u16()),
            None => is_authentication_error(&message),
        };
        if authentication {
            TransportError::Authentication(message)
        } else if err.is_decode() {
            TransportError::Decode(message)
        } else {
            TransportError::Http(message)
        }
    }
}

/// Errors ending one attempt of a match.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    /// A chat completion failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A team has no agent for the role required by the game.
    #[error("team '{team}' has no agent for {role}")]
    MissingAgent {
        /// Team name
        team: String,
        /// Role name
        role: String,
    },

    /// The match thread panicked.
    #[error("match panicked: {0}")]
    Panicked(String),
}

impl MatchError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            MatchError::Transport(err) => err.is_retryable(),
            MatchError::MissingAgent { .. } | MatchError::Panicked(_) => false,
        }
    }

    /// Whether this error means the operator must fix credentials.
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            MatchError::Transport(TransportError::Authentication(_))
        )
    }
}

/// Data problems found while building a team, before any network call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TeamError {
    /// No prompt was submitted.
    #[error("no prompt submitted")]
    MissingSubmission,

    /// The submission does not hold the expected number of role prompts.
    #[error("expected {expected} role prompt(s), found {found}")]
    MalformedPrompt {
        /// Number of prompts required by the game
        expected: usize,
        /// Number of prompts found in the submission
        found: usize,
    },

    /// Reservation values are missing.
    #[error("no reservation values")]
    MissingValues,

    /// The store failed.
    #[error("store error: {0}")]
    Store(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_phrases_are_case_insensitive() {
        assert!(is_authentication_error("Error: Invalid API Key provided"));
        assert!(is_authentication_error("HTTP 401"));
        assert!(is_authentication_error("Unauthorized"));
        assert!(is_authentication_error("invalid_api_key"));
        assert!(!is_authentication_error("connection reset by peer"));
    }

    #[test]
    fn status_code_digits_inside_numbers_are_not_authentication() {
        assert!(!is_authentication_error("Used 199401 tokens of 200000"));
        assert!(!is_authentication_error("request id 4010"));

        let rate_limited = TransportError::from_status(
            429,
            "Rate limit reached. Limit 200000, Used 199401, Requested 1200.".into(),
        );
        assert!(matches!(rate_limited, TransportError::Status { code: 429, .. }));
        assert!(rate_limited.is_retryable());
    }

    #[test]
    fn only_authentication_is_not_retryable() {
        assert!(!TransportError::Authentication("x".into()).is_retryable());
        assert!(TransportError::Http("timeout".into()).is_retryable());
        assert!(TransportError::EmptyResponse.is_retryable());
        assert!(TransportError::from_status(500, "oops".into()).is_retryable());
        assert!(!TransportError::from_status(401, "".into()).is_retryable());
        assert!(!TransportError::from_status(403, "forbidden".into()).is_retryable());
        // a known status wins over the wording of the body
        assert!(TransportError::from_status(400, "Incorrect API key".into()).is_retryable());
    }
}
