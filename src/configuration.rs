//! Config for the orchestrator behaviors
//!
//! This module provides configuration options for controlling how a tournament is run.
//!
//! Configuration can be created programmatically using [`Configuration::new()`] or by reading
//! environment variables using [`Configuration::from_env()`].
//!
//! # Environment Variables
//!
//! The following environment variables can be used to override configuration values. All
//! values are optional. Unset or unparseable values keep their default. Flags are enabled by
//! setting them to `"true"` (case-insensitive).
//!
//! - `NEGO_MODEL`: Chat model identifier (default: `gpt-4o-mini`)
//! - `NEGO_MAX_TURNS`: Exchanges allowed after the opening message (default: `10`)
//! - `NEGO_TERMINATION_PHRASE`: Phrase closing a negotiation (default: `Pleasure doing business with you`)
//! - `NEGO_SUMMARY_PROMPT`: System prompt of the analyzer agent (default: built-in prompt)
//! - `NEGO_SUMMARY_TERMINATION_PHRASE`: Phrase preceding the agreed value in the analyzer summary (default: `The value agreed was`)
//! - `NEGO_NUM_ROUNDS`: Number of rounds (default: `1`)
//! - `NEGO_CONVERSATION_STARTER`: `role1` or `role2`, the role speaking first (default: `role1`)
//! - `NEGO_MAX_RETRIES`: Attempts per match before giving up (default: `10`)
//! - `NEGO_MAX_PARALLEL`: Matches running at the same time (default: number of CPUs)
//! - `NEGO_REQUEST_TIMEOUT_SECS`: Wall-clock timeout of one chat call (default: `120`)
//! - `NEGO_TEMPERATURE`, `NEGO_TOP_P`: Sampling parameters (default: unset)
//! - `NEGO_VERBOSE`: Print match progress to stdout (default: `true`)
//! - `NEGO_LOG`: Enable logging to a file (default: `false`)

use std::str::FromStr;
use std::time::Duration;

use crate::agent::Role;
use crate::transport::ModelSettings;

/// Default analyzer prompt. It must make the analyzer end with the summary termination phrase.
pub const DEFAULT_SUMMARY_PROMPT: &str = "You are a neutral analyst reading a negotiation \
transcript. Decide whether both parties explicitly agreed on a single value. If they did, answer \
with a one-line summary followed by a line of the form 'The value agreed was X' where X is the \
number only. If they did not agree, answer 'The value agreed was none'.";

/// Configuration for orchestrator behaviors.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    pub(crate) model: String,
    pub(crate) temperature: Option<f32>,
    pub(crate) top_p: Option<f32>,
    pub(crate) max_turns: usize,
    pub(crate) negotiation_termination_phrase: String,
    pub(crate) summary_prompt: String,
    pub(crate) summary_termination_phrase: String,
    pub(crate) num_rounds: i32,
    pub(crate) conversation_starter: Role,
    pub(crate) max_retries: u32,
    pub(crate) max_parallel_matches: usize,
    pub(crate) request_timeout: Duration,
    pub(crate) verbose: bool,
    pub(crate) log: bool,
}

impl Configuration {
    /// Create a new configuration with default parameters.
    ///
    /// By default:
    /// - Matches use `gpt-4o-mini` without explicit sampling parameters.
    /// - A negotiation gets 10 exchanges after the opening message.
    /// - One round is played, role 1 speaks first.
    /// - A match is attempted up to 10 times.
    /// - As many matches as CPUs run at the same time.
    /// - Match progress is printed to stdout, logging to file is disabled.
    pub fn new() -> Self {
        Self {
            model: "gpt-4o-mini".to_owned(),
            temperature: None,
            top_p: None,
            max_turns: 10,
            negotiation_termination_phrase: "Pleasure doing business with you".to_owned(),
            summary_prompt: DEFAULT_SUMMARY_PROMPT.to_owned(),
            summary_termination_phrase: "The value agreed was".to_owned(),
            num_rounds: 1,
            conversation_starter: Role::Role1,
            max_retries: 10,
            max_parallel_matches: num_cpus::get().max(1),
            request_timeout: Duration::from_secs(120),
            verbose: true,
            log: false,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// See the module documentation for the recognized variables. Any variable that is unset
    /// or cannot be parsed leaves the default value in place.
    pub fn from_env() -> Self {
        fn get_env_flag(var: &str, default: bool) -> bool {
            match std::env::var(var) {
                Ok(val) => val.eq_ignore_ascii_case("true"),
                Err(_) => default,
            }
        }

        fn get_env<T: FromStr>(var: &str) -> Option<T> {
            std::env::var(var).ok().and_then(|v| v.trim().parse().ok())
        }

        let default = Self::new();
        Self {
            model: get_env("NEGO_MODEL").unwrap_or(default.model),
            temperature: get_env("NEGO_TEMPERATURE"),
            top_p: get_env("NEGO_TOP_P"),
            max_turns: get_env("NEGO_MAX_TURNS").unwrap_or(default.max_turns),
            negotiation_termination_phrase: get_env("NEGO_TERMINATION_PHRASE")
                .unwrap_or(default.negotiation_termination_phrase),
            summary_prompt: get_env("NEGO_SUMMARY_PROMPT").unwrap_or(default.summary_prompt),
            summary_termination_phrase: get_env("NEGO_SUMMARY_TERMINATION_PHRASE")
                .unwrap_or(default.summary_termination_phrase),
            num_rounds: get_env("NEGO_NUM_ROUNDS").unwrap_or(default.num_rounds),
            conversation_starter: get_env("NEGO_CONVERSATION_STARTER")
                .unwrap_or(default.conversation_starter),
            max_retries: get_env::<u32>("NEGO_MAX_RETRIES")
                .filter(|n| *n > 0)
                .unwrap_or(default.max_retries),
            max_parallel_matches: get_env::<usize>("NEGO_MAX_PARALLEL")
                .filter(|n| *n > 0)
                .unwrap_or(default.max_parallel_matches),
            request_timeout: get_env("NEGO_REQUEST_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(default.request_timeout),
            verbose: get_env_flag("NEGO_VERBOSE", default.verbose),
            log: get_env_flag("NEGO_LOG", default.log),
        }
    }

    /// Set the chat model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set or clear the sampling temperature.
    pub fn with_temperature(mut self, value: Option<f32>) -> Self {
        self.temperature = value;
        self
    }

    /// Set or clear nucleus sampling.
    pub fn with_top_p(mut self, value: Option<f32>) -> Self {
        self.top_p = value;
        self
    }

    /// Set the number of exchanges allowed after the opening message.
    pub fn with_max_turns(mut self, value: usize) -> Self {
        self.max_turns = value;
        self
    }

    /// Set the phrase an agent says to close a negotiation.
    pub fn with_negotiation_termination_phrase(mut self, value: impl Into<String>) -> Self {
        self.negotiation_termination_phrase = value.into();
        self
    }

    /// Set the analyzer system prompt.
    pub fn with_summary_prompt(mut self, value: impl Into<String>) -> Self {
        self.summary_prompt = value.into();
        self
    }

    /// Set the phrase preceding the agreed value in the analyzer summary.
    pub fn with_summary_termination_phrase(mut self, value: impl Into<String>) -> Self {
        self.summary_termination_phrase = value.into();
        self
    }

    /// Set the number of rounds. Zero or negative means nothing is played.
    pub fn with_num_rounds(mut self, value: i32) -> Self {
        self.num_rounds = value;
        self
    }

    /// Set the role speaking first in every negotiation.
    pub fn with_conversation_starter(mut self, value: Role) -> Self {
        self.conversation_starter = value;
        self
    }

    /// Set the number of attempts per match (at least one).
    pub fn with_max_retries(mut self, value: u32) -> Self {
        self.max_retries = value.max(1);
        self
    }

    /// Set how many matches may run at the same time (at least one).
    ///
    /// Size it to the rate limits of the chat API.
    pub fn with_max_parallel_matches(mut self, value: usize) -> Self {
        self.max_parallel_matches = value.max(1);
        self
    }

    /// Set the timeout of a single chat call.
    pub fn with_request_timeout(mut self, value: Duration) -> Self {
        self.request_timeout = value;
        self
    }

    /// Enable or disable progress output on stdout.
    pub fn with_verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }

    /// Enable or disable logging to file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }

    /// Timeout of a single chat call, for building a transport.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Number of rounds to play.
    pub fn num_rounds(&self) -> i32 {
        self.num_rounds
    }

    pub(crate) fn model_settings(&self) -> ModelSettings {
        ModelSettings {
            model: self.model.clone(),
            temperature: self.temperature,
            top_p: self.top_p,
        }
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_clamp_to_one() {
        let config = Configuration::new()
            .with_max_retries(0)
            .with_max_parallel_matches(0);
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.max_parallel_matches, 1);
    }

    #[test]
    fn defaults() {
        let config = Configuration::default();
        assert_eq!(config.max_retries, 10);
        assert_eq!(config.conversation_starter, Role::Role1);
        assert_eq!(config.summary_termination_phrase, "The value agreed was");
        assert!(config.max_parallel_matches >= 1);
    }

    #[test]
    fn model_settings_follow_config() {
        let settings = Configuration::new()
            .with_model("o3-mini")
            .with_temperature(Some(0.2))
            .model_settings();
        assert_eq!(settings.model, "o3-mini");
        assert_eq!(settings.temperature, Some(0.2));
        assert_eq!(settings.top_p, None);
    }
}
