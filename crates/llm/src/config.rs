use resilience::RetryPolicy;
use serde::{Deserialize, Serialize};

use crate::LlmError;

/// Connection settings for an OpenAI-compatible chat completion endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL; `/chat/completions` is appended.
    pub api_base: String,
    /// Environment variable holding the API key. `None` sends no auth header.
    pub api_key_env: Option<String>,
    pub model: String,
    /// Sampling temperature used when a prompt does not set its own.
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Overall HTTP timeout in seconds.
    pub request_timeout_secs: u64,
    pub retry: RetryPolicy,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".into(),
            api_key_env: Some("OPENAI_API_KEY".into()),
            model: "gpt-4o-mini".into(),
            temperature: 0.0,
            max_tokens: Some(2048),
            request_timeout_secs: 60,
            retry: RetryPolicy::default(),
        }
    }
}

impl LlmConfig {
    pub fn validate(&self) -> Result<(), LlmError> {
        if self.api_base.trim().is_empty() {
            return Err(LlmError::InvalidConfig("api_base must not be empty".into()));
        }
        if self.model.trim().is_empty() {
            return Err(LlmError::InvalidConfig("model must not be empty".into()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(LlmError::InvalidConfig(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }
        self.retry.validate().map_err(LlmError::InvalidConfig)
    }

    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(LlmConfig::default().validate().is_ok());
    }

    #[test]
    fn completions_url_handles_trailing_slash() {
        let cfg = LlmConfig {
            api_base: "http://localhost:11434/v1/".into(),
            ..Default::default()
        };
        assert_eq!(cfg.completions_url(), "http://localhost:11434/v1/chat/completions");
    }

    #[test]
    fn out_of_range_temperature_is_rejected() {
        let cfg = LlmConfig {
            temperature: 3.5,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
