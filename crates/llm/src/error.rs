use std::time::Duration;

use resilience::{RetryClass, Retryable};
use thiserror::Error;

/// Failures of a language-model call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LlmError {
    #[error("invalid llm config: {0}")]
    InvalidConfig(String),
    /// No HTTP response was received.
    #[error("llm request failed: {0}")]
    Transport(String),
    #[error("llm request timed out after {0:?}")]
    Timeout(Duration),
    #[error("llm provider rate limited the request")]
    RateLimited { retry_after: Option<Duration> },
    #[error("llm provider returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
    /// The provider answered without any content.
    #[error("llm returned an empty completion")]
    EmptyResponse,
    /// Structured output did not match the expected schema, even after the
    /// single schema retry.
    #[error("llm output failed schema validation: {0}")]
    Schema(String),
}

impl Retryable for LlmError {
    fn retry_class(&self) -> RetryClass {
        match self {
            LlmError::Transport(_) | LlmError::Timeout(_) | LlmError::EmptyResponse => {
                RetryClass::Transient
            }
            LlmError::RateLimited { retry_after } => RetryClass::RateLimited {
                retry_after: *retry_after,
            },
            LlmError::Api { status, .. } => RetryClass::from_status(*status, None),
            LlmError::InvalidConfig(_) | LlmError::Schema(_) => RetryClass::Permanent,
        }
    }

    fn timed_out(limit: Duration) -> Self {
        LlmError::Timeout(limit)
    }
}
