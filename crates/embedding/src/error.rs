use std::time::Duration;

use resilience::{RetryClass, Retryable};
use thiserror::Error;

/// Errors surfaced while producing or comparing embeddings.
#[derive(Debug, Clone, Error)]
pub enum EmbeddingError {
    /// Configuration is inconsistent (e.g. api provider without `api_url`).
    #[error("invalid embedding config: {0}")]
    InvalidConfig(String),
    /// The request never produced an HTTP response.
    #[error("embedding request failed: {0}")]
    Transport(String),
    /// A single attempt exceeded its deadline.
    #[error("embedding request timed out after {0:?}")]
    Timeout(Duration),
    /// The provider answered 429.
    #[error("embedding provider rate limited the request")]
    RateLimited { retry_after: Option<Duration> },
    /// Any other non-success status.
    #[error("embedding provider returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
    /// The provider answered, but not with vectors we understand.
    #[error("unexpected embedding response: {0}")]
    Response(String),
    /// The provider returned a vector of a different size than configured.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl Retryable for EmbeddingError {
    fn retry_class(&self) -> RetryClass {
        match self {
            EmbeddingError::Transport(_) | EmbeddingError::Timeout(_) => RetryClass::Transient,
            EmbeddingError::RateLimited { retry_after } => RetryClass::RateLimited {
                retry_after: *retry_after,
            },
            EmbeddingError::Api { status, .. } => RetryClass::from_status(*status, None),
            EmbeddingError::InvalidConfig(_)
            | EmbeddingError::Response(_)
            | EmbeddingError::DimensionMismatch { .. } => RetryClass::Permanent,
        }
    }

    fn timed_out(limit: Duration) -> Self {
        EmbeddingError::Timeout(limit)
    }
}
