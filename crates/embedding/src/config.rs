use resilience::RetryPolicy;
use serde::{Deserialize, Serialize};

use crate::EmbeddingError;

/// Which embedder backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    /// Deterministic hashed character n-grams. Offline, no network.
    #[default]
    Stub,
    /// Remote HTTP inference endpoint.
    Api,
}

/// Payload and response dialect spoken by the remote endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApiFormat {
    /// `{"inputs": [...]}` as served by Hugging Face / TEI.
    HuggingFace,
    /// `{"input": [...], "model": "..."}`, answered with `data[].embedding`.
    #[default]
    OpenAi,
    /// `{"texts": [...]}`, answered with `{"embeddings": [[...]]}`.
    Custom,
}

/// Runtime configuration for the embedding service.
///
/// The same configuration must be used to embed the reference corpus and the
/// queries run against it. Mixing sources breaks similarity silently.
///
/// ```yaml
/// embedding:
///   provider: api
///   api_url: "https://api.openai.com/v1/embeddings"
///   api_format: open_ai
///   api_key_env: "OPENAI_API_KEY"
///   model_name: "text-embedding-3-small"
///   dimension: 1536
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    /// Inference endpoint when `provider` is `api`.
    pub api_url: Option<String>,
    pub api_format: ApiFormat,
    /// Environment variable holding the bearer token. Read once at construction.
    pub api_key_env: Option<String>,
    /// Friendly label recorded next to every corpus snapshot.
    pub model_name: String,
    /// Expected vector size. Responses of a different size are rejected.
    pub dimension: usize,
    /// Input texts are cut to this many characters before being sent.
    pub max_input_chars: usize,
    /// Number of texts sent per request when embedding a corpus.
    pub batch_size: usize,
    /// Overall HTTP timeout in seconds.
    pub request_timeout_secs: u64,
    pub retry: RetryPolicy,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Stub,
            api_url: None,
            api_format: ApiFormat::OpenAi,
            api_key_env: None,
            model_name: "stub-bigram-256".into(),
            dimension: 256,
            max_input_chars: 2000,
            batch_size: 32,
            request_timeout_secs: 30,
            retry: RetryPolicy::default(),
        }
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Result<(), EmbeddingError> {
        if self.dimension == 0 {
            return Err(EmbeddingError::InvalidConfig(
                "dimension must be greater than zero".into(),
            ));
        }
        if self.max_input_chars == 0 {
            return Err(EmbeddingError::InvalidConfig(
                "max_input_chars must be greater than zero".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(EmbeddingError::InvalidConfig(
                "batch_size must be greater than zero".into(),
            ));
        }
        if self.provider == EmbeddingProvider::Api
            && self.api_url.as_deref().map_or(true, |u| u.trim().is_empty())
        {
            return Err(EmbeddingError::InvalidConfig(
                "api_url is required for the api provider".into(),
            ));
        }
        self.retry.validate().map_err(EmbeddingError::InvalidConfig)
    }
}
