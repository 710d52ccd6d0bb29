//! Embedding & similarity service.
//!
//! Turns text into fixed-length, L2-normalized vectors and ranks candidate
//! vectors by cosine similarity. Two embedders ship with the crate:
//!
//! - [`ApiEmbedder`] calls a remote inference endpoint (Hugging Face / TEI,
//!   OpenAI-compatible, or a custom `{"texts": [...]}` service) through the
//!   shared retry policy.
//! - [`StubEmbedder`] hashes character n-grams locally. It is deterministic
//!   and is what tests and offline runs use.
//!
//! [`CorpusCache`] holds the vectors of a static reference corpus (regulation
//! text) and swaps in rebuilt snapshots atomically.
//!
//! Corpus and query vectors must come from the same embedder. The engine
//! cannot detect a mismatch between two models of equal dimension, so keep
//! a single `embedding` section in configuration and build one embedder
//! from it.

use std::sync::Arc;

use async_trait::async_trait;

mod api;
mod cache;
mod config;
mod error;
mod normalize;
mod similarity;
mod stub;

pub use api::ApiEmbedder;
pub use cache::{corpus_fingerprint, CorpusCache, CorpusDocument, CorpusSnapshot};
pub use config::{ApiFormat, EmbeddingConfig, EmbeddingProvider};
pub use error::EmbeddingError;
pub use normalize::{cosine_similarity, l2_normalize_in_place, truncate_chars};
pub use similarity::{rank_chunks, sort_chunks, Candidate, RetrievedChunk};
pub use stub::StubEmbedder;

/// Anything that can turn text into vectors of a fixed dimension.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Label recorded next to vectors produced by this embedder.
    fn model_name(&self) -> &str;

    /// Length of every vector this embedder returns.
    fn dimension(&self) -> usize;

    /// Embed several texts; the result has one vector per input, in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::Response("embedder returned no vector".into()))
    }
}

/// Construct the embedder described by `cfg`.
pub fn build_embedder(cfg: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, EmbeddingError> {
    cfg.validate()?;
    match cfg.provider {
        EmbeddingProvider::Stub => Ok(Arc::new(
            StubEmbedder::new(cfg.dimension)
                .with_model_name(cfg.model_name.clone())
                .with_max_input_chars(cfg.max_input_chars),
        )),
        EmbeddingProvider::Api => Ok(Arc::new(ApiEmbedder::new(cfg.clone())?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_config_builds_stub() {
        let embedder = build_embedder(&EmbeddingConfig::default()).unwrap();
        assert_eq!(embedder.dimension(), 256);
        assert_eq!(embedder.model_name(), "stub-bigram-256");
        let v = embedder.embed("남향 거실").await.unwrap();
        assert_eq!(v.len(), 256);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cfg = EmbeddingConfig {
            dimension: 0,
            ..Default::default()
        };
        assert!(build_embedder(&cfg).is_err());
    }
}
