use embedding::EmbeddingError;
use index::{FloorplanRecord, IndexError};
use resilience::RetryPolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::query_parser::ParsedQuery;

/// Which second-stage scorer runs over the top similarity candidates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RerankerConfig {
    /// Character-bigram overlap between query and document, computed locally.
    #[default]
    Lexical,
    /// A cross-encoder served behind a TEI-style `/rerank` endpoint.
    Api {
        url: String,
        #[serde(default)]
        api_key_env: Option<String>,
        #[serde(default = "RerankerConfig::default_timeout_secs")]
        request_timeout_secs: u64,
    },
    /// Rank by similarity alone.
    Disabled,
}

impl RerankerConfig {
    pub(crate) fn default_timeout_secs() -> u64 {
        30
    }
}

/// Tuning for hybrid floor-plan retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalConfig {
    /// Maximum number of hits returned to the caller.
    #[serde(default = "RetrievalConfig::default_max_results")]
    pub max_results: usize,
    /// Candidates below this cosine similarity are dropped before reranking.
    #[serde(default = "RetrievalConfig::default_min_similarity")]
    pub min_similarity: f32,
    /// How many of the best similarity candidates go to the reranker.
    #[serde(default = "RetrievalConfig::default_rerank_candidates")]
    pub rerank_candidates: usize,
    /// Weight of the rerank score in the final blend, in [0.0, 1.0].
    #[serde(default = "RetrievalConfig::default_rerank_weight")]
    pub rerank_weight: f32,
    #[serde(default)]
    pub reranker: RerankerConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl RetrievalConfig {
    pub(crate) fn default_max_results() -> usize {
        5
    }

    pub(crate) fn default_min_similarity() -> f32 {
        0.3
    }

    pub(crate) fn default_rerank_candidates() -> usize {
        20
    }

    pub(crate) fn default_rerank_weight() -> f32 {
        0.3
    }

    pub fn validate(&self) -> Result<(), MatchError> {
        if self.max_results == 0 {
            return Err(MatchError::InvalidConfig(
                "max_results must be greater than zero".into(),
            ));
        }
        if !(-1.0..=1.0).contains(&self.min_similarity) {
            return Err(MatchError::InvalidConfig(format!(
                "min_similarity must be between -1 and 1, got {}",
                self.min_similarity
            )));
        }
        if self.rerank_candidates < self.max_results {
            return Err(MatchError::InvalidConfig(format!(
                "rerank_candidates ({}) must be at least max_results ({})",
                self.rerank_candidates, self.max_results
            )));
        }
        if !(0.0..=1.0).contains(&self.rerank_weight) {
            return Err(MatchError::InvalidConfig(format!(
                "rerank_weight must be between 0 and 1, got {}",
                self.rerank_weight
            )));
        }
        if let RerankerConfig::Api {
            url,
            request_timeout_secs,
            ..
        } = &self.reranker
        {
            if url.trim().is_empty() {
                return Err(MatchError::InvalidConfig("reranker url is empty".into()));
            }
            if *request_timeout_secs == 0 {
                return Err(MatchError::InvalidConfig(
                    "reranker request_timeout_secs must be greater than zero".into(),
                ));
            }
        }
        self.retry.validate().map_err(MatchError::InvalidConfig)
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_results: Self::default_max_results(),
            min_similarity: Self::default_min_similarity(),
            rerank_candidates: Self::default_rerank_candidates(),
            rerank_weight: Self::default_rerank_weight(),
            reranker: RerankerConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// A ranked floor plan together with the signals that placed it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FloorplanHit {
    pub record: FloorplanRecord,
    /// Cosine similarity to the residual query, 0.0 for pure-filter queries.
    pub similarity: f32,
    /// Second-stage score when a reranker ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
    /// Final ordering score.
    pub score: f32,
    /// How many filter constraints the record hits at their requested value.
    pub specificity: usize,
}

impl FloorplanHit {
    pub fn record_id(&self) -> u64 {
        self.record.record_id
    }
}

/// Everything one retrieval call produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalOutcome {
    pub parsed: ParsedQuery,
    /// Records that passed the structured filter, before similarity cut-off.
    pub candidates: usize,
    pub hits: Vec<FloorplanHit>,
}

impl RetrievalOutcome {
    pub fn record_ids(&self) -> Vec<u64> {
        self.hits.iter().map(FloorplanHit::record_id).collect()
    }
}

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("invalid retrieval config: {0}")]
    InvalidConfig(String),
    #[error("record store error: {0}")]
    Index(#[from] IndexError),
    #[error("query embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),
}
