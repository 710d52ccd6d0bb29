//! YAML configuration for the routing engine.
//!
//! One file describes every collaborator the [`Orchestrator`] needs. Each
//! section falls back to its defaults when omitted, so a minimal file only
//! carries a version:
//!
//! ```yaml
//! version: "1.0"
//!
//! llm:
//!   api_base: "https://api.openai.com/v1"
//!   api_key_env: "OPENAI_API_KEY"
//!   model: "gpt-4o-mini"
//!
//! # Used for both the saved records and incoming questions.
//! embedding:
//!   provider: "api"
//!   api_url: "https://api.openai.com/v1/embeddings"
//!   api_format: "open_ai"
//!   api_key_env: "OPENAI_API_KEY"
//!   model_name: "text-embedding-3-small"
//!   dimension: 1536
//!
//! vision:
//!   endpoint: "http://cv:8000/infer"
//!   selection_tolerance: 0.05
//!
//! retrieval:
//!   max_results: 5
//!   min_similarity: 0.3
//!   rerank_candidates: 20
//!   rerank_weight: 0.3
//!   reranker:
//!     kind: "lexical"
//!
//! regulation:
//!   top_k: 5
//!   min_similarity: 0.2
//!
//! # Optional: replaces the retry policy of every section above.
//! retry:
//!   max_attempts: 3
//!   base_delay_ms: 500
//! ```

use std::fs;
use std::path::Path;
use std::sync::Arc;

use embedding::{EmbeddingConfig, build_embedder};
use index::RecordStore;
use llm::{LlmConfig, build_model};
use matcher::{HybridRetriever, RetrievalConfig, RetrievalMetrics, build_reranker};
use resilience::RetryPolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vision::{CvAnalysisAgent, VisionConfig, build_vision_model};

use crate::agents::{FloorplanSearchAgent, RegulationConfig, RegulationSearchAgent};
use crate::classifier::IntentClassifier;
use crate::metrics::RouteMetrics;
use crate::orchestrator::Orchestrator;

/// Errors that can occur when loading or applying a configuration file.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),

    #[error("failed to build {component}: {message}")]
    Build {
        component: &'static str,
        message: String,
    },
}

impl ConfigLoadError {
    fn build(component: &'static str, err: impl std::fmt::Display) -> Self {
        ConfigLoadError::Build {
            component,
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    pub version: String,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub vision: VisionConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub regulation: RegulationConfig,

    /// Shared retry policy overriding every section's own.
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
            vision: VisionConfig::default(),
            retrieval: RetrievalConfig::default(),
            regulation: RegulationConfig::default(),
            retry: None,
        }
    }
}

impl RouterConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: RouterConfig = serde_yaml::from_str(yaml)?;
        let config = config.with_shared_retry();
        config.validate()?;
        Ok(config)
    }

    /// Copy `retry`, when set, into every section.
    pub fn with_shared_retry(mut self) -> Self {
        if let Some(policy) = self.retry {
            self.llm.retry = policy;
            self.embedding.retry = policy;
            self.vision.retry = policy;
            self.retrieval.retry = policy;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => Ok(()),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }?;

        let section = |name: &str, err: String| ConfigLoadError::Validation(format!("{name}: {err}"));
        self.llm
            .validate()
            .map_err(|e| section("llm", e.to_string()))?;
        self.embedding
            .validate()
            .map_err(|e| section("embedding", e.to_string()))?;
        self.vision
            .validate()
            .map_err(|e| section("vision", e.to_string()))?;
        self.retrieval
            .validate()
            .map_err(|e| section("retrieval", e.to_string()))?;
        self.regulation
            .validate()
            .map_err(|e| section("regulation", e))?;
        if let Some(policy) = &self.retry {
            policy.validate().map_err(|e| section("retry", e))?;
        }
        Ok(())
    }

    /// Construct every service and wire them into an [`Orchestrator`].
    ///
    /// Queries and stored records go through the same embedder.
    pub fn build(&self, store: Arc<dyn RecordStore>) -> Result<Orchestrator, ConfigLoadError> {
        self.assemble(store, None)
    }

    /// Like [`RouterConfig::build`], reporting both routed requests and
    /// retrieval calls to `metrics`.
    pub fn build_observed<M>(
        &self,
        store: Arc<dyn RecordStore>,
        metrics: Arc<M>,
    ) -> Result<Orchestrator, ConfigLoadError>
    where
        M: RouteMetrics + RetrievalMetrics + 'static,
    {
        let retrieval: Arc<dyn RetrievalMetrics> = metrics.clone();
        let route: Arc<dyn RouteMetrics> = metrics;
        Ok(self.assemble(store, Some(retrieval))?.with_metrics(route))
    }

    fn assemble(
        &self,
        store: Arc<dyn RecordStore>,
        retrieval_metrics: Option<Arc<dyn RetrievalMetrics>>,
    ) -> Result<Orchestrator, ConfigLoadError> {
        self.validate()?;

        let llm = build_model(&self.llm).map_err(|e| ConfigLoadError::build("llm", e))?;
        let embedder =
            build_embedder(&self.embedding).map_err(|e| ConfigLoadError::build("embedding", e))?;
        let vision =
            build_vision_model(&self.vision).map_err(|e| ConfigLoadError::build("vision", e))?;
        let reranker = build_reranker(&self.retrieval.reranker, self.retrieval.retry)
            .map_err(|e| ConfigLoadError::build("reranker", e))?;

        let mut retriever =
            HybridRetriever::new(store.clone(), embedder.clone(), self.retrieval.clone())
                .map_err(|e| ConfigLoadError::build("retriever", e))?
                .with_reranker(reranker);
        if let Some(metrics) = retrieval_metrics {
            retriever = retriever.with_metrics(metrics);
        }

        let classifier = IntentClassifier::new(llm.clone());
        let cv = CvAnalysisAgent::new(vision, llm.clone(), embedder.clone())
            .with_max_image_bytes(self.vision.max_image_bytes);
        let floorplan = FloorplanSearchAgent::new(retriever, llm.clone());
        let regulation = RegulationSearchAgent::new(store, embedder, llm, self.regulation);

        tracing::info!(
            llm_model = %self.llm.model,
            embedding_model = %self.embedding.model_name,
            embedding_dimension = self.embedding.dimension,
            "orchestrator assembled"
        );
        Ok(Orchestrator::new(classifier, cv, floorplan, regulation))
    }
}
