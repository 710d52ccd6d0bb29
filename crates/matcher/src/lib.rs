//! # Archiroute Matcher (`matcher`)
//!
//! ## Purpose
//!
//! `matcher` answers floor-plan search requests over the records held by the
//! `index` crate. A request is free Korean (or `key=value`) text such as
//! `"방 3개, 화장실 2개인 아파트 찾아줘"` or `"30평대 남향 거실 넓은 집"`.
//!
//! ## Pipeline
//!
//! 1. [`parse_query`] pulls structured hints (room, bathroom and bay counts,
//!    area in ㎡ or 평, structure type) out of the text. It never fails; what
//!    it cannot read stays in [`ParsedQuery::residual`].
//! 2. [`HybridRetriever`] narrows candidates with the hints through the
//!    [`index::RecordStore`].
//! 3. With an empty residual the candidates are ranked by how many hints they
//!    hit exactly, then by recency. Otherwise the residual is embedded once,
//!    candidates under `min_similarity` are dropped, and the best
//!    `rerank_candidates` go through a [`Reranker`].
//! 4. Final order is score descending with `record_id` as the tie-breaker, cut
//!    to `max_results`.
//!
//! ## Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use embedding::StubEmbedder;
//! use index::{InMemoryStore, StoreSnapshot};
//! use matcher::{HybridRetriever, RetrievalConfig};
//!
//! # async fn run() -> Result<(), matcher::MatchError> {
//! let store = Arc::new(InMemoryStore::new(StoreSnapshot::default()));
//! let retriever = HybridRetriever::new(
//!     store,
//!     Arc::new(StubEmbedder::new(384)),
//!     RetrievalConfig::default(),
//! )?;
//!
//! let outcome = retriever.search("방 3개, 화장실 2개인 아파트 찾아줘").await?;
//! for hit in &outcome.hits {
//!     println!("{} score={:.3}", hit.record.name, hit.score);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Metrics
//!
//! Hand a [`RetrievalMetrics`] implementation to
//! [`HybridRetriever::with_metrics`] to observe latency and result sizes.

mod hybrid;
pub mod metrics;
mod query_parser;
mod rerank;
mod types;

pub use crate::hybrid::{blend_score, sort_by_score, sort_by_specificity, HybridRetriever};
pub use crate::metrics::{RetrievalMetrics, RetrievalPath};
pub use crate::query_parser::{parse_query, ParsedQuery, PYEONG_TO_M2};
pub use crate::rerank::{build_reranker, ApiReranker, LexicalReranker, RerankError, Reranker};
pub use crate::types::{
    FloorplanHit, MatchError, RerankerConfig, RetrievalConfig, RetrievalOutcome,
};
