// Metrics hooks for retrieval.
//
// A `RetrievalMetrics` observer is handed to `HybridRetriever::with_metrics`
// at construction time; the retriever reports latency and result sizes for
// every search. Nothing here knows about a concrete metrics backend.
use std::time::Duration;

/// Which path a retrieval took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalPath {
    /// Only structured constraints; ordered by specificity then recency.
    FilterOnly,
    /// Residual text was embedded and scored.
    Semantic,
}

impl RetrievalPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalPath::FilterOnly => "filter_only",
            RetrievalPath::Semantic => "semantic",
        }
    }
}

/// Metrics observer for retrieval calls.
pub trait RetrievalMetrics: Send + Sync {
    /// `candidates` counts records that passed the structured filter and
    /// `hits` the records returned after every cut-off.
    fn record_retrieval(
        &self,
        path: RetrievalPath,
        latency: Duration,
        candidates: usize,
        hits: usize,
    );
}
