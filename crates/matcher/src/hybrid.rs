use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;

use embedding::{cosine_similarity, Embedder};
use index::{FloorplanRecord, RecordStore};

use crate::metrics::{RetrievalMetrics, RetrievalPath};
use crate::query_parser::{parse_query, ParsedQuery};
use crate::rerank::{build_reranker, Reranker};
use crate::types::{FloorplanHit, MatchError, RetrievalConfig, RetrievalOutcome};

/// `weight·rerank + (1 − weight)·similarity`; similarity alone without a
/// rerank score.
pub fn blend_score(similarity: f32, rerank: Option<f32>, weight: f32) -> f32 {
    match rerank {
        Some(r) => weight * r + (1.0 - weight) * similarity,
        None => similarity,
    }
}

/// Score descending, then `record_id` ascending.
pub fn sort_by_score(hits: &mut [FloorplanHit]) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.record_id().cmp(&b.record_id()))
    });
}

/// Specificity descending, newest first, then `record_id` ascending.
pub fn sort_by_specificity(hits: &mut [FloorplanHit]) {
    hits.sort_by(|a, b| {
        b.specificity
            .cmp(&a.specificity)
            .then_with(|| b.record.created_at.cmp(&a.record.created_at))
            .then_with(|| a.record_id().cmp(&b.record_id()))
    });
}

/// Filtered vector search over floor-plan records.
///
/// 1. Structured hints narrow the candidate set through the store.
/// 2. With no residual text, candidates are ordered by specificity.
/// 3. Otherwise the residual is embedded once and scored by cosine similarity
///    against each stored embedding; weak candidates are dropped.
/// 4. The best `rerank_candidates` are rescored and blended.
pub struct HybridRetriever {
    store: Arc<dyn RecordStore>,
    embedder: Arc<dyn Embedder>,
    reranker: Option<Arc<dyn Reranker>>,
    config: RetrievalConfig,
    metrics: Option<Arc<dyn RetrievalMetrics>>,
}

impl std::fmt::Debug for HybridRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridRetriever")
            .field("embedder", &self.embedder.model_name())
            .field("reranker", &self.reranker.as_ref().map(|r| r.name().to_string()))
            .field("config", &self.config)
            .finish()
    }
}

impl HybridRetriever {
    /// Build a retriever with the reranker named in `config`.
    pub fn new(
        store: Arc<dyn RecordStore>,
        embedder: Arc<dyn Embedder>,
        config: RetrievalConfig,
    ) -> Result<Self, MatchError> {
        config.validate()?;
        let reranker = build_reranker(&config.reranker, config.retry)?;
        Ok(Self {
            store,
            embedder,
            reranker,
            config,
            metrics: None,
        })
    }

    /// Replace the configured reranker.
    pub fn with_reranker(mut self, reranker: Option<Arc<dyn Reranker>>) -> Self {
        self.reranker = reranker;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn RetrievalMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Parse `query` and retrieve.
    pub async fn search(&self, query: &str) -> Result<RetrievalOutcome, MatchError> {
        self.retrieve(parse_query(query)).await
    }

    /// Retrieve for an already parsed query.
    pub async fn retrieve(&self, parsed: ParsedQuery) -> Result<RetrievalOutcome, MatchError> {
        let start = Instant::now();
        let candidates = match parsed.hints.as_ref() {
            Some(filter) => self.store.floorplans_matching(filter)?,
            None => self.store.floorplans()?,
        };
        let candidate_count = candidates.len();

        let (path, hits) = if parsed.has_semantic_content() {
            let hits = self.semantic_rank(&parsed, candidates).await?;
            (RetrievalPath::Semantic, hits)
        } else {
            (RetrievalPath::FilterOnly, self.filter_rank(&parsed, candidates))
        };

        tracing::debug!(
            path = path.as_str(),
            candidates = candidate_count,
            hits = hits.len(),
            residual = %parsed.residual,
            "floorplan retrieval finished"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_retrieval(path, start.elapsed(), candidate_count, hits.len());
        }

        Ok(RetrievalOutcome {
            parsed,
            candidates: candidate_count,
            hits,
        })
    }

    fn filter_rank(&self, parsed: &ParsedQuery, candidates: Vec<FloorplanRecord>) -> Vec<FloorplanHit> {
        let mut hits: Vec<FloorplanHit> = candidates
            .into_iter()
            .map(|record| {
                let specificity = parsed
                    .hints
                    .as_ref()
                    .map_or(0, |filter| filter.specificity(&record));
                FloorplanHit {
                    record,
                    similarity: 0.0,
                    rerank_score: None,
                    score: 0.0,
                    specificity,
                }
            })
            .collect();
        sort_by_specificity(&mut hits);
        hits.truncate(self.config.max_results);
        hits
    }

    async fn semantic_rank(
        &self,
        parsed: &ParsedQuery,
        candidates: Vec<FloorplanRecord>,
    ) -> Result<Vec<FloorplanHit>, MatchError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let query_vector = self.embedder.embed(&parsed.residual).await?;

        let mut hits: Vec<FloorplanHit> = candidates
            .into_iter()
            .filter_map(|record| {
                if record.embedding.len() != query_vector.len() {
                    tracing::warn!(
                        record_id = record.record_id,
                        stored = record.embedding.len(),
                        query = query_vector.len(),
                        "stored embedding dimension differs from query, scoring 0"
                    );
                }
                let similarity = cosine_similarity(&query_vector, &record.embedding);
                if similarity < self.config.min_similarity {
                    return None;
                }
                let specificity = parsed
                    .hints
                    .as_ref()
                    .map_or(0, |filter| filter.specificity(&record));
                Some(FloorplanHit {
                    record,
                    similarity,
                    rerank_score: None,
                    score: similarity,
                    specificity,
                })
            })
            .collect();

        sort_by_score(&mut hits);
        hits.truncate(self.config.rerank_candidates);

        if let Some(reranker) = &self.reranker {
            let documents: Vec<String> = hits
                .iter()
                .map(|h| format!("{}\n{}", h.record.name, h.record.document))
                .collect();
            match reranker.score(&parsed.residual, &documents).await {
                Ok(scores) => {
                    for (hit, rerank) in hits.iter_mut().zip(scores) {
                        hit.rerank_score = Some(rerank);
                        hit.score =
                            blend_score(hit.similarity, Some(rerank), self.config.rerank_weight);
                    }
                    sort_by_score(&mut hits);
                }
                Err(err) => {
                    tracing::warn!(
                        reranker = reranker.name(),
                        error = %err,
                        "rerank failed, keeping similarity order"
                    );
                }
            }
        }

        hits.truncate(self.config.max_results);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests;
