//! Long-lived vectors for a static reference corpus.
//!
//! Readers take an `Arc` of the current [`CorpusSnapshot`] and keep using it
//! for the rest of their request. A rebuild embeds the whole new document
//! set first and only then swaps the pointer, so no reader ever sees a
//! half-built snapshot. A failed rebuild leaves the old snapshot in place.

use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};

use fxhash::FxHasher64;
use serde::{Deserialize, Serialize};

use crate::similarity::{rank_chunks, Candidate, RetrievedChunk};
use crate::{Embedder, EmbeddingError};

/// One reference document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusDocument {
    pub id: String,
    pub content: String,
}

impl CorpusDocument {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
        }
    }
}

/// Content fingerprint of a document set, used to detect changes.
pub fn corpus_fingerprint(docs: &[CorpusDocument]) -> u64 {
    let mut hasher = FxHasher64::default();
    docs.len().hash(&mut hasher);
    for doc in docs {
        doc.id.hash(&mut hasher);
        doc.content.hash(&mut hasher);
    }
    hasher.finish()
}

/// Immutable, fully embedded view of the corpus.
#[derive(Debug, Default)]
pub struct CorpusSnapshot {
    fingerprint: u64,
    model_name: String,
    dimension: usize,
    entries: Vec<(CorpusDocument, Vec<f32>)>,
}

impl CorpusSnapshot {
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rank the documents accepted by `keep` against `query`.
    pub fn rank<F>(
        &self,
        query: &[f32],
        top_k: usize,
        min_similarity: f32,
        keep: F,
    ) -> Vec<RetrievedChunk>
    where
        F: Fn(&CorpusDocument) -> bool,
    {
        let candidates = self
            .entries
            .iter()
            .filter(|(doc, _)| keep(doc))
            .map(|(doc, vector)| Candidate {
                source_id: &doc.id,
                content: &doc.content,
                vector,
            });
        rank_chunks(query, candidates, top_k, min_similarity)
    }
}

/// Atomically swappable holder of the current [`CorpusSnapshot`].
#[derive(Debug)]
pub struct CorpusCache {
    current: RwLock<Arc<CorpusSnapshot>>,
    rebuild: tokio::sync::Mutex<()>,
    batch_size: usize,
}

impl Default for CorpusCache {
    fn default() -> Self {
        Self::new(32)
    }
}

impl CorpusCache {
    pub fn new(batch_size: usize) -> Self {
        Self {
            current: RwLock::new(Arc::new(CorpusSnapshot::default())),
            rebuild: tokio::sync::Mutex::new(()),
            batch_size: batch_size.max(1),
        }
    }

    /// The currently published snapshot.
    pub fn snapshot(&self) -> Arc<CorpusSnapshot> {
        let guard = self
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.clone()
    }

    /// Whether `docs` differ from what the current snapshot was built from.
    pub fn needs_rebuild(&self, docs: &[CorpusDocument]) -> bool {
        let snapshot = self.snapshot();
        snapshot.fingerprint != corpus_fingerprint(docs)
            || snapshot.len() != docs.len()
            || (snapshot.is_empty() && !docs.is_empty())
    }

    /// Embed `docs` and publish them as the new snapshot.
    pub async fn rebuild(
        &self,
        embedder: &dyn Embedder,
        docs: Vec<CorpusDocument>,
    ) -> Result<Arc<CorpusSnapshot>, EmbeddingError> {
        let _serialized = self.rebuild.lock().await;
        self.build_and_publish(embedder, docs).await
    }

    /// Return a snapshot matching `docs`, rebuilding only when they changed.
    pub async fn ensure(
        &self,
        embedder: &dyn Embedder,
        docs: &[CorpusDocument],
    ) -> Result<Arc<CorpusSnapshot>, EmbeddingError> {
        if !self.needs_rebuild(docs) {
            return Ok(self.snapshot());
        }
        let _serialized = self.rebuild.lock().await;
        // Another task may have finished the same rebuild while we waited.
        if !self.needs_rebuild(docs) {
            return Ok(self.snapshot());
        }
        self.build_and_publish(embedder, docs.to_vec()).await
    }

    async fn build_and_publish(
        &self,
        embedder: &dyn Embedder,
        docs: Vec<CorpusDocument>,
    ) -> Result<Arc<CorpusSnapshot>, EmbeddingError> {
        let fingerprint = corpus_fingerprint(&docs);
        let mut vectors = Vec::with_capacity(docs.len());
        for batch in docs.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|d| d.content.clone()).collect();
            let embedded = embedder.embed_batch(&texts).await?;
            if embedded.len() != texts.len() {
                return Err(EmbeddingError::Response(format!(
                    "embedder returned {} vectors for {} documents",
                    embedded.len(),
                    texts.len()
                )));
            }
            vectors.extend(embedded);
        }

        let snapshot = Arc::new(CorpusSnapshot {
            fingerprint,
            model_name: embedder.model_name().to_string(),
            dimension: embedder.dimension(),
            entries: docs.into_iter().zip(vectors).collect(),
        });

        {
            let mut guard = self
                .current
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *guard = snapshot.clone();
        }
        tracing::info!(
            documents = snapshot.len(),
            model = %snapshot.model_name,
            "reference corpus snapshot published"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StubEmbedder;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn docs() -> Vec<CorpusDocument> {
        vec![
            CorpusDocument::new("r1", "제2종일반주거지역 건폐율 60퍼센트 이하"),
            CorpusDocument::new("r2", "일반상업지역 용적률 800퍼센트 이하"),
            CorpusDocument::new("r3", "제2종일반주거지역 미용실 제1종 근린생활시설 허용"),
        ]
    }

    struct CountingEmbedder {
        inner: StubEmbedder,
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model_name(&self) -> &str {
            self.inner.model_name()
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(EmbeddingError::Transport("offline".into()));
            }
            self.inner.embed_batch(texts).await
        }
    }

    fn counting(fail: bool) -> CountingEmbedder {
        CountingEmbedder {
            inner: StubEmbedder::new(128),
            calls: AtomicUsize::new(0),
            fail,
        }
    }

    #[tokio::test]
    async fn starts_empty_and_publishes_after_rebuild() {
        let cache = CorpusCache::new(2);
        assert!(cache.snapshot().is_empty());
        assert!(cache.needs_rebuild(&docs()));

        let embedder = counting(false);
        let snapshot = cache.rebuild(&embedder, docs()).await.unwrap();
        assert_eq!(snapshot.len(), 3);
        // Two batches of two and one.
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
        assert!(!cache.needs_rebuild(&docs()));
    }

    #[tokio::test]
    async fn ensure_skips_unchanged_corpus() {
        let cache = CorpusCache::default();
        let embedder = counting(false);
        cache.ensure(&embedder, &docs()).await.unwrap();
        cache.ensure(&embedder, &docs()).await.unwrap();
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);

        let mut changed = docs();
        changed[0].content.push_str(" (개정)");
        cache.ensure(&embedder, &changed).await.unwrap();
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_rebuild_keeps_previous_snapshot() {
        let cache = CorpusCache::default();
        let ok = counting(false);
        let first = cache.rebuild(&ok, docs()).await.unwrap();

        let broken = counting(true);
        let mut changed = docs();
        changed.pop();
        assert!(cache.rebuild(&broken, changed).await.is_err());
        assert!(Arc::ptr_eq(&first, &cache.snapshot()));
    }

    #[tokio::test]
    async fn readers_keep_their_snapshot_across_swaps() {
        let cache = CorpusCache::default();
        let embedder = counting(false);
        cache.rebuild(&embedder, docs()).await.unwrap();
        let held = cache.snapshot();

        cache
            .rebuild(&embedder, vec![CorpusDocument::new("only", "주차장")])
            .await
            .unwrap();
        assert_eq!(held.len(), 3);
        assert_eq!(cache.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn rank_respects_filter_and_order() {
        let cache = CorpusCache::default();
        let embedder = StubEmbedder::new(128);
        let snapshot = cache.rebuild(&embedder, docs()).await.unwrap();
        let query = embedder.embed_text("제2종일반주거지역 미용실");

        let ranked = snapshot.rank(&query, 5, 0.0, |doc| doc.id != "r2");
        assert!(ranked.iter().all(|c| c.source_id != "r2"));
        assert_eq!(ranked[0].source_id, "r3");
        assert!(ranked.windows(2).all(|w| w[0].similarity >= w[1].similarity));
    }

    #[test]
    fn fingerprint_changes_with_content() {
        let a = docs();
        let mut b = docs();
        assert_eq!(corpus_fingerprint(&a), corpus_fingerprint(&b));
        b[1].id = "r9".into();
        assert_ne!(corpus_fingerprint(&a), corpus_fingerprint(&b));
    }
}
