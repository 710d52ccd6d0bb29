use super::*;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use embedding::StubEmbedder;
use index::{metric_names, InMemoryStore, MetricMap, StoreSnapshot};

use crate::rerank::RerankError;
use crate::types::RerankerConfig;

const DIM: usize = 64;

fn plan(id: u64, rooms: u32, baths: u32, day: u32, document: &str) -> FloorplanRecord {
    let metrics: MetricMap = [
        (metric_names::ROOM_COUNT, f64::from(rooms)),
        (metric_names::BATHROOM_COUNT, f64::from(baths)),
    ]
    .into_iter()
    .collect();
    FloorplanRecord {
        record_id: id,
        name: format!("plan-{id}"),
        structure_type: None,
        metrics,
        document: document.to_string(),
        embedding: Vec::new(),
        created_at: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
    }
}

async fn embedded(mut records: Vec<FloorplanRecord>) -> Vec<FloorplanRecord> {
    let embedder = StubEmbedder::new(DIM);
    for record in &mut records {
        record.embedding = embedder.embed(&record.document).await.unwrap();
    }
    records
}

fn retriever(records: Vec<FloorplanRecord>, config: RetrievalConfig) -> HybridRetriever {
    let store = Arc::new(InMemoryStore::new(StoreSnapshot {
        floorplans: records,
        ..Default::default()
    }));
    HybridRetriever::new(store, Arc::new(StubEmbedder::new(DIM)), config).unwrap()
}

fn open_config() -> RetrievalConfig {
    RetrievalConfig {
        min_similarity: -1.0,
        ..Default::default()
    }
}

#[tokio::test]
async fn pure_filter_query_orders_by_recency() {
    let r = retriever(
        vec![
            plan(1, 3, 2, 1, ""),
            plan(2, 3, 1, 2, ""),
            plan(3, 3, 2, 5, ""),
            plan(4, 4, 2, 9, ""),
        ],
        RetrievalConfig::default(),
    );
    let outcome = r.search("방 3개, 화장실 2개인 아파트 찾아줘").await.unwrap();
    assert!(outcome.parsed.residual.is_empty());
    assert_eq!(outcome.candidates, 2);
    assert_eq!(outcome.record_ids(), vec![3, 1]);
    assert!(outcome.hits.iter().all(|h| h.similarity == 0.0 && h.rerank_score.is_none()));
}

#[tokio::test]
async fn exact_target_outranks_newer_partial_match() {
    let r = retriever(
        vec![plan(1, 3, 1, 1, ""), plan(2, 4, 1, 20, "")],
        RetrievalConfig::default(),
    );
    let outcome = r.search("방 3개 이상").await.unwrap();
    assert_eq!(outcome.record_ids(), vec![1, 2]);
    assert_eq!(outcome.hits[0].specificity, 1);
    assert_eq!(outcome.hits[1].specificity, 0);
}

#[tokio::test]
async fn no_candidates_is_an_empty_result() {
    let r = retriever(vec![plan(1, 2, 1, 1, "")], RetrievalConfig::default());
    let outcome = r.search("방 5개 남향").await.unwrap();
    assert_eq!(outcome.candidates, 0);
    assert!(outcome.hits.is_empty());
}

#[tokio::test]
async fn results_are_capped_at_max_results() {
    let records = (1..=8).map(|i| plan(i, 3, 2, i as u32, "")).collect();
    let r = retriever(
        records,
        RetrievalConfig {
            max_results: 3,
            ..Default::default()
        },
    );
    let outcome = r.search("방 3개").await.unwrap();
    assert_eq!(outcome.record_ids(), vec![8, 7, 6]);
}

#[tokio::test]
async fn residual_text_is_ranked_by_similarity() {
    let records = embedded(vec![
        plan(1, 3, 2, 1, "북향 타워형 작은 주방"),
        plan(2, 3, 2, 1, "남향 거실 넓은 주방"),
        plan(3, 2, 1, 1, "남향 거실 넓은 주방"),
    ])
    .await;
    let r = retriever(records, open_config()).with_reranker(None);
    let outcome = r.search("방 3개 남향 거실 넓은 주방").await.unwrap();

    // Record 3 fails the room filter even though its text is identical.
    assert_eq!(outcome.candidates, 2);
    assert_eq!(outcome.record_ids()[0], 2);
    assert!(outcome.hits[0].similarity > outcome.hits[1].similarity);
    assert_eq!(outcome.hits[0].specificity, 1);
}

#[tokio::test]
async fn weak_and_mismatched_embeddings_are_dropped() {
    let mut records = embedded(vec![plan(1, 3, 2, 1, "남향 거실")]).await;
    let mut wrong_dim = plan(2, 3, 2, 1, "남향 거실");
    wrong_dim.embedding = vec![1.0; 3];
    records.push(wrong_dim);
    records.push(plan(3, 3, 2, 1, "남향 거실"));

    let r = retriever(records, RetrievalConfig::default());
    let outcome = r.search("남향 거실").await.unwrap();
    assert_eq!(outcome.candidates, 3);
    assert_eq!(outcome.record_ids(), vec![1]);
}

#[tokio::test]
async fn lexical_rerank_blends_scores() {
    let records = embedded(vec![
        plan(1, 3, 2, 1, "드레스룸 있는 안방"),
        plan(2, 3, 2, 1, "다용도실 옆 주방"),
    ])
    .await;
    let r = retriever(records, open_config());
    let outcome = r.search("드레스룸 있는 안방").await.unwrap();
    let top = &outcome.hits[0];
    assert_eq!(top.record_id(), 1);
    let rerank = top.rerank_score.unwrap();
    let expected = blend_score(top.similarity, Some(rerank), r.config().rerank_weight);
    assert!((top.score - expected).abs() < 1e-6);
}

struct FailingReranker;

#[async_trait]
impl Reranker for FailingReranker {
    fn name(&self) -> &str {
        "failing"
    }

    async fn score(&self, _query: &str, _documents: &[String]) -> Result<Vec<f32>, RerankError> {
        Err(RerankError::Transport("connection refused".into()))
    }
}

#[tokio::test]
async fn rerank_failure_keeps_similarity_order() {
    let records = embedded(vec![plan(1, 3, 2, 1, "남향 거실"), plan(2, 3, 2, 1, "북향")]).await;
    let r = retriever(records, open_config()).with_reranker(Some(Arc::new(FailingReranker)));
    let outcome = r.search("남향 거실").await.unwrap();
    assert_eq!(outcome.record_ids()[0], 1);
    assert!(outcome.hits.iter().all(|h| h.rerank_score.is_none()));
    assert!(outcome.hits.iter().all(|h| h.score == h.similarity));
}

#[derive(Default)]
struct CountingMetrics {
    calls: RwLock<Vec<(&'static str, usize, usize)>>,
}

impl RetrievalMetrics for CountingMetrics {
    fn record_retrieval(
        &self,
        path: RetrievalPath,
        _latency: Duration,
        candidates: usize,
        hits: usize,
    ) {
        self.calls
            .write()
            .unwrap()
            .push((path.as_str(), candidates, hits));
    }
}

#[tokio::test]
async fn metrics_observer_sees_each_search() {
    let metrics = Arc::new(CountingMetrics::default());
    let records = embedded(vec![plan(1, 3, 2, 1, "남향 거실")]).await;
    let r = retriever(records, open_config()).with_metrics(metrics.clone());

    r.search("방 3개").await.unwrap();
    r.search("남향 거실").await.unwrap();

    let calls = metrics.calls.read().unwrap();
    assert_eq!(
        *calls,
        vec![("filter_only", 1, 1), ("semantic", 1, 1)]
    );
}

#[test]
fn invalid_config_is_rejected() {
    let store = Arc::new(InMemoryStore::new(StoreSnapshot::default()));
    let bad = RetrievalConfig {
        rerank_weight: 1.5,
        ..Default::default()
    };
    let err = HybridRetriever::new(store.clone(), Arc::new(StubEmbedder::new(DIM)), bad).unwrap_err();
    assert!(matches!(err, MatchError::InvalidConfig(_)));

    let too_few = RetrievalConfig {
        max_results: 10,
        rerank_candidates: 5,
        reranker: RerankerConfig::Disabled,
        ..Default::default()
    };
    assert!(HybridRetriever::new(store, Arc::new(StubEmbedder::new(DIM)), too_few).is_err());
}
