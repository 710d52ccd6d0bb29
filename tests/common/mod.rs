#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use archiroute::{
    ErrorKind, FloorplanSearchAgent, InputType, IntentClassifier, Orchestrator, RegulationConfig,
    RegulationSearchAgent, RouteMetrics,
};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use embedding::{Embedder, EmbeddingError, StubEmbedder};
use image::{DynamicImage, ImageFormat, RgbImage};
use index::{
    FloorplanRecord, InMemoryStore, MetricMap, ParcelRecord, RecordStore, RegulationRecord,
    StoreSnapshot, ZoningEntry, metric_names,
};
use llm::{LlmError, Prompt, ScriptedModel};
use matcher::{HybridRetriever, RetrievalConfig};
use vision::{
    CvAnalysisAgent, Relation, RelationKind, Space, SpaceKind, TopologyGraph, VisionError,
    VisionModel, VisionOutput,
};

pub const DIMENSION: usize = 64;

pub const ANALYSIS_JSON: &str = r#"{
    "room_count": 3, "bathroom_count": 2, "bay_count": 3,
    "living_room_ratio": 0.28, "kitchen_ratio": 0.12, "bathroom_ratio": 0.08,
    "balcony_ratio": 0.1, "windowless_ratio": 0.05, "total_area_m2": 84.9,
    "has_special_space": false, "has_cross_ventilation": true, "has_ensuite_bathroom": true,
    "compliance_grade": 2, "structure_type": "판상형",
    "summary": "남향 3베이 판상형 평면입니다. 거실과 안방이 전면에 배치됩니다."
}"#;

pub const NARRATION: &str = "거실을 중심으로 침실이 양옆에 배치된 구조입니다.";
pub const REGULATION_REPLY: &str =
    "제2종일반주거지역에서는 미용실을 지을 수 있습니다 [건축법 시행령 제14조].";

/// One language model standing in for every prompt the engine sends.
pub fn scripted_model() -> ScriptedModel {
    ScriptedModel::new().respond_with(|prompt: &Prompt| {
        if prompt.system.starts_with("You route questions") {
            let intent = if ["지을", "미용실", "용적률", "건폐율"]
                .iter()
                .any(|w| prompt.user.contains(w))
            {
                "regulation_search"
            } else {
                "floorplan_search"
            };
            return Ok(format!(r#"{{"intent": "{intent}", "confidence": 0.9}}"#));
        }
        if prompt.system.contains("architectural analyst") {
            return Ok(ANALYSIS_JSON.to_string());
        }
        if prompt.system.contains("layout section") {
            return Ok(NARRATION.to_string());
        }
        if prompt.system.contains("building-code assistant") {
            return Ok(REGULATION_REPLY.to_string());
        }
        Err(LlmError::Transport(format!("unexpected prompt: {}", prompt.system)))
    })
}

fn floorplan(id: u64, rooms: u32, baths: u32, document: &str, embedder: &StubEmbedder) -> FloorplanRecord {
    let mut metrics = MetricMap::new();
    metrics.insert(metric_names::ROOM_COUNT, rooms);
    metrics.insert(metric_names::BATHROOM_COUNT, baths);
    metrics.insert(metric_names::TOTAL_AREA_M2, 59.0 + 12.0 * f64::from(rooms));
    FloorplanRecord {
        record_id: id,
        name: format!("평면 {id}"),
        structure_type: Some("판상형".into()),
        metrics,
        document: document.into(),
        embedding: embedder.embed_text(document),
        created_at: Utc.with_ymd_and_hms(2024, 5, id as u32, 9, 0, 0).unwrap(),
    }
}

fn regulation(id: &str, region: Option<&str>, zone: Option<&str>, title: &str, content: &str) -> RegulationRecord {
    RegulationRecord {
        id: id.into(),
        region_code: region.map(str::to_string),
        zone_name: zone.map(str::to_string),
        title: title.into(),
        article: Some("제14조".into()),
        content: content.into(),
    }
}

pub fn store() -> Arc<InMemoryStore> {
    let embedder = StubEmbedder::new(DIMENSION);
    Arc::new(InMemoryStore::new(StoreSnapshot {
        floorplans: vec![
            floorplan(1, 3, 2, "남향 거실과 넓은 주방이 있는 3베이 판상형", &embedder),
            floorplan(2, 3, 2, "맞통풍이 되는 거실과 안방 욕실", &embedder),
            floorplan(3, 4, 2, "복도를 따라 방이 배치된 타워형", &embedder),
            floorplan(4, 2, 1, "작은 주방과 거실이 합쳐진 구조", &embedder),
        ],
        regulations: vec![
            regulation(
                "bl-14",
                None,
                Some("제2종일반주거지역"),
                "건축법 시행령",
                "제2종일반주거지역에서는 제1종 근린생활시설인 미용실을 건축할 수 있다.",
            ),
            regulation(
                "gn-30",
                Some("11680"),
                None,
                "강남구 도시계획 조례",
                "강남구의 건폐율은 조례에서 정하는 비율 이하로 한다.",
            ),
            regulation(
                "hd-12",
                Some("26350"),
                Some("일반상업지역"),
                "해운대구 도시계획 조례",
                "일반상업지역의 용적률은 1000퍼센트 이하로 한다.",
            ),
        ],
        zoning: vec![
            ZoningEntry {
                region_code: "11680".into(),
                region_name: "서울특별시 강남구".into(),
                zone_name: "제2종일반주거지역".into(),
                zone_code: Some("UQA122".into()),
            },
            ZoningEntry {
                region_code: "26350".into(),
                region_name: "부산광역시 해운대구".into(),
                zone_name: "일반상업지역".into(),
                zone_code: None,
            },
        ],
        parcels: vec![ParcelRecord {
            address: "서울특별시 강남구 역삼동 123-45".into(),
            region_code: "11680".into(),
            region_name: "서울특별시 강남구".into(),
            zone_name: "제2종일반주거지역".into(),
        }],
    }))
}

pub fn topology() -> TopologyGraph {
    let space = |id: &str, name: &str, kind: SpaceKind, area: f64| Space {
        id: id.into(),
        name: name.into(),
        kind,
        area_m2: Some(area),
        has_window: kind != SpaceKind::Bathroom,
    };
    TopologyGraph {
        spaces: vec![
            space("s1", "거실", SpaceKind::LivingRoom, 24.0),
            space("s2", "안방", SpaceKind::Bedroom, 14.0),
            space("s3", "침실1", SpaceKind::Bedroom, 10.0),
            space("s4", "욕실", SpaceKind::Bathroom, 5.0),
        ],
        relations: vec![
            Relation {
                from: "s1".into(),
                to: "s2".into(),
                kind: RelationKind::Door,
            },
            Relation {
                from: "s1".into(),
                to: "s3".into(),
                kind: RelationKind::Door,
            },
        ],
    }
}

/// Vision backend that always returns the same topology.
pub struct FixedVision;

#[async_trait]
impl VisionModel for FixedVision {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn infer(&self, _image: &[u8]) -> Result<VisionOutput, VisionError> {
        Ok(VisionOutput {
            topology: topology(),
            visualization: Vec::new(),
        })
    }
}

/// Embedder that fails every call.
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing"
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::Transport("embedding service unreachable".into()))
    }
}

#[derive(Default)]
pub struct RecordingMetrics {
    pub routes: Mutex<Vec<(InputType, String, Option<ErrorKind>)>>,
    pub rejected: AtomicUsize,
}

impl RouteMetrics for RecordingMetrics {
    fn record_route(
        &self,
        input_type: InputType,
        agent_used: &str,
        _latency: Duration,
        failure: Option<ErrorKind>,
    ) {
        self.routes
            .lock()
            .unwrap()
            .push((input_type, agent_used.to_string(), failure));
    }

    fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub model: Arc<ScriptedModel>,
    pub metrics: Arc<RecordingMetrics>,
}

pub fn harness_with(model: ScriptedModel, embedder: Arc<dyn Embedder>) -> Harness {
    let store: Arc<dyn RecordStore> = store();
    let model = Arc::new(model);
    let metrics = Arc::new(RecordingMetrics::default());

    let retriever = HybridRetriever::new(
        store.clone(),
        embedder.clone(),
        RetrievalConfig {
            min_similarity: -1.0,
            ..Default::default()
        },
    )
    .unwrap();
    let orchestrator = Orchestrator::new(
        IntentClassifier::new(model.clone()),
        CvAnalysisAgent::new(Arc::new(FixedVision), model.clone(), embedder.clone()),
        FloorplanSearchAgent::new(retriever, model.clone()),
        RegulationSearchAgent::new(
            store,
            embedder,
            model.clone(),
            RegulationConfig {
                min_similarity: -1.0,
                ..Default::default()
            },
        ),
    )
    .with_metrics(metrics.clone());

    Harness {
        orchestrator,
        model,
        metrics,
    }
}

pub fn harness() -> Harness {
    harness_with(scripted_model(), Arc::new(StubEmbedder::new(DIMENSION)))
}

/// A small valid PNG standing in for a floor-plan photo.
pub fn floorplan_png() -> Vec<u8> {
    let img = RgbImage::from_fn(32, 24, |x, y| {
        if x % 8 == 0 || y % 8 == 0 {
            image::Rgb([30, 30, 30])
        } else {
            image::Rgb([245, 245, 245])
        }
    });
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}
