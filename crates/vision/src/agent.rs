use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use embedding::{Embedder, EmbeddingError};
use image::{ImageFormat, ImageReader};
use index::MetricMap;
use llm::{complete_json_validated, LanguageModel, LlmError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analysis::{analysis_prompt, FloorplanAnalysis};
use crate::config::DEFAULT_MAX_IMAGE_BYTES;
use crate::model::{VisionError, VisionModel};
use crate::render::render_topology_png;
use crate::topology::TopologyGraph;

/// How much of the pipeline to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    /// Topology, visualisation and structured analysis only.
    Preview,
    /// Preview plus metrics, document and embedding.
    #[default]
    Full,
}

/// Everything the pipeline learned about one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvAnalysisResult {
    pub mode: AnalysisMode,
    pub topology: TopologyGraph,
    /// Base64 PNG visualisation of the topology.
    pub topology_image: String,
    pub structured_analysis: FloorplanAnalysis,
    /// Empty in preview mode.
    pub metrics: MetricMap,
    /// Empty in preview mode.
    pub document: String,
    /// Empty in preview mode.
    pub embedding: Vec<f32>,
}

impl CvAnalysisResult {
    pub fn is_complete(&self) -> bool {
        self.mode == AnalysisMode::Full
    }
}

/// Terminal failure of one pipeline stage. No partial result is returned.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("vision stage failed: {0}")]
    Vision(#[from] VisionError),
    #[error("structured analysis failed: {0}")]
    Analysis(#[from] LlmError),
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),
}

/// Turns a floor-plan image into topology, metrics, a document and a vector.
///
/// Stages run strictly in order and the first failure ends the request.
pub struct CvAnalysisAgent {
    vision: Arc<dyn VisionModel>,
    llm: Arc<dyn LanguageModel>,
    embedder: Arc<dyn Embedder>,
    max_image_bytes: usize,
}

impl CvAnalysisAgent {
    pub fn new(
        vision: Arc<dyn VisionModel>,
        llm: Arc<dyn LanguageModel>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            vision,
            llm,
            embedder,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }

    pub fn with_max_image_bytes(mut self, max_image_bytes: usize) -> Self {
        self.max_image_bytes = max_image_bytes;
        self
    }

    pub async fn analyze(
        &self,
        image: &[u8],
        mode: AnalysisMode,
    ) -> Result<CvAnalysisResult, AnalysisError> {
        let started = Instant::now();
        let format = validate_image(image, self.max_image_bytes)?;

        let output = self.vision.infer(image).await?;
        tracing::debug!(
            backend = self.vision.name(),
            ?format,
            spaces = output.topology.spaces.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "topology inferred"
        );
        if output.topology.dangling_relations().next().is_some() {
            tracing::warn!("topology has relations to unknown spaces");
        }

        let analysis: FloorplanAnalysis = complete_json_validated(
            self.llm.as_ref(),
            &analysis_prompt(&output.topology),
            FloorplanAnalysis::validate,
        )
        .await?;
        tracing::debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "structured analysis complete"
        );

        let visualization = if output.visualization.is_empty() {
            render_topology_png(&output.topology).map_err(|e| {
                VisionError::Response(format!("failed to render topology: {e}"))
            })?
        } else {
            output.visualization
        };

        let preview = CvAnalysisResult {
            mode: AnalysisMode::Preview,
            topology: output.topology,
            topology_image: STANDARD.encode(visualization),
            structured_analysis: analysis,
            metrics: MetricMap::new(),
            document: String::new(),
            embedding: Vec::new(),
        };

        match mode {
            AnalysisMode::Preview => Ok(preview),
            AnalysisMode::Full => self.complete(preview).await,
        }
    }

    /// Run the metric, document and embedding stages on a preview result.
    ///
    /// Already complete results are returned unchanged.
    pub async fn complete(
        &self,
        mut result: CvAnalysisResult,
    ) -> Result<CvAnalysisResult, AnalysisError> {
        if result.is_complete() {
            return Ok(result);
        }
        let started = Instant::now();
        result.metrics = result.structured_analysis.to_metrics();
        result.document = result.structured_analysis.render_document();
        result.embedding = self.embedder.embed(&result.document).await?;
        result.mode = AnalysisMode::Full;
        tracing::debug!(
            model = self.embedder.model_name(),
            dimension = result.embedding.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "analysis document embedded"
        );
        Ok(result)
    }
}

/// Reject empty, oversized, unknown or undecodable images before any model call.
pub fn validate_image(image: &[u8], max_bytes: usize) -> Result<ImageFormat, AnalysisError> {
    if image.is_empty() {
        return Err(AnalysisError::InvalidImage("image is empty".into()));
    }
    if image.len() > max_bytes {
        return Err(AnalysisError::InvalidImage(format!(
            "image is {} bytes, limit is {max_bytes}",
            image.len()
        )));
    }
    let format = image::guess_format(image)
        .map_err(|_| AnalysisError::InvalidImage("unrecognised image format".into()))?;
    if !matches!(format, ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::WebP) {
        return Err(AnalysisError::InvalidImage(format!(
            "unsupported image format {format:?}"
        )));
    }
    let (width, height) = ImageReader::with_format(Cursor::new(image), format)
        .into_dimensions()
        .map_err(|e| AnalysisError::InvalidImage(format!("could not read image header: {e}")))?;
    if width == 0 || height == 0 {
        return Err(AnalysisError::InvalidImage("image has no pixels".into()));
    }
    Ok(format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VisionOutput;
    use crate::topology::{Space, SpaceKind};
    use async_trait::async_trait;
    use embedding::StubEmbedder;
    use index::metric_names;
    use llm::ScriptedModel;

    struct FixedVision(Result<VisionOutput, VisionError>);

    #[async_trait]
    impl VisionModel for FixedVision {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn infer(&self, _image: &[u8]) -> Result<VisionOutput, VisionError> {
            self.0.clone()
        }
    }

    const ANALYSIS: &str = r#"{
        "room_count": 3, "bathroom_count": 2, "bay_count": 3,
        "living_room_ratio": 0.3, "kitchen_ratio": 0.1, "bathroom_ratio": 0.08,
        "balcony_ratio": 0.1, "windowless_ratio": 0.05, "total_area_m2": 84.0,
        "has_special_space": false, "has_cross_ventilation": true,
        "has_ensuite_bathroom": true, "compliance_grade": 4,
        "structure_type": "판상형", "summary": "3베이 판상형 구조입니다."
    }"#;

    fn png() -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        image::RgbImage::new(8, 8)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn topology() -> TopologyGraph {
        TopologyGraph {
            spaces: vec![Space {
                id: "r1".into(),
                name: "안방".into(),
                kind: SpaceKind::Bedroom,
                area_m2: Some(12.0),
                has_window: true,
            }],
            relations: vec![],
        }
    }

    fn agent(vision: Result<VisionOutput, VisionError>, llm: ScriptedModel) -> CvAnalysisAgent {
        CvAnalysisAgent::new(
            Arc::new(FixedVision(vision)),
            Arc::new(llm),
            Arc::new(StubEmbedder::new(64)),
        )
    }

    fn ok_vision() -> Result<VisionOutput, VisionError> {
        Ok(VisionOutput {
            topology: topology(),
            visualization: Vec::new(),
        })
    }

    #[tokio::test]
    async fn full_mode_fills_every_field() {
        let agent = agent(ok_vision(), ScriptedModel::new().otherwise(ANALYSIS));
        let result = agent.analyze(&png(), AnalysisMode::Full).await.unwrap();

        assert!(result.is_complete());
        assert_eq!(result.metrics.len(), 13);
        assert_eq!(result.metrics.number(metric_names::ROOM_COUNT), Some(3.0));
        assert!(result.document.contains("방 3개"));
        assert_eq!(result.embedding.len(), 64);
        assert!(!result.topology_image.is_empty());
        assert!(STANDARD.decode(&result.topology_image).is_ok());
    }

    #[tokio::test]
    async fn preview_mode_leaves_derived_fields_empty() {
        let agent = agent(ok_vision(), ScriptedModel::new().otherwise(ANALYSIS));
        let preview = agent.analyze(&png(), AnalysisMode::Preview).await.unwrap();

        assert_eq!(preview.mode, AnalysisMode::Preview);
        assert!(preview.metrics.is_empty());
        assert!(preview.document.is_empty());
        assert!(preview.embedding.is_empty());
        assert_eq!(preview.structured_analysis.room_count, Some(3));

        let full = agent.complete(preview).await.unwrap();
        assert!(full.is_complete());
        assert_eq!(full.metrics.len(), 13);
    }

    #[tokio::test]
    async fn empty_topology_is_analysed() {
        let vision = Ok(VisionOutput::default());
        let agent = agent(vision, ScriptedModel::new().otherwise(r#"{"summary": ""}"#));
        let result = agent.analyze(&png(), AnalysisMode::Full).await.unwrap();
        assert!(result.topology.is_empty());
        assert!(result.metrics.iter().all(|(_, v)| v.is_null()));
    }

    #[tokio::test]
    async fn unprocessable_image_is_a_vision_error() {
        let vision = Err(VisionError::Unprocessable("not a plan".into()));
        let llm = ScriptedModel::new().otherwise(ANALYSIS);
        let agent = agent(vision, llm);
        let err = agent.analyze(&png(), AnalysisMode::Full).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Vision(VisionError::Unprocessable(_))));
    }

    #[tokio::test]
    async fn invalid_analysis_is_retried_once_then_fails() {
        let llm = ScriptedModel::new().otherwise(r#"{"kitchen_ratio": 3.0}"#);
        let agent = agent(ok_vision(), llm);
        let err = agent.analyze(&png(), AnalysisMode::Full).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Analysis(LlmError::Schema(_))));
    }

    #[tokio::test]
    async fn rejects_bad_images_before_calling_models() {
        let llm = Arc::new(ScriptedModel::new().otherwise(ANALYSIS));
        let agent = CvAnalysisAgent::new(
            Arc::new(FixedVision(ok_vision())),
            llm.clone(),
            Arc::new(StubEmbedder::new(8)),
        )
        .with_max_image_bytes(1024);

        for bad in [Vec::new(), b"not an image".to_vec(), vec![0u8; 2048]] {
            let err = agent.analyze(&bad, AnalysisMode::Preview).await.unwrap_err();
            assert!(matches!(err, AnalysisError::InvalidImage(_)));
        }
        assert_eq!(llm.call_count(), 0);
    }

    #[test]
    fn truncated_png_fails_validation() {
        let mut bytes = png();
        bytes.truncate(12);
        assert!(matches!(
            validate_image(&bytes, DEFAULT_MAX_IMAGE_BYTES),
            Err(AnalysisError::InvalidImage(_))
        ));
        assert_eq!(validate_image(&png(), DEFAULT_MAX_IMAGE_BYTES).unwrap(), ImageFormat::Png);
    }
}
