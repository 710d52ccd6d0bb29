use super::UploadForm;
use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use axum::extract::{Multipart, State};
use axum::Json;
use std::sync::Arc;
use vision::{AnalysisMode, CvAnalysisResult};

/// Analyse an uploaded floor plan without searching or narrating
/// (POST /api/v1/floorplans/analyze).
///
/// Runs the preview pipeline: topology, its rendering and the structured
/// analysis. Unlike `/api/v1/chat`, failures are reported as errors.
pub async fn analyze_floorplan(
    State(state): State<Arc<ServerState>>,
    multipart: Multipart,
) -> ServerResult<Json<CvAnalysisResult>> {
    let form = UploadForm::read(multipart).await?;
    let image = form
        .image
        .ok_or_else(|| ServerError::BadRequest("'image' field is required".into()))?;

    let result = state
        .orchestrator
        .cv_agent()
        .analyze(&image, AnalysisMode::Preview)
        .await?;
    Ok(Json(result))
}
