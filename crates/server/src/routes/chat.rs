use super::UploadForm;
use crate::error::{ServerError, ServerResult};
use crate::middleware::RequestId;
use crate::state::ServerState;
use archiroute::OrchestrationResult;
use axum::extract::{Multipart, State};
use axum::{Extension, Json};
use std::sync::Arc;

/// Route one question (POST /api/v1/chat).
///
/// Multipart fields: `requester_id` (required), `question`, `image`.
/// Agent failures still answer 200 with the degraded response; only a
/// request with neither a question nor an image is refused.
pub async fn chat(
    State(state): State<Arc<ServerState>>,
    Extension(http_request_id): Extension<RequestId>,
    multipart: Multipart,
) -> ServerResult<Json<OrchestrationResult>> {
    let form = UploadForm::read(multipart).await?;

    let requester_id = form
        .requester_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ServerError::BadRequest("'requester_id' field is required".into()))?;
    let question = form.question.unwrap_or_default();

    let result = state
        .orchestrator
        .route(&requester_id, &question, form.image.as_deref())
        .await?;

    tracing::debug!(
        http_request_id = %http_request_id.0,
        request_id = ?result.request_id(),
        agent_used = result.agent_used(),
        "chat answered"
    );
    Ok(Json(result))
}
