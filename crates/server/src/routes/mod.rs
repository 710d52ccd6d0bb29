//! API route handlers
//!
//! - `health`: liveness, readiness and Prometheus metrics
//! - `chat`: routed questions, with or without a floor-plan image
//! - `analyze`: standalone floor-plan image analysis

pub mod analyze;
pub mod chat;
pub mod health;

use crate::error::{ServerError, ServerResult};
use axum::extract::Multipart;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

/// API version and base info (GET /, no authentication)
pub async fn api_info() -> ServerResult<impl IntoResponse> {
    Ok(Json(json!({
        "name": "archiroute",
        "version": env!("CARGO_PKG_VERSION"),
        "api_version": "v1",
        "endpoints": [
            "/api/v1/chat",
            "/api/v1/floorplans/analyze",
            "/health",
            "/ready",
            "/metrics"
        ]
    })))
}

/// 404 Not Found handler
pub async fn not_found() -> ServerError {
    ServerError::NotFound
}

/// Multipart fields shared by the upload endpoints. Unknown fields are
/// skipped.
#[derive(Debug, Default)]
pub(crate) struct UploadForm {
    pub requester_id: Option<String>,
    pub question: Option<String>,
    pub image: Option<Vec<u8>>,
}

impl UploadForm {
    pub(crate) async fn read(mut multipart: Multipart) -> ServerResult<Self> {
        let mut form = UploadForm::default();
        while let Some(field) = multipart.next_field().await? {
            match field.name() {
                Some("requester_id") => form.requester_id = Some(field.text().await?),
                Some("question") => form.question = Some(field.text().await?),
                Some("image") => {
                    let bytes = field.bytes().await?;
                    if !bytes.is_empty() {
                        form.image = Some(bytes.to_vec());
                    }
                }
                _ => {}
            }
        }
        Ok(form)
    }
}
