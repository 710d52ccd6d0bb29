use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use resilience::{execute_with_retry, RetryClass, RetryPolicy, Retryable};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::topology::TopologyGraph;

/// What a vision backend returns for one image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisionOutput {
    pub topology: TopologyGraph,
    /// PNG bytes of the backend's own visualisation; empty when it has none.
    pub visualization: Vec<u8>,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum VisionError {
    #[error("invalid vision config: {0}")]
    InvalidConfig(String),
    /// The backend looked at the image and could not read a floor plan from it.
    #[error("could not process image: {0}")]
    Unprocessable(String),
    #[error("vision request failed: {0}")]
    Transport(String),
    #[error("vision request timed out after {0:?}")]
    Timeout(Duration),
    #[error("vision backend rate limited the request")]
    RateLimited { retry_after: Option<Duration> },
    #[error("vision backend returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("unexpected vision response: {0}")]
    Response(String),
    #[error("no vision backend available: {0}")]
    Unavailable(String),
}

impl Retryable for VisionError {
    fn retry_class(&self) -> RetryClass {
        match self {
            VisionError::Transport(_) | VisionError::Timeout(_) => RetryClass::Transient,
            VisionError::RateLimited { retry_after } => RetryClass::RateLimited {
                retry_after: *retry_after,
            },
            VisionError::Api { status, .. } => RetryClass::from_status(*status, None),
            VisionError::InvalidConfig(_)
            | VisionError::Unprocessable(_)
            | VisionError::Response(_)
            | VisionError::Unavailable(_) => RetryClass::Permanent,
        }
    }

    fn timed_out(limit: Duration) -> Self {
        VisionError::Timeout(limit)
    }
}

/// Structural inference over a floor-plan image.
#[async_trait]
pub trait VisionModel: Send + Sync {
    fn name(&self) -> &str;

    async fn infer(&self, image: &[u8]) -> Result<VisionOutput, VisionError>;
}

/// Placeholder used when no vision backend is configured.
#[derive(Debug, Clone, Default)]
pub struct NoVisionBackend;

#[async_trait]
impl VisionModel for NoVisionBackend {
    fn name(&self) -> &str {
        "none"
    }

    async fn infer(&self, _image: &[u8]) -> Result<VisionOutput, VisionError> {
        Err(VisionError::Unavailable(
            "image analysis is not configured on this deployment".into(),
        ))
    }
}

#[derive(Debug, Deserialize)]
struct InferResponse {
    #[serde(default)]
    topology: Option<TopologyGraph>,
    #[serde(default)]
    visualization: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Vision backend reached over HTTP.
///
/// Posts `{"image": <base64>}` and expects
/// `{"topology": {...}, "visualization": <base64 png>}`. HTTP 422 or an
/// `error` field without a topology means the image could not be processed.
#[derive(Debug, Clone)]
pub struct HttpVisionModel {
    name: String,
    client: reqwest::Client,
    endpoint: String,
    auth_header: Option<String>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl HttpVisionModel {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, VisionError> {
        let endpoint = endpoint.into();
        if endpoint.trim().is_empty() {
            return Err(VisionError::InvalidConfig("endpoint must not be empty".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| VisionError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            name: name.into(),
            client,
            endpoint,
            auth_header: api_key.map(|key| format!("Bearer {key}")),
            timeout,
            retry,
        })
    }

    async fn send_once(&self, payload: &serde_json::Value) -> Result<VisionOutput, VisionError> {
        let mut request = self.client.post(&self.endpoint).json(payload);
        if let Some(header) = self.auth_header.as_deref() {
            request = request.header(reqwest::header::AUTHORIZATION, header);
        }
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                VisionError::Timeout(self.timeout)
            } else {
                VisionError::Transport(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        match status {
            429 => {
                return Err(VisionError::RateLimited {
                    retry_after: retry_after(response.headers()),
                })
            }
            422 => {
                let body = response.text().await.unwrap_or_default();
                return Err(VisionError::Unprocessable(body));
            }
            200..=299 => {}
            _ => {
                let body = response.text().await.unwrap_or_default();
                return Err(VisionError::Api { status, body });
            }
        }

        let body: InferResponse = response
            .json()
            .await
            .map_err(|e| VisionError::Response(e.to_string()))?;
        decode_infer_response(body)
    }
}

#[async_trait]
impl VisionModel for HttpVisionModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn infer(&self, image: &[u8]) -> Result<VisionOutput, VisionError> {
        let payload = json!({ "image": STANDARD.encode(image) });
        execute_with_retry(&self.retry, |_attempt| self.send_once(&payload))
            .await
            .into_result()
    }
}

fn decode_infer_response(body: InferResponse) -> Result<VisionOutput, VisionError> {
    let topology = match (body.topology, body.error) {
        (Some(topology), _) => topology,
        (None, Some(reason)) => return Err(VisionError::Unprocessable(reason)),
        (None, None) => return Err(VisionError::Response("missing `topology`".into())),
    };
    let visualization = match body.visualization.as_deref() {
        Some(encoded) if !encoded.is_empty() => STANDARD
            .decode(encoded)
            .map_err(|e| VisionError::Response(format!("visualization is not base64: {e}")))?,
        _ => Vec::new(),
    };
    Ok(VisionOutput {
        topology,
        visualization,
    })
}

fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Result<VisionOutput, VisionError> {
        decode_infer_response(serde_json::from_str(raw).unwrap())
    }

    #[test]
    fn decodes_topology_and_visualization() {
        let encoded = STANDARD.encode([0x89, b'P', b'N', b'G']);
        let out = parse(&format!(
            r#"{{"topology": {{"spaces": [], "relations": []}}, "visualization": "{encoded}"}}"#
        ))
        .unwrap();
        assert!(out.topology.is_empty());
        assert_eq!(out.visualization, vec![0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn error_without_topology_is_unprocessable() {
        let err = parse(r#"{"error": "not a floor plan"}"#).unwrap_err();
        assert_eq!(err, VisionError::Unprocessable("not a floor plan".into()));
        assert!(!err.retry_class().is_retryable());
    }

    #[test]
    fn missing_topology_is_a_response_error() {
        assert!(matches!(parse("{}"), Err(VisionError::Response(_))));
    }

    #[test]
    fn bad_base64_is_rejected() {
        let err = parse(r#"{"topology": {}, "visualization": "***"}"#).unwrap_err();
        assert!(matches!(err, VisionError::Response(_)));
    }

    #[test]
    fn empty_endpoint_is_invalid() {
        let err = HttpVisionModel::new(
            "cv",
            " ",
            None,
            Duration::from_secs(1),
            RetryPolicy::default(),
        )
        .unwrap_err();
        assert!(matches!(err, VisionError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn disabled_backend_reports_unavailable() {
        let err = NoVisionBackend.infer(b"png").await.unwrap_err();
        assert!(matches!(err, VisionError::Unavailable(_)));
    }

    #[test]
    fn server_errors_are_transient() {
        let err = VisionError::Api {
            status: 502,
            body: String::new(),
        };
        assert_eq!(err.retry_class(), RetryClass::Transient);
    }
}
