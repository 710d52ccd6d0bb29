use std::sync::Arc;
use std::time::Duration;

use resilience::RetryPolicy;
use serde::{Deserialize, Serialize};

use crate::model::{HttpVisionModel, NoVisionBackend, VisionError, VisionModel};
use crate::selection::{BackendCandidate, VisionRouter};

/// Default cap on uploaded image size (20 MiB).
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

/// Runtime configuration for the CV analysis pipeline.
///
/// ```yaml
/// vision:
///   selection_tolerance: 0.05
///   backends:
///     - { name: premium, quality: 0.92, cost: 10.0, endpoint: "http://cv-a:8000/infer" }
///     - { name: budget,  quality: 0.90, cost: 1.0,  endpoint: "http://cv-b:8000/infer" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Single backend endpoint, used when `backends` is empty.
    pub endpoint: Option<String>,
    pub api_key_env: Option<String>,
    pub request_timeout_secs: u64,
    pub max_image_bytes: usize,
    /// Relative quality slack when choosing among `backends`.
    pub selection_tolerance: f64,
    pub backends: Vec<BackendCandidate>,
    pub retry: RetryPolicy,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key_env: None,
            request_timeout_secs: 120,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            selection_tolerance: 0.05,
            backends: Vec::new(),
            retry: RetryPolicy::default(),
        }
    }
}

impl VisionConfig {
    pub fn validate(&self) -> Result<(), VisionError> {
        if !(0.0..=1.0).contains(&self.selection_tolerance) {
            return Err(VisionError::InvalidConfig(format!(
                "selection_tolerance must be between 0 and 1, got {}",
                self.selection_tolerance
            )));
        }
        if self.max_image_bytes == 0 {
            return Err(VisionError::InvalidConfig(
                "max_image_bytes must be greater than zero".into(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(VisionError::InvalidConfig(
                "request_timeout_secs must be greater than zero".into(),
            ));
        }
        if let Some(missing) = self.backends.iter().find(|b| b.endpoint.is_none()) {
            return Err(VisionError::InvalidConfig(format!(
                "backend {} has no endpoint",
                missing.name
            )));
        }
        self.retry.validate().map_err(VisionError::InvalidConfig)
    }

    fn api_key(&self) -> Result<Option<String>, VisionError> {
        match self.api_key_env.as_deref() {
            Some(var) => std::env::var(var).map(Some).map_err(|_| {
                VisionError::InvalidConfig(format!("environment variable {var} is not set"))
            }),
            None => Ok(None),
        }
    }
}

/// Build the vision backend described by `cfg`.
///
/// Several `backends` go through [`VisionRouter`]; a lone `endpoint` is used
/// directly; with neither, image requests fail with
/// [`VisionError::Unavailable`].
pub fn build_vision_model(cfg: &VisionConfig) -> Result<Arc<dyn VisionModel>, VisionError> {
    cfg.validate()?;
    let timeout = Duration::from_secs(cfg.request_timeout_secs);
    let api_key = cfg.api_key()?;

    if !cfg.backends.is_empty() {
        let mut backends: Vec<(BackendCandidate, Arc<dyn VisionModel>)> =
            Vec::with_capacity(cfg.backends.len());
        for candidate in &cfg.backends {
            let endpoint = candidate.endpoint.clone().unwrap_or_default();
            let model = HttpVisionModel::new(
                candidate.name.clone(),
                endpoint,
                api_key.clone(),
                timeout,
                cfg.retry,
            )?;
            backends.push((candidate.clone(), Arc::new(model)));
        }
        return Ok(Arc::new(VisionRouter::build(backends, cfg.selection_tolerance)?));
    }

    match cfg.endpoint.as_deref() {
        Some(endpoint) => Ok(Arc::new(HttpVisionModel::new(
            "default",
            endpoint,
            api_key,
            timeout,
            cfg.retry,
        )?)),
        None => {
            tracing::warn!("no vision backend configured, image analysis is disabled");
            Ok(Arc::new(NoVisionBackend))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = VisionConfig::default();
        assert_eq!(cfg.selection_tolerance, 0.05);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn tolerance_out_of_range_is_rejected() {
        let cfg = VisionConfig {
            selection_tolerance: 1.5,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn backends_need_endpoints() {
        let cfg = VisionConfig {
            backends: vec![BackendCandidate::new("a", 0.9, 1.0)],
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(VisionError::InvalidConfig(_))));
    }

    #[test]
    fn builds_router_for_several_backends() {
        let mut a = BackendCandidate::new("premium", 0.92, 10.0);
        a.endpoint = Some("http://127.0.0.1:9/a".into());
        let mut b = BackendCandidate::new("budget", 0.90, 1.0);
        b.endpoint = Some("http://127.0.0.1:9/b".into());
        let cfg = VisionConfig {
            backends: vec![a, b],
            ..Default::default()
        };
        let model = build_vision_model(&cfg).unwrap();
        assert_eq!(model.name(), "budget");
    }

    #[test]
    fn nothing_configured_disables_analysis() {
        let model = build_vision_model(&VisionConfig::default()).unwrap();
        assert_eq!(model.name(), "none");
    }

    #[test]
    fn parses_yaml_like_json() {
        let cfg: VisionConfig = serde_json::from_str(
            r#"{"endpoint": "http://cv:8000/infer", "selection_tolerance": 0.1}"#,
        )
        .unwrap();
        assert_eq!(cfg.endpoint.as_deref(), Some("http://cv:8000/infer"));
        assert_eq!(cfg.max_image_bytes, DEFAULT_MAX_IMAGE_BYTES);
        assert_eq!(cfg.selection_tolerance, 0.1);
    }
}
