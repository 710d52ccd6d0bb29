use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::{VisionError, VisionModel, VisionOutput};

/// A labelling backend with its benchmark score and relative cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendCandidate {
    pub name: String,
    /// Benchmark quality, higher is better.
    pub quality: f64,
    /// Relative cost per call, lower is better.
    #[serde(default)]
    pub cost: f64,
    /// HTTP endpoint when the backend is remote.
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl BackendCandidate {
    pub fn new(name: impl Into<String>, quality: f64, cost: f64) -> Self {
        Self {
            name: name.into(),
            quality,
            cost,
            endpoint: None,
        }
    }
}

/// Pick the cheapest candidate whose quality is within `tolerance` of the best.
///
/// `tolerance` is relative to the top score: with 0.05 a candidate scoring
/// at least 95% of the best is acceptable. Equal costs prefer higher quality,
/// then the lexicographically smaller name. Candidates with a non-finite
/// quality are ignored.
pub fn select_backend(candidates: &[BackendCandidate], tolerance: f64) -> Option<&BackendCandidate> {
    let scored = candidates.iter().filter(|c| c.quality.is_finite());
    let best = scored.clone().map(|c| c.quality).reduce(f64::max)?;
    let floor = best - best.abs() * tolerance.max(0.0);

    scored.filter(|c| c.quality >= floor).min_by(|a, b| {
        a.cost
            .total_cmp(&b.cost)
            .then_with(|| b.quality.total_cmp(&a.quality))
            .then_with(|| a.name.cmp(&b.name))
    })
}

/// A [`VisionModel`] that delegates to the backend chosen by
/// [`select_backend`] at construction.
pub struct VisionRouter {
    active: BackendCandidate,
    model: Arc<dyn VisionModel>,
    candidates: Vec<BackendCandidate>,
}

impl VisionRouter {
    pub fn build(
        backends: Vec<(BackendCandidate, Arc<dyn VisionModel>)>,
        tolerance: f64,
    ) -> Result<Self, VisionError> {
        let candidates: Vec<BackendCandidate> = backends.iter().map(|(c, _)| c.clone()).collect();
        let chosen = select_backend(&candidates, tolerance)
            .ok_or_else(|| VisionError::InvalidConfig("no usable vision backend candidates".into()))?
            .name
            .clone();

        let (active, model) = backends
            .into_iter()
            .find(|(c, _)| c.name == chosen)
            .ok_or_else(|| VisionError::InvalidConfig(format!("backend {chosen} vanished")))?;

        tracing::info!(
            backend = %active.name,
            quality = active.quality,
            cost = active.cost,
            candidates = candidates.len(),
            tolerance,
            "selected vision backend"
        );
        Ok(Self {
            active,
            model,
            candidates,
        })
    }

    pub fn active(&self) -> &BackendCandidate {
        &self.active
    }

    pub fn candidates(&self) -> &[BackendCandidate] {
        &self.candidates
    }
}

#[async_trait]
impl VisionModel for VisionRouter {
    fn name(&self) -> &str {
        &self.active.name
    }

    async fn infer(&self, image: &[u8]) -> Result<VisionOutput, VisionError> {
        self.model.infer(image).await
    }
}

impl std::fmt::Debug for VisionRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionRouter")
            .field("active", &self.active)
            .field("candidates", &self.candidates)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NoVisionBackend;

    #[test]
    fn prefers_cheaper_backend_within_tolerance() {
        let candidates = vec![
            BackendCandidate::new("premium", 0.92, 10.0),
            BackendCandidate::new("budget", 0.89, 1.0),
            BackendCandidate::new("weak", 0.70, 0.1),
        ];
        // 0.89 >= 0.92 * 0.95 = 0.874
        assert_eq!(select_backend(&candidates, 0.05).unwrap().name, "budget");
        // with no tolerance only the best qualifies
        assert_eq!(select_backend(&candidates, 0.0).unwrap().name, "premium");
    }

    #[test]
    fn outside_tolerance_falls_back_to_best() {
        let candidates = vec![
            BackendCandidate::new("premium", 0.92, 10.0),
            BackendCandidate::new("budget", 0.80, 1.0),
        ];
        assert_eq!(select_backend(&candidates, 0.05).unwrap().name, "premium");
    }

    #[test]
    fn equal_cost_prefers_quality_then_name() {
        let candidates = vec![
            BackendCandidate::new("b", 0.90, 1.0),
            BackendCandidate::new("a", 0.90, 1.0),
            BackendCandidate::new("c", 0.91, 1.0),
        ];
        assert_eq!(select_backend(&candidates, 0.05).unwrap().name, "c");
        let tied = &candidates[..2];
        assert_eq!(select_backend(tied, 0.05).unwrap().name, "a");
    }

    #[test]
    fn nothing_to_choose_from() {
        assert!(select_backend(&[], 0.05).is_none());
        assert!(select_backend(&[BackendCandidate::new("nan", f64::NAN, 0.0)], 0.05).is_none());
    }

    #[test]
    fn router_exposes_the_selected_backend() {
        let model: Arc<dyn VisionModel> = Arc::new(NoVisionBackend);
        let backends = vec![
            (BackendCandidate::new("premium", 0.92, 10.0), model.clone()),
            (BackendCandidate::new("budget", 0.90, 1.0), model),
        ];
        let router = VisionRouter::build(backends, 0.05).unwrap();
        assert_eq!(router.active().name, "budget");
        assert_eq!(router.name(), "budget");
        assert_eq!(router.candidates().len(), 2);
        assert!(VisionRouter::build(Vec::new(), 0.05).is_err());
    }
}
