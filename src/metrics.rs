use std::time::Duration;

use crate::error::ErrorKind;
use crate::types::InputType;

/// Metrics observer for routed requests.
///
/// Injected through [`crate::Orchestrator::with_metrics`]; the orchestrator
/// works the same without one.
pub trait RouteMetrics: Send + Sync {
    /// One call per completed route, degraded or not.
    fn record_route(
        &self,
        input_type: InputType,
        agent_used: &str,
        latency: Duration,
        failure: Option<ErrorKind>,
    );

    /// A request refused before any agent ran.
    fn record_rejected(&self) {}
}
