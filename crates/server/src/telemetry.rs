//! Prometheus-backed observers for the routing engine.

use std::time::Duration;

use archiroute::{ErrorKind, InputType, RouteMetrics};
use matcher::{RetrievalMetrics, RetrievalPath};
use metrics::{counter, histogram};

/// Routes engine observations to the globally installed `metrics` recorder.
///
/// Without an installed recorder every call is a no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrometheusMetrics;

impl RouteMetrics for PrometheusMetrics {
    fn record_route(
        &self,
        input_type: InputType,
        agent_used: &str,
        latency: Duration,
        failure: Option<ErrorKind>,
    ) {
        let outcome = failure.map(|k| k.as_str()).unwrap_or("ok");
        counter!(
            "archiroute_routes_total",
            "input_type" => input_type.as_str(),
            "agent" => agent_used.to_string(),
            "outcome" => outcome
        )
        .increment(1);
        histogram!(
            "archiroute_route_latency_seconds",
            "agent" => agent_used.to_string()
        )
        .record(latency.as_secs_f64());
    }

    fn record_rejected(&self) {
        counter!("archiroute_rejected_total").increment(1);
    }
}

impl RetrievalMetrics for PrometheusMetrics {
    fn record_retrieval(
        &self,
        path: RetrievalPath,
        latency: Duration,
        candidates: usize,
        hits: usize,
    ) {
        histogram!("archiroute_retrieval_latency_seconds", "path" => path.as_str())
            .record(latency.as_secs_f64());
        histogram!("archiroute_retrieval_candidates", "path" => path.as_str())
            .record(candidates as f64);
        if hits == 0 {
            counter!("archiroute_retrieval_empty_total", "path" => path.as_str()).increment(1);
        }
    }
}
