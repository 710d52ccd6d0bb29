use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::telemetry::PrometheusMetrics;
use archiroute::{Orchestrator, RouterConfig};
use dashmap::DashMap;
use index::{InMemoryStore, RecordStore, StoreConfig};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared application state
#[derive(Clone)]
pub struct ServerState {
    /// Server configuration
    pub config: Arc<ServerConfig>,

    /// Rate limit tracking: API key -> (count, window_start)
    pub rate_limiter: Arc<DashMap<String, (u32, Instant)>>,

    /// Routing engine (shared across requests)
    pub orchestrator: Arc<Orchestrator>,

    /// Record store the engine reads from
    pub store: Arc<InMemoryStore>,

    /// Renders `/metrics`; `None` when metrics are disabled
    pub metrics: Option<PrometheusHandle>,
}

impl ServerState {
    /// Load the store and engine configuration named in `config` and
    /// assemble the orchestrator.
    pub fn load(config: ServerConfig, metrics: Option<PrometheusHandle>) -> ServerResult<Self> {
        let store_config = match &config.store_path {
            Some(path) => StoreConfig::json_file(path),
            None => StoreConfig::InMemory,
        };
        let store = store_config.build()?;

        let engine = match &config.engine_config {
            Some(path) => RouterConfig::from_file(path)?,
            None => RouterConfig::default(),
        };
        let record_store: Arc<dyn RecordStore> = store.clone();
        let orchestrator = engine.build_observed(record_store, Arc::new(PrometheusMetrics))?;

        Ok(Self::new(config, orchestrator, store, metrics))
    }

    /// Create state around an already assembled orchestrator.
    pub fn new(
        config: ServerConfig,
        orchestrator: Orchestrator,
        store: Arc<InMemoryStore>,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            rate_limiter: Arc::new(DashMap::new()),
            orchestrator: Arc::new(orchestrator),
            store,
            metrics,
        }
    }

    /// Check if API key is valid
    pub fn is_valid_api_key(&self, key: &str) -> bool {
        self.config.api_keys.contains(key)
    }

    /// Fixed one-minute window per API key.
    pub fn check_rate_limit(&self, key: &str) -> bool {
        let now = Instant::now();
        let window = Duration::from_secs(60);
        let limit = self.config.rate_limit_per_minute;

        let mut entry = self.rate_limiter.entry(key.to_string()).or_insert((0, now));
        let (count, window_start) = entry.value_mut();

        if now.duration_since(*window_start) > window {
            *count = 0;
            *window_start = now;
        }

        if *count >= limit {
            return false;
        }

        *count += 1;
        true
    }
}
