//! HTTP REST API for archiroute.
//!
//! Exposes [`archiroute::Orchestrator::route`] over multipart HTTP, plus a
//! standalone floor-plan analysis endpoint, behind API-key authentication
//! and per-key rate limiting.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use server::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::load()?;
//!     server::start_server(config).await?;
//!     Ok(())
//! }
//! ```
//!
//! # API Endpoints
//!
//! Public:
//!
//! - `GET /` - API information
//! - `GET /health` - Liveness probe
//! - `GET /ready` - Readiness probe with store and corpus sizes
//! - `GET /metrics` - Prometheus metrics
//!
//! Protected (`X-API-Key` or `Authorization: Bearer <key>`):
//!
//! - `POST /api/v1/chat` - multipart `requester_id`, `question`, optional `image`
//! - `POST /api/v1/floorplans/analyze` - multipart `image`, preview analysis

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;
pub mod telemetry;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::{build_router, start_server};
pub use state::ServerState;
pub use telemetry::PrometheusMetrics;
