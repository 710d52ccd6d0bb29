//! Question routing for a Korean floor-plan and zoning assistant.
//!
//! A request is a requester id, a question and an optional floor-plan image.
//! The [`Orchestrator`] decides who answers it:
//!
//! - an image goes through the [`vision::CvAnalysisAgent`] and is then
//!   described by the [`FloorplanSearchAgent`];
//! - text is classified by the [`IntentClassifier`] and handed either to the
//!   [`FloorplanSearchAgent`] (hybrid search over saved plans) or to the
//!   [`RegulationSearchAgent`] (zoning lookup plus cited regulation articles).
//!
//! Every collaborator is built once, by [`RouterConfig::build`] or by hand,
//! and injected. Agent failures never escape [`Orchestrator::route`]; they turn
//! into the uniform degraded answer and are reported through [`RouteMetrics`].
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use archiroute::RouterConfig;
//! use index::{InMemoryStore, StoreSnapshot};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RouterConfig::from_file("archiroute.yaml")?;
//! let store = Arc::new(InMemoryStore::new(StoreSnapshot::from_json_file("store.json")?));
//! let orchestrator = config.build(store)?;
//!
//! let result = orchestrator
//!     .route("user-1", "강남구 역삼동 123-45에 미용실 지을 수 있어?", None)
//!     .await?;
//! println!("{}", result.response().answer);
//! # Ok(())
//! # }
//! ```

pub mod agents;
pub mod classifier;
pub mod config;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod types;

pub use agents::{
    AddressParts, FloorplanQuery, FloorplanSearchAgent, ParsedAddress, RegulationAnswer,
    RegulationConfig, RegulationSearchAgent, TextSearch, describe_filter, parse_address,
};
pub use classifier::IntentClassifier;
pub use config::{ConfigLoadError, RouterConfig};
pub use error::{AgentError, ClassificationError, ErrorKind, RequestRejected};
pub use metrics::RouteMetrics;
pub use orchestrator::{
    AGENT_CLASSIFIER, AGENT_FLOORPLAN, AGENT_IMAGE, AGENT_REGULATION, Orchestrator,
};
pub use types::{
    AgentAnswer, DEGRADED_ANSWER, InputType, IntentClassification, IntentType,
    OrchestrationResult, QueryIntent, detect_input_type,
};
