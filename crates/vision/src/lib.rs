//! # Archiroute Vision
//!
//! The CV analysis agent: a floor-plan image in, a structured description out.
//!
//! ## Pipeline
//!
//! 1. Image validation ([`validate_image`]): empty, oversized, unknown or
//!    undecodable images are rejected before any model is called.
//! 2. Structural inference through a [`VisionModel`], producing a
//!    [`TopologyGraph`] and optionally the backend's own visualisation.
//! 3. Structured analysis: one JSON call to the language model yields a
//!    validated [`FloorplanAnalysis`].
//! 4. (full mode) The thirteen metrics, a Korean document and its embedding.
//! 5. The visualisation, rendered locally when the backend sent none, is
//!    base64 encoded into the result.
//!
//! [`AnalysisMode::Preview`] stops after the analysis so the caller can show
//! it cheaply; [`CvAnalysisAgent::complete`] finishes a preview later, which
//! keeps the embedding to one call per saved record.
//!
//! ## Backends
//!
//! [`HttpVisionModel`] calls a remote inference service with the shared retry
//! policy. When several backends are configured, [`VisionRouter`] picks the
//! cheapest one whose benchmark quality is within the configured tolerance of
//! the best ([`select_backend`]).

mod agent;
mod analysis;
mod config;
mod model;
mod render;
mod selection;
mod topology;

pub use agent::{validate_image, AnalysisError, AnalysisMode, CvAnalysisAgent, CvAnalysisResult};
pub use analysis::FloorplanAnalysis;
pub use config::{build_vision_model, VisionConfig, DEFAULT_MAX_IMAGE_BYTES};
pub use model::{HttpVisionModel, NoVisionBackend, VisionError, VisionModel, VisionOutput};
pub use render::render_topology_png;
pub use selection::{select_backend, BackendCandidate, VisionRouter};
pub use topology::{Relation, RelationKind, Space, SpaceKind, TopologyGraph};
