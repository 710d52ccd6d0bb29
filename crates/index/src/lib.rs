//! # Archiroute Index
//!
//! Read-only record store the search agents run against.
//!
//! ## Contents
//!
//! - **Floor plans** ([`FloorplanRecord`]): saved plans with the thirteen
//!   analysis metrics, a natural-language document and its embedding.
//! - **Regulations** ([`RegulationRecord`]): law and ordinance articles,
//!   optionally scoped to a region code and zone.
//! - **Zoning** ([`ZoningEntry`]) and **parcels** ([`ParcelRecord`]): what
//!   zone a region or a specific lot falls in.
//!
//! Structured constraints over floor plans are expressed with
//! [`FloorplanFilter`]. Zoning is resolved in tiers by [`resolve_zoning`].
//!
//! The [`RecordStore`] trait abstracts where records live. [`InMemoryStore`]
//! keeps a [`StoreSnapshot`] behind a `RwLock` and can be loaded from a JSON
//! data file through [`StoreConfig`].
//!
//! ## Example
//!
//! ```
//! use index::{FloorplanFilter, Bounds, InMemoryStore, RecordStore, StoreSnapshot};
//!
//! let store = InMemoryStore::new(StoreSnapshot::default());
//! let filter = FloorplanFilter {
//!     room_count: Some(Bounds::exact(3)),
//!     ..Default::default()
//! };
//! assert!(store.floorplans_matching(&filter).unwrap().is_empty());
//! ```

mod filter;
mod record;
mod store;
mod zoning;

pub use filter::{Bounds, FloorplanFilter};
pub use record::{
    metric_names, FloorplanRecord, MetricMap, MetricValue, ParcelRecord, RegulationRecord,
    ZoningEntry,
};
pub use store::{normalize_address, InMemoryStore, RecordStore, StoreConfig, StoreSnapshot};
pub use zoning::{resolve_zoning, ZoningMatch, ZoningQuery, ZoningTier};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("I/O error: {0}")]
    Io(String),
}

impl IndexError {
    pub fn backend<S: Into<String>>(msg: S) -> Self {
        IndexError::Backend(msg.into())
    }
}
