use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::filter::FloorplanFilter;
use crate::record::{FloorplanRecord, ParcelRecord, RegulationRecord, ZoningEntry};
use crate::IndexError;

/// Read access to the records the agents search over.
///
/// Implementations return owned copies so callers never hold a lock across
/// an `.await`.
pub trait RecordStore: Send + Sync {
    /// All floor-plan records in store order.
    fn floorplans(&self) -> Result<Vec<FloorplanRecord>, IndexError>;

    /// Floor plans satisfying every constraint of `filter`.
    fn floorplans_matching(
        &self,
        filter: &FloorplanFilter,
    ) -> Result<Vec<FloorplanRecord>, IndexError> {
        Ok(self
            .floorplans()?
            .into_iter()
            .filter(|record| filter.matches(record))
            .collect())
    }

    fn floorplan(&self, record_id: u64) -> Result<Option<FloorplanRecord>, IndexError>;

    fn regulations(&self) -> Result<Vec<RegulationRecord>, IndexError>;

    fn zoning_entries(&self) -> Result<Vec<ZoningEntry>, IndexError>;

    /// Look up the parcel registered for a lot address.
    fn parcel(&self, address: &str) -> Result<Option<ParcelRecord>, IndexError>;
}

/// Everything a store holds, in the JSON layout used by data files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSnapshot {
    pub floorplans: Vec<FloorplanRecord>,
    pub regulations: Vec<RegulationRecord>,
    pub zoning: Vec<ZoningEntry>,
    pub parcels: Vec<ParcelRecord>,
}

impl StoreSnapshot {
    pub fn from_json_str(raw: &str) -> Result<Self, IndexError> {
        serde_json::from_str(raw).map_err(|e| IndexError::Decode(e.to_string()))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| IndexError::Io(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&raw)
    }
}

/// Selects where records come from.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreConfig {
    /// Start empty; records are supplied through [`InMemoryStore::replace`].
    #[default]
    InMemory,
    /// Load a [`StoreSnapshot`] from a JSON file at startup.
    JsonFile { path: PathBuf },
}

impl StoreConfig {
    pub fn json_file(path: impl Into<PathBuf>) -> Self {
        StoreConfig::JsonFile { path: path.into() }
    }

    pub fn build(&self) -> Result<Arc<InMemoryStore>, IndexError> {
        match self {
            StoreConfig::InMemory => Ok(Arc::new(InMemoryStore::default())),
            StoreConfig::JsonFile { path } => {
                let snapshot = StoreSnapshot::from_json_file(path)?;
                log::info!(
                    "loaded record store from {}: {} floorplans, {} regulations, {} zoning entries, {} parcels",
                    path.display(),
                    snapshot.floorplans.len(),
                    snapshot.regulations.len(),
                    snapshot.zoning.len(),
                    snapshot.parcels.len()
                );
                Ok(Arc::new(InMemoryStore::new(snapshot)))
            }
        }
    }
}

/// A [`RecordStore`] backed by a `RwLock` around a [`StoreSnapshot`].
#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: RwLock<StoreSnapshot>,
}

impl InMemoryStore {
    pub fn new(snapshot: StoreSnapshot) -> Self {
        Self {
            data: RwLock::new(snapshot),
        }
    }

    /// Swap in a new data set. Readers see either the old or the new one.
    pub fn replace(&self, snapshot: StoreSnapshot) -> Result<(), IndexError> {
        *self
            .data
            .write()
            .map_err(|_| IndexError::backend("poisoned lock"))? = snapshot;
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&StoreSnapshot) -> T) -> Result<T, IndexError> {
        let guard = self
            .data
            .read()
            .map_err(|_| IndexError::backend("poisoned lock"))?;
        Ok(f(&guard))
    }
}

impl RecordStore for InMemoryStore {
    fn floorplans(&self) -> Result<Vec<FloorplanRecord>, IndexError> {
        self.read(|data| data.floorplans.clone())
    }

    fn floorplans_matching(
        &self,
        filter: &FloorplanFilter,
    ) -> Result<Vec<FloorplanRecord>, IndexError> {
        // Filter under the lock so only matches are cloned.
        self.read(|data| {
            data.floorplans
                .iter()
                .filter(|record| filter.matches(record))
                .cloned()
                .collect()
        })
    }

    fn floorplan(&self, record_id: u64) -> Result<Option<FloorplanRecord>, IndexError> {
        self.read(|data| {
            data.floorplans
                .iter()
                .find(|record| record.record_id == record_id)
                .cloned()
        })
    }

    fn regulations(&self) -> Result<Vec<RegulationRecord>, IndexError> {
        self.read(|data| data.regulations.clone())
    }

    fn zoning_entries(&self) -> Result<Vec<ZoningEntry>, IndexError> {
        self.read(|data| data.zoning.clone())
    }

    fn parcel(&self, address: &str) -> Result<Option<ParcelRecord>, IndexError> {
        let wanted = normalize_address(address);
        if wanted.is_empty() {
            return Ok(None);
        }
        self.read(|data| {
            let exact = data
                .parcels
                .iter()
                .find(|p| normalize_address(&p.address) == wanted);
            // Fall back to a whole-word suffix so "역삼동 123-45" finds the
            // full "서울특별시 강남구 역삼동 123-45" entry.
            exact
                .or_else(|| {
                    let wanted: Vec<&str> = address.split_whitespace().collect();
                    data.parcels.iter().find(|p| {
                        let stored: Vec<&str> = p.address.split_whitespace().collect();
                        is_place_suffix(&stored, &wanted) || is_place_suffix(&wanted, &stored)
                    })
                })
                .cloned()
        })
    }
}

/// `suffix` ends `tokens` word for word and names a place, not just a lot.
fn is_place_suffix(tokens: &[&str], suffix: &[&str]) -> bool {
    suffix.len() >= 2
        && suffix
            .iter()
            .any(|t| !t.chars().any(|c| c.is_ascii_digit()))
        && tokens.ends_with(suffix)
}

/// Drop whitespace so spacing differences do not defeat lookups.
pub fn normalize_address(address: &str) -> String {
    address.chars().filter(|c| !c.is_whitespace()).collect()
}
