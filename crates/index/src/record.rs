use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Names of the thirteen floor-plan metrics, in display order.
pub mod metric_names {
    pub const ROOM_COUNT: &str = "room_count";
    pub const BATHROOM_COUNT: &str = "bathroom_count";
    pub const BAY_COUNT: &str = "bay_count";
    pub const LIVING_ROOM_RATIO: &str = "living_room_ratio";
    pub const KITCHEN_RATIO: &str = "kitchen_ratio";
    pub const BATHROOM_RATIO: &str = "bathroom_ratio";
    pub const BALCONY_RATIO: &str = "balcony_ratio";
    pub const WINDOWLESS_RATIO: &str = "windowless_ratio";
    pub const TOTAL_AREA_M2: &str = "total_area_m2";
    pub const HAS_SPECIAL_SPACE: &str = "has_special_space";
    pub const HAS_CROSS_VENTILATION: &str = "has_cross_ventilation";
    pub const HAS_ENSUITE_BATHROOM: &str = "has_ensuite_bathroom";
    pub const COMPLIANCE_GRADE: &str = "compliance_grade";

    pub const ALL: [&str; 13] = [
        ROOM_COUNT,
        BATHROOM_COUNT,
        BAY_COUNT,
        LIVING_ROOM_RATIO,
        KITCHEN_RATIO,
        BATHROOM_RATIO,
        BALCONY_RATIO,
        WINDOWLESS_RATIO,
        TOTAL_AREA_M2,
        HAS_SPECIAL_SPACE,
        HAS_CROSS_VENTILATION,
        HAS_ENSUITE_BATHROOM,
        COMPLIANCE_GRADE,
    ];
}

/// A single metric value: number, flag, or unknown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum MetricValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
}

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetricValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, MetricValue::Null)
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Number(value)
    }
}

impl From<u32> for MetricValue {
    fn from(value: u32) -> Self {
        MetricValue::Number(f64::from(value))
    }
}

impl From<bool> for MetricValue {
    fn from(value: bool) -> Self {
        MetricValue::Bool(value)
    }
}

impl<T: Into<MetricValue>> From<Option<T>> for MetricValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(MetricValue::Null, Into::into)
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Null => f.write_str("-"),
            MetricValue::Bool(true) => f.write_str("예"),
            MetricValue::Bool(false) => f.write_str("아니오"),
            MetricValue::Number(n) if n.fract() == 0.0 => write!(f, "{}", *n as i64),
            MetricValue::Number(n) => write!(f, "{n:.2}"),
        }
    }
}

/// Insertion-ordered mapping of metric name to value.
///
/// Serialized as a JSON object whose keys keep insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricMap {
    entries: Vec<(String, MetricValue)>,
}

impl MetricMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a metric, keeping the original position on replace.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<MetricValue>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&MetricValue> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(MetricValue::as_f64)
    }

    pub fn flag(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(MetricValue::as_bool)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetricValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<MetricValue>> FromIterator<(K, V)> for MetricMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = MetricMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl Serialize for MetricMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for MetricMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MetricMapVisitor;

        impl<'de> Visitor<'de> for MetricMapVisitor {
            type Value = MetricMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of metric names to numbers, booleans or null")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<MetricMap, A::Error> {
                let mut map = MetricMap::new();
                while let Some((k, v)) = access.next_entry::<String, MetricValue>()? {
                    map.insert(k, v);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(MetricMapVisitor)
    }
}

/// A saved floor plan with its precomputed analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorplanRecord {
    pub record_id: u64,
    pub name: String,
    /// 판상형, 타워형, 혼합형 ...
    #[serde(default)]
    pub structure_type: Option<String>,
    #[serde(default)]
    pub metrics: MetricMap,
    /// Natural-language rendering of the analysis.
    #[serde(default)]
    pub document: String,
    /// Embedding of `document`, produced by the configured embedder.
    #[serde(default)]
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

/// One article of law or ordinance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegulationRecord {
    pub id: String,
    /// `None` for national law applicable everywhere.
    #[serde(default)]
    pub region_code: Option<String>,
    /// `None` when the article applies to every zone.
    #[serde(default)]
    pub zone_name: Option<String>,
    pub title: String,
    #[serde(default)]
    pub article: Option<String>,
    pub content: String,
}

impl RegulationRecord {
    /// Short reference used when citing this article in an answer.
    pub fn citation(&self) -> String {
        match &self.article {
            Some(article) => format!("[{} {}]", self.title, article),
            None => format!("[{}]", self.title),
        }
    }

    /// Whether the article applies inside the given zoning classification.
    pub fn applies_to(&self, zoning: &ZoningEntry) -> bool {
        let region_ok = self
            .region_code
            .as_deref()
            .map_or(true, |code| code == zoning.region_code);
        let zone_ok = self
            .zone_name
            .as_deref()
            .map_or(true, |zone| zone == zoning.zone_name);
        region_ok && zone_ok
    }
}

/// A zoning classification known for a region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoningEntry {
    /// Five-digit 시군구 code, e.g. `11680` for 강남구.
    pub region_code: String,
    pub region_name: String,
    pub zone_name: String,
    #[serde(default)]
    pub zone_code: Option<String>,
}

/// Land-use facts for one lot address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParcelRecord {
    pub address: String,
    pub region_code: String,
    pub region_name: String,
    pub zone_name: String,
}
