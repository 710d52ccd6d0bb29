use serde::{Deserialize, Serialize};

use crate::record::ZoningEntry;

/// What is known about a location when looking up its zoning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoningQuery {
    pub region_code: Option<String>,
    pub region_name: Option<String>,
    pub zone_name: Option<String>,
}

/// Which combination of keys produced a zoning match, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoningTier {
    CodeAndZone,
    RegionNameAndZone,
    ZoneOnly,
    CodeOnly,
}

impl ZoningTier {
    pub const ORDER: [ZoningTier; 4] = [
        ZoningTier::CodeAndZone,
        ZoningTier::RegionNameAndZone,
        ZoningTier::ZoneOnly,
        ZoningTier::CodeOnly,
    ];

    fn accepts(self, query: &ZoningQuery, entry: &ZoningEntry) -> bool {
        let code = query.region_code.as_deref();
        let zone = query.zone_name.as_deref();
        let region = query.region_name.as_deref();
        match self {
            ZoningTier::CodeAndZone => {
                code == Some(entry.region_code.as_str()) && zone == Some(entry.zone_name.as_str())
            }
            ZoningTier::RegionNameAndZone => {
                zone.is_some_and(|name| zone_name_contains(&entry.zone_name, name))
                    && region.is_some_and(|name| region_names_overlap(name, &entry.region_name))
            }
            ZoningTier::ZoneOnly => {
                zone.is_some_and(|name| zone_name_contains(&entry.zone_name, name))
            }
            ZoningTier::CodeOnly => code == Some(entry.region_code.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoningMatch {
    pub entry: ZoningEntry,
    pub tier: ZoningTier,
}

/// Resolve a zoning entry by trying each tier in [`ZoningTier::ORDER`].
///
/// The first tier with any match wins; within a tier the first entry in
/// store order is returned.
pub fn resolve_zoning(entries: &[ZoningEntry], query: &ZoningQuery) -> Option<ZoningMatch> {
    ZoningTier::ORDER.into_iter().find_map(|tier| {
        entries
            .iter()
            .find(|entry| tier.accepts(query, entry))
            .map(|entry| ZoningMatch {
                entry: entry.clone(),
                tier,
            })
    })
}

/// "강남구" and "서울특별시 강남구" name the same region.
fn region_names_overlap(a: &str, b: &str) -> bool {
    let a: String = a.split_whitespace().collect();
    let b: String = b.split_whitespace().collect();
    !a.is_empty() && !b.is_empty() && (a.ends_with(&b) || b.ends_with(&a))
}

/// "일반주거지역" finds "제2종일반주거지역".
fn zone_name_contains(entry_zone: &str, wanted: &str) -> bool {
    let entry_zone: String = entry_zone.split_whitespace().collect();
    let wanted: String = wanted.split_whitespace().collect();
    !wanted.is_empty() && entry_zone.contains(&wanted)
}
