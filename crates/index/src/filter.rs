use serde::{Deserialize, Serialize};

use crate::record::{metric_names, FloorplanRecord};

/// Distance under which an area counts as hitting its target.
const AREA_TARGET_SLACK_M2: f64 = 1.0;

/// Inclusive numeric bounds with the value the user actually asked for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<T>,
    /// Preferred value inside the bounds, used for specificity ranking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<T>,
}

impl<T: Copy + PartialOrd> Bounds<T> {
    pub fn exact(value: T) -> Self {
        Self {
            min: Some(value),
            max: Some(value),
            target: Some(value),
        }
    }

    pub fn at_least(value: T) -> Self {
        Self {
            min: Some(value),
            max: None,
            target: Some(value),
        }
    }

    pub fn at_most(value: T) -> Self {
        Self {
            min: None,
            max: Some(value),
            target: Some(value),
        }
    }

    pub fn between(min: T, max: T) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
            target: None,
        }
    }

    pub fn contains(&self, value: T) -> bool {
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }
}

impl Bounds<f64> {
    /// `center ± tolerance·center`, targeting `center`.
    pub fn around(center: f64, tolerance: f64) -> Self {
        let slack = center.abs() * tolerance;
        Self {
            min: Some(center - slack),
            max: Some(center + slack),
            target: Some(center),
        }
    }
}

/// Structured constraints over floor-plan records.
///
/// Every constraint that is set must hold. A record that lacks the
/// constrained metric does not match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FloorplanFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_count: Option<Bounds<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bathroom_count: Option<Bounds<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bay_count: Option<Bounds<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_m2: Option<Bounds<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structure_type: Option<String>,
}

impl FloorplanFilter {
    pub fn is_empty(&self) -> bool {
        self.room_count.is_none()
            && self.bathroom_count.is_none()
            && self.bay_count.is_none()
            && self.area_m2.is_none()
            && self.structure_type.is_none()
    }

    /// Number of constraints that are set.
    pub fn constraint_count(&self) -> usize {
        [
            self.room_count.is_some(),
            self.bathroom_count.is_some(),
            self.bay_count.is_some(),
            self.area_m2.is_some(),
            self.structure_type.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    }

    pub fn matches(&self, record: &FloorplanRecord) -> bool {
        let count_ok = |bounds: &Option<Bounds<u32>>, metric: &str| match bounds {
            None => true,
            Some(b) => count_metric(record, metric).is_some_and(|v| b.contains(v)),
        };

        count_ok(&self.room_count, metric_names::ROOM_COUNT)
            && count_ok(&self.bathroom_count, metric_names::BATHROOM_COUNT)
            && count_ok(&self.bay_count, metric_names::BAY_COUNT)
            && self.area_m2.as_ref().map_or(true, |b| {
                record
                    .metrics
                    .number(metric_names::TOTAL_AREA_M2)
                    .is_some_and(|v| b.contains(v))
            })
            && self.structure_type.as_deref().map_or(true, |wanted| {
                record.structure_type.as_deref() == Some(wanted)
            })
    }

    /// How many constraints the record hits at their target value.
    ///
    /// Used to rank pure-filter results: a record with exactly the requested
    /// room count ranks above one that merely satisfies "at least".
    pub fn specificity(&self, record: &FloorplanRecord) -> usize {
        let count_hit = |bounds: &Option<Bounds<u32>>, metric: &str| {
            match (bounds.and_then(|b| b.target), count_metric(record, metric)) {
                (Some(target), Some(value)) => target == value,
                _ => false,
            }
        };

        let mut hits = [
            count_hit(&self.room_count, metric_names::ROOM_COUNT),
            count_hit(&self.bathroom_count, metric_names::BATHROOM_COUNT),
            count_hit(&self.bay_count, metric_names::BAY_COUNT),
        ]
        .into_iter()
        .filter(|hit| *hit)
        .count();

        if let (Some(target), Some(area)) = (
            self.area_m2.and_then(|b| b.target),
            record.metrics.number(metric_names::TOTAL_AREA_M2),
        ) {
            if (area - target).abs() <= AREA_TARGET_SLACK_M2 {
                hits += 1;
            }
        }
        if self.structure_type.is_some() && self.matches_structure(record) {
            hits += 1;
        }
        hits
    }

    fn matches_structure(&self, record: &FloorplanRecord) -> bool {
        self.structure_type.as_deref() == record.structure_type.as_deref()
    }
}

fn count_metric(record: &FloorplanRecord, metric: &str) -> Option<u32> {
    record
        .metrics
        .number(metric)
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v.round() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MetricMap;
    use chrono::{TimeZone, Utc};

    fn record(rooms: u32, baths: u32, area: f64, structure: Option<&str>) -> FloorplanRecord {
        let metrics: MetricMap = [
            (metric_names::ROOM_COUNT, f64::from(rooms)),
            (metric_names::BATHROOM_COUNT, f64::from(baths)),
            (metric_names::TOTAL_AREA_M2, area),
        ]
        .into_iter()
        .collect();
        FloorplanRecord {
            record_id: 1,
            name: "test".into(),
            structure_type: structure.map(str::to_string),
            metrics,
            document: String::new(),
            embedding: Vec::new(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = FloorplanFilter::default();
        assert!(filter.is_empty());
        assert!(filter.matches(&record(1, 1, 30.0, None)));
        assert_eq!(filter.specificity(&record(1, 1, 30.0, None)), 0);
    }

    #[test]
    fn bounds_are_inclusive() {
        let b = Bounds::between(2u32, 4);
        assert!(b.contains(2) && b.contains(4));
        assert!(!b.contains(5));
        let around = Bounds::around(100.0, 0.1);
        assert!(around.contains(90.0) && around.contains(110.0));
        assert!(!around.contains(111.0));
    }

    #[test]
    fn all_constraints_must_hold() {
        let filter = FloorplanFilter {
            room_count: Some(Bounds::exact(3)),
            bathroom_count: Some(Bounds::exact(2)),
            structure_type: Some("판상형".into()),
            ..Default::default()
        };
        assert_eq!(filter.constraint_count(), 3);
        assert!(filter.matches(&record(3, 2, 84.0, Some("판상형"))));
        assert!(!filter.matches(&record(3, 1, 84.0, Some("판상형"))));
        assert!(!filter.matches(&record(3, 2, 84.0, Some("타워형"))));
        assert!(!filter.matches(&record(3, 2, 84.0, None)));
    }

    #[test]
    fn missing_metric_does_not_match() {
        let filter = FloorplanFilter {
            bay_count: Some(Bounds::at_least(3)),
            ..Default::default()
        };
        assert!(!filter.matches(&record(3, 2, 84.0, None)));
    }

    #[test]
    fn exact_hits_are_more_specific() {
        let filter = FloorplanFilter {
            room_count: Some(Bounds::at_least(3)),
            area_m2: Some(Bounds::around(84.0, 0.1)),
            ..Default::default()
        };
        let exact = record(3, 2, 84.5, None);
        let loose = record(4, 2, 80.0, None);
        assert!(filter.matches(&exact) && filter.matches(&loose));
        assert_eq!(filter.specificity(&exact), 2);
        assert_eq!(filter.specificity(&loose), 0);
    }
}
