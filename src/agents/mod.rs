//! The answering agents and the Korean formatting they share.

pub mod address;
pub mod floorplan;
pub mod regulation;

use index::{Bounds, FloorplanFilter, MetricMap, MetricValue, metric_names};
use vision::CvAnalysisResult;

pub use address::{AddressParts, ParsedAddress, parse_address};
pub use floorplan::{FloorplanSearchAgent, TextSearch};
pub use regulation::{RegulationAnswer, RegulationConfig, RegulationSearchAgent};

/// What the floor-plan agent is asked to do.
#[derive(Debug, Clone)]
pub enum FloorplanQuery {
    /// Search saved records for a free-text question.
    TextSearch { query: String, requester_id: String },
    /// Describe a freshly analysed image. No retrieval runs.
    Image(Box<CvAnalysisResult>),
}

impl FloorplanQuery {
    pub fn text(query: impl Into<String>, requester_id: impl Into<String>) -> Self {
        FloorplanQuery::TextSearch {
            query: query.into(),
            requester_id: requester_id.into(),
        }
    }

    pub fn image(result: CvAnalysisResult) -> Self {
        FloorplanQuery::Image(Box::new(result))
    }
}

pub(crate) fn metric_label(name: &str) -> &str {
    match name {
        metric_names::ROOM_COUNT => "방 개수",
        metric_names::BATHROOM_COUNT => "욕실 개수",
        metric_names::BAY_COUNT => "베이 수",
        metric_names::LIVING_ROOM_RATIO => "거실 비율",
        metric_names::KITCHEN_RATIO => "주방 비율",
        metric_names::BATHROOM_RATIO => "욕실 비율",
        metric_names::BALCONY_RATIO => "발코니 비율",
        metric_names::WINDOWLESS_RATIO => "무창 공간 비율",
        metric_names::TOTAL_AREA_M2 => "전용 면적",
        metric_names::HAS_SPECIAL_SPACE => "특화 공간",
        metric_names::HAS_CROSS_VENTILATION => "맞통풍",
        metric_names::HAS_ENSUITE_BATHROOM => "안방 욕실",
        metric_names::COMPLIANCE_GRADE => "법규 적합 등급",
        other => other,
    }
}

pub(crate) fn format_metric(name: &str, value: &MetricValue) -> String {
    let Some(number) = value.as_f64() else {
        return value.to_string();
    };
    match name {
        metric_names::LIVING_ROOM_RATIO
        | metric_names::KITCHEN_RATIO
        | metric_names::BATHROOM_RATIO
        | metric_names::BALCONY_RATIO
        | metric_names::WINDOWLESS_RATIO => format!("{:.0}%", number * 100.0),
        metric_names::TOTAL_AREA_M2 => format!("{number:.1}㎡"),
        metric_names::COMPLIANCE_GRADE => format!("{number:.0}등급"),
        metric_names::ROOM_COUNT | metric_names::BATHROOM_COUNT | metric_names::BAY_COUNT => {
            format!("{number:.0}개")
        }
        _ => value.to_string(),
    }
}

/// One `- label: value` line per metric, skipping unknown values.
pub(crate) fn metric_lines(metrics: &MetricMap) -> Vec<String> {
    metrics
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(name, value)| format!("- {}: {}", metric_label(name), format_metric(name, value)))
        .collect()
}

fn describe_count(label: &str, bounds: &Bounds<u32>) -> String {
    match (bounds.min, bounds.max) {
        (Some(min), Some(max)) if min == max => format!("{label} {min}개"),
        (Some(min), Some(max)) => format!("{label} {min}~{max}개"),
        (Some(min), None) => format!("{label} {min}개 이상"),
        (None, Some(max)) => format!("{label} {max}개 이하"),
        (None, None) => label.to_string(),
    }
}

fn describe_area(bounds: &Bounds<f64>) -> String {
    match (bounds.min, bounds.max, bounds.target) {
        (Some(_), Some(_), Some(target)) => format!("면적 약 {target:.0}㎡"),
        (Some(min), Some(max), None) => format!("면적 {min:.0}~{max:.0}㎡"),
        (Some(min), None, _) => format!("면적 {min:.0}㎡ 이상"),
        (None, Some(max), _) => format!("면적 {max:.0}㎡ 이하"),
        (None, None, _) => "면적".to_string(),
    }
}

/// Human-readable list of the constraints in `filter`.
pub fn describe_filter(filter: &FloorplanFilter) -> Vec<String> {
    let mut parts = Vec::with_capacity(filter.constraint_count());
    if let Some(b) = &filter.room_count {
        parts.push(describe_count("방", b));
    }
    if let Some(b) = &filter.bathroom_count {
        parts.push(describe_count("욕실", b));
    }
    if let Some(b) = &filter.bay_count {
        parts.push(describe_count("베이", b));
    }
    if let Some(b) = &filter.area_m2 {
        parts.push(describe_area(b));
    }
    if let Some(s) = &filter.structure_type {
        parts.push(s.clone());
    }
    parts
}
