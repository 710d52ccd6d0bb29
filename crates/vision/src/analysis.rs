use std::fmt::Write as _;

use index::{metric_names, MetricMap};
use llm::Prompt;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::topology::TopologyGraph;

const PYEONG_M2: f64 = 3.3058;

pub(crate) const ANALYSIS_SYSTEM_PROMPT: &str = "\
You are an architectural analyst for Korean apartment floor plans. \
You receive the room topology of one plan as JSON together with a few counted facts. \
Reply with one JSON object with exactly these keys: \
room_count, bathroom_count, bay_count (integers), \
living_room_ratio, kitchen_ratio, bathroom_ratio, balcony_ratio, windowless_ratio \
(fractions of the total area between 0 and 1), total_area_m2 (number), \
has_special_space, has_cross_ventilation, has_ensuite_bathroom (booleans), \
compliance_grade (integer 1 to 5), structure_type (one of 판상형, 타워형, 혼합형, 복도식, 계단식), \
summary (two Korean sentences). Use null for anything the topology does not show.";

/// Structured analysis of one floor plan.
///
/// Every metric is optional: the model answers `null` for anything the
/// topology does not show.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FloorplanAnalysis {
    #[serde(default, deserialize_with = "whole_count")]
    pub room_count: Option<u32>,
    #[serde(default, deserialize_with = "whole_count")]
    pub bathroom_count: Option<u32>,
    #[serde(default, deserialize_with = "whole_count")]
    pub bay_count: Option<u32>,
    #[serde(default)]
    pub living_room_ratio: Option<f64>,
    #[serde(default)]
    pub kitchen_ratio: Option<f64>,
    #[serde(default)]
    pub bathroom_ratio: Option<f64>,
    #[serde(default)]
    pub balcony_ratio: Option<f64>,
    #[serde(default)]
    pub windowless_ratio: Option<f64>,
    #[serde(default)]
    pub total_area_m2: Option<f64>,
    #[serde(default)]
    pub has_special_space: Option<bool>,
    #[serde(default)]
    pub has_cross_ventilation: Option<bool>,
    #[serde(default)]
    pub has_ensuite_bathroom: Option<bool>,
    #[serde(default, deserialize_with = "whole_count")]
    pub compliance_grade: Option<u32>,
    #[serde(default)]
    pub structure_type: Option<String>,
    #[serde(default)]
    pub summary: String,
}

// Models often write counts as `3.0`.
fn whole_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    match Option::<f64>::deserialize(deserializer)? {
        None => Ok(None),
        Some(n) if n >= 0.0 && n.fract() == 0.0 && n <= f64::from(u32::MAX) => Ok(Some(n as u32)),
        Some(n) => Err(D::Error::custom(format!(
            "expected a whole non-negative number, got {n}"
        ))),
    }
}

impl FloorplanAnalysis {
    fn ratios(&self) -> [(&'static str, Option<f64>); 5] {
        [
            (metric_names::LIVING_ROOM_RATIO, self.living_room_ratio),
            (metric_names::KITCHEN_RATIO, self.kitchen_ratio),
            (metric_names::BATHROOM_RATIO, self.bathroom_ratio),
            (metric_names::BALCONY_RATIO, self.balcony_ratio),
            (metric_names::WINDOWLESS_RATIO, self.windowless_ratio),
        ]
    }

    /// Range checks applied to the model's answer before it is accepted.
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in self.ratios() {
            if let Some(v) = value {
                if !(0.0..=1.0).contains(&v) {
                    return Err(format!("{name} must be between 0 and 1, got {v}"));
                }
            }
        }
        if let Some(area) = self.total_area_m2 {
            if !area.is_finite() || area < 0.0 {
                return Err(format!("total_area_m2 must be non-negative, got {area}"));
            }
        }
        if let Some(grade) = self.compliance_grade {
            if !(1..=5).contains(&grade) {
                return Err(format!("compliance_grade must be 1 to 5, got {grade}"));
            }
        }
        Ok(())
    }

    /// The thirteen metrics in their fixed order.
    pub fn to_metrics(&self) -> MetricMap {
        let mut metrics = MetricMap::new();
        metrics.insert(metric_names::ROOM_COUNT, self.room_count);
        metrics.insert(metric_names::BATHROOM_COUNT, self.bathroom_count);
        metrics.insert(metric_names::BAY_COUNT, self.bay_count);
        for (name, value) in self.ratios() {
            metrics.insert(name, value);
        }
        metrics.insert(metric_names::TOTAL_AREA_M2, self.total_area_m2);
        metrics.insert(metric_names::HAS_SPECIAL_SPACE, self.has_special_space);
        metrics.insert(metric_names::HAS_CROSS_VENTILATION, self.has_cross_ventilation);
        metrics.insert(metric_names::HAS_ENSUITE_BATHROOM, self.has_ensuite_bathroom);
        metrics.insert(metric_names::COMPLIANCE_GRADE, self.compliance_grade);
        metrics
    }

    /// Korean description used as the record's searchable document.
    pub fn render_document(&self) -> String {
        let mut doc = String::new();

        if let Some(structure) = &self.structure_type {
            let _ = write!(doc, "{structure} 구조의 평면입니다. ");
        }

        let mut layout = Vec::new();
        if let Some(rooms) = self.room_count {
            layout.push(format!("방 {rooms}개"));
        }
        if let Some(baths) = self.bathroom_count {
            layout.push(format!("화장실 {baths}개"));
        }
        if let Some(bays) = self.bay_count {
            layout.push(format!("{bays}베이"));
        }
        if !layout.is_empty() {
            let _ = write!(doc, "{} 구성입니다. ", layout.join(", "));
        }

        if let Some(area) = self.total_area_m2 {
            let _ = write!(
                doc,
                "전용면적은 약 {area:.1}㎡({:.1}평)입니다. ",
                area / PYEONG_M2
            );
        }

        let shares: Vec<String> = [
            ("거실", self.living_room_ratio),
            ("주방", self.kitchen_ratio),
            ("욕실", self.bathroom_ratio),
            ("발코니", self.balcony_ratio),
            ("무창 공간", self.windowless_ratio),
        ]
        .into_iter()
        .filter_map(|(label, ratio)| ratio.map(|r| format!("{label} {:.0}%", r * 100.0)))
        .collect();
        if !shares.is_empty() {
            let _ = write!(doc, "면적 비율은 {}입니다. ", shares.join(", "));
        }

        for (flag, yes, no) in [
            (self.has_cross_ventilation, "맞통풍이 가능합니다.", "맞통풍이 어렵습니다."),
            (self.has_ensuite_bathroom, "안방에 전용 욕실이 있습니다.", "안방 전용 욕실은 없습니다."),
            (self.has_special_space, "알파룸 등 특화 공간이 있습니다.", "별도의 특화 공간은 없습니다."),
        ] {
            if let Some(flag) = flag {
                doc.push_str(if flag { yes } else { no });
                doc.push(' ');
            }
        }

        if let Some(grade) = self.compliance_grade {
            let _ = write!(doc, "법규 적합 등급은 5점 만점에 {grade}점입니다. ");
        }
        if !self.summary.trim().is_empty() {
            doc.push_str(self.summary.trim());
        }
        doc.trim_end().to_string()
    }
}

pub(crate) fn analysis_prompt(topology: &TopologyGraph) -> Prompt {
    let user = serde_json::json!({
        "topology": topology,
        "facts": topology.facts(),
    });
    Prompt::json(ANALYSIS_SYSTEM_PROMPT, user.to_string()).with_temperature(0.0)
}
