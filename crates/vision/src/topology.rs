use serde::{Deserialize, Serialize};

/// Functional category of a space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpaceKind {
    Bedroom,
    LivingRoom,
    Kitchen,
    Bathroom,
    Balcony,
    Entrance,
    DressRoom,
    Utility,
    Corridor,
    Other,
}

impl SpaceKind {
    /// Korean label used in rendered documents.
    pub fn label(self) -> &'static str {
        match self {
            SpaceKind::Bedroom => "침실",
            SpaceKind::LivingRoom => "거실",
            SpaceKind::Kitchen => "주방",
            SpaceKind::Bathroom => "욕실",
            SpaceKind::Balcony => "발코니",
            SpaceKind::Entrance => "현관",
            SpaceKind::DressRoom => "드레스룸",
            SpaceKind::Utility => "다용도실",
            SpaceKind::Corridor => "복도",
            SpaceKind::Other => "기타",
        }
    }
}

/// One room or area detected in the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Space {
    pub id: String,
    pub name: String,
    pub kind: SpaceKind,
    #[serde(default)]
    pub area_m2: Option<f64>,
    #[serde(default)]
    pub has_window: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Door,
    Opening,
    Adjacent,
}

/// A connection between two spaces, by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub from: String,
    pub to: String,
    pub kind: RelationKind,
}

/// Spaces and how they connect. An empty graph is valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologyGraph {
    #[serde(default)]
    pub spaces: Vec<Space>,
    #[serde(default)]
    pub relations: Vec<Relation>,
}

impl TopologyGraph {
    pub fn is_empty(&self) -> bool {
        self.spaces.is_empty()
    }

    pub fn space(&self, id: &str) -> Option<&Space> {
        self.spaces.iter().find(|s| s.id == id)
    }

    pub fn count(&self, kind: SpaceKind) -> usize {
        self.spaces.iter().filter(|s| s.kind == kind).count()
    }

    /// Sum of known space areas, `None` when no space has an area.
    pub fn total_area_m2(&self) -> Option<f64> {
        let known: Vec<f64> = self.spaces.iter().filter_map(|s| s.area_m2).collect();
        if known.is_empty() {
            None
        } else {
            Some(known.iter().sum())
        }
    }

    /// Relations whose endpoints are not both present.
    pub fn dangling_relations(&self) -> impl Iterator<Item = &Relation> {
        self.relations
            .iter()
            .filter(|r| self.space(&r.from).is_none() || self.space(&r.to).is_none())
    }

    /// Counts handed to the analysis prompt alongside the raw graph.
    pub fn facts(&self) -> serde_json::Value {
        serde_json::json!({
            "space_count": self.spaces.len(),
            "bedrooms": self.count(SpaceKind::Bedroom),
            "bathrooms": self.count(SpaceKind::Bathroom),
            "balconies": self.count(SpaceKind::Balcony),
            "windowless_spaces": self.spaces.iter().filter(|s| !s.has_window).count(),
            "known_area_m2": self.total_area_m2(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space(id: &str, kind: SpaceKind, area: Option<f64>, window: bool) -> Space {
        Space {
            id: id.into(),
            name: kind.label().into(),
            kind,
            area_m2: area,
            has_window: window,
        }
    }

    #[test]
    fn parses_model_output() {
        let raw = r#"{
            "spaces": [
                {"id": "r1", "name": "안방", "kind": "bedroom", "area_m2": 12.5, "has_window": true},
                {"id": "r2", "name": "욕실", "kind": "bathroom"}
            ],
            "relations": [{"from": "r1", "to": "r2", "kind": "door"}]
        }"#;
        let graph: TopologyGraph = serde_json::from_str(raw).unwrap();
        assert_eq!(graph.spaces.len(), 2);
        assert!(!graph.spaces[1].has_window);
        assert_eq!(graph.relations[0].kind, RelationKind::Door);
        assert_eq!(graph.dangling_relations().count(), 0);
    }

    #[test]
    fn empty_graph_is_valid() {
        let graph: TopologyGraph = serde_json::from_str("{}").unwrap();
        assert!(graph.is_empty());
        assert_eq!(graph.total_area_m2(), None);
        assert_eq!(graph.facts()["space_count"], 0);
    }

    #[test]
    fn counts_and_areas() {
        let graph = TopologyGraph {
            spaces: vec![
                space("a", SpaceKind::Bedroom, Some(10.0), true),
                space("b", SpaceKind::Bedroom, None, true),
                space("c", SpaceKind::Bathroom, Some(4.0), false),
            ],
            relations: vec![Relation {
                from: "a".into(),
                to: "zz".into(),
                kind: RelationKind::Adjacent,
            }],
        };
        assert_eq!(graph.count(SpaceKind::Bedroom), 2);
        assert_eq!(graph.total_area_m2(), Some(14.0));
        assert_eq!(graph.dangling_relations().count(), 1);
        assert_eq!(graph.facts()["windowless_spaces"], 1);
    }
}
