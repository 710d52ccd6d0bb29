use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Apology shown to the user whenever an agent had to give up.
pub const DEGRADED_ANSWER: &str =
    "죄송합니다. 요청을 처리하는 중 문제가 발생했습니다. 잠시 후 다시 시도해 주세요.";

/// How the request arrived; decided before anything else runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    Image,
    Text,
}

impl InputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputType::Image => "image",
            InputType::Text => "text",
        }
    }
}

/// A present, non-empty image makes the request an image request.
pub fn detect_input_type(image: Option<&[u8]>) -> InputType {
    match image {
        Some(bytes) if !bytes.is_empty() => InputType::Image,
        _ => InputType::Text,
    }
}

/// What the classifier may decide for a text request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    FloorplanSearch,
    RegulationSearch,
}

impl QueryIntent {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "floorplan_search" => Some(QueryIntent::FloorplanSearch),
            "regulation_search" => Some(QueryIntent::RegulationSearch),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntentClassification {
    pub intent_type: QueryIntent,
    /// Always within `[0, 1]`.
    pub confidence: f64,
}

/// Intent reported in the response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentType {
    FloorplanSearch,
    RegulationSearch,
    FloorplanImage,
}

impl From<QueryIntent> for IntentType {
    fn from(intent: QueryIntent) -> Self {
        match intent {
            QueryIntent::FloorplanSearch => IntentType::FloorplanSearch,
            QueryIntent::RegulationSearch => IntentType::RegulationSearch,
        }
    }
}

/// What an agent hands back to the user.
///
/// `floorplan_ids` is `None` when no record search ran (image analysis,
/// regulation answers, degraded answers) and `Some` otherwise, possibly empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentAnswer {
    pub title: String,
    pub answer: String,
    pub floorplan_ids: Option<Vec<u64>>,
}

impl AgentAnswer {
    pub fn new(title: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            answer: answer.into(),
            floorplan_ids: None,
        }
    }

    pub fn with_floorplan_ids(mut self, ids: Vec<u64>) -> Self {
        self.floorplan_ids = Some(ids);
        self
    }

    /// The uniform degraded answer.
    pub fn error() -> Self {
        Self::new("error", DEGRADED_ANSWER)
    }

    pub fn is_error(&self) -> bool {
        self.title == "error"
    }
}

/// The response envelope returned by [`crate::Orchestrator::route`].
///
/// Read-only once built: fields are reachable through accessors or the
/// serialized form only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationResult {
    intent_type: Option<IntentType>,
    confidence: f64,
    agent_used: String,
    response: AgentAnswer,
    metadata: Map<String, Value>,
}

impl OrchestrationResult {
    pub(crate) fn new(
        intent_type: Option<IntentType>,
        confidence: f64,
        agent_used: impl Into<String>,
        response: AgentAnswer,
        metadata: Map<String, Value>,
    ) -> Self {
        Self {
            intent_type,
            confidence,
            agent_used: agent_used.into(),
            response,
            metadata,
        }
    }

    /// `None` only when classification failed.
    pub fn intent_type(&self) -> Option<IntentType> {
        self.intent_type
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn agent_used(&self) -> &str {
        &self.agent_used
    }

    pub fn response(&self) -> &AgentAnswer {
        &self.response
    }

    pub fn floorplan_ids(&self) -> Option<&[u64]> {
        self.response.floorplan_ids.as_deref()
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn request_id(&self) -> Option<&str> {
        self.metadata.get("request_id").and_then(Value::as_str)
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.metadata
            .get("elapsed_ms")
            .and_then(Value::as_u64)
            .map(Duration::from_millis)
    }
}
