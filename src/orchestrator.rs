use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value, json};
use uuid::Uuid;
use vision::{AnalysisMode, CvAnalysisAgent};

use crate::agents::{FloorplanQuery, FloorplanSearchAgent, RegulationSearchAgent};
use crate::classifier::IntentClassifier;
use crate::error::{AgentError, ErrorKind, RequestRejected};
use crate::metrics::RouteMetrics;
use crate::types::{
    AgentAnswer, InputType, IntentType, OrchestrationResult, QueryIntent, detect_input_type,
};

pub const AGENT_IMAGE: &str = "cv_analysis+floorplan_search";
pub const AGENT_FLOORPLAN: &str = "floorplan_search";
pub const AGENT_REGULATION: &str = "regulation_search";
pub const AGENT_CLASSIFIER: &str = "intent_classifier";

/// What one branch produced before it is wrapped into the envelope.
struct Routed {
    intent_type: Option<IntentType>,
    confidence: f64,
    agent_used: &'static str,
    response: AgentAnswer,
    failure: Option<ErrorKind>,
    extra: Map<String, Value>,
}

impl Routed {
    fn degraded(mut self, err: &AgentError) -> Self {
        self.response = AgentAnswer::error();
        self.failure = Some(err.kind());
        self
    }
}

/// Single entry point: decides which agent answers and wraps the result.
///
/// The only error is a rejected request. Every agent failure still yields an
/// [`OrchestrationResult`] carrying the degraded answer.
pub struct Orchestrator {
    classifier: IntentClassifier,
    cv: CvAnalysisAgent,
    floorplan: FloorplanSearchAgent,
    regulation: RegulationSearchAgent,
    metrics: Option<Arc<dyn RouteMetrics>>,
}

impl Orchestrator {
    pub fn new(
        classifier: IntentClassifier,
        cv: CvAnalysisAgent,
        floorplan: FloorplanSearchAgent,
        regulation: RegulationSearchAgent,
    ) -> Self {
        Self {
            classifier,
            cv,
            floorplan,
            regulation,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn RouteMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn cv_agent(&self) -> &CvAnalysisAgent {
        &self.cv
    }

    pub fn regulation_agent(&self) -> &RegulationSearchAgent {
        &self.regulation
    }

    pub async fn route(
        &self,
        requester_id: &str,
        question: &str,
        image: Option<&[u8]>,
    ) -> Result<OrchestrationResult, RequestRejected> {
        let started = Instant::now();
        let input_type = detect_input_type(image);
        if input_type == InputType::Text && question.trim().is_empty() {
            if let Some(metrics) = &self.metrics {
                metrics.record_rejected();
            }
            tracing::info!(requester_id, "empty request rejected");
            return Err(RequestRejected::Empty);
        }
        let request_id = Uuid::new_v4().to_string();

        let routed = match image {
            Some(bytes) if input_type == InputType::Image => self.route_image(bytes).await,
            _ => self.route_text(requester_id, question).await,
        };

        let elapsed = started.elapsed();
        if let Some(metrics) = &self.metrics {
            metrics.record_route(input_type, routed.agent_used, elapsed, routed.failure);
        }
        tracing::info!(
            request_id = %request_id,
            requester_id,
            input_type = input_type.as_str(),
            agent_used = routed.agent_used,
            intent = ?routed.intent_type,
            failure = ?routed.failure,
            elapsed_ms = elapsed.as_millis() as u64,
            "request routed"
        );

        let mut metadata = Map::new();
        metadata.insert("input_type".into(), json!(input_type.as_str()));
        metadata.insert("request_id".into(), json!(request_id));
        metadata.insert("elapsed_ms".into(), json!(elapsed.as_millis() as u64));
        if let Some(kind) = routed.failure {
            metadata.insert("error_kind".into(), json!(kind.as_str()));
        }
        metadata.extend(routed.extra);

        Ok(OrchestrationResult::new(
            routed.intent_type,
            routed.confidence,
            routed.agent_used,
            routed.response,
            metadata,
        ))
    }

    async fn route_image(&self, image: &[u8]) -> Routed {
        let routed = Routed {
            intent_type: Some(IntentType::FloorplanImage),
            confidence: 1.0,
            agent_used: AGENT_IMAGE,
            response: AgentAnswer::error(),
            failure: None,
            extra: Map::new(),
        };

        let analysed = self
            .cv
            .analyze(image, AnalysisMode::Full)
            .await
            .map_err(AgentError::analysis);
        let answered = match analysed {
            Ok(result) => self.floorplan.try_search(FloorplanQuery::image(result)).await,
            Err(err) => Err(err),
        };
        match answered {
            Ok(response) => Routed { response, ..routed },
            Err(err) => {
                tracing::warn!(kind = %err.kind(), error = %err, "image request degraded");
                routed.degraded(&err)
            }
        }
    }

    async fn route_text(&self, requester_id: &str, question: &str) -> Routed {
        let classification = match self.classifier.classify(question).await {
            Ok(classification) => classification,
            Err(err) => {
                let err = AgentError::from(err);
                tracing::warn!(requester_id, error = %err, "classification failed");
                return Routed {
                    intent_type: None,
                    confidence: 0.0,
                    agent_used: AGENT_CLASSIFIER,
                    response: AgentAnswer::error(),
                    failure: Some(err.kind()),
                    extra: Map::new(),
                };
            }
        };

        let mut routed = Routed {
            intent_type: Some(classification.intent_type.into()),
            confidence: classification.confidence,
            agent_used: AGENT_FLOORPLAN,
            response: AgentAnswer::error(),
            failure: None,
            extra: Map::new(),
        };

        match classification.intent_type {
            QueryIntent::FloorplanSearch => {
                let search = self.floorplan.search_text(question, requester_id).await;
                routed.extra.insert(
                    "filters".into(),
                    serde_json::to_value(&search.filters).unwrap_or(Value::Null),
                );
                match search.answer {
                    Ok(response) => Routed { response, ..routed },
                    Err(err) => {
                        tracing::warn!(requester_id, kind = %err.kind(), error = %err, "floor-plan search degraded");
                        routed.degraded(&err)
                    }
                }
            }
            QueryIntent::RegulationSearch => {
                routed.agent_used = AGENT_REGULATION;
                match self.regulation.try_answer(requester_id, question).await {
                    Ok(answer) => {
                        routed.extra.insert(
                            "zoning".into(),
                            serde_json::to_value(&answer.zoning).unwrap_or(Value::Null),
                        );
                        Routed {
                            response: answer.answer,
                            ..routed
                        }
                    }
                    Err(err) => {
                        tracing::warn!(requester_id, kind = %err.kind(), error = %err, "regulation answer degraded");
                        routed.extra.insert("zoning".into(), Value::Null);
                        routed.degraded(&err)
                    }
                }
            }
        }
    }
}
