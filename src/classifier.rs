use std::sync::Arc;

use llm::{LanguageModel, Prompt, complete_json_validated};
use serde::Deserialize;

use crate::error::ClassificationError;
use crate::types::{IntentClassification, QueryIntent};

const CLASSIFIER_SYSTEM_PROMPT: &str = "\
You route questions for a Korean apartment floor-plan service.
Decide whether the user wants to find floor plans (floorplan_search) or asks
about building, zoning or land-use regulations (regulation_search).
Reply with a JSON object only:
{\"intent\": \"floorplan_search\" | \"regulation_search\", \"confidence\": <number between 0 and 1>}";

#[derive(Debug, Deserialize)]
struct RawClassification {
    intent: String,
    #[serde(default)]
    confidence: Option<f64>,
}

fn check_label(raw: &RawClassification) -> Result<(), String> {
    match QueryIntent::from_label(&raw.intent) {
        Some(_) => Ok(()),
        None => Err(format!(
            "intent must be floorplan_search or regulation_search, got {:?}",
            raw.intent
        )),
    }
}

/// Clamp into `[0, 1]`; a missing or non-finite value counts as 0.
fn clamp_confidence(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() => v.clamp(0.0, 1.0),
        _ => 0.0,
    }
}

/// Decides which agent answers a text-only request.
///
/// One structured language-model call per question. Labels outside the two
/// known intents are schema failures and get the usual single retry.
#[derive(Clone)]
pub struct IntentClassifier {
    model: Arc<dyn LanguageModel>,
}

impl IntentClassifier {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub async fn classify(
        &self,
        question: &str,
    ) -> Result<IntentClassification, ClassificationError> {
        let prompt = Prompt::json(CLASSIFIER_SYSTEM_PROMPT, question.trim()).with_temperature(0.0);
        let raw: RawClassification =
            complete_json_validated(self.model.as_ref(), &prompt, check_label).await?;

        let intent_type = QueryIntent::from_label(&raw.intent).ok_or_else(|| {
            ClassificationError(llm::LlmError::Schema(format!("unknown intent {:?}", raw.intent)))
        })?;
        let classification = IntentClassification {
            intent_type,
            confidence: clamp_confidence(raw.confidence),
        };
        tracing::debug!(
            intent = ?classification.intent_type,
            confidence = classification.confidence,
            "question classified"
        );
        Ok(classification)
    }
}
