//! Schema-checked JSON completions.
//!
//! Output that fails to parse or validate is retried exactly once with a
//! corrective note appended to the prompt; a second failure becomes
//! [`LlmError::Schema`]. Transport errors are not retried here, that is the
//! job of [`crate::Resilient`].

use serde::de::DeserializeOwned;

use crate::{LanguageModel, LlmError, Prompt};

/// Number of completions attempted for one structured call.
const SCHEMA_ATTEMPTS: usize = 2;

/// Ask `model` for JSON and deserialize it into `T`.
pub async fn complete_json<T>(model: &dyn LanguageModel, prompt: &Prompt) -> Result<T, LlmError>
where
    T: DeserializeOwned + Send,
{
    complete_json_validated(model, prompt, |_: &T| Ok(())).await
}

/// Like [`complete_json`], with an extra semantic check on the parsed value.
pub async fn complete_json_validated<T, V>(
    model: &dyn LanguageModel,
    prompt: &Prompt,
    validate: V,
) -> Result<T, LlmError>
where
    T: DeserializeOwned + Send,
    V: Fn(&T) -> Result<(), String> + Send + Sync,
{
    let mut current = prompt.clone();
    let mut last_reason = String::new();

    for attempt in 0..SCHEMA_ATTEMPTS {
        let raw = model.complete(&current).await?;
        let parsed = parse_json::<T>(&raw).and_then(|value| validate(&value).map(|()| value));
        match parsed {
            Ok(value) => return Ok(value),
            Err(reason) => {
                tracing::warn!(attempt = attempt + 1, %reason, "structured llm output rejected");
                current = prompt.with_correction(&reason);
                last_reason = reason;
            }
        }
    }

    Err(LlmError::Schema(last_reason))
}

/// Deserialize the JSON object contained in a completion.
///
/// Tolerates Markdown code fences and prose around a single object.
pub fn parse_json<T: DeserializeOwned>(raw: &str) -> Result<T, String> {
    let body = strip_code_fence(raw.trim());
    match serde_json::from_str(body) {
        Ok(value) => Ok(value),
        Err(first) => match (body.find('{'), body.rfind('}')) {
            (Some(start), Some(end)) if start < end => {
                serde_json::from_str(&body[start..=end]).map_err(|e| e.to_string())
            }
            _ => Err(first.to_string()),
        },
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.trim_end().trim_end_matches("```").trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ScriptedModel;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Label {
        intent: String,
        confidence: f32,
    }

    #[test]
    fn parses_fenced_json() {
        let raw = "```json\n{\"intent\": \"a\", \"confidence\": 0.5}\n```";
        let label: Label = parse_json(raw).unwrap();
        assert_eq!(label.intent, "a");
    }

    #[test]
    fn parses_json_surrounded_by_prose() {
        let raw = "결과입니다: {\"intent\": \"b\", \"confidence\": 1.0} 끝";
        let label: Label = parse_json(raw).unwrap();
        assert_eq!(label.intent, "b");
    }

    #[test]
    fn reports_missing_fields() {
        let err = parse_json::<Label>("{\"intent\": \"a\"}").unwrap_err();
        assert!(err.contains("confidence"));
    }

    #[tokio::test]
    async fn schema_failure_is_retried_once() {
        let model = ScriptedModel::new().with_sequence(vec![
            Ok("not json".to_string()),
            Ok("{\"intent\": \"x\", \"confidence\": 0.9}".to_string()),
        ]);
        let label: Label = complete_json(&model, &Prompt::json("s", "u")).await.unwrap();
        assert_eq!(label.intent, "x");
        assert_eq!(model.call_count(), 2);
        // The retry carries a correction note.
        assert!(model.prompts()[1].user.contains("not valid"));
    }

    #[tokio::test]
    async fn second_schema_failure_is_hard() {
        let model = ScriptedModel::new().otherwise("{}");
        let err = complete_json::<Label>(&model, &Prompt::json("s", "u"))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Schema(_)));
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test]
    async fn validation_failures_count_as_schema_failures() {
        let model = ScriptedModel::new().otherwise("{\"intent\": \"x\", \"confidence\": 4.0}");
        let err = complete_json_validated(&model, &Prompt::json("s", "u"), |l: &Label| {
            if (0.0..=1.0).contains(&l.confidence) {
                Ok(())
            } else {
                Err("confidence out of range".into())
            }
        })
        .await
        .unwrap_err();
        assert_eq!(err, LlmError::Schema("confidence out of range".into()));
    }

    #[tokio::test]
    async fn transport_errors_propagate_without_schema_retry() {
        let model = ScriptedModel::new().with_sequence(vec![Err(LlmError::Api {
            status: 500,
            body: String::new(),
        })]);
        let err = complete_json::<Label>(&model, &Prompt::json("s", "u"))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Api { status: 500, .. }));
        assert_eq!(model.call_count(), 1);
    }
}
