use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use resilience::{execute_with_retry, RetryClass, RetryPolicy, Retryable};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::types::{MatchError, RerankerConfig};

#[derive(Debug, Clone, Error)]
pub enum RerankError {
    #[error("rerank request failed: {0}")]
    Transport(String),
    #[error("rerank request timed out after {0:?}")]
    Timeout(Duration),
    #[error("reranker rate limited the request")]
    RateLimited { retry_after: Option<Duration> },
    #[error("reranker returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("unexpected rerank response: {0}")]
    Response(String),
}

impl Retryable for RerankError {
    fn retry_class(&self) -> RetryClass {
        match self {
            RerankError::Transport(_) | RerankError::Timeout(_) => RetryClass::Transient,
            RerankError::RateLimited { retry_after } => RetryClass::RateLimited {
                retry_after: *retry_after,
            },
            RerankError::Api { status, .. } => RetryClass::from_status(*status, None),
            RerankError::Response(_) => RetryClass::Permanent,
        }
    }

    fn timed_out(limit: Duration) -> Self {
        RerankError::Timeout(limit)
    }
}

/// Second-stage scorer over a short list of candidate documents.
#[async_trait]
pub trait Reranker: Send + Sync {
    fn name(&self) -> &str;

    /// One score per document, in input order. Higher is better.
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, RerankError>;
}

/// Dice coefficient over character bigrams, whitespace ignored.
///
/// Cheap, deterministic and good at rewarding exact Korean phrases
/// (`남향`, `드레스룸`) that a bag-of-vectors embedding may blur.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalReranker;

pub(crate) fn char_bigrams(text: &str) -> HashSet<(char, char)> {
    let mut grams = HashSet::new();
    for token in text.split_whitespace() {
        let chars: Vec<char> = token.to_lowercase().chars().collect();
        for pair in chars.windows(2) {
            grams.insert((pair[0], pair[1]));
        }
    }
    grams
}

pub(crate) fn dice(query: &HashSet<(char, char)>, document: &HashSet<(char, char)>) -> f32 {
    let total = query.len() + document.len();
    if total == 0 {
        return 0.0;
    }
    let shared = query.intersection(document).count();
    (2 * shared) as f32 / total as f32
}

#[async_trait]
impl Reranker for LexicalReranker {
    fn name(&self) -> &str {
        "lexical"
    }

    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, RerankError> {
        let query = char_bigrams(query);
        Ok(documents
            .iter()
            .map(|doc| dice(&query, &char_bigrams(doc)))
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct RankedText {
    index: usize,
    score: f32,
}

/// Cross-encoder behind a TEI-compatible `/rerank` endpoint.
///
/// Sends `{"query", "texts"}` and expects `[{"index", "score"}]` back.
#[derive(Debug, Clone)]
pub struct ApiReranker {
    client: reqwest::Client,
    url: String,
    auth_header: Option<String>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl ApiReranker {
    pub fn new(
        url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, MatchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| MatchError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
            auth_header: api_key.map(|key| format!("Bearer {key}")),
            timeout,
            retry,
        })
    }

    async fn send_once(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, RerankError> {
        let payload = json!({ "query": query, "texts": documents, "raw_scores": false });
        let mut request = self.client.post(&self.url).json(&payload);
        if let Some(header) = self.auth_header.as_deref() {
            request = request.header(reqwest::header::AUTHORIZATION, header);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                RerankError::Timeout(self.timeout)
            } else {
                RerankError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(RerankError::RateLimited { retry_after });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RerankError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let ranked: Vec<RankedText> = response
            .json()
            .await
            .map_err(|e| RerankError::Response(format!("invalid JSON response: {e}")))?;
        scores_in_input_order(ranked, documents.len())
    }
}

fn scores_in_input_order(ranked: Vec<RankedText>, expected: usize) -> Result<Vec<f32>, RerankError> {
    let mut scores = vec![None; expected];
    for item in ranked {
        let slot = scores.get_mut(item.index).ok_or_else(|| {
            RerankError::Response(format!("index {} out of range for {expected} texts", item.index))
        })?;
        *slot = Some(item.score);
    }
    scores
        .into_iter()
        .enumerate()
        .map(|(i, s)| s.ok_or_else(|| RerankError::Response(format!("no score for text {i}"))))
        .collect()
}

#[async_trait]
impl Reranker for ApiReranker {
    fn name(&self) -> &str {
        "api"
    }

    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, RerankError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let outcome = execute_with_retry(&self.retry, |_attempt| self.send_once(query, documents)).await;
        if outcome.attempts > 1 {
            tracing::debug!(attempts = outcome.attempts, "rerank call recovered");
        }
        outcome.into_result()
    }
}

/// Build the reranker described by `cfg`; `None` when reranking is disabled.
pub fn build_reranker(
    cfg: &RerankerConfig,
    retry: RetryPolicy,
) -> Result<Option<Arc<dyn Reranker>>, MatchError> {
    match cfg {
        RerankerConfig::Lexical => Ok(Some(Arc::new(LexicalReranker))),
        RerankerConfig::Disabled => Ok(None),
        RerankerConfig::Api {
            url,
            api_key_env,
            request_timeout_secs,
        } => {
            let api_key = match api_key_env.as_deref() {
                Some(var) => Some(std::env::var(var).map_err(|_| {
                    MatchError::InvalidConfig(format!("environment variable {var} is not set"))
                })?),
                None => None,
            };
            let reranker = ApiReranker::new(
                url.clone(),
                api_key,
                Duration::from_secs(*request_timeout_secs),
                retry,
            )?;
            Ok(Some(Arc::new(reranker)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lexical_prefers_shared_phrases() {
        let docs = vec![
            "남향 판상형 구조, 거실이 넓습니다".to_string(),
            "북향 타워형 구조".to_string(),
        ];
        let scores = LexicalReranker.score("남향 거실", &docs).await.unwrap();
        assert_eq!(scores.len(), 2);
        assert!(scores[0] > scores[1]);
        assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
    }

    #[tokio::test]
    async fn lexical_handles_empty_input() {
        let scores = LexicalReranker.score("", &["".to_string()]).await.unwrap();
        assert_eq!(scores, vec![0.0]);
    }

    #[test]
    fn dice_is_one_for_identical_text() {
        let a = char_bigrams("드레스룸");
        assert!((dice(&a, &a) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn api_scores_are_reordered_by_index() {
        let ranked = vec![
            RankedText { index: 1, score: 0.9 },
            RankedText { index: 0, score: 0.2 },
        ];
        assert_eq!(scores_in_input_order(ranked, 2).unwrap(), vec![0.2, 0.9]);
    }

    #[test]
    fn api_scores_must_cover_every_text() {
        let ranked = vec![RankedText { index: 0, score: 0.2 }];
        assert!(scores_in_input_order(ranked, 2).is_err());
        let ranked = vec![RankedText { index: 5, score: 0.2 }];
        assert!(scores_in_input_order(ranked, 2).is_err());
    }

    #[test]
    fn rate_limits_are_retried() {
        let err = RerankError::RateLimited { retry_after: None };
        assert!(err.retry_class().is_retryable());
        assert!(!RerankError::Response("x".into()).retry_class().is_retryable());
    }

    #[test]
    fn disabled_config_builds_nothing() {
        assert!(build_reranker(&RerankerConfig::Disabled, RetryPolicy::default())
            .unwrap()
            .is_none());
        let lexical = build_reranker(&RerankerConfig::Lexical, RetryPolicy::default())
            .unwrap()
            .unwrap();
        assert_eq!(lexical.name(), "lexical");
    }
}
