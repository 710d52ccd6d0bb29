use std::time::Duration;

use async_trait::async_trait;
use resilience::execute_with_retry;
use serde_json::{json, Value};

use crate::normalize::{l2_normalize_in_place, truncate_chars};
use crate::{ApiFormat, Embedder, EmbeddingConfig, EmbeddingError};

/// Embedder backed by a remote HTTP inference endpoint.
///
/// Each request runs under the configured [`resilience::RetryPolicy`], so
/// callers see one call that either returns vectors or has already exhausted
/// its retries. Returned vectors are always L2-normalized.
#[derive(Debug, Clone)]
pub struct ApiEmbedder {
    client: reqwest::Client,
    url: String,
    auth_header: Option<String>,
    cfg: EmbeddingConfig,
}

impl ApiEmbedder {
    pub fn new(cfg: EmbeddingConfig) -> Result<Self, EmbeddingError> {
        cfg.validate()?;
        let url = cfg
            .api_url
            .clone()
            .ok_or_else(|| EmbeddingError::InvalidConfig("api_url is required for api mode".into()))?;
        let auth_header = match cfg.api_key_env.as_deref() {
            Some(var) => {
                let key = std::env::var(var).map_err(|_| {
                    EmbeddingError::InvalidConfig(format!("environment variable {var} is not set"))
                })?;
                Some(format!("Bearer {key}"))
            }
            None => None,
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(32)
            .build()
            .map_err(|e| EmbeddingError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url,
            auth_header,
            cfg,
        })
    }

    async fn send_api_request(&self, payload: &Value) -> Result<Value, EmbeddingError> {
        let mut request = self.client.post(&self.url).json(payload);
        if let Some(header) = self.auth_header.as_deref() {
            request = request.header(reqwest::header::AUTHORIZATION, header);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                EmbeddingError::Timeout(Duration::from_secs(self.cfg.request_timeout_secs))
            } else {
                EmbeddingError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(EmbeddingError::RateLimited {
                retry_after: retry_after(response.headers()),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Api {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| EmbeddingError::Response(format!("invalid JSON response: {e}")))
    }
}

#[async_trait]
impl Embedder for ApiEmbedder {
    fn model_name(&self) -> &str {
        &self.cfg.model_name
    }

    fn dimension(&self) -> usize {
        self.cfg.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let inputs: Vec<&str> = texts
            .iter()
            .map(|t| truncate_chars(t, self.cfg.max_input_chars))
            .collect();
        let payload = build_api_payload(self.cfg.api_format, &inputs, &self.cfg.model_name);

        let outcome = execute_with_retry(&self.cfg.retry, |_attempt| {
            self.send_api_request(&payload)
        })
        .await;
        let attempts = outcome.attempts;
        let response = outcome.into_result()?;
        if attempts > 1 {
            tracing::debug!(attempts, model = %self.cfg.model_name, "embedding call recovered");
        }

        let vectors = parse_embeddings_from_value(response)?;
        if vectors.len() != texts.len() {
            return Err(EmbeddingError::Response(format!(
                "API returned {} embeddings for {} inputs",
                vectors.len(),
                texts.len()
            )));
        }

        vectors
            .into_iter()
            .map(|mut v| {
                if v.len() != self.cfg.dimension {
                    return Err(EmbeddingError::DimensionMismatch {
                        expected: self.cfg.dimension,
                        actual: v.len(),
                    });
                }
                l2_normalize_in_place(&mut v);
                Ok(v)
            })
            .collect()
    }
}

fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn build_api_payload(format: ApiFormat, texts: &[&str], model_name: &str) -> Value {
    match format {
        ApiFormat::HuggingFace => json!({ "inputs": texts }),
        ApiFormat::OpenAi => json!({ "input": texts, "model": model_name }),
        ApiFormat::Custom => json!({ "texts": texts }),
    }
}

pub(crate) fn parse_embeddings_from_value(value: Value) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    match value {
        Value::Object(mut map) => {
            if let Some(embeddings) = map.remove("embeddings") {
                return parse_embedding_collection(embeddings);
            }

            if let Some(Value::Array(items)) = map.remove("data") {
                let mut indexed = Vec::with_capacity(items.len());
                for (position, item) in items.into_iter().enumerate() {
                    let Value::Object(mut obj) = item else {
                        return Err(EmbeddingError::Response(
                            "unexpected entry inside `data` array".into(),
                        ));
                    };
                    let embedding = obj.remove("embedding").ok_or_else(|| {
                        EmbeddingError::Response("missing `embedding` field in data item".into())
                    })?;
                    let index = obj
                        .get("index")
                        .and_then(Value::as_u64)
                        .map_or(position, |i| i as usize);
                    indexed.push((index, parse_embedding_vector(embedding)?));
                }
                // OpenAI does not promise response order; `index` does.
                indexed.sort_by_key(|(index, _)| *index);
                return Ok(indexed.into_iter().map(|(_, v)| v).collect());
            }

            Err(EmbeddingError::Response(
                "unsupported API response shape".into(),
            ))
        }
        other => parse_embedding_collection(other),
    }
}

fn parse_embedding_collection(value: Value) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    match value {
        Value::Array(items) => {
            if items.is_empty() {
                Ok(Vec::new())
            } else if items.iter().all(|item| matches!(item, Value::Array(_))) {
                items.into_iter().map(parse_embedding_vector).collect()
            } else {
                parse_embedding_vector(Value::Array(items)).map(|vec| vec![vec])
            }
        }
        other => parse_embedding_vector(other).map(|vec| vec![vec]),
    }
}

fn parse_embedding_vector(value: Value) -> Result<Vec<f32>, EmbeddingError> {
    match value {
        Value::Array(values) => values
            .into_iter()
            .map(|entry| match entry {
                Value::Number(num) => num
                    .as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| EmbeddingError::Response("non-finite embedding value".into())),
                other => Err(EmbeddingError::Response(format!(
                    "embedding entries must be numbers, got {other:?}"
                ))),
            })
            .collect(),
        other => Err(EmbeddingError::Response(format!(
            "embedding vector must be an array, got {other:?}"
        ))),
    }
}
