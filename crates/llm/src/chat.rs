use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{LanguageModel, LlmConfig, LlmError, Prompt, ResponseFormat};

/// Single-attempt client for an OpenAI-compatible `/chat/completions` API.
///
/// Wrap it in [`crate::Resilient`] to get retries; on its own it reports
/// every failure straight back.
#[derive(Debug, Clone)]
pub struct ChatClient {
    client: reqwest::Client,
    url: String,
    auth_header: Option<String>,
    cfg: LlmConfig,
}

impl ChatClient {
    pub fn new(cfg: LlmConfig) -> Result<Self, LlmError> {
        cfg.validate()?;
        let auth_header = match cfg.api_key_env.as_deref() {
            Some(var) => {
                let key = std::env::var(var).map_err(|_| {
                    LlmError::InvalidConfig(format!("environment variable {var} is not set"))
                })?;
                Some(format!("Bearer {key}"))
            }
            None => None,
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| LlmError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: cfg.completions_url(),
            auth_header,
            cfg,
        })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.cfg
    }
}

#[async_trait]
impl LanguageModel for ChatClient {
    async fn complete(&self, prompt: &Prompt) -> Result<String, LlmError> {
        let payload = build_chat_payload(&self.cfg, prompt);
        let mut request = self.client.post(&self.url).json(&payload);
        if let Some(header) = self.auth_header.as_deref() {
            request = request.header(reqwest::header::AUTHORIZATION, header);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout(Duration::from_secs(self.cfg.request_timeout_secs))
            } else {
                LlmError::Transport(e.to_string())
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
            return Err(LlmError::RateLimited { retry_after });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| LlmError::Transport(format!("invalid JSON body: {e}")))?;
        extract_content(&body)
    }
}

fn build_chat_payload(cfg: &LlmConfig, prompt: &Prompt) -> Value {
    let mut payload = json!({
        "model": cfg.model,
        "messages": [
            { "role": "system", "content": prompt.system },
            { "role": "user", "content": prompt.user },
        ],
        "temperature": prompt.temperature.unwrap_or(cfg.temperature),
    });
    if let Some(max_tokens) = cfg.max_tokens {
        payload["max_tokens"] = json!(max_tokens);
    }
    if prompt.format == ResponseFormat::Json {
        payload["response_format"] = json!({ "type": "json_object" });
    }
    payload
}

fn extract_content(body: &Value) -> Result<String, LlmError> {
    let content = body
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if content.is_empty() {
        return Err(LlmError::EmptyResponse);
    }
    Ok(content.to_string())
}
