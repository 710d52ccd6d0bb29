//! Language-model collaborator.
//!
//! The engine talks to language models through the [`LanguageModel`] trait:
//! one instruction/context pair in, one completion out. Call sites that need
//! structured output go through [`complete_json`], which parses and validates
//! the completion and retries a schema failure exactly once.
//!
//! [`ChatClient`] speaks the OpenAI-compatible chat completion protocol and
//! [`Resilient`] adds the shared retry policy on top of any model.
//! [`build_model`] wires both together from an [`LlmConfig`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

mod chat;
mod config;
mod error;
mod resilient;
mod scripted;
mod structured;

pub use chat::ChatClient;
pub use config::LlmConfig;
pub use error::LlmError;
pub use resilient::Resilient;
pub use scripted::ScriptedModel;
pub use structured::{complete_json, complete_json_validated, parse_json};

/// Expected shape of a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    #[default]
    Text,
    Json,
}

/// A fixed instruction plus the request-specific context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    pub format: ResponseFormat,
    /// Overrides the client's default temperature when set.
    pub temperature: Option<f32>,
}

impl Prompt {
    pub fn text(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            format: ResponseFormat::Text,
            temperature: None,
        }
    }

    pub fn json(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            format: ResponseFormat::Json,
            ..Self::text(system, user)
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Copy of this prompt asking the model to fix its previous output.
    pub fn with_correction(&self, reason: &str) -> Self {
        let mut corrected = self.clone();
        corrected.user = format!(
            "{}\n\nThe previous answer was not valid JSON for the requested schema ({reason}). \
             Reply with the JSON object only.",
            self.user
        );
        corrected
    }
}

/// Something that completes prompts.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &Prompt) -> Result<String, LlmError>;
}

#[async_trait]
impl<M: LanguageModel + ?Sized> LanguageModel for Arc<M> {
    async fn complete(&self, prompt: &Prompt) -> Result<String, LlmError> {
        (**self).complete(prompt).await
    }
}

/// Build a retrying chat client from configuration.
pub fn build_model(cfg: &LlmConfig) -> Result<Arc<dyn LanguageModel>, LlmError> {
    let client = ChatClient::new(cfg.clone())?;
    Ok(Arc::new(Resilient::new(client, cfg.retry)))
}
