use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{LanguageModel, LlmError, Prompt};

type Responder = Box<dyn Fn(&Prompt) -> Result<String, LlmError> + Send + Sync>;

/// Deterministic [`LanguageModel`] for tests and demos.
///
/// Replies are chosen in this order: queued sequence entries, then the first
/// rule whose needle appears in the system or user text, then the responder
/// function, then the fallback. Every prompt received is recorded.
#[derive(Default)]
pub struct ScriptedModel {
    sequence: Mutex<VecDeque<Result<String, LlmError>>>,
    rules: Vec<(String, Result<String, LlmError>)>,
    responder: Option<Responder>,
    fallback: Option<Result<String, LlmError>>,
    calls: Mutex<Vec<Prompt>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replies consumed one per call before any rule is consulted.
    pub fn with_sequence(self, replies: Vec<Result<String, LlmError>>) -> Self {
        {
            let mut queue = self
                .sequence
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            queue.extend(replies);
        }
        self
    }

    /// Reply with `reply` whenever `needle` occurs in the prompt.
    pub fn when(mut self, needle: impl Into<String>, reply: impl Into<String>) -> Self {
        self.rules.push((needle.into(), Ok(reply.into())));
        self
    }

    /// Fail with `error` whenever `needle` occurs in the prompt.
    pub fn when_err(mut self, needle: impl Into<String>, error: LlmError) -> Self {
        self.rules.push((needle.into(), Err(error)));
        self
    }

    /// Compute replies from the prompt when no rule matched.
    pub fn respond_with<F>(mut self, responder: F) -> Self
    where
        F: Fn(&Prompt) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        self.responder = Some(Box::new(responder));
        self
    }

    /// Reply used when nothing else matched.
    pub fn otherwise(mut self, reply: impl Into<String>) -> Self {
        self.fallback = Some(Ok(reply.into()));
        self
    }

    /// Error used when nothing else matched.
    pub fn otherwise_err(mut self, error: LlmError) -> Self {
        self.fallback = Some(Err(error));
        self
    }

    pub fn call_count(&self) -> usize {
        self.lock_calls().len()
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.lock_calls().clone()
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Vec<Prompt>> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn reply_for(&self, prompt: &Prompt) -> Result<String, LlmError> {
        let queued = self
            .sequence
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        if let Some(reply) = queued {
            return reply;
        }

        let haystack = format!("{}\n{}", prompt.system, prompt.user);
        if let Some((_, reply)) = self
            .rules
            .iter()
            .find(|(needle, _)| haystack.contains(needle.as_str()))
        {
            return reply.clone();
        }
        if let Some(responder) = &self.responder {
            return responder(prompt);
        }
        self.fallback
            .clone()
            .unwrap_or_else(|| Err(LlmError::Transport("no scripted reply for prompt".into())))
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: &Prompt) -> Result<String, LlmError> {
        self.lock_calls().push(prompt.clone());
        self.reply_for(prompt)
    }
}
