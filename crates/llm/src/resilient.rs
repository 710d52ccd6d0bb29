use async_trait::async_trait;
use resilience::{execute_with_retry, RetryPolicy};

use crate::{LanguageModel, LlmError, Prompt};

/// Retry wrapper around any [`LanguageModel`].
///
/// Transient failures back off exponentially, rate-limit signals wait for
/// the cooldown, everything else is returned on the first attempt.
#[derive(Debug, Clone)]
pub struct Resilient<M> {
    inner: M,
    policy: RetryPolicy,
}

impl<M> Resilient<M> {
    pub fn new(inner: M, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }
}

#[async_trait]
impl<M: LanguageModel> LanguageModel for Resilient<M> {
    async fn complete(&self, prompt: &Prompt) -> Result<String, LlmError> {
        execute_with_retry(&self.policy, |_attempt| self.inner.complete(prompt))
            .await
            .into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ScriptedModel;
    use std::time::Duration;

    fn transient() -> LlmError {
        LlmError::Transport("connection reset".into())
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures() {
        let scripted = ScriptedModel::new()
            .with_sequence(vec![Err(transient()), Err(transient())])
            .otherwise("안녕하세요");
        let model = Resilient::new(scripted, RetryPolicy::default().with_jitter(false));

        assert_eq!(model.complete(&Prompt::text("s", "u")).await.unwrap(), "안녕하세요");
        assert_eq!(model.inner().call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let scripted = ScriptedModel::new().with_sequence(vec![
            Err(transient()),
            Err(transient()),
            Err(transient()),
            Ok("too late".into()),
        ]);
        let model = Resilient::new(scripted, RetryPolicy::default());

        assert_eq!(model.complete(&Prompt::text("s", "u")).await, Err(transient()));
        assert_eq!(model.inner().call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limits_wait_for_cooldown() {
        let scripted = ScriptedModel::new()
            .with_sequence(vec![Err(LlmError::RateLimited { retry_after: None })])
            .otherwise("ok");
        let policy = RetryPolicy::default().with_rate_limit_cooldown(Duration::from_secs(20));
        let model = Resilient::new(scripted, policy);

        let started = tokio::time::Instant::now();
        assert_eq!(model.complete(&Prompt::text("s", "u")).await.unwrap(), "ok");
        assert!(started.elapsed() >= Duration::from_secs(20));
    }

    #[tokio::test]
    async fn hard_errors_are_returned_immediately() {
        let scripted = ScriptedModel::new().with_sequence(vec![Err(LlmError::Api {
            status: 403,
            body: "forbidden".into(),
        })]);
        let model = Resilient::new(scripted, RetryPolicy::default());

        assert!(model.complete(&Prompt::text("s", "u")).await.is_err());
        assert_eq!(model.inner().call_count(), 1);
    }
}
