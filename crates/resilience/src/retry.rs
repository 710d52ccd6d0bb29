//! Retry logic with exponential backoff for transient failures.
//!
//! Transient failures are retried with an exponentially growing delay.
//! Rate-limit signals get a longer, fixed cooldown. Permanent failures
//! return immediately without spending attempts.

use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::serde_millis;

/// How the retry loop should treat a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Connection resets, timeouts, 5xx responses.
    Transient,
    /// The provider asked the caller to slow down. `retry_after` carries the
    /// provider's hint when it sent one.
    RateLimited { retry_after: Option<Duration> },
    /// Bad requests, auth failures, schema violations. Never retried.
    Permanent,
}

impl RetryClass {
    /// Map an HTTP status code onto a retry class.
    pub fn from_status(status: u16, retry_after: Option<Duration>) -> Self {
        match status {
            429 => RetryClass::RateLimited { retry_after },
            408 | 500..=599 => RetryClass::Transient,
            _ => RetryClass::Permanent,
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, RetryClass::Permanent)
    }
}

/// Errors that can flow through [`execute_with_retry`].
pub trait Retryable: Sized {
    /// Classify this failure.
    fn retry_class(&self) -> RetryClass;

    /// Build the error reported when a single attempt exceeds
    /// [`RetryPolicy::attempt_timeout`]. Timeouts are treated as transient.
    fn timed_out(limit: Duration) -> Self;
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay after the first transient failure; doubled on every further one.
    #[serde(rename = "base_delay_ms", with = "serde_millis")]
    pub base_delay: Duration,
    /// Upper bound for the exponential delay.
    #[serde(rename = "max_delay_ms", with = "serde_millis")]
    pub max_delay: Duration,
    /// Minimum wait after a rate-limit signal.
    #[serde(rename = "rate_limit_cooldown_ms", with = "serde_millis")]
    pub rate_limit_cooldown: Duration,
    /// Per-attempt deadline. `None` lets an attempt run until the transport
    /// gives up on its own.
    #[serde(rename = "attempt_timeout_ms", with = "serde_millis::option")]
    pub attempt_timeout: Option<Duration>,
    /// Whether to add random jitter to backoff delays.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            rate_limit_cooldown: Duration::from_secs(20),
            attempt_timeout: Some(Duration::from_secs(30)),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy without any waiting, for fakes and tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            rate_limit_cooldown: Duration::ZERO,
            attempt_timeout: None,
            jitter: false,
        }
    }

    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_rate_limit_cooldown(mut self, cooldown: Duration) -> Self {
        self.rate_limit_cooldown = cooldown;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Reject policies that would never run or never wait sensibly.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".into());
        }
        if self.max_delay < self.base_delay {
            return Err("max_delay must not be smaller than base_delay".into());
        }
        if self.attempt_timeout == Some(Duration::ZERO) {
            return Err("attempt_timeout must be positive when set".into());
        }
        Ok(())
    }
}

/// Result of a retried operation.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    /// The final result: the first success, or the last error.
    pub result: Result<T, E>,
    /// Number of attempts made (1 = no retries needed).
    pub attempts: u32,
    /// Wall-clock time spent across all attempts and delays.
    pub total_duration: Duration,
}

impl<T, E> RetryOutcome<T, E> {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }

    pub fn into_result(self) -> Result<T, E> {
        self.result
    }
}

/// Execute an async operation with retry logic.
///
/// The closure receives the zero-based attempt number. Each attempt is bounded
/// by [`RetryPolicy::attempt_timeout`] when one is set.
///
/// ```ignore
/// let outcome = execute_with_retry(&policy, |_attempt| client.send(payload.clone())).await;
/// let response = outcome.into_result()?;
/// ```
pub async fn execute_with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    mut operation: F,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let start = Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        let result = match policy.attempt_timeout {
            Some(limit) => match tokio::time::timeout(limit, operation(attempt)).await {
                Ok(result) => result,
                Err(_) => Err(E::timed_out(limit)),
            },
            None => operation(attempt).await,
        };

        let error = match result {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt + 1,
                    total_duration: start.elapsed(),
                };
            }
            Err(error) => error,
        };

        let class = error.retry_class();
        if !class.is_retryable() || attempt + 1 >= max_attempts {
            if attempt > 0 {
                tracing::warn!(attempts = attempt + 1, error = %error, "giving up on external call");
            }
            return RetryOutcome {
                result: Err(error),
                attempts: attempt + 1,
                total_duration: start.elapsed(),
            };
        }

        let delay = next_delay(policy, attempt, class);
        tracing::warn!(
            attempt = attempt + 1,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "external call failed, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Delay to wait after attempt `attempt` failed with `class`.
pub fn next_delay(policy: &RetryPolicy, attempt: u32, class: RetryClass) -> Duration {
    match class {
        RetryClass::RateLimited { retry_after } => policy
            .rate_limit_cooldown
            .max(retry_after.unwrap_or_default()),
        RetryClass::Transient | RetryClass::Permanent => backoff_delay(policy, attempt),
    }
}

/// Calculate delay for a retry attempt with exponential backoff.
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let base = policy.base_delay.as_millis() as u64;
    let exponential = base.saturating_mul(2_u64.saturating_pow(attempt));
    let delay = exponential.min(policy.max_delay.as_millis() as u64);

    if policy.jitter && delay > 0 {
        // Add 0-50% random jitter
        let jitter = fastrand::u64(0..=delay / 2);
        Duration::from_millis(delay + jitter)
    } else {
        Duration::from_millis(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::fmt;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Flaky,
        Fatal,
        Busy,
        TimedOut,
    }

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{self:?}")
        }
    }

    impl Retryable for TestError {
        fn retry_class(&self) -> RetryClass {
            match self {
                TestError::Flaky | TestError::TimedOut => RetryClass::Transient,
                TestError::Busy => RetryClass::RateLimited { retry_after: None },
                TestError::Fatal => RetryClass::Permanent,
            }
        }

        fn timed_out(_limit: Duration) -> Self {
            TestError::TimedOut
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::default()
            .with_base_delay(Duration::from_millis(10))
            .with_max_delay(Duration::from_millis(40))
            .with_rate_limit_cooldown(Duration::from_secs(5))
            .with_jitter(false)
    }

    #[tokio::test(start_paused = true)]
    async fn retry_succeeds_eventually() {
        let calls = Cell::new(0);
        let outcome = execute_with_retry(&fast_policy(), |_attempt| {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                if n < 3 {
                    Err(TestError::Flaky)
                } else {
                    Ok("success")
                }
            }
        })
        .await;

        assert!(outcome.succeeded());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.into_result(), Ok("success"));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_stops_at_max_attempts() {
        let outcome: RetryOutcome<(), _> =
            execute_with_retry(&fast_policy().with_max_attempts(3), |_| async {
                Err(TestError::Flaky)
            })
            .await;

        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.into_result(), Err(TestError::Flaky));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_are_not_retried() {
        let outcome: RetryOutcome<(), _> =
            execute_with_retry(&fast_policy(), |_| async { Err(TestError::Fatal) }).await;

        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.into_result(), Err(TestError::Fatal));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_waits_for_cooldown() {
        let started = tokio::time::Instant::now();
        let calls = Cell::new(0);
        let outcome = execute_with_retry(&fast_policy(), |_| {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                if n == 1 {
                    Err(TestError::Busy)
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(outcome.into_result(), Ok(2));
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempts_time_out_and_count_as_transient() {
        let policy = fast_policy()
            .with_max_attempts(2)
            .with_attempt_timeout(Some(Duration::from_secs(1)));
        let outcome: RetryOutcome<(), _> = execute_with_retry(&policy, |_| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;

        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.into_result(), Err(TestError::TimedOut));
    }

    #[tokio::test]
    async fn no_delay_on_success() {
        let outcome: RetryOutcome<_, TestError> =
            execute_with_retry(&RetryPolicy::default(), |_| async { Ok(1) }).await;

        assert_eq!(outcome.attempts, 1);
        assert!(outcome.total_duration < Duration::from_millis(50));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = fast_policy();
        assert_eq!(backoff_delay(&policy, 0), Duration::from_millis(10));
        assert_eq!(backoff_delay(&policy, 1), Duration::from_millis(20));
        assert_eq!(backoff_delay(&policy, 2), Duration::from_millis(40));
        assert_eq!(backoff_delay(&policy, 10), Duration::from_millis(40));
    }

    #[test]
    fn jitter_stays_within_half_the_delay() {
        let policy = fast_policy().with_jitter(true);
        for _ in 0..100 {
            let delay = backoff_delay(&policy, 1);
            assert!(delay >= Duration::from_millis(20));
            assert!(delay <= Duration::from_millis(30));
        }
    }

    #[test]
    fn rate_limit_delay_honours_longer_retry_after() {
        let policy = fast_policy();
        let hinted = RetryClass::RateLimited {
            retry_after: Some(Duration::from_secs(30)),
        };
        assert_eq!(next_delay(&policy, 0, hinted), Duration::from_secs(30));
        let short = RetryClass::RateLimited {
            retry_after: Some(Duration::from_secs(1)),
        };
        assert_eq!(next_delay(&policy, 0, short), Duration::from_secs(5));
    }

    #[test]
    fn status_codes_map_to_classes() {
        assert_eq!(
            RetryClass::from_status(429, None),
            RetryClass::RateLimited { retry_after: None }
        );
        assert_eq!(RetryClass::from_status(503, None), RetryClass::Transient);
        assert_eq!(RetryClass::from_status(408, None), RetryClass::Transient);
        assert_eq!(RetryClass::from_status(400, None), RetryClass::Permanent);
        assert_eq!(RetryClass::from_status(401, None), RetryClass::Permanent);
    }

    #[test]
    fn policy_roundtrips_through_millis() {
        let policy = RetryPolicy::default();
        let json = serde_json::to_value(policy).unwrap();
        assert_eq!(json["base_delay_ms"], 500);
        assert_eq!(json["attempt_timeout_ms"], 30_000);

        let parsed: RetryPolicy =
            serde_json::from_str(r#"{"max_attempts": 5, "attempt_timeout_ms": null}"#).unwrap();
        assert_eq!(parsed.max_attempts, 5);
        assert_eq!(parsed.attempt_timeout, None);
        assert_eq!(parsed.base_delay, Duration::from_millis(500));
    }

    #[test]
    fn validate_rejects_zero_attempts() {
        assert!(RetryPolicy::default().validate().is_ok());
        assert!(RetryPolicy::default().with_max_attempts(0).validate().is_err());
        assert!(RetryPolicy::default()
            .with_attempt_timeout(Some(Duration::ZERO))
            .validate()
            .is_err());
    }
}
