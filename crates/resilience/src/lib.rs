//! Resilience primitives for calls that leave the process.
//!
//! Every wrapper around an external collaborator (language model, embedding
//! endpoint, vision endpoint, reranker) runs its request through
//! [`execute_with_retry`]. Agents and the orchestrator never retry on their
//! own; they see each wrapped call as one already-resilient operation.
//!
//! Errors opt into the loop by implementing [`Retryable`], which tells the
//! loop whether a failure is transient, a rate-limit signal, or permanent.

mod retry;
pub mod serde_millis;

pub use retry::{
    backoff_delay, execute_with_retry, next_delay, RetryClass, RetryOutcome, RetryPolicy,
    Retryable,
};
