//! Resilience primitives
//!
//! Retry execution with pluggable backoff, jitter and retry policies. Callers
//! own per-attempt timeouts; the executor only decides whether and when to try
//! again.

pub mod retry;

pub use retry::{
    BackoffStrategy, Jitter, RetryConfig, RetryConfigBuilder, RetryDecision, RetryError,
    RetryExecutor, RetryPolicy, RetryResult,
};
