//! Resilient remote calls
//!
//! Wraps every call to the remote calendar in a per-attempt deadline and the
//! shared retry executor. Only [`ProviderError::Transient`] is retried; a
//! provider `Retry-After` overrides the computed backoff.

use std::future::Future;
use std::time::Duration;

use calmirror_common::{RetryConfig, RetryDecision, RetryError, RetryExecutor, RetryPolicy};
use calmirror_domain::{ProviderError, TransientKind};
use tracing::warn;

/// Retry transient provider failures, stop on everything else
#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderRetryPolicy;

impl RetryPolicy<ProviderError> for ProviderRetryPolicy {
    fn should_retry(&self, error: &ProviderError, _attempt: u32) -> RetryDecision {
        match error.retry_after() {
            Some(delay) => RetryDecision::RetryAfter(delay),
            None if error.is_transient() => RetryDecision::Retry,
            None => RetryDecision::Stop,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemoteCaller {
    executor: RetryExecutor<ProviderRetryPolicy>,
    attempt_timeout: Duration,
}

impl RemoteCaller {
    pub fn new(retry: RetryConfig, attempt_timeout: Duration) -> Self {
        Self { executor: RetryExecutor::new(retry, ProviderRetryPolicy), attempt_timeout }
    }

    /// Run `operation` until it succeeds or fails for good
    ///
    /// Exhausting the attempt or time budget yields
    /// [`ProviderError::RetriesExhausted`]; non-retryable errors come back
    /// unchanged.
    pub async fn call<T, F, Fut>(&self, operation: &'static str, mut op: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let deadline = self.attempt_timeout;
        let result = self
            .executor
            .execute(|| {
                let attempt = op();
                async move {
                    match tokio::time::timeout(deadline, attempt).await {
                        Ok(outcome) => outcome,
                        Err(_) => Err(ProviderError::transient(
                            TransientKind::Timeout,
                            format!("{operation} exceeded {}s", deadline.as_secs()),
                        )),
                    }
                }
            })
            .await;

        result.map_err(|err| match err {
            RetryError::NonRetryable { source } => source,
            RetryError::AttemptsExhausted { attempts, source } => {
                warn!(operation, attempts, error = %source, "remote call retries exhausted");
                ProviderError::RetriesExhausted { attempts, last_error: source.to_string() }
            }
            RetryError::TimeoutExceeded { attempts, source, elapsed } => {
                warn!(operation, attempts, ?elapsed, "remote call retry budget exceeded");
                ProviderError::RetriesExhausted {
                    attempts,
                    last_error: source.map_or_else(|| "retry budget exceeded".to_string(), |e| e.to_string()),
                }
            }
            RetryError::InvalidConfiguration { message } => ProviderError::Rejected { status: 0, message },
        })
    }
}
