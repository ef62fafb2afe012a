//! Calendar API call metrics
//!
//! ## Design
//! - **SeqCst ordering** for the pair used in the average (total time, count)
//! - **Relaxed** for independent counters
//! - **Microsecond storage**; reporting helpers convert to ms

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use calmirror_domain::{ProviderError, TransientKind};
use serde::Serialize;

use crate::observability::{MetricsError, MetricsResult};

#[derive(Debug, Default)]
pub struct ProviderMetrics {
    total_call_time_micros: AtomicU64,
    last_call_time_micros: AtomicU64,
    calls: AtomicU64,
    errors: AtomicU64,
    timeouts: AtomicU64,
    rate_limited: AtomicU64,
    token_invalidations: AtomicU64,
}

/// Point-in-time copy of [`ProviderMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProviderMetricsSnapshot {
    pub calls: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub rate_limited: u64,
    pub token_invalidations: u64,
    pub last_call_ms: u64,
}

impl ProviderMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finished call, successful or not
    pub fn record_call(&self, elapsed: Duration) -> MetricsResult<()> {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.total_call_time_micros.fetch_add(micros, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_call_time_micros.store(micros, Ordering::Relaxed);
        Ok(())
    }

    /// Classify and count a failed call
    pub fn record_error(&self, error: &ProviderError) -> MetricsResult<()> {
        self.errors.fetch_add(1, Ordering::Relaxed);
        match error {
            ProviderError::Transient { kind: TransientKind::Timeout, .. } => {
                self.timeouts.fetch_add(1, Ordering::Relaxed);
            }
            ProviderError::Transient { kind: TransientKind::RateLimited { .. }, .. } => {
                self.rate_limited.fetch_add(1, Ordering::Relaxed);
            }
            ProviderError::InvalidSyncToken => {
                self.token_invalidations.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
        Ok(())
    }

    /// Average call time in milliseconds
    ///
    /// # Errors
    /// `EmptyData` before the first call is recorded.
    pub fn avg_call_time_ms(&self) -> MetricsResult<f64> {
        let total = self.total_call_time_micros.load(Ordering::SeqCst);
        let count = self.calls.load(Ordering::SeqCst);
        if count == 0 {
            return Err(MetricsError::EmptyData { metric: "average call time" });
        }
        #[allow(clippy::cast_precision_loss)]
        Ok((total as f64 / count as f64) / 1_000.0)
    }

    pub fn snapshot(&self) -> ProviderMetricsSnapshot {
        ProviderMetricsSnapshot {
            calls: self.calls.load(Ordering::SeqCst),
            errors: self.errors.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            token_invalidations: self.token_invalidations.load(Ordering::Relaxed),
            last_call_ms: self.last_call_time_micros.load(Ordering::Relaxed) / 1_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_requires_data() {
        let metrics = ProviderMetrics::new();
        assert!(matches!(metrics.avg_call_time_ms(), Err(MetricsError::EmptyData { .. })));

        metrics.record_call(Duration::from_millis(10)).expect("record");
        metrics.record_call(Duration::from_millis(30)).expect("record");
        let avg = metrics.avg_call_time_ms().expect("average");
        assert!((avg - 20.0).abs() < f64::EPSILON);
        assert_eq!(metrics.snapshot().last_call_ms, 30);
    }

    #[test]
    fn errors_are_classified() {
        let metrics = ProviderMetrics::new();
        metrics
            .record_error(&ProviderError::transient(TransientKind::Timeout, "slow"))
            .expect("record");
        metrics
            .record_error(&ProviderError::transient(
                TransientKind::RateLimited { retry_after_secs: None },
                "quota",
            ))
            .expect("record");
        metrics.record_error(&ProviderError::InvalidSyncToken).expect("record");
        metrics.record_error(&ProviderError::AuthFailure { message: "revoked".into() }).expect("record");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.errors, 4);
        assert_eq!(snapshot.timeouts, 1);
        assert_eq!(snapshot.rate_limited, 1);
        assert_eq!(snapshot.token_invalidations, 1);
    }
}
