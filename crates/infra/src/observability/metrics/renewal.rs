//! Renewal job metrics

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use calmirror_domain::RenewalReport;
use serde::Serialize;

use crate::observability::MetricsResult;

#[derive(Debug, Default)]
pub struct RenewalMetrics {
    runs: AtomicU64,
    failed_runs: AtomicU64,
    timeouts: AtomicU64,
    channels_renewed: AtomicU64,
    channels_failed: AtomicU64,
    last_run_micros: AtomicU64,
}

/// Point-in-time copy of [`RenewalMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RenewalMetricsSnapshot {
    pub runs: u64,
    pub failed_runs: u64,
    pub timeouts: u64,
    pub channels_renewed: u64,
    pub channels_failed: u64,
    pub last_run_ms: u64,
}

impl RenewalMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> RenewalMetricsSnapshot {
        RenewalMetricsSnapshot {
            runs: self.runs(),
            failed_runs: self.failed_runs(),
            timeouts: self.timeouts(),
            channels_renewed: self.channels_renewed(),
            channels_failed: self.channels_failed(),
            last_run_ms: self.last_run_ms(),
        }
    }

    pub fn record_run(&self, report: &RenewalReport, elapsed: Duration) -> MetricsResult<()> {
        self.runs.fetch_add(1, Ordering::Relaxed);
        self.channels_renewed.fetch_add(u64::from(report.renewed), Ordering::Relaxed);
        self.channels_failed.fetch_add(u64::from(report.failed), Ordering::Relaxed);
        self.last_run_micros
            .store(u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX), Ordering::Relaxed);
        Ok(())
    }

    /// A run that errored out before producing a report
    pub fn record_failed_run(&self) -> MetricsResult<()> {
        self.runs.fetch_add(1, Ordering::Relaxed);
        self.failed_runs.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn record_timeout(&self) -> MetricsResult<()> {
        self.runs.fetch_add(1, Ordering::Relaxed);
        self.timeouts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    pub fn failed_runs(&self) -> u64 {
        self.failed_runs.load(Ordering::Relaxed)
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    pub fn channels_renewed(&self) -> u64 {
        self.channels_renewed.load(Ordering::Relaxed)
    }

    pub fn channels_failed(&self) -> u64 {
        self.channels_failed.load(Ordering::Relaxed)
    }

    pub fn last_run_ms(&self) -> u64 {
        self.last_run_micros.load(Ordering::Relaxed) / 1_000
    }
}
