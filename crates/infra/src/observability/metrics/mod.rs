//! Metrics collection modules
//!
//! Thread-safe metrics for the provider client and the renewal job, grouped
//! under [`SyncMetrics`] so one `Arc` can be shared by both.

pub mod provider;
pub mod renewal;

pub use provider::{ProviderMetrics, ProviderMetricsSnapshot};
pub use renewal::{RenewalMetrics, RenewalMetricsSnapshot};
use serde::Serialize;

#[derive(Debug, Default)]
pub struct SyncMetrics {
    pub provider: ProviderMetrics,
    pub renewal: RenewalMetrics,
}

/// Both metric groups as served on `/health`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncMetricsSnapshot {
    pub provider: ProviderMetricsSnapshot,
    pub renewal: RenewalMetricsSnapshot,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SyncMetricsSnapshot {
        SyncMetricsSnapshot { provider: self.provider.snapshot(), renewal: self.renewal.snapshot() }
    }
}
