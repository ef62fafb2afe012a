//! Outcome summaries returned by the sync and renewal jobs

use serde::{Deserialize, Serialize};

/// Result of one delta-fetch run for a channel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub channel_id: String,
    /// Pages committed, across a resync if one happened
    pub pages: u32,
    /// Rows inserted or updated
    pub events_applied: u32,
    /// Deltas that were unchanged or stale
    pub events_skipped: u32,
    /// The stored token was rejected and a new baseline was taken
    pub full_resync: bool,
    pub sync_token_advanced: bool,
}

impl SyncReport {
    pub fn new(channel_id: impl Into<String>) -> Self {
        Self { channel_id: channel_id.into(), ..Self::default() }
    }
}

/// Result of one renewal tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewalReport {
    /// Live channels inside the renewal window
    pub examined: u32,
    pub renewed: u32,
    pub failed: u32,
}
