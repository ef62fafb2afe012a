//! Health snapshot served on `/health`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Ok,
    /// Provider credentials rejected; syncs cannot make progress
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelHealth {
    pub channel_id: String,
    pub target_id: String,
    pub expiration: DateTime<Utc>,
    /// Live but past expiration: renewal is not keeping up
    pub expired: bool,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    pub degraded_reason: Option<String>,
    pub channels: Vec<ChannelHealth>,
    pub generated_at: DateTime<Utc>,
}
