//! Push notification channels

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::CALENDAR_CHANNEL_PREFIX;
use crate::errors::CalMirrorError;

/// Lifecycle of a push channel
///
/// `Registering → Active → Renewing → Active (replacement) | Deactivated`,
/// and `Active → Deactivated` on a "removed" notification or explicit stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    /// Row persisted, provider registration in flight
    Registering,
    Active,
    /// A replacement is being registered; still receives notifications
    Renewing,
    Deactivated,
}

impl ChannelState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Registering => "registering",
            Self::Active => "active",
            Self::Renewing => "renewing",
            Self::Deactivated => "deactivated",
        }
    }

    /// Live channels receive notifications and may sync
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Active | Self::Renewing)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelState {
    type Err = CalMirrorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registering" => Ok(Self::Registering),
            "active" => Ok(Self::Active),
            "renewing" => Ok(Self::Renewing),
            "deactivated" => Ok(Self::Deactivated),
            other => Err(CalMirrorError::InvalidInput(format!("unknown channel state: {other}"))),
        }
    }
}

/// A registered change-notification channel and its sync cursors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncChannel {
    pub channel_id: String,
    /// Provider-assigned; unknown until registration completes
    pub resource_id: Option<String>,
    pub target_id: String,
    /// Cursor for the next incremental fetch; `None` means no baseline yet
    pub sync_token: Option<String>,
    /// Continuation cursor of a multi-page fetch in progress
    pub page_token: Option<String>,
    pub expiration: DateTime<Utc>,
    pub state: ChannelState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SyncChannel {
    /// New `Registering` row for `target_id` with a fresh channel id
    pub fn registering(target_id: impl Into<String>, expiration: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            channel_id: Self::generate_id(),
            resource_id: None,
            target_id: target_id.into(),
            sync_token: None,
            page_token: None,
            expiration,
            state: ChannelState::Registering,
            created_at: now,
            updated_at: now,
        }
    }

    /// `calendar-<uuid v4>`
    pub fn generate_id() -> String {
        format!("{CALENDAR_CHANNEL_PREFIX}{}", Uuid::new_v4())
    }

    pub fn is_live(&self) -> bool {
        self.state.is_live()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration <= now
    }

    /// Whether the channel expires before `now + window`
    pub fn expires_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.expiration <= now + window
    }
}
