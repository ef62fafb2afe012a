//! Mirrored calendar events

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::CalMirrorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Confirmed,
    Tentative,
    /// Tombstone; mirror rows are never physically deleted
    Cancelled,
}

impl EventStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Tentative => "tentative",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = CalMirrorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(Self::Confirmed),
            "tentative" => Ok(Self::Tentative),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(CalMirrorError::InvalidInput(format!("unknown event status: {other}"))),
        }
    }
}

/// Attendee response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseState {
    NeedsAction,
    Declined,
    Tentative,
    Accepted,
}

impl ResponseState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NeedsAction => "needs_action",
            Self::Declined => "declined",
            Self::Tentative => "tentative",
            Self::Accepted => "accepted",
        }
    }
}

impl FromStr for ResponseState {
    type Err = CalMirrorError;

    /// Accepts both the storage form and Google's camelCase `needsAction`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "needs_action" | "needsAction" => Ok(Self::NeedsAction),
            "declined" => Ok(Self::Declined),
            "tentative" => Ok(Self::Tentative),
            "accepted" => Ok(Self::Accepted),
            other => Err(CalMirrorError::InvalidInput(format!("unknown response state: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub address: String,
    pub response_state: ResponseState,
}

impl Participant {
    pub fn new(address: impl Into<String>, response_state: ResponseState) -> Self {
        Self { address: address.into(), response_state }
    }
}

/// Local replica of a remote calendar event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorEvent {
    /// Natural key; the only conflict key for upserts
    pub remote_event_id: String,
    pub target_id: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub conference_link: Option<String>,
    pub view_link: Option<String>,
    pub status: EventStatus,
    pub organizer: Option<String>,
    pub participants: Vec<Participant>,
    /// Remote modification time, or the observation instant if the provider
    /// omitted it
    pub updated_at: DateTime<Utc>,
}

impl MirrorEvent {
    pub fn is_cancelled(&self) -> bool {
        self.status == EventStatus::Cancelled
    }
}
