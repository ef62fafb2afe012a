//! Provider-neutral change feed types
//!
//! `RemoteEvent` is what the remote calendar reports for one event; fields the
//! provider omitted stay `None` so the reconciler can tell "cleared" from "not
//! sent" on cancellation tombstones.

use std::time::Duration;

use calmirror_common::SecretString;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::{EventStatus, Participant};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEvent {
    pub id: String,
    pub status: EventStatus,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub conference_link: Option<String>,
    pub view_link: Option<String>,
    pub organizer: Option<String>,
    /// `None` when the provider sent no attendee list
    pub participants: Option<Vec<Participant>>,
    pub updated: Option<DateTime<Utc>>,
}

impl RemoteEvent {
    /// A bare tombstone carrying only the id
    pub fn tombstone(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: EventStatus::Cancelled,
            summary: None,
            description: None,
            start: None,
            end: None,
            conference_link: None,
            view_link: None,
            organizer: None,
            participants: None,
            updated: None,
        }
    }
}

/// One page of the change feed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeltaPage {
    pub items: Vec<RemoteEvent>,
    /// Present on every page except the last
    pub next_page_token: Option<String>,
    /// Present only on the last page
    pub next_sync_token: Option<String>,
}

impl DeltaPage {
    pub fn is_last(&self) -> bool {
        self.next_page_token.is_none()
    }
}

/// Parameters of a change-feed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeQuery {
    /// Incremental mode when set; mutually exclusive with `time_min`
    pub sync_token: Option<String>,
    /// Lower bound for a full sync
    pub time_min: Option<DateTime<Utc>>,
    pub page_token: Option<String>,
    pub page_size: u32,
}

impl ChangeQuery {
    pub fn incremental(sync_token: impl Into<String>, page_size: u32) -> Self {
        Self { sync_token: Some(sync_token.into()), time_min: None, page_token: None, page_size }
    }

    pub fn full(time_min: DateTime<Utc>, page_size: u32) -> Self {
        Self { sync_token: None, time_min: Some(time_min), page_token: None, page_size }
    }

    /// Same base parameters, continuing at `page_token`
    #[must_use]
    pub fn with_page(&self, page_token: Option<String>) -> Self {
        Self { page_token, ..self.clone() }
    }

    pub fn is_full(&self) -> bool {
        self.sync_token.is_none()
    }
}

/// Channel cursor update committed together with a page's rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCheckpoint {
    /// More pages follow; persist the continuation cursor
    Continue { page_token: String },
    /// Final page; clear the cursor and store `sync_token` (a `None` keeps the
    /// stored token unchanged)
    Complete { sync_token: Option<String> },
}

/// Register a push channel with the provider
#[derive(Debug, Clone)]
pub struct WatchRequest {
    pub channel_id: String,
    pub target_id: String,
    pub callback_url: String,
    /// Echoed back in `X-Goog-Channel-Token` on every notification
    pub token: SecretString,
    pub ttl: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchResponse {
    pub resource_id: String,
    pub expiration: DateTime<Utc>,
}
