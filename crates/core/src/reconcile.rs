//! Delta reconciliation
//!
//! Decides how one remote change lands in the mirror. Pure: no I/O, no clock.
//!
//! Rules:
//! - the remote event id is the only match key
//! - a cancelled delta produces a tombstone; fields the delta omits are kept
//!   from the current row
//! - any other delta overwrites every field
//! - a delta whose remote `updated` is strictly older than the current row is
//!   stale and dropped, which protects optimistic local writes
//! - a delta that would leave the row content unchanged is dropped, which
//!   suppresses echoes of our own writes and makes replays no-ops

use calmirror_domain::{EventStatus, MirrorEvent, RemoteEvent};
use chrono::{DateTime, Utc};

/// What to do with one delta
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    Insert(MirrorEvent),
    Update(MirrorEvent),
    Unchanged,
    Stale,
}

impl Reconciliation {
    /// Row to persist, if any
    pub fn row(&self) -> Option<&MirrorEvent> {
        match self {
            Self::Insert(row) | Self::Update(row) => Some(row),
            Self::Unchanged | Self::Stale => None,
        }
    }

    pub fn into_row(self) -> Option<MirrorEvent> {
        match self {
            Self::Insert(row) | Self::Update(row) => Some(row),
            Self::Unchanged | Self::Stale => None,
        }
    }
}

/// Reconcile `delta` against the `current` mirror row
///
/// `observed_at` stands in for the remote modification time when the
/// provider omits it.
pub fn reconcile(
    current: Option<&MirrorEvent>,
    delta: &RemoteEvent,
    target_id: &str,
    observed_at: DateTime<Utc>,
) -> Reconciliation {
    if let (Some(current), Some(remote_updated)) = (current, delta.updated) {
        if remote_updated < current.updated_at {
            return Reconciliation::Stale;
        }
    }

    let updated_at = delta.updated.unwrap_or(observed_at);
    let row = match (delta.status, current) {
        (EventStatus::Cancelled, Some(current)) => tombstone_over(current, delta, target_id, updated_at),
        _ => overwrite(delta, target_id, updated_at),
    };

    match current {
        None => Reconciliation::Insert(row),
        Some(current) if same_content(current, &row) => Reconciliation::Unchanged,
        Some(_) => Reconciliation::Update(row),
    }
}

fn overwrite(delta: &RemoteEvent, target_id: &str, updated_at: DateTime<Utc>) -> MirrorEvent {
    MirrorEvent {
        remote_event_id: delta.id.clone(),
        target_id: target_id.to_string(),
        summary: delta.summary.clone(),
        description: delta.description.clone(),
        start_time: delta.start,
        end_time: delta.end,
        conference_link: delta.conference_link.clone(),
        view_link: delta.view_link.clone(),
        status: delta.status,
        organizer: delta.organizer.clone(),
        participants: delta.participants.clone().unwrap_or_default(),
        updated_at,
    }
}

fn tombstone_over(
    current: &MirrorEvent,
    delta: &RemoteEvent,
    target_id: &str,
    updated_at: DateTime<Utc>,
) -> MirrorEvent {
    MirrorEvent {
        remote_event_id: current.remote_event_id.clone(),
        target_id: target_id.to_string(),
        summary: delta.summary.clone().or_else(|| current.summary.clone()),
        description: delta.description.clone().or_else(|| current.description.clone()),
        start_time: delta.start.or(current.start_time),
        end_time: delta.end.or(current.end_time),
        conference_link: delta.conference_link.clone().or_else(|| current.conference_link.clone()),
        view_link: delta.view_link.clone().or_else(|| current.view_link.clone()),
        status: EventStatus::Cancelled,
        organizer: delta.organizer.clone().or_else(|| current.organizer.clone()),
        participants: delta.participants.clone().unwrap_or_else(|| current.participants.clone()),
        updated_at,
    }
}

/// Equality ignoring `updated_at`
fn same_content(a: &MirrorEvent, b: &MirrorEvent) -> bool {
    a.remote_event_id == b.remote_event_id
        && a.target_id == b.target_id
        && a.summary == b.summary
        && a.description == b.description
        && a.start_time == b.start_time
        && a.end_time == b.end_time
        && a.conference_link == b.conference_link
        && a.view_link == b.view_link
        && a.status == b.status
        && a.organizer == b.organizer
        && a.participants == b.participants
}
