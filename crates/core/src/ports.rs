//! Port interfaces
//!
//! Storage and remote-calendar boundaries. Infrastructure adapters implement
//! these; core services only ever see the traits.

use std::collections::HashMap;

use async_trait::async_trait;
use calmirror_domain::{
    ChangeQuery, ChannelState, DeltaPage, MirrorEvent, PageCheckpoint, ProviderError, RemoteEvent,
    Result, SyncChannel, WatchRequest, WatchResponse,
};
use chrono::{DateTime, Utc};

/// Persistent channel state
#[async_trait]
pub trait ChannelRepository: Send + Sync {
    /// Insert a new row; fails with `ChannelConflict` if it would create a
    /// second live channel for the target
    async fn insert_channel(&self, channel: &SyncChannel) -> Result<()>;

    async fn find_channel(&self, channel_id: &str) -> Result<Option<SyncChannel>>;

    /// The `Active`/`Renewing` channel for a target, if any
    async fn find_live_for_target(&self, target_id: &str) -> Result<Option<SyncChannel>>;

    /// Promote a `Registering` row to `Active` with the provider's answer
    async fn activate(
        &self,
        channel_id: &str,
        watch: &WatchResponse,
        now: DateTime<Utc>,
    ) -> Result<SyncChannel>;

    async fn set_state(&self, channel_id: &str, state: ChannelState, now: DateTime<Utc>)
        -> Result<()>;

    /// Move `channel_id` from `from` to `to` only if it is still in `from`
    ///
    /// Returns `false` when the row was in another state and nothing changed.
    async fn transition(
        &self,
        channel_id: &str,
        from: ChannelState,
        to: ChannelState,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Replace the stored sync token outside of a page commit
    async fn update_sync_token(
        &self,
        channel_id: &str,
        sync_token: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Clear sync token and page cursor ahead of a full resync
    async fn reset_sync_state(&self, channel_id: &str, now: DateTime<Utc>) -> Result<()>;

    /// In one transaction: deactivate `old_channel_id`, copy its current
    /// cursors onto `replacement_id` and promote the replacement to `Active`
    ///
    /// Fails with `ChannelSuperseded` if the old channel is no longer live.
    async fn swap_live(
        &self,
        old_channel_id: &str,
        replacement_id: &str,
        watch: &WatchResponse,
        now: DateTime<Utc>,
    ) -> Result<SyncChannel>;

    /// Live channels expiring at or before `deadline`
    ///
    /// Includes `Renewing` rows so a renewal interrupted by a crash is retried.
    async fn list_due_for_renewal(&self, deadline: DateTime<Utc>) -> Result<Vec<SyncChannel>>;

    async fn list_live(&self) -> Result<Vec<SyncChannel>>;
}

/// The local event mirror
#[async_trait]
pub trait MirrorStore: Send + Sync {
    /// Current rows for the given ids; missing ids are absent from the map
    async fn find_events(&self, remote_event_ids: &[String]) -> Result<HashMap<String, MirrorEvent>>;

    async fn get_event(&self, remote_event_id: &str) -> Result<Option<MirrorEvent>>;

    /// Upsert `rows` and apply `checkpoint` to the channel in one transaction
    ///
    /// Fails with `ChannelSuperseded`, writing nothing, once the channel is no
    /// longer live.
    async fn commit_page(
        &self,
        channel_id: &str,
        rows: &[MirrorEvent],
        checkpoint: &PageCheckpoint,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Upsert rows outside of a page commit (single-event refresh, local writes)
    async fn save_events(&self, rows: &[MirrorEvent]) -> Result<()>;

    /// All rows of a calendar, tombstones included
    async fn list_events(&self, target_id: &str) -> Result<Vec<MirrorEvent>>;
}

/// The remote calendar service
///
/// Errors stay as [`ProviderError`] so callers can tell transient failures
/// from token invalidation and auth problems.
#[async_trait]
pub trait CalendarRemote: Send + Sync {
    async fn list_changes(
        &self,
        target_id: &str,
        query: &ChangeQuery,
    ) -> std::result::Result<DeltaPage, ProviderError>;

    async fn watch(&self, request: &WatchRequest) -> std::result::Result<WatchResponse, ProviderError>;

    async fn stop(&self, channel_id: &str, resource_id: &str) -> std::result::Result<(), ProviderError>;

    async fn get_event(
        &self,
        target_id: &str,
        event_id: &str,
    ) -> std::result::Result<RemoteEvent, ProviderError>;
}

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
