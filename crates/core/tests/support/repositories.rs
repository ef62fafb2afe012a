//! In-memory channel repository and mirror store
//!
//! One struct implements both ports because `commit_page` writes event rows
//! and the channel cursor together, exactly like the SQLite adapter. Enforces
//! the one-live-channel-per-target rule the database index enforces.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use calmirror_core::{ChannelRepository, MirrorStore};
use calmirror_domain::{
    CalMirrorError, ChannelState, MirrorEvent, PageCheckpoint, Result as DomainResult, SyncChannel,
    WatchResponse,
};
use chrono::{DateTime, Utc};

#[derive(Default)]
struct State {
    channels: HashMap<String, SyncChannel>,
    events: HashMap<String, MirrorEvent>,
    /// Number of page commits to allow before failing every later one
    commits_before_failure: Option<u32>,
    commits: u32,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_channel(&self, channel: SyncChannel) {
        self.state.lock().unwrap().channels.insert(channel.channel_id.clone(), channel);
    }

    pub fn put_event(&self, event: MirrorEvent) {
        self.state.lock().unwrap().events.insert(event.remote_event_id.clone(), event);
    }

    pub fn channel(&self, channel_id: &str) -> SyncChannel {
        self.state.lock().unwrap().channels.get(channel_id).cloned().expect("channel present")
    }

    pub fn channels_for(&self, target_id: &str) -> Vec<SyncChannel> {
        let mut rows: Vec<_> = self
            .state
            .lock()
            .unwrap()
            .channels
            .values()
            .filter(|c| c.target_id == target_id)
            .cloned()
            .collect();
        rows.sort_by_key(|c| c.created_at);
        rows
    }

    pub fn event(&self, remote_event_id: &str) -> Option<MirrorEvent> {
        self.state.lock().unwrap().events.get(remote_event_id).cloned()
    }

    pub fn event_count(&self) -> usize {
        self.state.lock().unwrap().events.len()
    }

    /// Simulate a crash after `commits` successful page commits
    pub fn fail_commits_after(&self, commits: u32) {
        let mut state = self.state.lock().unwrap();
        state.commits = 0;
        state.commits_before_failure = Some(commits);
    }

    pub fn heal(&self) {
        self.state.lock().unwrap().commits_before_failure = None;
    }
}

fn live_conflict(state: &State, target_id: &str, except: &str) -> bool {
    state
        .channels
        .values()
        .any(|c| c.target_id == target_id && c.channel_id != except && c.is_live())
}

fn missing(channel_id: &str) -> CalMirrorError {
    CalMirrorError::NotFound(format!("channel {channel_id}"))
}

#[async_trait]
impl ChannelRepository for InMemoryStore {
    async fn insert_channel(&self, channel: &SyncChannel) -> DomainResult<()> {
        let mut state = self.state.lock().unwrap();
        if channel.is_live() && live_conflict(&state, &channel.target_id, &channel.channel_id) {
            return Err(CalMirrorError::ChannelConflict { target_id: channel.target_id.clone() });
        }
        state.channels.insert(channel.channel_id.clone(), channel.clone());
        Ok(())
    }

    async fn find_channel(&self, channel_id: &str) -> DomainResult<Option<SyncChannel>> {
        Ok(self.state.lock().unwrap().channels.get(channel_id).cloned())
    }

    async fn find_live_for_target(&self, target_id: &str) -> DomainResult<Option<SyncChannel>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .channels
            .values()
            .find(|c| c.target_id == target_id && c.is_live())
            .cloned())
    }

    async fn activate(&self, channel_id: &str, watch: &WatchResponse, now: DateTime<Utc>) -> DomainResult<SyncChannel> {
        let mut state = self.state.lock().unwrap();
        let target_id = state.channels.get(channel_id).ok_or_else(|| missing(channel_id))?.target_id.clone();
        if live_conflict(&state, &target_id, channel_id) {
            return Err(CalMirrorError::ChannelConflict { target_id });
        }
        let channel = state.channels.get_mut(channel_id).ok_or_else(|| missing(channel_id))?;
        channel.state = ChannelState::Active;
        channel.resource_id = Some(watch.resource_id.clone());
        channel.expiration = watch.expiration;
        channel.updated_at = now;
        Ok(channel.clone())
    }

    async fn set_state(&self, channel_id: &str, new_state: ChannelState, now: DateTime<Utc>) -> DomainResult<()> {
        let mut state = self.state.lock().unwrap();
        let channel = state.channels.get_mut(channel_id).ok_or_else(|| missing(channel_id))?;
        channel.state = new_state;
        channel.updated_at = now;
        Ok(())
    }

    async fn transition(
        &self,
        channel_id: &str,
        from: ChannelState,
        to: ChannelState,
        now: DateTime<Utc>,
    ) -> DomainResult<bool> {
        let mut state = self.state.lock().unwrap();
        let channel = state.channels.get_mut(channel_id).ok_or_else(|| missing(channel_id))?;
        if channel.state != from {
            return Ok(false);
        }
        channel.state = to;
        channel.updated_at = now;
        Ok(true)
    }

    async fn update_sync_token(&self, channel_id: &str, sync_token: Option<&str>, now: DateTime<Utc>) -> DomainResult<()> {
        let mut state = self.state.lock().unwrap();
        let channel = state.channels.get_mut(channel_id).ok_or_else(|| missing(channel_id))?;
        channel.sync_token = sync_token.map(str::to_string);
        channel.updated_at = now;
        Ok(())
    }

    async fn reset_sync_state(&self, channel_id: &str, now: DateTime<Utc>) -> DomainResult<()> {
        let mut state = self.state.lock().unwrap();
        let channel = state.channels.get_mut(channel_id).ok_or_else(|| missing(channel_id))?;
        channel.sync_token = None;
        channel.page_token = None;
        channel.updated_at = now;
        Ok(())
    }

    async fn swap_live(
        &self,
        old_channel_id: &str,
        replacement_id: &str,
        watch: &WatchResponse,
        now: DateTime<Utc>,
    ) -> DomainResult<SyncChannel> {
        let mut state = self.state.lock().unwrap();
        let old = state.channels.get(old_channel_id).cloned().ok_or_else(|| missing(old_channel_id))?;
        if !state.channels.contains_key(replacement_id) {
            return Err(missing(replacement_id));
        }
        if !old.is_live() {
            return Err(CalMirrorError::ChannelSuperseded { channel_id: old_channel_id.to_string() });
        }
        if let Some(row) = state.channels.get_mut(old_channel_id) {
            row.state = ChannelState::Deactivated;
            row.updated_at = now;
        }
        let replacement = state.channels.get_mut(replacement_id).ok_or_else(|| missing(replacement_id))?;
        replacement.state = ChannelState::Active;
        replacement.resource_id = Some(watch.resource_id.clone());
        replacement.expiration = watch.expiration;
        replacement.sync_token = old.sync_token;
        replacement.page_token = old.page_token;
        replacement.updated_at = now;
        Ok(replacement.clone())
    }

    async fn list_due_for_renewal(&self, deadline: DateTime<Utc>) -> DomainResult<Vec<SyncChannel>> {
        let mut due: Vec<_> = self
            .state
            .lock()
            .unwrap()
            .channels
            .values()
            .filter(|c| c.is_live() && c.expiration <= deadline)
            .cloned()
            .collect();
        due.sort_by_key(|c| c.expiration);
        Ok(due)
    }

    async fn list_live(&self) -> DomainResult<Vec<SyncChannel>> {
        Ok(self.state.lock().unwrap().channels.values().filter(|c| c.is_live()).cloned().collect())
    }
}

#[async_trait]
impl MirrorStore for InMemoryStore {
    async fn find_events(&self, remote_event_ids: &[String]) -> DomainResult<HashMap<String, MirrorEvent>> {
        let state = self.state.lock().unwrap();
        Ok(remote_event_ids
            .iter()
            .filter_map(|id| state.events.get(id).map(|row| (id.clone(), row.clone())))
            .collect())
    }

    async fn get_event(&self, remote_event_id: &str) -> DomainResult<Option<MirrorEvent>> {
        Ok(self.state.lock().unwrap().events.get(remote_event_id).cloned())
    }

    async fn commit_page(
        &self,
        channel_id: &str,
        rows: &[MirrorEvent],
        checkpoint: &PageCheckpoint,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(limit) = state.commits_before_failure {
            if state.commits >= limit {
                return Err(CalMirrorError::Database("simulated crash before commit".into()));
            }
        }
        state.commits += 1;

        let channel = state.channels.get_mut(channel_id).ok_or_else(|| missing(channel_id))?;
        if !channel.is_live() {
            return Err(CalMirrorError::ChannelSuperseded { channel_id: channel_id.to_string() });
        }
        match checkpoint {
            PageCheckpoint::Continue { page_token } => channel.page_token = Some(page_token.clone()),
            PageCheckpoint::Complete { sync_token } => {
                channel.page_token = None;
                if let Some(token) = sync_token {
                    channel.sync_token = Some(token.clone());
                }
            }
        }
        channel.updated_at = now;
        for row in rows {
            state.events.insert(row.remote_event_id.clone(), row.clone());
        }
        Ok(())
    }

    async fn save_events(&self, rows: &[MirrorEvent]) -> DomainResult<()> {
        let mut state = self.state.lock().unwrap();
        for row in rows {
            state.events.insert(row.remote_event_id.clone(), row.clone());
        }
        Ok(())
    }

    async fn list_events(&self, target_id: &str) -> DomainResult<Vec<MirrorEvent>> {
        let mut rows: Vec<_> = self
            .state
            .lock()
            .unwrap()
            .events
            .values()
            .filter(|e| e.target_id == target_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.remote_event_id.cmp(&b.remote_event_id));
        Ok(rows)
    }
}
