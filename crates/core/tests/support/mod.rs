//! Shared test helpers for `calmirror-core` integration tests.
//!
//! In-memory ports plus a scripted remote calendar, so sync, registration,
//! dispatch and renewal can be exercised without SQLite or HTTP.

#![allow(dead_code)]

pub mod clock;
pub mod remote;
pub mod repositories;

use std::sync::Arc;
use std::time::Duration;

use calmirror_common::{RetryConfig, SecretString};
use calmirror_core::{ChannelRegistry, RegistrationSettings, RemoteCaller};
use calmirror_domain::{ChannelState, EventStatus, MirrorEvent, RemoteEvent, SyncChannel};
use chrono::{DateTime, TimeZone, Utc};

pub use clock::FixedClock;
pub use remote::ScriptedRemote;
pub use repositories::InMemoryStore;

pub const SECRET: &str = "test-channel-secret";

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).single().expect("valid timestamp")
}

/// Caller with tiny fixed backoff so retry paths finish quickly
pub fn caller(max_attempts: u32) -> RemoteCaller {
    let retry = RetryConfig::builder()
        .max_attempts(max_attempts)
        .fixed_backoff(Duration::from_millis(1))
        .no_jitter()
        .unlimited_time()
        .build()
        .expect("valid retry config");
    RemoteCaller::new(retry, Duration::from_secs(5))
}

pub fn settings() -> RegistrationSettings {
    RegistrationSettings {
        callback_url: "https://crm.example.com/webhooks/calendar".to_string(),
        token: SecretString::new(SECRET),
        ttl: Duration::from_secs(7 * 24 * 3600),
    }
}

pub fn registry(store: &Arc<InMemoryStore>, remote: &Arc<ScriptedRemote>, clock: &Arc<FixedClock>) -> Arc<ChannelRegistry> {
    Arc::new(ChannelRegistry::new(store.clone(), remote.clone(), caller(3), clock.clone(), settings()))
}

/// Seed an `Active` channel directly into the store
pub fn active_channel(store: &InMemoryStore, target_id: &str, sync_token: Option<&str>, expiration: DateTime<Utc>) -> SyncChannel {
    let mut channel = SyncChannel::registering(target_id, expiration, t0());
    channel.state = ChannelState::Active;
    channel.resource_id = Some(format!("res-{target_id}"));
    channel.sync_token = sync_token.map(str::to_string);
    store.put_channel(channel.clone());
    channel
}

pub fn confirmed(id: &str, summary: &str, updated: DateTime<Utc>) -> RemoteEvent {
    RemoteEvent {
        id: id.to_string(),
        status: EventStatus::Confirmed,
        summary: Some(summary.to_string()),
        description: None,
        start: Some(updated + chrono::Duration::days(1)),
        end: Some(updated + chrono::Duration::days(1) + chrono::Duration::hours(1)),
        conference_link: None,
        view_link: Some(format!("https://calendar.example.com/event?eid={id}")),
        organizer: Some("owner@example.com".to_string()),
        participants: Some(Vec::new()),
        updated: Some(updated),
    }
}

pub fn cancelled(id: &str, updated: DateTime<Utc>) -> RemoteEvent {
    RemoteEvent { updated: Some(updated), ..RemoteEvent::tombstone(id) }
}

pub fn mirror_row(id: &str, target_id: &str, summary: &str, updated_at: DateTime<Utc>) -> MirrorEvent {
    MirrorEvent {
        remote_event_id: id.to_string(),
        target_id: target_id.to_string(),
        summary: Some(summary.to_string()),
        description: None,
        start_time: Some(updated_at + chrono::Duration::days(1)),
        end_time: Some(updated_at + chrono::Duration::days(1) + chrono::Duration::hours(1)),
        conference_link: None,
        view_link: None,
        status: EventStatus::Confirmed,
        organizer: Some("owner@example.com".to_string()),
        participants: Vec::new(),
        updated_at,
    }
}
