#![allow(dead_code)]

use std::sync::Arc;

use calmirror_domain::{ChannelState, EventStatus, MirrorEvent, Participant, ResponseState, SyncChannel};
use calmirror_infra::database::DbManager;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;

/// Temporary database wrapper that keeps the underlying file alive for the
/// duration of a test run.
pub struct TestDatabase {
    pub manager: Arc<DbManager>,
    _temp_dir: TempDir,
}

impl TestDatabase {
    /// Create a new temporary database with the schema applied.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir should be created");
        let db_path = temp_dir.path().join("test.db");

        let manager = DbManager::new(&db_path, 4).expect("db manager should be created");
        manager.run_migrations().expect("schema should apply");

        Self { manager: Arc::new(manager), _temp_dir: temp_dir }
    }

    /// Execute a batch of SQL statements against the database.
    pub fn execute_batch(&self, sql: &str) {
        let conn = self
            .manager
            .get_connection()
            .expect("connection should be available for execute_batch");
        conn.execute_batch(sql).expect("SQL batch execution should succeed");
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).single().expect("valid timestamp")
}

pub fn channel(target_id: &str, state: ChannelState, expiration: DateTime<Utc>) -> SyncChannel {
    let mut channel = SyncChannel::registering(target_id, expiration, t0());
    channel.state = state;
    if state != ChannelState::Registering {
        channel.resource_id = Some(format!("res-{target_id}"));
    }
    channel
}

pub fn event(id: &str, target_id: &str, summary: &str, updated_at: DateTime<Utc>) -> MirrorEvent {
    MirrorEvent {
        remote_event_id: id.to_string(),
        target_id: target_id.to_string(),
        summary: Some(summary.to_string()),
        description: None,
        start_time: Some(updated_at + Duration::days(1)),
        end_time: Some(updated_at + Duration::days(1) + Duration::hours(1)),
        conference_link: Some("https://meet.google.com/abc-defg-hij".to_string()),
        view_link: None,
        status: EventStatus::Confirmed,
        organizer: Some("owner@example.com".to_string()),
        participants: vec![
            Participant::new("owner@example.com", ResponseState::Accepted),
            Participant::new("guest@example.com", ResponseState::NeedsAction),
        ],
        updated_at,
    }
}
