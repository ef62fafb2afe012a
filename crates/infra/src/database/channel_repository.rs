//! SQLite implementation of the `ChannelRepository` port.
//!
//! The partial unique index on `target_id` for live states is the final
//! guard for the one-live-channel rule; violations surface as
//! `ChannelConflict`.

use std::sync::Arc;

use async_trait::async_trait;
use calmirror_core::ChannelRepository;
use calmirror_domain::{CalMirrorError, ChannelState, Result, SyncChannel, WatchResponse};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use tracing::{debug, instrument};

use super::manager::DbManager;
use super::timestamps::{decode, encode};
use crate::errors::InfraError;

const CHANNEL_COLUMNS: &str = "channel_id, resource_id, target_id, sync_token, page_token, \
                               expiration, state, created_at, updated_at";

pub struct SqliteChannelRepository {
    db: Arc<DbManager>,
}

impl SqliteChannelRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ChannelRepository for SqliteChannelRepository {
    #[instrument(skip(self, channel), fields(channel_id = %channel.channel_id, target_id = %channel.target_id))]
    async fn insert_channel(&self, channel: &SyncChannel) -> Result<()> {
        let channel = channel.clone();
        self.db
            .with_connection(move |conn| {
                insert_row(conn, &channel)?;
                debug!(state = %channel.state, "channel row inserted");
                Ok(())
            })
            .await
    }

    async fn find_channel(&self, channel_id: &str) -> Result<Option<SyncChannel>> {
        let channel_id = channel_id.to_string();
        self.db.with_connection(move |conn| find_by_id(conn, &channel_id)).await
    }

    async fn find_live_for_target(&self, target_id: &str) -> Result<Option<SyncChannel>> {
        let target_id = target_id.to_string();
        self.db
            .with_connection(move |conn| {
                let sql = format!(
                    "SELECT {CHANNEL_COLUMNS} FROM sync_channels \
                     WHERE target_id = ?1 AND state IN ('active', 'renewing')"
                );
                Ok(query_channels(conn, &sql, params![target_id])?.into_iter().next())
            })
            .await
    }

    #[instrument(skip(self, watch), fields(resource_id = %watch.resource_id))]
    async fn activate(
        &self,
        channel_id: &str,
        watch: &WatchResponse,
        now: DateTime<Utc>,
    ) -> Result<SyncChannel> {
        let channel_id = channel_id.to_string();
        let watch = watch.clone();
        self.db
            .with_connection(move |conn| {
                let current = require(conn, &channel_id)?;
                let changed = execute_sql(
                    conn,
                    "UPDATE sync_channels
                     SET state = 'active', resource_id = ?2, expiration = ?3, updated_at = ?4
                     WHERE channel_id = ?1",
                    params![channel_id, watch.resource_id, encode(watch.expiration), encode(now)],
                )
                .map_err(|err| conflict_or_database(err, &current.target_id))?;
                debug!(changed, "channel activated");
                require(conn, &channel_id)
            })
            .await
    }

    async fn set_state(&self, channel_id: &str, state: ChannelState, now: DateTime<Utc>) -> Result<()> {
        let channel_id = channel_id.to_string();
        self.db
            .with_connection(move |conn| {
                let current = require(conn, &channel_id)?;
                execute_sql(
                    conn,
                    "UPDATE sync_channels SET state = ?2, updated_at = ?3 WHERE channel_id = ?1",
                    params![channel_id, state.as_str(), encode(now)],
                )
                .map_err(|err| conflict_or_database(err, &current.target_id))?;
                Ok(())
            })
            .await
    }

    async fn transition(
        &self,
        channel_id: &str,
        from: ChannelState,
        to: ChannelState,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let channel_id = channel_id.to_string();
        self.db
            .with_connection(move |conn| {
                let current = require(conn, &channel_id)?;
                let changed = execute_sql(
                    conn,
                    "UPDATE sync_channels SET state = ?3, updated_at = ?4
                     WHERE channel_id = ?1 AND state = ?2",
                    params![channel_id, from.as_str(), to.as_str(), encode(now)],
                )
                .map_err(|err| conflict_or_database(err, &current.target_id))?;
                debug!(%from, %to, applied = changed > 0, "channel state transition");
                Ok(changed > 0)
            })
            .await
    }

    async fn update_sync_token(
        &self,
        channel_id: &str,
        sync_token: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let channel_id = channel_id.to_string();
        let sync_token = sync_token.map(str::to_string);
        self.db
            .with_connection(move |conn| {
                update_one(
                    conn,
                    &channel_id,
                    "UPDATE sync_channels SET sync_token = ?2, updated_at = ?3 WHERE channel_id = ?1",
                    params![channel_id, sync_token, encode(now)],
                )
            })
            .await
    }

    async fn reset_sync_state(&self, channel_id: &str, now: DateTime<Utc>) -> Result<()> {
        let channel_id = channel_id.to_string();
        self.db
            .with_connection(move |conn| {
                update_one(
                    conn,
                    &channel_id,
                    "UPDATE sync_channels SET sync_token = NULL, page_token = NULL, updated_at = ?2
                     WHERE channel_id = ?1",
                    params![channel_id, encode(now)],
                )
            })
            .await
    }

    #[instrument(skip(self, watch))]
    async fn swap_live(
        &self,
        old_channel_id: &str,
        replacement_id: &str,
        watch: &WatchResponse,
        now: DateTime<Utc>,
    ) -> Result<SyncChannel> {
        let old_id = old_channel_id.to_string();
        let new_id = replacement_id.to_string();
        let watch = watch.clone();
        self.db
            .with_connection(move |conn| {
                let tx = conn.transaction().map_err(InfraError::from)?;
                let old = require(&tx, &old_id)?;
                require(&tx, &new_id)?;
                let stamp = encode(now);

                let retired = tx
                    .execute(
                        "UPDATE sync_channels SET state = 'deactivated', updated_at = ?2
                         WHERE channel_id = ?1 AND state IN ('active', 'renewing')",
                        params![old_id, stamp],
                    )
                    .map_err(InfraError::from)?;
                if retired == 0 {
                    // Dropping the transaction rolls it back.
                    return Err(CalMirrorError::ChannelSuperseded { channel_id: old_id });
                }
                // Cursors are read inside the transaction so nothing committed
                // by a concurrent page is lost.
                tx.execute(
                    "UPDATE sync_channels
                     SET state = 'active', resource_id = ?2, expiration = ?3, updated_at = ?4,
                         sync_token = (SELECT sync_token FROM sync_channels WHERE channel_id = ?5),
                         page_token = (SELECT page_token FROM sync_channels WHERE channel_id = ?5)
                     WHERE channel_id = ?1",
                    params![new_id, watch.resource_id, encode(watch.expiration), stamp, old_id],
                )
                .map_err(|err| conflict_or_database(err, &old.target_id))?;

                let replacement = require(&tx, &new_id)?;
                tx.commit().map_err(InfraError::from)?;
                debug!(target_id = %replacement.target_id, "live channel swapped");
                Ok(replacement)
            })
            .await
    }

    async fn list_due_for_renewal(&self, deadline: DateTime<Utc>) -> Result<Vec<SyncChannel>> {
        self.db
            .with_connection(move |conn| {
                let sql = format!(
                    "SELECT {CHANNEL_COLUMNS} FROM sync_channels \
                     WHERE state IN ('active', 'renewing') AND expiration <= ?1 \
                     ORDER BY expiration ASC"
                );
                query_channels(conn, &sql, params![encode(deadline)])
            })
            .await
    }

    async fn list_live(&self) -> Result<Vec<SyncChannel>> {
        self.db
            .with_connection(move |conn| {
                let sql = format!(
                    "SELECT {CHANNEL_COLUMNS} FROM sync_channels \
                     WHERE state IN ('active', 'renewing') ORDER BY target_id ASC"
                );
                query_channels(conn, &sql, &[])
            })
            .await
    }
}

fn insert_row(conn: &Connection, channel: &SyncChannel) -> Result<()> {
    conn.execute(
        "INSERT INTO sync_channels (channel_id, resource_id, target_id, sync_token, page_token,
                                    expiration, state, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            channel.channel_id,
            channel.resource_id,
            channel.target_id,
            channel.sync_token,
            channel.page_token,
            encode(channel.expiration),
            channel.state.as_str(),
            encode(channel.created_at),
            encode(channel.updated_at),
        ],
    )
    .map_err(|err| conflict_or_database(err, &channel.target_id))?;
    Ok(())
}

/// Goes straight to rusqlite so constraint codes stay inspectable
fn execute_sql(conn: &Connection, sql: &str, params: &[&dyn ToSql]) -> rusqlite::Result<usize> {
    conn.execute(sql, params)
}

struct ChannelRecord {
    channel_id: String,
    resource_id: Option<String>,
    target_id: String,
    sync_token: Option<String>,
    page_token: Option<String>,
    expiration: String,
    state: String,
    created_at: String,
    updated_at: String,
}

impl ChannelRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            channel_id: row.get(0)?,
            resource_id: row.get(1)?,
            target_id: row.get(2)?,
            sync_token: row.get(3)?,
            page_token: row.get(4)?,
            expiration: row.get(5)?,
            state: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_channel(self) -> Result<SyncChannel> {
        Ok(SyncChannel {
            channel_id: self.channel_id,
            resource_id: self.resource_id,
            target_id: self.target_id,
            sync_token: self.sync_token,
            page_token: self.page_token,
            expiration: decode(&self.expiration)?,
            state: self.state.parse()?,
            created_at: decode(&self.created_at)?,
            updated_at: decode(&self.updated_at)?,
        })
    }
}

fn query_channels(conn: &Connection, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<SyncChannel>> {
    let mut stmt = conn.prepare(sql).map_err(InfraError::from)?;
    let records = stmt
        .query_map(params, ChannelRecord::from_row)
        .map_err(InfraError::from)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(InfraError::from)?;
    records.into_iter().map(ChannelRecord::into_channel).collect()
}

pub(crate) fn find_by_id(conn: &Connection, channel_id: &str) -> Result<Option<SyncChannel>> {
    let sql = format!("SELECT {CHANNEL_COLUMNS} FROM sync_channels WHERE channel_id = ?1");
    let record = conn
        .prepare(&sql)
        .and_then(|mut stmt| stmt.query_row(params![channel_id], ChannelRecord::from_row).optional())
        .map_err(InfraError::from)?;
    record.map(ChannelRecord::into_channel).transpose()
}

fn require(conn: &Connection, channel_id: &str) -> Result<SyncChannel> {
    find_by_id(conn, channel_id)?
        .ok_or_else(|| CalMirrorError::NotFound(format!("channel {channel_id}")))
}

fn update_one(conn: &Connection, channel_id: &str, sql: &str, params: &[&dyn ToSql]) -> Result<()> {
    let changed = conn.execute(sql, params).map_err(InfraError::from)?;
    if changed == 0 {
        return Err(CalMirrorError::NotFound(format!("channel {channel_id}")));
    }
    Ok(())
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn conflict_or_database(err: rusqlite::Error, target_id: &str) -> CalMirrorError {
    if is_unique_violation(&err) {
        CalMirrorError::ChannelConflict { target_id: target_id.to_string() }
    } else {
        InfraError::from(err).into()
    }
}
