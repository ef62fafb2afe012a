//! SQLite implementation of the `MirrorStore` port.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use calmirror_core::MirrorStore;
use calmirror_domain::{CalMirrorError, MirrorEvent, PageCheckpoint, Participant, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, Row};
use tracing::{debug, instrument};

use super::channel_repository::find_by_id;
use super::manager::DbManager;
use super::timestamps::{decode, decode_opt, encode, encode_opt};
use crate::errors::InfraError;

const EVENT_COLUMNS: &str = "remote_event_id, target_id, summary, description, start_time, end_time, \
                             conference_link, view_link, status, organizer, updated_at";

pub struct SqliteMirrorStore {
    db: Arc<DbManager>,
}

impl SqliteMirrorStore {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MirrorStore for SqliteMirrorStore {
    async fn find_events(&self, remote_event_ids: &[String]) -> Result<HashMap<String, MirrorEvent>> {
        if remote_event_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let ids = remote_event_ids.to_vec();
        self.db
            .with_connection(move |conn| {
                let placeholders = vec!["?"; ids.len()].join(", ");
                let sql = format!(
                    "SELECT {EVENT_COLUMNS} FROM mirror_events WHERE remote_event_id IN ({placeholders})"
                );
                let events = query_events(conn, &sql, params_from_iter(ids.iter()))?;
                Ok(events.into_iter().map(|event| (event.remote_event_id.clone(), event)).collect())
            })
            .await
    }

    async fn get_event(&self, remote_event_id: &str) -> Result<Option<MirrorEvent>> {
        let id = remote_event_id.to_string();
        self.db
            .with_connection(move |conn| {
                let sql = format!("SELECT {EVENT_COLUMNS} FROM mirror_events WHERE remote_event_id = ?1");
                Ok(query_events(conn, &sql, params![id])?.into_iter().next())
            })
            .await
    }

    #[instrument(skip(self, rows, checkpoint), fields(rows = rows.len()))]
    async fn commit_page(
        &self,
        channel_id: &str,
        rows: &[MirrorEvent],
        checkpoint: &PageCheckpoint,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let channel_id = channel_id.to_string();
        let rows = rows.to_vec();
        let checkpoint = checkpoint.clone();
        self.db
            .with_connection(move |conn| {
                let tx = conn.transaction().map_err(InfraError::from)?;
                for row in &rows {
                    upsert_event(&tx, row)?;
                }
                apply_checkpoint(&tx, &channel_id, &checkpoint, now)?;
                tx.commit().map_err(InfraError::from)?;
                debug!(channel_id = %channel_id, "page committed with cursor");
                Ok(())
            })
            .await
    }

    async fn save_events(&self, rows: &[MirrorEvent]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let rows = rows.to_vec();
        self.db
            .with_connection(move |conn| {
                let tx = conn.transaction().map_err(InfraError::from)?;
                for row in &rows {
                    upsert_event(&tx, row)?;
                }
                tx.commit().map_err(InfraError::from)?;
                Ok(())
            })
            .await
    }

    async fn list_events(&self, target_id: &str) -> Result<Vec<MirrorEvent>> {
        let target_id = target_id.to_string();
        self.db
            .with_connection(move |conn| {
                let sql = format!(
                    "SELECT {EVENT_COLUMNS} FROM mirror_events WHERE target_id = ?1 \
                     ORDER BY start_time ASC, remote_event_id ASC"
                );
                query_events(conn, &sql, params![target_id])
            })
            .await
    }
}

fn upsert_event(conn: &Connection, event: &MirrorEvent) -> Result<()> {
    conn.execute(
        "INSERT INTO mirror_events (remote_event_id, target_id, summary, description, start_time,
                                    end_time, conference_link, view_link, status, organizer, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT(remote_event_id) DO UPDATE SET
             target_id = excluded.target_id,
             summary = excluded.summary,
             description = excluded.description,
             start_time = excluded.start_time,
             end_time = excluded.end_time,
             conference_link = excluded.conference_link,
             view_link = excluded.view_link,
             status = excluded.status,
             organizer = excluded.organizer,
             updated_at = excluded.updated_at",
        params![
            event.remote_event_id,
            event.target_id,
            event.summary,
            event.description,
            encode_opt(event.start_time),
            encode_opt(event.end_time),
            event.conference_link,
            event.view_link,
            event.status.as_str(),
            event.organizer,
            encode(event.updated_at),
        ],
    )
    .map_err(InfraError::from)?;

    conn.execute(
        "DELETE FROM mirror_event_participants WHERE remote_event_id = ?1",
        params![event.remote_event_id],
    )
    .map_err(InfraError::from)?;
    let mut insert = conn
        .prepare_cached(
            "INSERT INTO mirror_event_participants (remote_event_id, position, address, response_state)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .map_err(InfraError::from)?;
    for (position, participant) in event.participants.iter().enumerate() {
        let position = i64::try_from(position)
            .map_err(|_| CalMirrorError::InvalidInput("too many participants".into()))?;
        insert
            .execute(params![
                event.remote_event_id,
                position,
                participant.address,
                participant.response_state.as_str()
            ])
            .map_err(InfraError::from)?;
    }
    Ok(())
}

fn apply_checkpoint(
    conn: &Connection,
    channel_id: &str,
    checkpoint: &PageCheckpoint,
    now: DateTime<Utc>,
) -> Result<()> {
    let stamp = encode(now);
    let changed = match checkpoint {
        PageCheckpoint::Continue { page_token } => conn.execute(
            "UPDATE sync_channels SET page_token = ?2, updated_at = ?3
             WHERE channel_id = ?1 AND state IN ('active', 'renewing')",
            params![channel_id, page_token, stamp],
        ),
        PageCheckpoint::Complete { sync_token: Some(token) } => conn.execute(
            "UPDATE sync_channels SET sync_token = ?2, page_token = NULL, updated_at = ?3
             WHERE channel_id = ?1 AND state IN ('active', 'renewing')",
            params![channel_id, token, stamp],
        ),
        PageCheckpoint::Complete { sync_token: None } => conn.execute(
            "UPDATE sync_channels SET page_token = NULL, updated_at = ?2
             WHERE channel_id = ?1 AND state IN ('active', 'renewing')",
            params![channel_id, stamp],
        ),
    }
    .map_err(InfraError::from)?;

    if changed == 0 {
        // The caller's transaction is dropped, discarding this page's rows.
        return Err(match find_by_id(conn, channel_id)? {
            Some(_) => CalMirrorError::ChannelSuperseded { channel_id: channel_id.to_string() },
            None => CalMirrorError::NotFound(format!("channel {channel_id}")),
        });
    }
    Ok(())
}

struct EventRecord {
    remote_event_id: String,
    target_id: String,
    summary: Option<String>,
    description: Option<String>,
    start_time: Option<String>,
    end_time: Option<String>,
    conference_link: Option<String>,
    view_link: Option<String>,
    status: String,
    organizer: Option<String>,
    updated_at: String,
}

impl EventRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            remote_event_id: row.get(0)?,
            target_id: row.get(1)?,
            summary: row.get(2)?,
            description: row.get(3)?,
            start_time: row.get(4)?,
            end_time: row.get(5)?,
            conference_link: row.get(6)?,
            view_link: row.get(7)?,
            status: row.get(8)?,
            organizer: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn into_event(self, participants: Vec<Participant>) -> Result<MirrorEvent> {
        Ok(MirrorEvent {
            remote_event_id: self.remote_event_id,
            target_id: self.target_id,
            summary: self.summary,
            description: self.description,
            start_time: decode_opt(self.start_time.as_deref())?,
            end_time: decode_opt(self.end_time.as_deref())?,
            conference_link: self.conference_link,
            view_link: self.view_link,
            status: self.status.parse()?,
            organizer: self.organizer,
            participants,
            updated_at: decode(&self.updated_at)?,
        })
    }
}

fn query_events<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<MirrorEvent>> {
    let mut stmt = conn.prepare(sql).map_err(InfraError::from)?;
    let records = stmt
        .query_map(params, EventRecord::from_row)
        .map_err(InfraError::from)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(InfraError::from)?;

    records
        .into_iter()
        .map(|record| {
            let participants = load_participants(conn, &record.remote_event_id)?;
            record.into_event(participants)
        })
        .collect()
}

fn load_participants(conn: &Connection, remote_event_id: &str) -> Result<Vec<Participant>> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT address, response_state FROM mirror_event_participants
             WHERE remote_event_id = ?1 ORDER BY position ASC",
        )
        .map_err(InfraError::from)?;
    let raw = stmt
        .query_map(params![remote_event_id], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
        .map_err(InfraError::from)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(InfraError::from)?;

    raw.into_iter()
        .map(|(address, state)| Ok(Participant::new(address, state.parse()?)))
        .collect()
}
