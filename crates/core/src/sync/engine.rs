//! Entry point for the CRUD layer
//!
//! Local edits made through the CRM are written optimistically and go
//! through the same reconciler as remote deltas, so a later, older remote
//! echo is dropped as stale instead of clobbering the edit.

use std::sync::Arc;

use calmirror_domain::{CalMirrorError, MirrorEvent, RemoteEvent, Result, SyncChannel};
use tracing::{debug, instrument};

use super::{DeltaFetcher, SyncCoordinator, TriggerOutcome};
use crate::ports::{Clock, MirrorStore};
use crate::reconcile::{reconcile, Reconciliation};

pub struct SyncEngine {
    store: Arc<dyn MirrorStore>,
    fetcher: Arc<DeltaFetcher>,
    coordinator: SyncCoordinator,
    clock: Arc<dyn Clock>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn MirrorStore>,
        fetcher: Arc<DeltaFetcher>,
        coordinator: SyncCoordinator,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, fetcher, coordinator, clock }
    }

    /// Record an optimistic local write (last-write-wins on `updated_at`)
    ///
    /// # Errors
    /// `InvalidInput` for an empty event id; storage errors otherwise.
    #[instrument(skip(self, event), fields(remote_event_id = %event.remote_event_id))]
    pub async fn apply_local_write(&self, event: MirrorEvent) -> Result<Reconciliation> {
        if event.remote_event_id.is_empty() {
            return Err(CalMirrorError::InvalidInput("remote_event_id is required".into()));
        }

        let current = self.store.get_event(&event.remote_event_id).await?;
        let delta = RemoteEvent {
            id: event.remote_event_id,
            status: event.status,
            summary: event.summary,
            description: event.description,
            start: event.start_time,
            end: event.end_time,
            conference_link: event.conference_link,
            view_link: event.view_link,
            organizer: event.organizer,
            participants: Some(event.participants),
            updated: Some(event.updated_at),
        };

        let outcome = reconcile(current.as_ref(), &delta, &event.target_id, self.clock.now());
        match outcome.row() {
            Some(row) => self.store.save_events(std::slice::from_ref(row)).await?,
            None => debug!(?outcome, "local write not applied"),
        }
        Ok(outcome)
    }

    /// Re-read one event from the provider
    pub async fn refresh_event(&self, target_id: &str, remote_event_id: &str) -> Result<Reconciliation> {
        self.fetcher.refresh_event(target_id, remote_event_id).await
    }

    /// Queue a background sync through the coordinator
    pub fn request_sync(&self, channel: &SyncChannel) -> TriggerOutcome {
        self.coordinator.trigger(channel)
    }

    pub async fn list_events(&self, target_id: &str) -> Result<Vec<MirrorEvent>> {
        self.store.list_events(target_id).await
    }
}
