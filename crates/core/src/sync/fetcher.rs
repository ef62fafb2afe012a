//! Delta fetcher
//!
//! Pulls every change since a channel's sync token and commits it page by
//! page. Each page's reconciled rows and the channel cursor go into the
//! mirror in one transaction before the next page is requested, so a crash
//! never advances the token past what was stored.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use calmirror_domain::{
    CalMirrorError, ChangeQuery, MirrorEvent, PageCheckpoint, ProviderError, RemoteEvent, Result,
    SyncChannel, SyncReport,
};
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use super::ChannelSync;
use crate::health::SyncHealth;
use crate::ports::{CalendarRemote, ChannelRepository, Clock, MirrorStore};
use crate::reconcile::{reconcile, Reconciliation};
use crate::remote::RemoteCaller;

#[derive(Debug, Clone, Copy)]
pub struct FetchSettings {
    pub page_size: u32,
    /// Pages per pass before the run is aborted
    pub max_pages_per_run: u32,
}

/// Replacements followed within one run before giving up
const MAX_HANDOFFS: u32 = 3;

impl Default for FetchSettings {
    fn default() -> Self {
        Self { page_size: 250, max_pages_per_run: 1000 }
    }
}

pub struct DeltaFetcher {
    channels: Arc<dyn ChannelRepository>,
    store: Arc<dyn MirrorStore>,
    remote: Arc<dyn CalendarRemote>,
    caller: RemoteCaller,
    clock: Arc<dyn Clock>,
    health: Arc<SyncHealth>,
    settings: FetchSettings,
}

/// Rows to write for one page plus skip count
struct PagePlan {
    rows: Vec<MirrorEvent>,
    skipped: u32,
}

impl DeltaFetcher {
    pub fn new(
        channels: Arc<dyn ChannelRepository>,
        store: Arc<dyn MirrorStore>,
        remote: Arc<dyn CalendarRemote>,
        caller: RemoteCaller,
        clock: Arc<dyn Clock>,
        health: Arc<SyncHealth>,
        settings: FetchSettings,
    ) -> Self {
        Self { channels, store, remote, caller, clock, health, settings }
    }

    /// Sync one channel to the provider's current state
    ///
    /// A channel that was renewed, before or during the run, hands over to
    /// the target's live replacement: pages the old row can no longer accept
    /// are fetched again from the cursor the replacement inherited.
    ///
    /// # Errors
    /// `NotFound` for unknown channels, `InvalidInput` for a retired channel
    /// with no live successor, provider errors that survive retries, and
    /// storage errors. On error the stored token is left at the last
    /// committed page.
    #[instrument(skip(self))]
    pub async fn sync(&self, channel_id: &str) -> Result<SyncReport> {
        let requested = self
            .channels
            .find_channel(channel_id)
            .await?
            .ok_or_else(|| CalMirrorError::NotFound(format!("channel {channel_id}")))?;
        let state = requested.state;
        let Some(mut channel) = self.live_for(requested).await? else {
            return Err(CalMirrorError::InvalidInput(format!("channel {channel_id} is {state}")));
        };
        if channel.channel_id != channel_id {
            info!(new_channel_id = %channel.channel_id, "channel was replaced; syncing its successor");
        }

        let mut report = SyncReport::new(channel.channel_id.clone());
        let mut handoffs = 0;
        let outcome = loop {
            match self.run(&channel, &mut report).await {
                Err(CalMirrorError::ChannelSuperseded { .. }) if handoffs < MAX_HANDOFFS => {
                    handoffs += 1;
                    self.health.forget(&channel.channel_id);
                    match self.channels.find_live_for_target(&channel.target_id).await {
                        Ok(Some(next)) => {
                            info!(
                                old_channel_id = %channel.channel_id,
                                new_channel_id = %next.channel_id,
                                "channel replaced mid-sync; continuing on replacement"
                            );
                            report.channel_id.clone_from(&next.channel_id);
                            channel = next;
                        }
                        Ok(None) => {
                            info!(channel_id = %channel.channel_id, "channel retired mid-sync; stopping");
                            return Ok(report);
                        }
                        Err(err) => break Err(err),
                    }
                }
                other => break other,
            }
        };

        let now = self.clock.now();
        match &outcome {
            Ok(()) => {
                self.health.record_success(&channel.channel_id, now);
                info!(
                    pages = report.pages,
                    applied = report.events_applied,
                    skipped = report.events_skipped,
                    full_resync = report.full_resync,
                    "channel synced"
                );
            }
            Err(err) => {
                self.health.record_failure(&channel.channel_id, err);
                warn!(pages = report.pages, error = %err, "channel sync failed");
            }
        }
        outcome.map(|()| report)
    }

    /// `channel` while it is live, otherwise its target's live channel
    async fn live_for(&self, channel: SyncChannel) -> Result<Option<SyncChannel>> {
        if channel.is_live() {
            return Ok(Some(channel));
        }
        self.channels.find_live_for_target(&channel.target_id).await
    }

    /// Re-read a single event and reconcile it
    ///
    /// A not-found answer cancels the existing mirror row; if there is no row
    /// there is nothing to cancel and the result is `Unchanged`.
    #[instrument(skip(self))]
    pub async fn refresh_event(&self, target_id: &str, remote_event_id: &str) -> Result<Reconciliation> {
        let fetched = self
            .caller
            .call("get_event", || self.remote.get_event(target_id, remote_event_id))
            .await;
        let observed_at = self.clock.now();
        let current = self.store.get_event(remote_event_id).await?;

        let delta = match fetched {
            Ok(event) => event,
            Err(ProviderError::EventGone { .. }) if current.is_none() => {
                debug!("event gone and never mirrored");
                return Ok(Reconciliation::Unchanged);
            }
            Err(ProviderError::EventGone { .. }) => RemoteEvent::tombstone(remote_event_id),
            Err(err) => {
                self.health.observe_error(&CalMirrorError::Provider(err.clone()));
                return Err(err.into());
            }
        };

        let outcome = reconcile(current.as_ref(), &delta, target_id, observed_at);
        if let Some(row) = outcome.row() {
            self.store.save_events(std::slice::from_ref(row)).await?;
        }
        Ok(outcome)
    }

    async fn run(&self, channel: &SyncChannel, report: &mut SyncReport) -> Result<()> {
        let base = self.base_query(channel);
        match self.drain(channel, base, channel.page_token.clone(), report).await {
            Err(CalMirrorError::Provider(ProviderError::InvalidSyncToken)) => {
                warn!(channel_id = %channel.channel_id, "sync token rejected; starting full resync");
                let now = self.clock.now();
                self.channels.reset_sync_state(&channel.channel_id, now).await?;
                report.full_resync = true;
                // A second rejection propagates: at most one resync per run.
                self.drain(channel, ChangeQuery::full(now, self.settings.page_size), None, report).await
            }
            other => other,
        }
    }

    fn base_query(&self, channel: &SyncChannel) -> ChangeQuery {
        match &channel.sync_token {
            Some(token) => ChangeQuery::incremental(token.clone(), self.settings.page_size),
            None => ChangeQuery::full(self.clock.now(), self.settings.page_size),
        }
    }

    async fn drain(
        &self,
        channel: &SyncChannel,
        base: ChangeQuery,
        mut page_token: Option<String>,
        report: &mut SyncReport,
    ) -> Result<()> {
        if page_token.is_some() {
            info!(channel_id = %channel.channel_id, "resuming from stored page cursor");
        }

        for _ in 0..self.settings.max_pages_per_run {
            let query = base.with_page(page_token.take());
            let page = self
                .caller
                .call("list_changes", || self.remote.list_changes(&channel.target_id, &query))
                .await?;

            let observed_at = self.clock.now();
            let plan = self.plan_page(&channel.target_id, &page.items, observed_at).await?;
            let checkpoint = match page.next_page_token {
                Some(next) => PageCheckpoint::Continue { page_token: next },
                None => PageCheckpoint::Complete { sync_token: page.next_sync_token },
            };

            self.store.commit_page(&channel.channel_id, &plan.rows, &checkpoint, observed_at).await?;
            report.pages += 1;
            report.events_applied += u32::try_from(plan.rows.len()).unwrap_or(u32::MAX);
            report.events_skipped += plan.skipped;
            debug!(
                channel_id = %channel.channel_id,
                items = page.items.len(),
                written = plan.rows.len(),
                "page committed"
            );

            match checkpoint {
                PageCheckpoint::Continue { page_token: next } => page_token = Some(next),
                PageCheckpoint::Complete { sync_token: Some(_) } => {
                    report.sync_token_advanced = true;
                    return Ok(());
                }
                PageCheckpoint::Complete { sync_token: None } => {
                    warn!(channel_id = %channel.channel_id, "final page carried no sync token; keeping stored token");
                    return Ok(());
                }
            }
        }

        Err(CalMirrorError::Internal(format!(
            "channel {} exceeded {} pages in one pass",
            channel.channel_id, self.settings.max_pages_per_run
        )))
    }

    /// Reconcile a page against the mirror
    ///
    /// Repeated ids within a page are applied in order, each against the
    /// result of the previous one.
    async fn plan_page(
        &self,
        target_id: &str,
        items: &[RemoteEvent],
        observed_at: DateTime<Utc>,
    ) -> Result<PagePlan> {
        let ids: Vec<String> = items.iter().map(|item| item.id.clone()).collect();
        let mut current = self.store.find_events(&ids).await?;
        let mut rows: Vec<MirrorEvent> = Vec::with_capacity(items.len());
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut skipped = 0;

        for item in items {
            match reconcile(current.get(&item.id), item, target_id, observed_at).into_row() {
                Some(row) => {
                    current.insert(row.remote_event_id.clone(), row.clone());
                    match positions.get(&row.remote_event_id) {
                        Some(&index) => rows[index] = row,
                        None => {
                            positions.insert(row.remote_event_id.clone(), rows.len());
                            rows.push(row);
                        }
                    }
                }
                None => skipped += 1,
            }
        }

        Ok(PagePlan { rows, skipped })
    }
}

#[async_trait]
impl ChannelSync for DeltaFetcher {
    async fn sync_channel(&self, channel_id: &str) -> Result<SyncReport> {
        self.sync(channel_id).await
    }
}
