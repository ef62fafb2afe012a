//! Per-target sync serialization
//!
//! At most one sync runs per calendar. Runs are keyed by `target_id`, not by
//! channel, so the old and the replacement channel of a renewal never fetch
//! in parallel. A trigger that arrives while a run is in flight records its
//! channel as pending instead of starting a second run; the running task then
//! performs exactly one trailing run for the most recently triggered channel,
//! however many triggers arrived. Different targets run in parallel. The map
//! lock is only held for bookkeeping, never across a sync.

use std::collections::HashMap;
use std::sync::Arc;

use calmirror_domain::SyncChannel;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info_span, Instrument};

use super::ChannelSync;

#[derive(Debug, Default)]
struct Slot {
    /// Channel to run once more after the current run
    pending: Option<String>,
}

type Inflight = Arc<Mutex<HashMap<String, Slot>>>;

/// Result of [`SyncCoordinator::trigger`]
#[derive(Debug)]
pub enum TriggerOutcome {
    /// A new run was spawned; the handle resolves after any trailing run
    Started(JoinHandle<()>),
    /// A run for the target is already in flight and will run once more
    Coalesced,
}

impl TriggerOutcome {
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started(_))
    }
}

#[derive(Clone)]
pub struct SyncCoordinator {
    syncer: Arc<dyn ChannelSync>,
    inflight: Inflight,
}

impl SyncCoordinator {
    pub fn new(syncer: Arc<dyn ChannelSync>) -> Self {
        Self { syncer, inflight: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Request a sync of `channel` without waiting for it
    pub fn trigger(&self, channel: &SyncChannel) -> TriggerOutcome {
        let target_id = channel.target_id.clone();
        {
            let mut inflight = self.inflight.lock();
            if let Some(slot) = inflight.get_mut(&target_id) {
                slot.pending = Some(channel.channel_id.clone());
                debug!(%target_id, channel_id = %channel.channel_id, "sync already running; coalesced");
                return TriggerOutcome::Coalesced;
            }
            inflight.insert(target_id.clone(), Slot::default());
        }

        let syncer = Arc::clone(&self.syncer);
        let inflight = Arc::clone(&self.inflight);
        let first = channel.channel_id.clone();
        let span = info_span!("target_sync", target_id = %target_id);
        let handle = tokio::spawn(
            async move {
                let mut release =
                    SlotRelease { inflight: Arc::clone(&inflight), target_id: target_id.clone(), armed: true };
                let mut channel_id = first;
                loop {
                    if let Err(err) = syncer.sync_channel(&channel_id).await {
                        error!(%channel_id, error = %err, "sync run failed");
                    }
                    match take_pending(&inflight, &target_id) {
                        Some(next) => {
                            debug!(channel_id = %next, "running trailing sync");
                            channel_id = next;
                        }
                        None => {
                            release.armed = false;
                            break;
                        }
                    }
                }
            }
            .instrument(span),
        );
        TriggerOutcome::Started(handle)
    }

    /// Whether a run for `target_id` is in flight
    pub fn is_running(&self, target_id: &str) -> bool {
        self.inflight.lock().contains_key(target_id)
    }
}

/// Takes the pending channel, or removes the slot when nothing is pending
///
/// Both happen under one lock so a trigger racing with the end of a run is
/// either coalesced into a trailing run or starts a fresh one.
fn take_pending(inflight: &Inflight, target_id: &str) -> Option<String> {
    let mut map = inflight.lock();
    let pending = map.get_mut(target_id).and_then(|slot| slot.pending.take());
    if pending.is_none() {
        map.remove(target_id);
    }
    pending
}

/// Frees the slot if the sync task unwinds
struct SlotRelease {
    inflight: Inflight,
    target_id: String,
    armed: bool,
}

impl Drop for SlotRelease {
    fn drop(&mut self) {
        if self.armed {
            self.inflight.lock().remove(&self.target_id);
        }
    }
}
