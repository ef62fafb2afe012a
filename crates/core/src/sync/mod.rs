//! Incremental sync
//!
//! [`DeltaFetcher`] pulls changes for one channel page by page,
//! [`SyncCoordinator`] serializes runs per channel, and [`SyncEngine`] is the
//! entry point for writes coming from the CRUD layer.

pub mod coordinator;
pub mod engine;
pub mod fetcher;

use async_trait::async_trait;
use calmirror_domain::{Result, SyncReport};

pub use coordinator::{SyncCoordinator, TriggerOutcome};
pub use engine::SyncEngine;
pub use fetcher::{DeltaFetcher, FetchSettings};

/// One full sync run for a channel
#[async_trait]
pub trait ChannelSync: Send + Sync {
    async fn sync_channel(&self, channel_id: &str) -> Result<SyncReport>;
}
