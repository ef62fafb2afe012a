//! Renewal of channels nearing expiration

use std::sync::Arc;

use calmirror_domain::{RenewalReport, Result};
use tracing::{error, info, instrument};

use crate::channels::ChannelRegistry;
use crate::health::SyncHealth;
use crate::ports::{ChannelRepository, Clock};

pub struct ChannelRenewalService {
    channels: Arc<dyn ChannelRepository>,
    registry: Arc<ChannelRegistry>,
    health: Arc<SyncHealth>,
    clock: Arc<dyn Clock>,
    window: chrono::Duration,
}

impl ChannelRenewalService {
    pub fn new(
        channels: Arc<dyn ChannelRepository>,
        registry: Arc<ChannelRegistry>,
        health: Arc<SyncHealth>,
        clock: Arc<dyn Clock>,
        window: chrono::Duration,
    ) -> Self {
        Self { channels, registry, health, clock, window }
    }

    /// Replace every live channel expiring within the window
    ///
    /// The replacement is registered and swapped in before the old channel
    /// is deregistered, so the target is never left without a live channel.
    /// A failed channel stays `Active` and is retried on the next tick.
    ///
    /// # Errors
    /// Only when the due channels cannot be listed; per-channel failures are
    /// counted in the report.
    #[instrument(skip(self))]
    pub async fn renew_due(&self) -> Result<RenewalReport> {
        let deadline = self.clock.now() + self.window;
        let due = self.channels.list_due_for_renewal(deadline).await?;
        let mut report = RenewalReport {
            examined: u32::try_from(due.len()).unwrap_or(u32::MAX),
            ..RenewalReport::default()
        };

        for channel in &due {
            match self.registry.register_replacement(channel).await {
                Ok(replacement) => {
                    report.renewed += 1;
                    self.health.forget(&channel.channel_id);
                    self.registry.stop_remote(channel).await;
                    info!(
                        old_channel_id = %channel.channel_id,
                        new_channel_id = %replacement.channel_id,
                        "channel renewed"
                    );
                }
                Err(err) => {
                    report.failed += 1;
                    self.health.observe_error(&err);
                    error!(channel_id = %channel.channel_id, error = %err, "channel renewal failed");
                }
            }
        }

        info!(examined = report.examined, renewed = report.renewed, failed = report.failed, "renewal pass done");
        Ok(report)
    }
}
