//! Channel registry service
//!
//! Owns the channel state machine:
//! `Registering → Active → Renewing → Active (replacement) | Deactivated`.
//! A `Registering` row is written before the provider is called, so a crash
//! mid-registration leaves a non-live row behind instead of an orphaned
//! provider channel with no local record.

use std::sync::Arc;
use std::time::Duration;

use calmirror_common::SecretString;
use calmirror_domain::{
    CalMirrorError, ChannelState, ProviderError, Result, SyncChannel, WatchRequest, WatchResponse,
};
use tracing::{debug, error, info, instrument, warn};

use crate::ports::{CalendarRemote, ChannelRepository, Clock};
use crate::remote::RemoteCaller;

/// What every channel registration sends to the provider
#[derive(Debug, Clone)]
pub struct RegistrationSettings {
    pub callback_url: String,
    pub token: SecretString,
    pub ttl: Duration,
}

pub struct ChannelRegistry {
    channels: Arc<dyn ChannelRepository>,
    remote: Arc<dyn CalendarRemote>,
    caller: RemoteCaller,
    clock: Arc<dyn Clock>,
    settings: RegistrationSettings,
}

impl ChannelRegistry {
    pub fn new(
        channels: Arc<dyn ChannelRepository>,
        remote: Arc<dyn CalendarRemote>,
        caller: RemoteCaller,
        clock: Arc<dyn Clock>,
        settings: RegistrationSettings,
    ) -> Self {
        Self { channels, remote, caller, clock, settings }
    }

    /// Register a channel for `target_id`
    ///
    /// # Errors
    /// `ChannelConflict` when the target already has a live channel; the
    /// provider error when registration fails (the row is then
    /// `Deactivated`).
    #[instrument(skip(self))]
    pub async fn register(&self, target_id: &str) -> Result<SyncChannel> {
        if let Some(live) = self.channels.find_live_for_target(target_id).await? {
            warn!(existing = %live.channel_id, "refusing to register a second live channel");
            return Err(CalMirrorError::ChannelConflict { target_id: target_id.to_string() });
        }

        let channel = self.new_registering_row(target_id, None, None);
        self.channels.insert_channel(&channel).await?;

        let watch = match self.watch(&channel).await {
            Ok(watch) => watch,
            Err(err) => {
                error!(channel_id = %channel.channel_id, error = %err, "channel registration failed");
                self.retire(&channel.channel_id).await;
                return Err(err.into());
            }
        };

        match self.channels.activate(&channel.channel_id, &watch, self.clock.now()).await {
            Ok(active) => {
                info!(
                    channel_id = %active.channel_id,
                    expiration = %active.expiration,
                    "channel registered"
                );
                Ok(active)
            }
            Err(err) => {
                // Lost a race with another registration for the same target.
                error!(channel_id = %channel.channel_id, error = %err, "channel activation failed");
                self.retire(&channel.channel_id).await;
                self.stop_remote_channel(&channel.channel_id, Some(&watch.resource_id)).await;
                Err(err)
            }
        }
    }

    /// Register a replacement for `old` and swap live status atomically
    ///
    /// The old channel stays live (`Renewing`) until the swap commits, so
    /// notifications keep flowing throughout. On failure the replacement row
    /// is deactivated and the old channel goes back to `Active`, unless it was
    /// retired while the replacement was being registered.
    ///
    /// # Errors
    /// `ChannelSuperseded` when `old` is no longer live, before or during the
    /// renewal; provider and storage errors otherwise.
    #[instrument(skip(self, old), fields(old_channel_id = %old.channel_id, target_id = %old.target_id))]
    pub async fn register_replacement(&self, old: &SyncChannel) -> Result<SyncChannel> {
        self.begin_renewal(&old.channel_id).await?;

        let replacement = self.new_registering_row(
            &old.target_id,
            old.sync_token.clone(),
            old.page_token.clone(),
        );
        if let Err(err) = self.channels.insert_channel(&replacement).await {
            self.restore(old).await;
            return Err(err);
        }

        let watch = match self.watch(&replacement).await {
            Ok(watch) => watch,
            Err(err) => {
                error!(error = %err, "replacement registration failed; keeping old channel");
                self.retire(&replacement.channel_id).await;
                self.restore(old).await;
                return Err(err.into());
            }
        };

        match self
            .channels
            .swap_live(&old.channel_id, &replacement.channel_id, &watch, self.clock.now())
            .await
        {
            Ok(active) => {
                info!(
                    new_channel_id = %active.channel_id,
                    expiration = %active.expiration,
                    "channel replaced"
                );
                Ok(active)
            }
            Err(err) => {
                error!(error = %err, "live swap failed; keeping old channel");
                self.retire(&replacement.channel_id).await;
                self.stop_remote_channel(&replacement.channel_id, Some(&watch.resource_id)).await;
                self.restore(old).await;
                Err(err)
            }
        }
    }

    /// # Errors
    /// `NotFound` for an unknown channel id.
    pub async fn lookup(&self, channel_id: &str) -> Result<SyncChannel> {
        self.channels
            .find_channel(channel_id)
            .await?
            .ok_or_else(|| CalMirrorError::NotFound(format!("channel {channel_id}")))
    }

    /// Like [`Self::lookup`] but `None` for unknown ids
    pub async fn find(&self, channel_id: &str) -> Result<Option<SyncChannel>> {
        self.channels.find_channel(channel_id).await
    }

    /// Overwrite the stored sync token
    ///
    /// The delta fetcher commits tokens together with page rows through
    /// `MirrorStore::commit_page`; this is for out-of-band corrections.
    pub async fn update_token(&self, channel_id: &str, sync_token: Option<&str>) -> Result<()> {
        self.channels.update_sync_token(channel_id, sync_token, self.clock.now()).await
    }

    /// Mark a channel `Deactivated`
    #[instrument(skip(self))]
    pub async fn deactivate(&self, channel_id: &str) -> Result<()> {
        self.channels.set_state(channel_id, ChannelState::Deactivated, self.clock.now()).await?;
        info!("channel deactivated");
        Ok(())
    }

    /// Deregister with the provider (best-effort), then deactivate
    #[instrument(skip(self))]
    pub async fn stop(&self, channel_id: &str) -> Result<()> {
        let channel = self.lookup(channel_id).await?;
        if channel.is_live() {
            self.stop_remote_channel(&channel.channel_id, channel.resource_id.as_deref()).await;
        }
        self.deactivate(channel_id).await
    }

    /// Provider-side deregistration only; failures are logged and swallowed
    pub async fn stop_remote(&self, channel: &SyncChannel) {
        self.stop_remote_channel(&channel.channel_id, channel.resource_id.as_deref()).await;
    }

    /// Live channel for `target_id`, registering one if needed
    ///
    /// A live channel that already expired is replaced, carrying its cursors.
    #[instrument(skip(self))]
    pub async fn ensure_channel(&self, target_id: &str) -> Result<SyncChannel> {
        match self.channels.find_live_for_target(target_id).await? {
            Some(channel) if channel.is_expired(self.clock.now()) => {
                warn!(channel_id = %channel.channel_id, "live channel already expired; replacing");
                let replacement = self.register_replacement(&channel).await?;
                self.stop_remote(&channel).await;
                Ok(replacement)
            }
            Some(channel) => {
                debug!(channel_id = %channel.channel_id, "live channel present");
                Ok(channel)
            }
            None => self.register(target_id).await,
        }
    }

    fn new_registering_row(
        &self,
        target_id: &str,
        sync_token: Option<String>,
        page_token: Option<String>,
    ) -> SyncChannel {
        let now = self.clock.now();
        let ttl = chrono::Duration::from_std(self.settings.ttl).unwrap_or(chrono::Duration::zero());
        let mut channel = SyncChannel::registering(target_id, now + ttl, now);
        channel.sync_token = sync_token;
        channel.page_token = page_token;
        channel
    }

    async fn watch(&self, channel: &SyncChannel) -> std::result::Result<WatchResponse, ProviderError> {
        let request = WatchRequest {
            channel_id: channel.channel_id.clone(),
            target_id: channel.target_id.clone(),
            callback_url: self.settings.callback_url.clone(),
            token: self.settings.token.clone(),
            ttl: self.settings.ttl,
        };
        self.caller.call("watch", || self.remote.watch(&request)).await
    }

    async fn retire(&self, channel_id: &str) {
        if let Err(err) =
            self.channels.set_state(channel_id, ChannelState::Deactivated, self.clock.now()).await
        {
            error!(channel_id, error = %err, "failed to deactivate channel row");
        }
    }

    /// `Active → Renewing`; an already `Renewing` row is an interrupted renewal
    async fn begin_renewal(&self, channel_id: &str) -> Result<()> {
        let now = self.clock.now();
        if self.channels.transition(channel_id, ChannelState::Active, ChannelState::Renewing, now).await? {
            return Ok(());
        }
        let current = self.lookup(channel_id).await?;
        if current.state == ChannelState::Renewing {
            debug!(channel_id, "resuming interrupted renewal");
            return Ok(());
        }
        warn!(channel_id, state = %current.state, "channel not live; skipping renewal");
        Err(CalMirrorError::ChannelSuperseded { channel_id: channel_id.to_string() })
    }

    /// `Renewing → Active` only; a channel retired meanwhile stays retired
    async fn restore(&self, old: &SyncChannel) {
        match self
            .channels
            .transition(&old.channel_id, ChannelState::Renewing, ChannelState::Active, self.clock.now())
            .await
        {
            Ok(true) => debug!(channel_id = %old.channel_id, "old channel restored to active"),
            Ok(false) => info!(channel_id = %old.channel_id, "old channel retired during renewal; not restoring"),
            Err(err) => {
                error!(channel_id = %old.channel_id, error = %err, "failed to restore channel to active");
            }
        }
    }

    async fn stop_remote_channel(&self, channel_id: &str, resource_id: Option<&str>) {
        let Some(resource_id) = resource_id else {
            debug!(channel_id, "no resource id; skipping provider deregistration");
            return;
        };
        match self.caller.call("stop", || self.remote.stop(channel_id, resource_id)).await {
            Ok(()) => debug!(channel_id, "channel deregistered with provider"),
            Err(err) => warn!(channel_id, error = %err, "provider deregistration failed"),
        }
    }
}
