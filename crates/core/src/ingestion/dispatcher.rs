//! Notification dispatch
//!
//! Order of checks: shared secret, notification target tag, channel lookup,
//! resource state. Nothing is read or written before the secret matches.

use std::sync::Arc;

use calmirror_domain::{
    CalMirrorError, NotificationTarget, ResourceState, WebhookAuthError, WebhookNotification,
};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::guard::SecretGuard;
use crate::channels::ChannelRegistry;
use crate::sync::{SyncCoordinator, TriggerOutcome};

/// What a notification resulted in; every variant is acknowledged with 200
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// `sync` handshake
    Acknowledged,
    SyncTriggered,
    /// A sync for the channel was already running; one trailing run queued
    SyncCoalesced,
    Deactivated,
    UnknownChannel,
    UnsupportedTarget,
    UnknownState,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("webhook rejected: {0}")]
    Unauthorized(#[from] WebhookAuthError),

    #[error(transparent)]
    Internal(#[from] CalMirrorError),
}

pub struct NotificationDispatcher {
    guard: SecretGuard,
    registry: Arc<ChannelRegistry>,
    coordinator: SyncCoordinator,
}

impl NotificationDispatcher {
    pub fn new(guard: SecretGuard, registry: Arc<ChannelRegistry>, coordinator: SyncCoordinator) -> Self {
        Self { guard, registry, coordinator }
    }

    /// Verify a raw channel token before the rest of the request is parsed
    ///
    /// # Errors
    /// The [`WebhookAuthError`] describing the rejection.
    pub fn authorize(&self, token: Option<&str>) -> Result<(), WebhookAuthError> {
        self.guard.verify(token)
    }

    /// Handle one notification
    ///
    /// # Errors
    /// `Unauthorized` on a bad secret; `Internal` when the channel store
    /// fails (the provider will redeliver).
    #[instrument(
        skip(self, notification),
        fields(
            channel_id = %notification.channel_id,
            state = notification.resource_state.as_str(),
            message_number = ?notification.message_number,
        )
    )]
    pub async fn dispatch(&self, notification: &WebhookNotification) -> Result<DispatchOutcome, DispatchError> {
        if let Err(err) = self.authorize(notification.channel_token.as_ref().map(|t| t.expose())) {
            warn!(reason = %err, "rejecting notification");
            return Err(err.into());
        }

        if let NotificationTarget::Unsupported(tag) = notification.target() {
            debug!(%tag, "notification for unsupported target");
            return Ok(DispatchOutcome::UnsupportedTarget);
        }

        let channel = match self.registry.find(&notification.channel_id).await? {
            Some(channel) if channel.is_live() => channel,
            Some(channel) => {
                debug!(state = %channel.state, "notification for non-live channel");
                return Ok(DispatchOutcome::UnknownChannel);
            }
            None => {
                debug!("notification for unknown channel");
                return Ok(DispatchOutcome::UnknownChannel);
            }
        };

        if let (Some(expected), Some(presented)) = (&channel.resource_id, &notification.resource_id) {
            if expected != presented {
                warn!(%expected, %presented, "resource id mismatch; ignoring notification");
                return Ok(DispatchOutcome::UnknownChannel);
            }
        }

        match &notification.resource_state {
            ResourceState::Sync => {
                debug!("channel handshake");
                Ok(DispatchOutcome::Acknowledged)
            }
            ResourceState::Exists => match self.coordinator.trigger(&channel) {
                TriggerOutcome::Started(_) => Ok(DispatchOutcome::SyncTriggered),
                TriggerOutcome::Coalesced => Ok(DispatchOutcome::SyncCoalesced),
            },
            ResourceState::NotExists => {
                info!("provider reports resource removed");
                self.registry.deactivate(&channel.channel_id).await?;
                Ok(DispatchOutcome::Deactivated)
            }
            ResourceState::Unknown(state) => {
                warn!(%state, "unknown resource state");
                Ok(DispatchOutcome::UnknownState)
            }
        }
    }
}
