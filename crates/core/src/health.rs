//! Sync health tracking
//!
//! Records the last success and error per channel and flips the service to
//! degraded when the provider rejects our credentials. A later successful
//! sync clears the degraded flag.

use std::collections::HashMap;
use std::sync::Arc;

use calmirror_domain::{
    CalMirrorError, ChannelHealth, HealthSnapshot, HealthStatus, ProviderError, Result, SyncChannel,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{error, info};

use crate::ports::{ChannelRepository, Clock};

#[derive(Debug, Default, Clone)]
struct ChannelRecord {
    last_success: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

#[derive(Debug, Default)]
struct HealthState {
    degraded_reason: Option<String>,
    channels: HashMap<String, ChannelRecord>,
}

#[derive(Debug, Default)]
pub struct SyncHealth {
    state: RwLock<HealthState>,
}

impl SyncHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, channel_id: &str, at: DateTime<Utc>) {
        let mut state = self.state.write();
        let record = state.channels.entry(channel_id.to_string()).or_default();
        record.last_success = Some(at);
        record.last_error = None;
        if state.degraded_reason.take().is_some() {
            info!(channel_id, "provider access recovered");
        }
    }

    pub fn record_failure(&self, channel_id: &str, error: &CalMirrorError) {
        {
            let mut state = self.state.write();
            state.channels.entry(channel_id.to_string()).or_default().last_error = Some(error.to_string());
        }
        self.observe_error(error);
    }

    /// Degrade on credential rejection; other errors are ignored here
    pub fn observe_error(&self, error: &CalMirrorError) {
        if let Some(ProviderError::AuthFailure { message }) = error.provider() {
            error!(reason = %message, "provider rejected credentials; sync degraded");
            self.state.write().degraded_reason = Some(message.clone());
        }
    }

    /// Drop the outcome record of a channel that is no longer live
    pub fn forget(&self, channel_id: &str) {
        self.state.write().channels.remove(channel_id);
    }

    pub fn is_degraded(&self) -> bool {
        self.state.read().degraded_reason.is_some()
    }

    /// Combine tracked outcomes with the currently live channels
    ///
    /// Records of channels missing from `live` are pruned.
    pub fn snapshot(&self, live: &[SyncChannel], now: DateTime<Utc>) -> HealthSnapshot {
        let mut state = self.state.write();
        state.channels.retain(|id, _| live.iter().any(|channel| &channel.channel_id == id));
        let channels = live
            .iter()
            .map(|channel| {
                let record = state.channels.get(&channel.channel_id).cloned().unwrap_or_default();
                ChannelHealth {
                    channel_id: channel.channel_id.clone(),
                    target_id: channel.target_id.clone(),
                    expiration: channel.expiration,
                    expired: channel.expiration <= now,
                    last_success: record.last_success,
                    last_error: record.last_error,
                }
            })
            .collect();

        HealthSnapshot {
            status: if state.degraded_reason.is_some() { HealthStatus::Degraded } else { HealthStatus::Ok },
            degraded_reason: state.degraded_reason.clone(),
            channels,
            generated_at: now,
        }
    }
}

/// Builds `/health` snapshots from tracked outcomes and stored channels
pub struct HealthService {
    health: Arc<SyncHealth>,
    channels: Arc<dyn ChannelRepository>,
    clock: Arc<dyn Clock>,
}

impl HealthService {
    pub fn new(health: Arc<SyncHealth>, channels: Arc<dyn ChannelRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { health, channels, clock }
    }

    pub async fn report(&self) -> Result<HealthSnapshot> {
        let live = self.channels.list_live().await?;
        Ok(self.health.snapshot(&live, self.clock.now()))
    }
}

#[cfg(test)]
mod tests {
    use calmirror_domain::ChannelState;
    use chrono::{Duration, TimeZone};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 12, 0, 0).single().expect("valid timestamp")
    }

    fn live_channel(id: &str, expiration: DateTime<Utc>) -> SyncChannel {
        let mut channel = SyncChannel::registering("primary", expiration, now());
        channel.channel_id = id.to_string();
        channel.state = ChannelState::Active;
        channel
    }

    #[test]
    fn auth_failure_degrades_until_next_success() {
        let health = SyncHealth::new();
        let auth = CalMirrorError::Provider(ProviderError::AuthFailure { message: "token revoked".into() });

        health.record_failure("calendar-a", &auth);
        assert!(health.is_degraded());
        let snapshot = health.snapshot(&[live_channel("calendar-a", now() + Duration::days(1))], now());
        assert_eq!(snapshot.status, HealthStatus::Degraded);
        assert_eq!(snapshot.degraded_reason.as_deref(), Some("token revoked"));
        assert!(snapshot.channels[0].last_error.as_deref().is_some_and(|e| e.contains("token revoked")));

        health.record_success("calendar-a", now());
        assert!(!health.is_degraded());
        let snapshot = health.snapshot(&[live_channel("calendar-a", now() + Duration::days(1))], now());
        assert_eq!(snapshot.status, HealthStatus::Ok);
        assert_eq!(snapshot.channels[0].last_success, Some(now()));
        assert!(snapshot.channels[0].last_error.is_none());
    }

    #[test]
    fn transient_failures_do_not_degrade() {
        let health = SyncHealth::new();
        health.record_failure(
            "calendar-a",
            &CalMirrorError::Provider(ProviderError::RetriesExhausted { attempts: 5, last_error: "503".into() }),
        );
        assert!(!health.is_degraded());
    }

    #[test]
    fn expired_live_channels_are_flagged() {
        let health = SyncHealth::new();
        let snapshot = health.snapshot(
            &[
                live_channel("calendar-old", now() - Duration::minutes(1)),
                live_channel("calendar-new", now() + Duration::days(2)),
            ],
            now(),
        );

        assert!(snapshot.channels[0].expired);
        assert!(!snapshot.channels[1].expired);
        assert!(snapshot.channels[1].last_success.is_none());
    }

    #[test]
    fn records_of_superseded_channels_are_pruned() {
        let health = SyncHealth::new();
        health.record_success("calendar-old", now());
        health.record_success("calendar-new", now());
        health.record_success("calendar-renewed", now());
        health.forget("calendar-renewed");

        let snapshot = health.snapshot(&[live_channel("calendar-new", now() + Duration::days(2))], now());

        assert_eq!(snapshot.channels.len(), 1);
        assert_eq!(health.state.read().channels.len(), 1);
        assert!(health.state.read().channels.contains_key("calendar-new"));
    }
}
