//! Inbound push notifications

use calmirror_common::SecretString;

use crate::constants::CALENDAR_CHANNEL_PREFIX;

/// `X-Goog-Resource-State`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceState {
    /// Handshake sent right after registration
    Sync,
    /// Something changed; fetch the delta
    Exists,
    /// The watched resource is gone
    NotExists,
    Unknown(String),
}

impl ResourceState {
    pub fn parse(value: &str) -> Self {
        match value {
            "sync" => Self::Sync,
            "exists" => Self::Exists,
            "not_exists" => Self::NotExists,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Sync => "sync",
            Self::Exists => "exists",
            Self::NotExists => "not_exists",
            Self::Unknown(other) => other,
        }
    }
}

/// Domain a channel belongs to, read from its id tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationTarget {
    Calendar,
    Unsupported(String),
}

impl NotificationTarget {
    pub fn from_channel_id(channel_id: &str) -> Self {
        if channel_id.starts_with(CALENDAR_CHANNEL_PREFIX) {
            return Self::Calendar;
        }
        let tag = channel_id.split_once('-').map_or(channel_id, |(tag, _)| tag);
        Self::Unsupported(tag.to_string())
    }
}

/// Headers of one push notification
#[derive(Debug, Clone)]
pub struct WebhookNotification {
    pub channel_id: String,
    pub resource_id: Option<String>,
    pub resource_state: ResourceState,
    pub channel_token: Option<SecretString>,
    pub message_number: Option<u64>,
    pub channel_expiration: Option<String>,
}

impl WebhookNotification {
    pub fn target(&self) -> NotificationTarget {
        NotificationTarget::from_channel_id(&self.channel_id)
    }
}
