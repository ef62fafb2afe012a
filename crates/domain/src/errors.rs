//! Error types used throughout the application

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for calmirror
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum CalMirrorError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Live channel already exists for target {target_id}")]
    ChannelConflict { target_id: String },

    /// The channel stopped being live (renewed or retired) under the caller
    #[error("Channel {channel_id} is no longer live")]
    ChannelSuperseded { channel_id: String },

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CalMirrorError {
    /// Provider error carried by this error, if any
    pub fn provider(&self) -> Option<&ProviderError> {
        match self {
            Self::Provider(err) => Some(err),
            _ => None,
        }
    }
}

/// Result type alias for calmirror operations
pub type Result<T> = std::result::Result<T, CalMirrorError>;

/// Why a provider call failed in a way that may succeed on retry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransientKind {
    /// HTTP 429 or a rate-limit 403 (`retry_after_secs` from `Retry-After`)
    RateLimited { retry_after_secs: Option<u64> },
    /// HTTP 5xx
    Server { status: u16 },
    /// Connection refused/reset, DNS, TLS
    Connection,
    /// The call did not finish within its deadline
    Timeout,
}

/// Failures reported by the remote calendar provider
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum ProviderError {
    #[error("Transient provider failure ({kind:?}): {message}")]
    Transient { kind: TransientKind, message: String },

    /// HTTP 410 Gone: the stored sync token (or page cursor) is no longer valid
    #[error("Sync token rejected by provider")]
    InvalidSyncToken,

    #[error("Event {event_id} no longer exists")]
    EventGone { event_id: String },

    #[error("Provider rejected credentials: {message}")]
    AuthFailure { message: String },

    /// Non-retryable 4xx other than 401/403/404/410
    #[error("Provider rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Provider still failing after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("Failed to decode provider response: {message}")]
    Decode { message: String },
}

impl ProviderError {
    pub fn transient(kind: TransientKind, message: impl Into<String>) -> Self {
        Self::Transient { kind, message: message.into() }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Provider-requested delay before the next attempt
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Transient {
                kind: TransientKind::RateLimited { retry_after_secs: Some(secs) }, ..
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

/// Rejection of an inbound webhook before any state is touched
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookAuthError {
    #[error("Channel token header missing")]
    MissingToken,

    #[error("Channel token does not match")]
    Mismatch,
}
