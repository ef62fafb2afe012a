//! Application configuration
//!
//! Loaded by `calmirror-infra::config::loader` from `CALMIRROR_*` environment
//! variables or a TOML/JSON file. Secrets are [`SecretString`] so the whole
//! struct can be logged with `{:?}`.

use std::time::Duration;

use calmirror_common::SecretString;
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CALLBACK_PATH, DEFAULT_PAGE_SIZE, DEFAULT_RENEWAL_CRON, DEFAULT_RENEWAL_WINDOW_HOURS,
    DEFAULT_TARGET_ID, GOOGLE_CALENDAR_API_BASE, MAX_CHANNEL_TTL_HOURS,
};
use crate::errors::{CalMirrorError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    pub provider: ProviderConfig,
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub renewal: RenewalConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    /// Calendars to keep a live channel for
    #[serde(default = "default_targets")]
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Bearer token for the calendar API
    pub access_token: SecretString,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Attempts per remote call, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Public HTTPS URL the provider posts notifications to
    pub callback_url: String,
    #[serde(default = "default_callback_path")]
    pub callback_path: String,
    /// Sent as the channel token at registration, verified on every push
    pub shared_secret: SecretString,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewalConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds-first cron expression
    #[serde(default = "default_renewal_cron")]
    pub cron_expression: String,
    #[serde(default = "default_window_hours")]
    pub window_hours: u64,
    /// Lifetime requested for new channels
    #[serde(default = "default_channel_ttl_hours")]
    pub channel_ttl_hours: u64,
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// `maxResults` per change-feed page
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Upper bound on pages per run, guards against a cursor loop
    #[serde(default = "default_max_pages_per_run")]
    pub max_pages_per_run: u32,
}

impl Config {
    /// Reject configurations that would misbehave at runtime
    ///
    /// # Errors
    /// Returns `CalMirrorError::Config` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.provider.access_token.is_empty() {
            return Err(CalMirrorError::Config("provider.access_token is empty".into()));
        }
        if self.webhook.shared_secret.is_empty() {
            return Err(CalMirrorError::Config("webhook.shared_secret is empty".into()));
        }
        if self.webhook.callback_url.is_empty() {
            return Err(CalMirrorError::Config("webhook.callback_url is empty".into()));
        }
        if !self.webhook.callback_path.starts_with('/') {
            return Err(CalMirrorError::Config("webhook.callback_path must start with '/'".into()));
        }
        if self.provider.max_attempts == 0 {
            return Err(CalMirrorError::Config("provider.max_attempts must be at least 1".into()));
        }
        if self.renewal.channel_ttl_hours == 0
            || self.renewal.channel_ttl_hours > MAX_CHANNEL_TTL_HOURS
        {
            return Err(CalMirrorError::Config(format!(
                "renewal.channel_ttl_hours must be within 1..={MAX_CHANNEL_TTL_HOURS}"
            )));
        }
        // A window at least as long as the TTL would renew every channel on every tick.
        if self.renewal.window_hours >= self.renewal.channel_ttl_hours {
            return Err(CalMirrorError::Config(
                "renewal.window_hours must be shorter than renewal.channel_ttl_hours".into(),
            ));
        }
        if self.sync.page_size == 0 || self.sync.max_pages_per_run == 0 {
            return Err(CalMirrorError::Config("sync limits must be positive".into()));
        }
        if self.targets.is_empty() || self.targets.iter().any(String::is_empty) {
            return Err(CalMirrorError::Config("targets must be non-empty calendar ids".into()));
        }
        Ok(())
    }
}

impl ProviderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl RenewalConfig {
    pub fn window(&self) -> chrono::Duration {
        i64::try_from(self.window_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
            .unwrap_or(chrono::Duration::MAX)
    }

    pub fn channel_ttl(&self) -> Duration {
        Duration::from_secs(self.channel_ttl_hours * 3600)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "calmirror.db".to_string(), pool_size: default_pool_size() }
    }
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cron_expression: default_renewal_cron(),
            window_hours: default_window_hours(),
            channel_ttl_hours: default_channel_ttl_hours(),
            job_timeout_secs: default_job_timeout_secs(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { page_size: default_page_size(), max_pages_per_run: default_max_pages_per_run() }
    }
}

fn default_targets() -> Vec<String> {
    vec![DEFAULT_TARGET_ID.to_string()]
}

const fn default_pool_size() -> u32 {
    8
}

fn default_api_base() -> String {
    GOOGLE_CALENDAR_API_BASE.to_string()
}

const fn default_request_timeout_secs() -> u64 {
    30
}

const fn default_max_attempts() -> u32 {
    5
}

const fn default_base_backoff_ms() -> u64 {
    500
}

const fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_callback_path() -> String {
    DEFAULT_CALLBACK_PATH.to_string()
}

const fn default_true() -> bool {
    true
}

fn default_renewal_cron() -> String {
    DEFAULT_RENEWAL_CRON.to_string()
}

const fn default_window_hours() -> u64 {
    DEFAULT_RENEWAL_WINDOW_HOURS
}

const fn default_channel_ttl_hours() -> u64 {
    MAX_CHANNEL_TTL_HOURS
}

const fn default_job_timeout_secs() -> u64 {
    300
}

const fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

const fn default_max_pages_per_run() -> u32 {
    1000
}
