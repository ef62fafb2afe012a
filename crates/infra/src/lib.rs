//! # calmirror Infrastructure
//!
//! Infrastructure implementations of core ports.
//!
//! This crate contains:
//! - SQLite repositories for channels and the event mirror
//! - The Google Calendar API client
//! - The axum webhook endpoint
//! - The cron-driven renewal scheduler
//! - Configuration loading and metrics
//!
//! ## Architecture
//! - Implements traits defined in `calmirror-core`
//! - Contains all "impure" code (I/O, network, timers)

pub mod config;
pub mod database;
pub mod errors;
pub mod http;
pub mod integrations;
pub mod observability;
pub mod scheduling;
pub mod webhook;

// Re-export commonly used items
pub use database::{DbManager, SqliteChannelRepository, SqliteMirrorStore};
pub use errors::InfraError;
pub use http::HttpClient;
pub use integrations::GoogleCalendarClient;
pub use observability::metrics::SyncMetrics;
pub use scheduling::{RenewalScheduler, RenewalSchedulerConfig};
pub use webhook::{WebhookServer, WebhookState};
