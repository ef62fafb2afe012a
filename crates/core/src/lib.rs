//! # calmirror Core
//!
//! Sync engine logic - no infrastructure dependencies.
//!
//! This crate contains:
//! - Port interfaces for channel state, the event mirror and the remote
//!   calendar
//! - The pure reconciler
//! - Channel registration, delta fetching, notification dispatch and renewal
//!   services
//!
//! ## Architecture Principles
//! - Only depends on `calmirror-common` and `calmirror-domain`
//! - No database, HTTP, or scheduler code
//! - All external dependencies via traits
//! - Time comes from the [`ports::Clock`] port so tests stay deterministic

pub mod channels;
pub mod health;
pub mod ingestion;
pub mod ports;
pub mod reconcile;
pub mod remote;
pub mod renewal;
pub mod sync;

pub use channels::{ChannelRegistry, RegistrationSettings};
pub use health::{HealthService, SyncHealth};
pub use ingestion::{DispatchError, DispatchOutcome, NotificationDispatcher, SecretGuard};
pub use ports::{CalendarRemote, ChannelRepository, Clock, MirrorStore, SystemClock};
pub use reconcile::{reconcile, Reconciliation};
pub use remote::{ProviderRetryPolicy, RemoteCaller};
pub use renewal::ChannelRenewalService;
pub use sync::{ChannelSync, DeltaFetcher, FetchSettings, SyncCoordinator, SyncEngine, TriggerOutcome};
