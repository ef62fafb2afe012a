//! Modular common utilities shared across calmirror crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: retry/backoff policy, secret handling
//! - `platform`: pooled SQLite storage

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod resilience;
#[cfg(feature = "foundation")]
pub mod security;

// Platform tier
// -------------------------------------------------------------------
#[cfg(feature = "platform")]
pub mod storage;

#[cfg(feature = "foundation")]
pub use resilience::{
    BackoffStrategy, Jitter, RetryConfig, RetryConfigBuilder, RetryDecision, RetryError,
    RetryExecutor, RetryPolicy, RetryResult,
};
#[cfg(feature = "foundation")]
pub use security::{constant_time_eq, SecretString};
