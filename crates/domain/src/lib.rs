//! # calmirror Domain
//!
//! Domain types for the calendar mirror.
//!
//! This crate contains:
//! - Channel, mirror event and delta types
//! - Webhook notification model
//! - Error taxonomy and Result alias
//! - Configuration structures and constants
//!
//! ## Architecture
//! - Depends only on `calmirror-common` foundation helpers
//! - No I/O; pure data and validation

pub mod config;
pub mod constants;
pub mod errors;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
