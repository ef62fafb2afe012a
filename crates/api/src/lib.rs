//! # calmirror API
//!
//! Process layer - wiring and main entry point.
//!
//! This crate contains:
//! - Application context (dependency injection)
//! - Logging setup
//! - Main entry point and startup sequence
//!
//! ## Architecture
//! - Depends on `common`, `domain`, `core`, and `infra`
//! - Wires up the hexagonal architecture

pub mod context;
pub mod utils;

pub use context::AppContext;
