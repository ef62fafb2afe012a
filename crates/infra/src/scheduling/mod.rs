//! Scheduling infrastructure for background jobs
//!
//! The renewal scheduler follows the runtime rules shared by every
//! long-running task here:
//! - Explicit lifecycle management (start/stop)
//! - Join handles for spawned tasks
//! - Cancellation token support
//! - Timeout wrapping on all async operations

pub mod error;
pub mod renewal_scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use renewal_scheduler::{RenewalScheduler, RenewalSchedulerConfig, RenewalTask};
