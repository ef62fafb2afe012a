//! Observability infrastructure
//!
//! Lock-free counters for provider traffic and renewal jobs. Structured logs
//! go through `tracing`; these counters back the summary lines the scheduler
//! and the health endpoint emit.
//!
//! All record methods return `MetricsResult<()>` so callers can log and drop
//! a failed recording without aborting the operation being measured.

pub mod metrics;

/// Metrics error type
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Empty data set - cannot calculate aggregate metric
    #[error("Empty data: cannot calculate {metric}")]
    EmptyData {
        /// Metric name that failed (e.g., "average")
        metric: &'static str,
    },
}

/// Result type for metrics operations
pub type MetricsResult<T> = Result<T, MetricsError>;
