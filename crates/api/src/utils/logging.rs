//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

/// Output format of the log stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    /// `CALMIRROR_LOG_FORMAT=json` selects JSON lines; anything else is pretty
    pub fn from_env() -> Self {
        match std::env::var("CALMIRROR_LOG_FORMAT") {
            Ok(value) if value.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Install the global subscriber
///
/// The filter comes from `RUST_LOG`, defaulting to `info`. Calling this twice
/// is harmless; the second call leaves the first subscriber in place.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let installed = match format {
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
        LogFormat::Pretty => builder.try_init(),
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Log the outcome of a startup step with structured fields.
#[inline]
pub fn log_startup_step(step: &str, success: bool, detail: &str) {
    if success {
        tracing::info!(step, detail, "startup_step_complete");
    } else {
        tracing::warn!(step, detail, "startup_step_failed");
    }
}
