//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If a required variable is missing, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! Required:
//! - `CALMIRROR_PROVIDER_ACCESS_TOKEN`: Bearer token for the calendar API
//! - `CALMIRROR_WEBHOOK_CALLBACK_URL`: Public URL the provider posts to
//! - `CALMIRROR_WEBHOOK_SECRET`: Shared channel token
//!
//! Optional (defaults from `calmirror_domain::config`):
//! - `CALMIRROR_DB_PATH`, `CALMIRROR_DB_POOL_SIZE`
//! - `CALMIRROR_PROVIDER_API_BASE`, `CALMIRROR_PROVIDER_TIMEOUT_SECS`,
//!   `CALMIRROR_PROVIDER_MAX_ATTEMPTS`
//! - `CALMIRROR_WEBHOOK_BIND_ADDR`, `CALMIRROR_WEBHOOK_CALLBACK_PATH`
//! - `CALMIRROR_RENEWAL_ENABLED`, `CALMIRROR_RENEWAL_CRON`,
//!   `CALMIRROR_RENEWAL_WINDOW_HOURS`, `CALMIRROR_CHANNEL_TTL_HOURS`
//! - `CALMIRROR_SYNC_PAGE_SIZE`
//! - `CALMIRROR_TARGETS`: comma-separated calendar ids
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./calmirror.toml` or `./calmirror.json` (current working directory)
//! 2. `./config.toml` or `./config.json`
//! 3. Parent directory, then relative to the executable location

use std::path::{Path, PathBuf};
use std::str::FromStr;

use calmirror_domain::{CalMirrorError, Config, Result};
use serde_json::{json, Map, Value};

const FILE_NAMES: [&str; 4] = ["calmirror.toml", "calmirror.json", "config.toml", "config.json"];

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If any required
/// variables are missing, falls back to loading from a config file.
///
/// # Errors
/// Returns `CalMirrorError::Config` if neither source yields a configuration.
pub fn load() -> Result<Config> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// # Errors
/// Returns `CalMirrorError::Config` if a required variable is missing or a
/// value does not parse.
pub fn load_from_env() -> Result<Config> {
    let access_token = env_var("CALMIRROR_PROVIDER_ACCESS_TOKEN")?;
    let callback_url = env_var("CALMIRROR_WEBHOOK_CALLBACK_URL")?;
    let shared_secret = env_var("CALMIRROR_WEBHOOK_SECRET")?;

    let mut database = Map::new();
    database.insert("path".into(), json!(env_opt("CALMIRROR_DB_PATH").unwrap_or_else(|| "calmirror.db".into())));
    insert_opt(&mut database, "pool_size", env_parse::<u32>("CALMIRROR_DB_POOL_SIZE")?.map(Value::from));

    let mut provider = Map::new();
    provider.insert("access_token".into(), json!(access_token));
    insert_opt(&mut provider, "api_base", env_opt("CALMIRROR_PROVIDER_API_BASE").map(Value::from));
    insert_opt(
        &mut provider,
        "request_timeout_secs",
        env_parse::<u64>("CALMIRROR_PROVIDER_TIMEOUT_SECS")?.map(Value::from),
    );
    insert_opt(&mut provider, "max_attempts", env_parse::<u32>("CALMIRROR_PROVIDER_MAX_ATTEMPTS")?.map(Value::from));

    let mut webhook = Map::new();
    webhook.insert("callback_url".into(), json!(callback_url));
    webhook.insert("shared_secret".into(), json!(shared_secret));
    insert_opt(&mut webhook, "bind_addr", env_opt("CALMIRROR_WEBHOOK_BIND_ADDR").map(Value::from));
    insert_opt(&mut webhook, "callback_path", env_opt("CALMIRROR_WEBHOOK_CALLBACK_PATH").map(Value::from));

    let mut renewal = Map::new();
    renewal.insert("enabled".into(), json!(env_bool("CALMIRROR_RENEWAL_ENABLED", true)));
    insert_opt(&mut renewal, "cron_expression", env_opt("CALMIRROR_RENEWAL_CRON").map(Value::from));
    insert_opt(&mut renewal, "window_hours", env_parse::<u64>("CALMIRROR_RENEWAL_WINDOW_HOURS")?.map(Value::from));
    insert_opt(
        &mut renewal,
        "channel_ttl_hours",
        env_parse::<u64>("CALMIRROR_CHANNEL_TTL_HOURS")?.map(Value::from),
    );

    let mut sync = Map::new();
    insert_opt(&mut sync, "page_size", env_parse::<u32>("CALMIRROR_SYNC_PAGE_SIZE")?.map(Value::from));

    let mut root = Map::new();
    root.insert("database".into(), Value::Object(database));
    root.insert("provider".into(), Value::Object(provider));
    root.insert("webhook".into(), Value::Object(webhook));
    root.insert("renewal".into(), Value::Object(renewal));
    root.insert("sync".into(), Value::Object(sync));
    if let Some(targets) = env_opt("CALMIRROR_TARGETS") {
        let targets: Vec<&str> = targets.split(',').map(str::trim).filter(|t| !t.is_empty()).collect();
        root.insert("targets".into(), json!(targets));
    }

    serde_json::from_value(Value::Object(root))
        .map_err(|e| CalMirrorError::Config(format!("Invalid environment configuration: {e}")))
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations. Format is detected by
/// file extension.
///
/// # Errors
/// Returns `CalMirrorError::Config` if the file is missing or does not parse.
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(CalMirrorError::Config(format!("Config file not found: {}", p.display())));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            CalMirrorError::Config("No config file found in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| CalMirrorError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents).map_err(|e| CalMirrorError::Config(format!("Invalid TOML format: {e}"))),
        "json" => {
            serde_json::from_str(contents).map_err(|e| CalMirrorError::Config(format!("Invalid JSON format: {e}")))
        }
        _ => Err(CalMirrorError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe the standard locations for a configuration file
///
/// Returns the first existing file, or `None`.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut dirs = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd.clone());
        dirs.push(cwd.join(".."));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            dirs.push(exe_dir.to_path_buf());
            dirs.push(exe_dir.join(".."));
        }
    }

    dirs.iter().flat_map(|dir| FILE_NAMES.iter().map(move |name| dir.join(name))).find(|path| path.exists())
}

fn env_var(key: &str) -> Result<String> {
    env_opt(key).ok_or_else(|| CalMirrorError::Config(format!("Missing required environment variable: {key}")))
}

/// Set and non-blank
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_opt(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| CalMirrorError::Config(format!("Invalid value for {key}: {e}")))
        })
        .transpose()
}

/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map_or(default, |s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

fn insert_opt(map: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        map.insert(key.to_string(), value);
    }
}
