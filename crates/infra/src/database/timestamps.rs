//! Timestamp encoding for text columns

use calmirror_domain::{CalMirrorError, Result};
use chrono::{DateTime, SecondsFormat, Utc};

/// Fixed-width RFC 3339 so text order matches time order
pub(crate) fn encode(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn encode_opt(at: Option<DateTime<Utc>>) -> Option<String> {
    at.map(encode)
}

pub(crate) fn decode(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| CalMirrorError::Database(format!("invalid stored timestamp {raw:?}: {e}")))
}

pub(crate) fn decode_opt(raw: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    raw.map(decode).transpose()
}
