//! Conversions from external infrastructure errors into domain errors.

use calmirror_common::storage::StorageError;
use calmirror_domain::{CalMirrorError, ProviderError, TransientKind};
use reqwest::{Error as HttpError, StatusCode};
use rusqlite::Error as SqlError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub CalMirrorError);

impl From<InfraError> for CalMirrorError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<CalMirrorError> for InfraError {
    fn from(value: CalMirrorError) -> Self {
        InfraError(value)
    }
}

trait IntoCalMirrorError {
    fn into_calmirror(self) -> CalMirrorError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → CalMirrorError */
/* -------------------------------------------------------------------------- */

impl IntoCalMirrorError for SqlError {
    fn into_calmirror(self) -> CalMirrorError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => CalMirrorError::Database("database is busy".into()),
                    (ErrorCode::DatabaseLocked, _) => {
                        CalMirrorError::Database("database is locked".into())
                    }
                    (ErrorCode::ConstraintViolation, 2067 | 1555) => {
                        CalMirrorError::Database(format!("unique constraint violation: {message}"))
                    }
                    (ErrorCode::ConstraintViolation, 787) => {
                        CalMirrorError::Database("foreign key constraint violation".into())
                    }
                    _ => CalMirrorError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => CalMirrorError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                CalMirrorError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                CalMirrorError::Database(format!("invalid column type: {ty}"))
            }
            RE::InvalidPath(path) => {
                CalMirrorError::Database(format!("invalid database path: {}", path.to_string_lossy()))
            }
            other => CalMirrorError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_calmirror())
    }
}

/* -------------------------------------------------------------------------- */
/* StorageError → CalMirrorError */
/* -------------------------------------------------------------------------- */

impl IntoCalMirrorError for StorageError {
    fn into_calmirror(self) -> CalMirrorError {
        match self {
            StorageError::Rusqlite(err) => err.into_calmirror(),
            StorageError::Timeout(secs) => {
                CalMirrorError::Database(format!("connection pool timed out after {secs}s"))
            }
            other => CalMirrorError::Database(other.to_string()),
        }
    }
}

impl From<StorageError> for InfraError {
    fn from(value: StorageError) -> Self {
        InfraError(value.into_calmirror())
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → ProviderError */
/* -------------------------------------------------------------------------- */

/// Classify a reqwest failure
///
/// Transport-level failures are transient; status errors go through
/// [`provider_error_from_status`].
pub fn provider_error_from_http(err: HttpError) -> ProviderError {
    if err.is_timeout() {
        return ProviderError::transient(TransientKind::Timeout, "HTTP request timed out");
    }
    if err.is_connect() || err.is_request() {
        return ProviderError::transient(TransientKind::Connection, err.to_string());
    }
    if err.is_decode() || err.is_body() {
        return ProviderError::Decode { message: err.to_string() };
    }
    match err.status() {
        Some(status) => provider_error_from_status(status, None, err.to_string()),
        None => ProviderError::transient(TransientKind::Connection, err.to_string()),
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(CalMirrorError::Provider(provider_error_from_http(value)))
    }
}

/// Classify a non-success calendar API response
///
/// `410 Gone` on a list request means the sync token is no longer valid; the
/// single-event path turns 404/410 into `EventGone` itself.
pub fn provider_error_from_status(
    status: StatusCode,
    retry_after_secs: Option<u64>,
    message: String,
) -> ProviderError {
    match status.as_u16() {
        401 | 403 if !is_rate_limit_message(&message) => ProviderError::AuthFailure { message },
        403 | 429 => ProviderError::transient(
            TransientKind::RateLimited { retry_after_secs },
            message,
        ),
        410 => ProviderError::InvalidSyncToken,
        code @ 500..=599 => ProviderError::transient(TransientKind::Server { status: code }, message),
        408 => ProviderError::transient(TransientKind::Timeout, message),
        code => ProviderError::Rejected { status: code, message },
    }
}

/// Google reports quota exhaustion as 403 with a rate-limit reason
fn is_rate_limit_message(message: &str) -> bool {
    message.contains("rateLimitExceeded") || message.contains("userRateLimitExceeded")
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
