//! Infrastructure error conversions

pub mod conversions;

pub use conversions::{provider_error_from_http, provider_error_from_status, InfraError};
