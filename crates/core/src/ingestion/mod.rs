//! Webhook notification handling
//!
//! Transport-free: the HTTP boundary parses headers into a
//! [`calmirror_domain::WebhookNotification`] and maps [`DispatchOutcome`] /
//! [`DispatchError`] to status codes.

pub mod dispatcher;
pub mod guard;

pub use dispatcher::{DispatchError, DispatchOutcome, NotificationDispatcher};
pub use guard::SecretGuard;
