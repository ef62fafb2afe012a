//! Inbound push notification endpoint

pub mod server;

pub use server::{build_router, WebhookServer, WebhookState};
