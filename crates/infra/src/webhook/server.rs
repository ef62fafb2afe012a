//! axum boundary for provider push notifications.
//!
//! The handler only turns headers into a [`WebhookNotification`] and maps the
//! dispatch outcome to a status code. The secret is checked before any other
//! header is looked at, so an unauthenticated caller always gets 403.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use calmirror_common::SecretString;
use calmirror_core::{DispatchError, HealthService, NotificationDispatcher};
use calmirror_domain::constants::{
    HEADER_CHANNEL_EXPIRATION, HEADER_CHANNEL_ID, HEADER_CHANNEL_TOKEN, HEADER_MESSAGE_NUMBER,
    HEADER_RESOURCE_ID, HEADER_RESOURCE_STATE,
};
use calmirror_domain::{CalMirrorError, HealthSnapshot, ResourceState, Result, WebhookNotification};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::observability::metrics::{SyncMetrics, SyncMetricsSnapshot};

#[derive(Clone)]
pub struct WebhookState {
    pub dispatcher: Arc<NotificationDispatcher>,
    pub health: Arc<HealthService>,
    pub metrics: Arc<SyncMetrics>,
}

/// `/health` body: the sync snapshot plus provider and renewal counters
#[derive(Serialize)]
struct HealthBody {
    #[serde(flatten)]
    snapshot: HealthSnapshot,
    metrics: SyncMetricsSnapshot,
}

pub struct WebhookServer {
    addr: SocketAddr,
    callback_path: String,
    state: WebhookState,
}

impl WebhookServer {
    pub fn new(addr: SocketAddr, callback_path: impl Into<String>, state: WebhookState) -> Self {
        Self { addr, callback_path: callback_path.into(), state }
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests
    ///
    /// # Errors
    /// `Network` when the address cannot be bound or the server fails.
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = build_router(&self.callback_path, self.state);
        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| CalMirrorError::Network(format!("failed to bind {}: {e}", self.addr)))?;
        info!(addr = %self.addr, path = %self.callback_path, "webhook server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| CalMirrorError::Network(format!("webhook server failed: {e}")))?;

        info!("webhook server stopped");
        Ok(())
    }
}

pub fn build_router(callback_path: &str, state: WebhookState) -> Router {
    Router::new()
        .route(callback_path, post(handle_notification))
        .route("/health", get(handle_health))
        .with_state(state)
}

async fn handle_notification(State(state): State<WebhookState>, headers: HeaderMap) -> StatusCode {
    if let Err(err) = state.dispatcher.authorize(header(&headers, HEADER_CHANNEL_TOKEN)) {
        warn!(reason = %err, "webhook rejected");
        return StatusCode::FORBIDDEN;
    }

    let Some(notification) = parse_notification(&headers) else {
        warn!("webhook missing channel id or resource state");
        return StatusCode::BAD_REQUEST;
    };

    match state.dispatcher.dispatch(&notification).await {
        Ok(outcome) => {
            debug!(?outcome, "notification handled");
            StatusCode::OK
        }
        Err(DispatchError::Unauthorized(_)) => StatusCode::FORBIDDEN,
        Err(DispatchError::Internal(err)) => {
            error!(error = %err, channel_id = %notification.channel_id, "notification handling failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn handle_health(State(state): State<WebhookState>) -> Response {
    match state.health.report().await {
        Ok(snapshot) => Json(HealthBody { snapshot, metrics: state.metrics.snapshot() }).into_response(),
        Err(err) => {
            error!(error = %err, "health report failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok()).map(str::trim)
}

fn parse_notification(headers: &HeaderMap) -> Option<WebhookNotification> {
    let channel_id = header(headers, HEADER_CHANNEL_ID).filter(|v| !v.is_empty())?;
    let state = header(headers, HEADER_RESOURCE_STATE).filter(|v| !v.is_empty())?;

    Some(WebhookNotification {
        channel_id: channel_id.to_string(),
        resource_id: header(headers, HEADER_RESOURCE_ID).map(str::to_string),
        resource_state: ResourceState::parse(state),
        channel_token: header(headers, HEADER_CHANNEL_TOKEN).map(SecretString::from),
        message_number: header(headers, HEADER_MESSAGE_NUMBER).and_then(|v| v.parse().ok()),
        channel_expiration: header(headers, HEADER_CHANNEL_EXPIRATION).map(str::to_string),
    })
}
