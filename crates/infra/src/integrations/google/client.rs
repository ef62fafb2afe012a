//! Google Calendar API v3 client implementing the `CalendarRemote` port.
//!
//! One HTTP attempt per call; retries, per-attempt deadlines and
//! `Retry-After` handling live in the core `RemoteCaller`.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use calmirror_common::SecretString;
use calmirror_core::CalendarRemote;
use calmirror_domain::{
    CalMirrorError, ChangeQuery, DeltaPage, ProviderConfig, ProviderError, RemoteEvent, WatchRequest,
    WatchResponse,
};
use chrono::SecondsFormat;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};
use url::Url;

use super::types::{ChannelResource, EventsPage, GoogleEvent, StopBody, WatchBody, WatchParams};
use crate::http::HttpClient;
use crate::observability::metrics::SyncMetrics;

type ProviderResult<T> = std::result::Result<T, ProviderError>;

pub struct GoogleCalendarClient {
    http: HttpClient,
    api_base: Url,
    access_token: SecretString,
    metrics: Arc<SyncMetrics>,
}

impl GoogleCalendarClient {
    /// Build a client from provider configuration
    ///
    /// # Errors
    /// `Config` when `api_base` is not an absolute URL; errors building the
    /// underlying HTTP client.
    pub fn new(config: &ProviderConfig, metrics: Arc<SyncMetrics>) -> calmirror_domain::Result<Self> {
        let api_base = Url::parse(&config.api_base)
            .map_err(|e| CalMirrorError::Config(format!("provider.api_base is not a URL: {e}")))?;
        if api_base.cannot_be_a_base() {
            return Err(CalMirrorError::Config("provider.api_base cannot be a base URL".into()));
        }

        let http = HttpClient::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("calmirror/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { http, api_base, access_token: config.access_token.clone(), metrics })
    }

    /// `{api_base}/{segments...}` with every segment percent-encoded
    fn endpoint(&self, segments: &[&str]) -> ProviderResult<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|()| ProviderError::Rejected { status: 0, message: "invalid API base URL".into() })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, method: Method, url: Url) -> RequestBuilder {
        self.http.request(method, url).bearer_auth(self.access_token.expose())
    }

    /// Send, decode and record metrics for one call
    async fn execute<T: DeserializeOwned>(&self, builder: RequestBuilder) -> ProviderResult<T> {
        let started = Instant::now();
        let result = match self.http.send(builder).await {
            Ok(response) => response.json::<T>().await.map_err(crate::errors::provider_error_from_http),
            Err(err) => Err(err),
        };
        self.observe(started, result.as_ref().err());
        result
    }

    /// Like [`Self::execute`] for endpoints that answer with an empty body
    async fn execute_empty(&self, builder: RequestBuilder) -> ProviderResult<()> {
        let started = Instant::now();
        let result = self.http.send(builder).await.map(|_| ());
        self.observe(started, result.as_ref().err());
        result
    }

    fn observe(&self, started: Instant, error: Option<&ProviderError>) {
        if let Err(e) = self.metrics.provider.record_call(started.elapsed()) {
            warn!(error = %e, "failed to record provider call");
        }
        if let Some(err) = error {
            if let Err(e) = self.metrics.provider.record_error(err) {
                warn!(error = %e, "failed to record provider error");
            }
        }
    }
}

#[async_trait]
impl CalendarRemote for GoogleCalendarClient {
    #[instrument(skip(self, query), fields(full = query.is_full(), has_page = query.page_token.is_some()))]
    async fn list_changes(&self, target_id: &str, query: &ChangeQuery) -> ProviderResult<DeltaPage> {
        let url = self.endpoint(&["calendars", target_id, "events"])?;
        let mut params: Vec<(&str, String)> = vec![
            ("maxResults", query.page_size.to_string()),
            ("showDeleted", "true".to_string()),
            ("singleEvents", "false".to_string()),
        ];
        match (&query.sync_token, query.time_min) {
            (Some(token), _) => params.push(("syncToken", token.clone())),
            (None, Some(time_min)) => {
                params.push(("timeMin", time_min.to_rfc3339_opts(SecondsFormat::Secs, true)));
            }
            (None, None) => {}
        }
        if let Some(page) = &query.page_token {
            params.push(("pageToken", page.clone()));
        }

        let page: EventsPage = self.execute(self.authorized(Method::GET, url).query(&params)).await?;
        let items = page.items.into_iter().map(GoogleEvent::into_remote).collect::<ProviderResult<Vec<_>>>()?;
        debug!(items = items.len(), last = page.next_page_token.is_none(), "change page received");

        Ok(DeltaPage {
            items,
            next_page_token: page.next_page_token,
            next_sync_token: page.next_sync_token,
        })
    }

    #[instrument(skip(self, request), fields(channel_id = %request.channel_id, target_id = %request.target_id))]
    async fn watch(&self, request: &WatchRequest) -> ProviderResult<WatchResponse> {
        let url = self.endpoint(&["calendars", &request.target_id, "events", "watch"])?;
        let body = WatchBody {
            id: &request.channel_id,
            kind: "web_hook",
            address: &request.callback_url,
            token: request.token.expose(),
            params: WatchParams { ttl: request.ttl.as_secs().to_string() },
        };

        let resource: ChannelResource = self.execute(self.authorized(Method::POST, url).json(&body)).await?;
        let expiration = resource.expiration()?;
        let resource_id = resource
            .resource_id
            .ok_or_else(|| ProviderError::Decode { message: "watch response without resourceId".into() })?;
        debug!(%resource_id, %expiration, "channel registered with provider");
        Ok(WatchResponse { resource_id, expiration })
    }

    #[instrument(skip(self))]
    async fn stop(&self, channel_id: &str, resource_id: &str) -> ProviderResult<()> {
        let url = self.endpoint(&["channels", "stop"])?;
        let body = StopBody { id: channel_id, resource_id };
        self.execute_empty(self.authorized(Method::POST, url).json(&body)).await
    }

    #[instrument(skip(self))]
    async fn get_event(&self, target_id: &str, event_id: &str) -> ProviderResult<RemoteEvent> {
        let url = self.endpoint(&["calendars", target_id, "events", event_id])?;
        match self.execute::<GoogleEvent>(self.authorized(Method::GET, url)).await {
            Ok(event) => event.into_remote(),
            // On the single-event path 404 and 410 both mean the event is gone.
            Err(ProviderError::InvalidSyncToken | ProviderError::Rejected { status: 404, .. }) => {
                Err(ProviderError::EventGone { event_id: event_id.to_string() })
            }
            Err(err) => Err(err),
        }
    }
}
