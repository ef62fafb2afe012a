use std::time::Duration;

use calmirror_domain::{CalMirrorError, ProviderError};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client as ReqwestClient, Method, RequestBuilder, Response};
use tracing::debug;

use crate::errors::{provider_error_from_http, provider_error_from_status, InfraError};

/// Response bodies quoted in errors are cut to this many characters
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Thin reqwest wrapper shared by the provider integrations.
///
/// Sends exactly one attempt; retries and per-attempt deadlines belong to the
/// caller so a provider `Retry-After` can steer the backoff.
#[derive(Clone)]
pub struct HttpClient {
    client: ReqwestClient,
}

impl HttpClient {
    /// Start building a new HTTP client.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Convenience constructor with default configuration.
    pub fn new() -> Result<Self, CalMirrorError> {
        Self::builder().build()
    }

    /// Create a request builder using the underlying reqwest client.
    pub fn request<U>(&self, method: Method, url: U) -> RequestBuilder
    where
        U: reqwest::IntoUrl,
    {
        self.client.request(method, url)
    }

    /// Execute one request; any non-2xx status becomes a [`ProviderError`].
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, ProviderError> {
        let request = builder.build().map_err(provider_error_from_http)?;
        let method = request.method().clone();
        let url = request.url().clone();
        debug!(%method, url = %url.path(), "sending HTTP request");

        let response = self.client.execute(request).await.map_err(|err| {
            debug!(%method, url = %url.path(), error = %err, "HTTP request failed");
            provider_error_from_http(err)
        })?;

        let status = response.status();
        debug!(%method, url = %url.path(), %status, "received HTTP response");
        if status.is_success() {
            return Ok(response);
        }
        Err(error_from_response(response).await)
    }
}

/// Builder for [`HttpClient`].
#[derive(Debug)]
pub struct HttpClientBuilder {
    timeout: Duration,
    user_agent: Option<String>,
    default_headers: Option<HeaderMap>,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(30), user_agent: None, default_headers: None }
    }
}

impl HttpClientBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn default_headers(mut self, headers: HeaderMap) -> Self {
        self.default_headers = Some(headers);
        self
    }

    pub fn build(self) -> Result<HttpClient, CalMirrorError> {
        let mut builder = ReqwestClient::builder().timeout(self.timeout).no_proxy();

        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        if let Some(headers) = self.default_headers {
            builder = builder.default_headers(headers);
        }

        let client = builder.build().map_err(|err| CalMirrorError::from(InfraError::from(err)))?;
        Ok(HttpClient { client })
    }
}

async fn error_from_response(response: Response) -> ProviderError {
    let status = response.status();
    let retry_after = parse_retry_after(response.headers());
    let body = response.text().await.unwrap_or_default();
    let message = if body.is_empty() {
        status.to_string()
    } else {
        body.chars().take(MAX_ERROR_BODY_CHARS).collect()
    };
    provider_error_from_status(status, retry_after, message)
}

/// Delay-seconds form only; an HTTP-date falls back to computed backoff
fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()
}
