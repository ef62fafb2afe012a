//! Scripted remote calendar

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use calmirror_core::CalendarRemote;
use calmirror_domain::{
    ChangeQuery, DeltaPage, ProviderError, RemoteEvent, TransientKind, WatchRequest, WatchResponse,
};
use chrono::{DateTime, Duration, Utc};

type Scripted<T> = Mutex<VecDeque<Result<T, ProviderError>>>;
type Hook = Box<dyn FnOnce() + Send>;

/// Answers calls from queued responses and records what was asked
///
/// `list_changes` fails with a transient error once its script runs dry so
/// a test never silently loops. `watch` falls back to a fresh resource id.
pub struct ScriptedRemote {
    pages: Scripted<DeltaPage>,
    watches: Scripted<WatchResponse>,
    stops: Scripted<()>,
    events: Mutex<HashMap<String, Result<RemoteEvent, ProviderError>>>,
    queries: Mutex<Vec<ChangeQuery>>,
    watch_requests: Mutex<Vec<WatchRequest>>,
    stop_calls: Mutex<Vec<(String, String)>>,
    watch_hook: Mutex<Option<Hook>>,
    list_hooks: Mutex<HashMap<usize, Hook>>,
    default_expiration: DateTime<Utc>,
}

impl ScriptedRemote {
    pub fn new(default_expiration: DateTime<Utc>) -> Self {
        Self {
            pages: Mutex::default(),
            watches: Mutex::default(),
            stops: Mutex::default(),
            events: Mutex::default(),
            queries: Mutex::default(),
            watch_requests: Mutex::default(),
            stop_calls: Mutex::default(),
            watch_hook: Mutex::default(),
            list_hooks: Mutex::default(),
            default_expiration,
        }
    }

    pub fn push_page(&self, page: Result<DeltaPage, ProviderError>) -> &Self {
        self.pages.lock().unwrap().push_back(page);
        self
    }

    pub fn push_watch(&self, response: Result<WatchResponse, ProviderError>) -> &Self {
        self.watches.lock().unwrap().push_back(response);
        self
    }

    pub fn push_stop(&self, response: Result<(), ProviderError>) -> &Self {
        self.stops.lock().unwrap().push_back(response);
        self
    }

    /// Run `hook` inside the next `watch` call, before it answers
    pub fn on_next_watch(&self, hook: impl FnOnce() + Send + 'static) {
        *self.watch_hook.lock().unwrap() = Some(Box::new(hook));
    }

    /// Run `hook` inside the `call`-th `list_changes` call (zero-based)
    pub fn on_list_call(&self, call: usize, hook: impl FnOnce() + Send + 'static) {
        self.list_hooks.lock().unwrap().insert(call, Box::new(hook));
    }

    pub fn set_event(&self, id: &str, response: Result<RemoteEvent, ProviderError>) {
        self.events.lock().unwrap().insert(id.to_string(), response);
    }

    pub fn queries(&self) -> Vec<ChangeQuery> {
        self.queries.lock().unwrap().clone()
    }

    pub fn watch_requests(&self) -> Vec<WatchRequest> {
        self.watch_requests.lock().unwrap().clone()
    }

    pub fn stop_calls(&self) -> Vec<(String, String)> {
        self.stop_calls.lock().unwrap().clone()
    }
}

pub fn page(items: Vec<RemoteEvent>, next_page: Option<&str>, next_sync: Option<&str>) -> DeltaPage {
    DeltaPage {
        items,
        next_page_token: next_page.map(str::to_string),
        next_sync_token: next_sync.map(str::to_string),
    }
}

pub fn unavailable() -> ProviderError {
    ProviderError::transient(TransientKind::Server { status: 503 }, "backend unavailable")
}

pub fn watch_response(resource_id: &str, expiration: DateTime<Utc>) -> WatchResponse {
    WatchResponse { resource_id: resource_id.to_string(), expiration }
}

#[async_trait]
impl CalendarRemote for ScriptedRemote {
    async fn list_changes(&self, _target_id: &str, query: &ChangeQuery) -> Result<DeltaPage, ProviderError> {
        let call = {
            let mut queries = self.queries.lock().unwrap();
            queries.push(query.clone());
            queries.len() - 1
        };
        let hook = self.list_hooks.lock().unwrap().remove(&call);
        if let Some(hook) = hook {
            hook();
        }
        self.pages.lock().unwrap().pop_front().unwrap_or_else(|| Err(unavailable()))
    }

    async fn watch(&self, request: &WatchRequest) -> Result<WatchResponse, ProviderError> {
        let hook = self.watch_hook.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
        let mut requests = self.watch_requests.lock().unwrap();
        requests.push(request.clone());
        let fallback = watch_response(&format!("res-{}", requests.len()), self.default_expiration);
        self.watches.lock().unwrap().pop_front().unwrap_or(Ok(fallback))
    }

    async fn stop(&self, channel_id: &str, resource_id: &str) -> Result<(), ProviderError> {
        self.stop_calls.lock().unwrap().push((channel_id.to_string(), resource_id.to_string()));
        self.stops.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    async fn get_event(&self, _target_id: &str, event_id: &str) -> Result<RemoteEvent, ProviderError> {
        self.events
            .lock()
            .unwrap()
            .get(event_id)
            .cloned()
            .unwrap_or_else(|| Err(ProviderError::EventGone { event_id: event_id.to_string() }))
    }
}

/// One week after `from`
pub fn week_after(from: DateTime<Utc>) -> DateTime<Utc> {
    from + Duration::days(7)
}
