//! Application context - dependency injection container

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use calmirror_common::RetryConfig;
use calmirror_core::{
    CalendarRemote, ChannelRegistry, ChannelRenewalService, ChannelRepository, Clock, DeltaFetcher,
    FetchSettings, HealthService, MirrorStore, NotificationDispatcher, RegistrationSettings, RemoteCaller,
    SecretGuard, SyncCoordinator, SyncEngine, SyncHealth, SystemClock,
};
use calmirror_domain::{CalMirrorError, Config, ProviderConfig, RenewalReport, Result, SyncChannel};
use calmirror_infra::{
    DbManager, GoogleCalendarClient, RenewalScheduler, RenewalSchedulerConfig, SqliteChannelRepository,
    SqliteMirrorStore, SyncMetrics, WebhookServer, WebhookState,
};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Application context - holds all services and dependencies
pub struct AppContext {
    pub config: Config,
    pub db: Arc<DbManager>,
    pub metrics: Arc<SyncMetrics>,
    pub registry: Arc<ChannelRegistry>,
    pub coordinator: SyncCoordinator,
    pub engine: Arc<SyncEngine>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub health: Arc<HealthService>,
    renewal_scheduler: Mutex<RenewalScheduler>,
}

impl AppContext {
    /// Build every service from `config` against the production adapters
    ///
    /// # Errors
    /// Invalid configuration, database open/migration failures, or an
    /// unusable provider base URL.
    pub async fn new(config: Config) -> Result<Self> {
        let metrics = Arc::new(SyncMetrics::new());
        let remote: Arc<dyn CalendarRemote> = Arc::new(GoogleCalendarClient::new(&config.provider, Arc::clone(&metrics))?);
        Self::with_remote(config, remote, metrics).await
    }

    /// Same as [`Self::new`] with a caller-supplied calendar client
    ///
    /// # Errors
    /// See [`Self::new`].
    pub async fn with_remote(config: Config, remote: Arc<dyn CalendarRemote>, metrics: Arc<SyncMetrics>) -> Result<Self> {
        config.validate()?;

        let db = Arc::new(DbManager::new(&config.database.path, config.database.pool_size)?);
        db.run_migrations()?;
        db.health_check()?;

        let channels: Arc<dyn ChannelRepository> = Arc::new(SqliteChannelRepository::new(Arc::clone(&db)));
        let store: Arc<dyn MirrorStore> = Arc::new(SqliteMirrorStore::new(Arc::clone(&db)));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let sync_health = Arc::new(SyncHealth::new());
        let caller = RemoteCaller::new(retry_config(&config.provider)?, config.provider.request_timeout());

        let registry = Arc::new(ChannelRegistry::new(
            Arc::clone(&channels),
            Arc::clone(&remote),
            caller.clone(),
            Arc::clone(&clock),
            RegistrationSettings {
                callback_url: config.webhook.callback_url.clone(),
                token: config.webhook.shared_secret.clone(),
                ttl: config.renewal.channel_ttl(),
            },
        ));

        let fetcher = Arc::new(DeltaFetcher::new(
            Arc::clone(&channels),
            Arc::clone(&store),
            remote,
            caller,
            Arc::clone(&clock),
            Arc::clone(&sync_health),
            FetchSettings { page_size: config.sync.page_size, max_pages_per_run: config.sync.max_pages_per_run },
        ));
        let coordinator = SyncCoordinator::new(fetcher.clone());
        let engine = Arc::new(SyncEngine::new(store, fetcher, coordinator.clone(), Arc::clone(&clock)));

        let dispatcher = Arc::new(NotificationDispatcher::new(
            SecretGuard::new(config.webhook.shared_secret.clone()),
            Arc::clone(&registry),
            coordinator.clone(),
        ));
        let health = Arc::new(HealthService::new(Arc::clone(&sync_health), Arc::clone(&channels), Arc::clone(&clock)));

        let renewal = Arc::new(ChannelRenewalService::new(
            channels,
            Arc::clone(&registry),
            sync_health,
            clock,
            config.renewal.window(),
        ));
        let renewal_scheduler =
            RenewalScheduler::new(RenewalSchedulerConfig::from(&config.renewal), renewal, Arc::clone(&metrics));

        info!(
            database = %config.database.path,
            targets = config.targets.len(),
            "application context initialized"
        );

        Ok(Self {
            config,
            db,
            metrics,
            registry,
            coordinator,
            engine,
            dispatcher,
            health,
            renewal_scheduler: Mutex::new(renewal_scheduler),
        })
    }

    /// Make sure every configured target has a live channel and queue an
    /// initial sync for it
    ///
    /// A target that fails is logged and skipped; the next renewal tick or
    /// restart retries it.
    pub async fn ensure_channels(&self) -> Vec<SyncChannel> {
        let mut live = Vec::with_capacity(self.config.targets.len());
        for target_id in &self.config.targets {
            match self.registry.ensure_channel(target_id).await {
                Ok(channel) => {
                    self.coordinator.trigger(&channel);
                    live.push(channel);
                }
                Err(err) => error!(target_id = %target_id, error = %err, "failed to ensure channel"),
            }
        }
        live
    }

    /// Start the renewal cron job and run one pass right away
    ///
    /// # Errors
    /// Scheduler start failures (invalid cron expression, already running).
    pub async fn start_renewal(&self) -> Result<Option<RenewalReport>> {
        if !self.config.renewal.enabled {
            warn!("channel renewal disabled; channels will lapse at expiration");
            return Ok(None);
        }

        let mut scheduler = self.renewal_scheduler.lock().await;
        scheduler.start().await?;
        Ok(scheduler.run_now().await)
    }

    /// Webhook server bound to the configured address
    ///
    /// # Errors
    /// `Config` when `webhook.bind_addr` is not a socket address.
    pub fn webhook_server(&self) -> Result<WebhookServer> {
        let addr: SocketAddr = self
            .config
            .webhook
            .bind_addr
            .parse()
            .map_err(|e| CalMirrorError::Config(format!("webhook.bind_addr is invalid: {e}")))?;
        let state = WebhookState {
            dispatcher: Arc::clone(&self.dispatcher),
            health: Arc::clone(&self.health),
            metrics: Arc::clone(&self.metrics),
        };
        Ok(WebhookServer::new(addr, self.config.webhook.callback_path.clone(), state))
    }

    /// Stop background jobs
    ///
    /// In-flight channel syncs are left to finish; every page they commit is
    /// durable on its own.
    ///
    /// # Errors
    /// A scheduler that fails to stop within its timeout.
    pub async fn shutdown(&self) -> Result<()> {
        info!("shutdown called on AppContext");

        let mut scheduler = self.renewal_scheduler.lock().await;
        if scheduler.is_running() {
            scheduler.stop().await?;
        }
        Ok(())
    }

    pub async fn renewal_running(&self) -> bool {
        self.renewal_scheduler.lock().await.is_running()
    }
}

/// Retry budget for provider calls: exponential backoff with equal jitter
fn retry_config(provider: &ProviderConfig) -> Result<RetryConfig> {
    RetryConfig::builder()
        .max_attempts(provider.max_attempts)
        .exponential_backoff(
            Duration::from_millis(provider.base_backoff_ms),
            2.0,
            Duration::from_millis(provider.max_backoff_ms),
        )
        .equal_jitter()
        .build()
        .map_err(|e| CalMirrorError::Config(format!("invalid provider retry settings: {e:?}")))
}
