//! Cron-driven channel renewal.
//!
//! Each tick asks the renewal service to replace every live channel close to
//! expiry. Ticks never overlap: a tick that finds the previous one still
//! running is skipped. Every tick is bounded by `job_timeout` and aborted on
//! cancellation; `stop` waits up to `drain_timeout` for an in-flight tick to
//! let go before returning.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use calmirror_infra::observability::metrics::SyncMetrics;
//! use calmirror_infra::scheduling::{RenewalScheduler, RenewalSchedulerConfig, SchedulerResult};
//!
//! # async fn example() -> SchedulerResult<()> {
//! # let renewal: Arc<calmirror_core::ChannelRenewalService> = todo!();
//! let mut scheduler = RenewalScheduler::new(
//!     RenewalSchedulerConfig { cron_expression: "0 0 */3 * * *".into(), ..Default::default() },
//!     renewal,
//!     Arc::new(SyncMetrics::new()),
//! );
//!
//! scheduler.start().await?;
//! // ... application runs ...
//! scheduler.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use calmirror_core::ChannelRenewalService;
use calmirror_domain::{RenewalConfig, RenewalReport, Result};
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::observability::metrics::SyncMetrics;
use crate::observability::MetricsResult;
use crate::scheduling::error::{SchedulerError, SchedulerResult};

/// One renewal pass
#[async_trait]
pub trait RenewalTask: Send + Sync {
    async fn run(&self) -> Result<RenewalReport>;
}

#[async_trait]
impl RenewalTask for ChannelRenewalService {
    async fn run(&self) -> Result<RenewalReport> {
        self.renew_due().await
    }
}

/// Configuration for the renewal scheduler.
#[derive(Debug, Clone)]
pub struct RenewalSchedulerConfig {
    /// Seconds-first cron expression describing the execution schedule.
    pub cron_expression: String,
    /// Timeout applied to a single renewal pass.
    pub job_timeout: Duration,
    /// Timeout for starting the underlying scheduler.
    pub start_timeout: Duration,
    /// Timeout for stopping the scheduler.
    pub stop_timeout: Duration,
    /// How long `stop` waits for an in-flight tick to wind down.
    pub drain_timeout: Duration,
}

impl Default for RenewalSchedulerConfig {
    fn default() -> Self {
        Self {
            cron_expression: "0 0 */3 * * *".into(), // every 3 hours
            job_timeout: Duration::from_secs(300),
            start_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&RenewalConfig> for RenewalSchedulerConfig {
    fn from(config: &RenewalConfig) -> Self {
        Self {
            cron_expression: config.cron_expression.clone(),
            job_timeout: config.job_timeout(),
            ..Self::default()
        }
    }
}

/// Context shared by every tick of the job
#[derive(Clone)]
struct TickContext {
    task: Arc<dyn RenewalTask>,
    metrics: Arc<SyncMetrics>,
    busy: Arc<Mutex<()>>,
    cancel: CancellationToken,
    job_timeout: Duration,
}

/// Renewal scheduler with explicit lifecycle management.
pub struct RenewalScheduler {
    scheduler: Option<JobScheduler>,
    config: RenewalSchedulerConfig,
    cancellation: CancellationToken,
    task: Arc<dyn RenewalTask>,
    metrics: Arc<SyncMetrics>,
    busy: Arc<Mutex<()>>,
}

impl RenewalScheduler {
    pub fn new(config: RenewalSchedulerConfig, task: Arc<dyn RenewalTask>, metrics: Arc<SyncMetrics>) -> Self {
        Self {
            scheduler: None,
            config,
            cancellation: CancellationToken::new(),
            task,
            metrics,
            busy: Arc::new(Mutex::new(())),
        }
    }

    /// Start the cron job.
    ///
    /// # Errors
    /// `AlreadyRunning`, an invalid cron expression, or a scheduler failure.
    #[instrument(skip(self), fields(cron = %self.config.cron_expression))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        // Fresh token so the scheduler can be restarted after stop
        self.cancellation = CancellationToken::new();
        let scheduler_instance = self.build_scheduler().await?;

        let start_timeout = self.config.start_timeout;
        tokio::time::timeout(start_timeout, scheduler_instance.start())
            .await
            .map_err(|source| SchedulerError::Timeout { duration: start_timeout, source })?
            .map_err(|source| SchedulerError::StartFailed { source })?;

        self.scheduler = Some(scheduler_instance);
        info!("Renewal scheduler started");
        Ok(())
    }

    /// Cancel any running tick, stop the cron job and wait for the tick to
    /// release the renewal lock.
    ///
    /// # Errors
    /// `NotRunning`, or a timeout/failure shutting the scheduler down.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        let Some(mut scheduler) = self.scheduler.take() else {
            return Err(SchedulerError::NotRunning);
        };

        self.cancellation.cancel();

        let stop_timeout = self.config.stop_timeout;
        tokio::time::timeout(stop_timeout, async move { scheduler.shutdown().await })
            .await
            .map_err(|source| SchedulerError::Timeout { duration: stop_timeout, source })?
            .map_err(|source| SchedulerError::StopFailed { source })?;

        let drain_timeout = self.config.drain_timeout;
        let drained = tokio::time::timeout(drain_timeout, self.busy.lock())
            .await
            .map_err(|source| SchedulerError::Timeout { duration: drain_timeout, source })?;
        drop(drained);

        info!("Renewal scheduler stopped");
        Ok(())
    }

    /// Returns true when a scheduler instance is active.
    pub fn is_running(&self) -> bool {
        self.scheduler.is_some()
    }

    /// Run one tick immediately, outside the cron schedule
    ///
    /// Used at startup so channels that expired while the process was down
    /// are replaced without waiting for the first tick. Returns `None` when
    /// the tick was skipped, timed out or failed.
    pub async fn run_now(&self) -> Option<RenewalReport> {
        run_tick(self.tick_context()).await
    }

    fn tick_context(&self) -> TickContext {
        TickContext {
            task: Arc::clone(&self.task),
            metrics: Arc::clone(&self.metrics),
            busy: Arc::clone(&self.busy),
            cancel: self.cancellation.clone(),
            job_timeout: self.config.job_timeout,
        }
    }

    async fn build_scheduler(&self) -> SchedulerResult<JobScheduler> {
        let scheduler = JobScheduler::new().await.map_err(|source| SchedulerError::CreationFailed { source })?;
        let context = self.tick_context();

        let job_definition = Job::new_async(self.config.cron_expression.as_str(), move |_id, _lock| {
            let context = context.clone();
            Box::pin(async move {
                run_tick(context).await;
            })
        })
        .map_err(|source| SchedulerError::JobRegistrationFailed { source })?;

        let job_id = job_definition.guid();
        scheduler
            .add(job_definition)
            .await
            .map_err(|source| SchedulerError::JobRegistrationFailed { source })?;

        debug!(cron = %self.config.cron_expression, job_id = %job_id, "Registered renewal job");
        Ok(scheduler)
    }
}

async fn run_tick(context: TickContext) -> Option<RenewalReport> {
    let TickContext { task, metrics, busy, cancel, job_timeout } = context;
    if cancel.is_cancelled() {
        return None;
    }
    let Ok(_guard) = busy.try_lock() else {
        warn!("previous renewal tick still running; skipping");
        return None;
    };

    let started = Instant::now();
    tokio::select! {
        () = cancel.cancelled() => {
            info!("renewal tick cancelled");
            None
        }
        outcome = tokio::time::timeout(job_timeout, task.run()) => match outcome {
            Ok(Ok(report)) => {
                log_metric(metrics.renewal.record_run(&report, started.elapsed()), "scheduler.renewal.run");
                debug!(?report, "renewal tick finished");
                Some(report)
            }
            Ok(Err(err)) => {
                log_metric(metrics.renewal.record_failed_run(), "scheduler.renewal.error");
                error!(error = %err, "renewal tick failed");
                None
            }
            Err(_) => {
                log_metric(metrics.renewal.record_timeout(), "scheduler.renewal.timeout");
                warn!(timeout_secs = job_timeout.as_secs(), "renewal tick timed out");
                None
            }
        }
    }
}

fn log_metric(result: MetricsResult<()>, metric: &'static str) {
    if let Err(err) = result {
        warn!(metric = metric, error = ?err, "Failed to record scheduler metric");
    }
}

impl Drop for RenewalScheduler {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("RenewalScheduler dropped while running; cancelling tasks");
            self.cancellation.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use calmirror_domain::CalMirrorError;

    use super::*;

    struct CountingTask {
        runs: AtomicU32,
        delay: Duration,
        fail: bool,
    }

    impl CountingTask {
        fn new(delay: Duration, fail: bool) -> Arc<Self> {
            Arc::new(Self { runs: AtomicU32::new(0), delay, fail })
        }
    }

    #[async_trait]
    impl RenewalTask for CountingTask {
        async fn run(&self) -> Result<RenewalReport> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(CalMirrorError::Database("locked".into()));
            }
            Ok(RenewalReport { examined: 1, renewed: 1, failed: 0 })
        }
    }

    fn fast_config() -> RenewalSchedulerConfig {
        RenewalSchedulerConfig {
            cron_expression: "*/1 * * * * *".into(),
            job_timeout: Duration::from_millis(200),
            ..Default::default()
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn lifecycle_runs_ticks() {
        let task = CountingTask::new(Duration::ZERO, false);
        let metrics = Arc::new(SyncMetrics::new());
        let mut scheduler = RenewalScheduler::new(fast_config(), task.clone(), metrics.clone());

        scheduler.start().await.expect("start succeeds");
        tokio::time::sleep(Duration::from_millis(2500)).await;
        scheduler.stop().await.expect("stop succeeds");

        assert!(!scheduler.is_running());
        assert!(task.runs.load(Ordering::SeqCst) >= 1);
        assert!(metrics.renewal.channels_renewed() >= 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn double_start_is_rejected_and_restart_works() {
        let task = CountingTask::new(Duration::ZERO, false);
        let mut scheduler = RenewalScheduler::new(fast_config(), task, Arc::new(SyncMetrics::new()));

        scheduler.start().await.expect("first start");
        let err = scheduler.start().await.expect_err("second start fails");
        assert!(matches!(err, SchedulerError::AlreadyRunning));
        scheduler.stop().await.expect("stop");

        assert!(matches!(scheduler.stop().await, Err(SchedulerError::NotRunning)));
        scheduler.start().await.expect("start again");
        scheduler.stop().await.expect("stop again");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn invalid_cron_fails_registration() {
        let config = RenewalSchedulerConfig { cron_expression: "every three hours".into(), ..fast_config() };
        let mut scheduler =
            RenewalScheduler::new(config, CountingTask::new(Duration::ZERO, false), Arc::new(SyncMetrics::new()));

        let err = scheduler.start().await.expect_err("bad cron");
        assert!(matches!(err, SchedulerError::JobRegistrationFailed { .. }));
        assert!(!scheduler.is_running());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_waits_for_in_flight_tick_to_release() {
        let task = CountingTask::new(Duration::from_secs(5), false);
        let mut scheduler = RenewalScheduler::new(
            RenewalSchedulerConfig {
                cron_expression: "0 0 0 1 1 *".into(),
                job_timeout: Duration::from_secs(30),
                ..fast_config()
            },
            task.clone(),
            Arc::new(SyncMetrics::new()),
        );
        scheduler.start().await.expect("start");

        let busy = Arc::clone(&scheduler.busy);
        let context = scheduler.tick_context();
        let tick = tokio::spawn(run_tick(context));
        while task.runs.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(busy.try_lock().is_err(), "tick holds the renewal lock");

        scheduler.stop().await.expect("stop drains the tick");

        assert!(busy.try_lock().is_ok());
        assert!(tick.await.expect("tick task").is_none(), "cancelled tick reports nothing");
    }

    #[tokio::test]
    async fn slow_tick_times_out_and_is_counted() {
        let task = CountingTask::new(Duration::from_secs(5), false);
        let metrics = Arc::new(SyncMetrics::new());
        let scheduler = RenewalScheduler::new(fast_config(), task, metrics.clone());

        assert!(scheduler.run_now().await.is_none());
        assert_eq!(metrics.renewal.timeouts(), 1);
    }

    #[tokio::test]
    async fn failed_tick_is_counted_and_manual_run_reports() {
        let metrics = Arc::new(SyncMetrics::new());
        let failing = RenewalScheduler::new(fast_config(), CountingTask::new(Duration::ZERO, true), metrics.clone());
        assert!(failing.run_now().await.is_none());
        assert_eq!(metrics.renewal.failed_runs(), 1);

        let healthy =
            RenewalScheduler::new(fast_config(), CountingTask::new(Duration::ZERO, false), metrics.clone());
        let report = healthy.run_now().await.expect("report");
        assert_eq!(report.renewed, 1);
    }
}
