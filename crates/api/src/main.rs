//! calmirror - incremental calendar mirror
//!
//! Startup order: environment, logging, configuration, storage and services,
//! channel registration, renewal, then the webhook server until Ctrl-C.

use anyhow::Context;
use calmirror_api::utils::logging::{init_tracing, log_startup_step, LogFormat};
use calmirror_api::AppContext;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before the subscriber reads RUST_LOG
    let dotenv = dotenvy::dotenv();
    init_tracing(LogFormat::from_env());
    match dotenv {
        Ok(path) => info!(path = %path.display(), "loaded .env"),
        Err(e) => warn!(error = %e, "no .env file loaded"),
    }

    let config = calmirror_infra::config::load().context("failed to load configuration")?;
    info!(
        secret_fingerprint = %config.webhook.shared_secret.fingerprint(),
        callback_url = %config.webhook.callback_url,
        "configuration loaded"
    );

    let ctx = AppContext::new(config).await.context("failed to initialize application")?;

    let live = ctx.ensure_channels().await;
    log_startup_step("ensure_channels", live.len() == ctx.config.targets.len(), &format!("{} live", live.len()));

    match ctx.start_renewal().await {
        Ok(Some(report)) => {
            log_startup_step("renewal", true, &format!("renewed {} of {}", report.renewed, report.examined));
        }
        Ok(None) => log_startup_step("renewal", true, "disabled or skipped"),
        Err(e) => return Err(e).context("failed to start renewal scheduler"),
    }

    let server = ctx.webhook_server()?;
    server
        .serve(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl-C; running until killed");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await
        .context("webhook server failed")?;

    ctx.shutdown().await.context("shutdown failed")?;
    info!("calmirror stopped");
    Ok(())
}
