//! Quorum escalation worker
//!
//! Sweeps overdue approval requests on a fixed interval.
//!
//! Usage:
//!   escalator         - Sweep until interrupted
//!   escalator --once  - Run a single sweep and exit

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use quorum_core::{
    ApprovalService, EscalationScheduler, StaticDirectory, SystemClock, TracingNotifier,
};
use quorum_db::{SeaOrmApprovalStore, WorkflowCache, WorkflowRepository, connect};
use quorum_shared::{AppConfig, AppError};

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "quorum=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let once = std::env::args().skip(1).any(|arg| arg == "--once");

    let config = AppConfig::load().context("failed to load configuration")?;
    init_tracing(config.log.json);

    if !config.escalation.enabled && !once {
        info!("escalation disabled by configuration");
        return Ok(());
    }

    let db = connect(
        &config.database.url,
        config.database.max_connections,
        config.database.min_connections,
    )
    .await?;
    info!("Connected to database");

    let cache = WorkflowCache::with_config(1_000, config.escalation.workflow_cache_ttl_secs);
    let workflows = WorkflowRepository::with_cache(db.clone(), cache);
    let store = SeaOrmApprovalStore::new(db, workflows);
    let directory = StaticDirectory::from_roles(config.directory.roles.clone());
    info!(roles = config.directory.roles.len(), "approver directory loaded");

    let clock = Arc::new(SystemClock);
    let service = Arc::new(ApprovalService::with_clock(
        Arc::new(store),
        Arc::new(directory),
        Arc::new(TracingNotifier),
        clock.clone(),
    ));
    let scheduler = EscalationScheduler::new(
        service,
        clock,
        Duration::from_secs(config.escalation.sweep_interval_secs.max(1)),
    );

    if once {
        let escalated = scheduler.run_once().await.map_err(AppError::from)?;
        info!(escalated = escalated.len(), "single sweep finished");
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
        }
        signal.cancel();
    });

    scheduler.run(shutdown).await;
    Ok(())
}
