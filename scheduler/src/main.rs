// Scheduler binary entry point

mod ops;

use anyhow::Context;
use common::config::Settings;
use common::db::{DbPool, ReminderRepository};
use common::notify::{EmailSender, Notifier, SmsSender};
use common::scheduler::{Scheduler, SchedulerConfig, SchedulerEngine};
use common::telemetry;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("Failed to load configuration")?;
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    telemetry::init_logging(&settings.observability.log_level)?;
    info!("Starting MediTrack reminder scheduler");

    let db_pool = DbPool::new(&settings.database).await?;
    db_pool.migrate().await?;

    let store = Arc::new(ReminderRepository::new(db_pool.clone()));
    let email = EmailSender::new(&settings.mail)?;
    let sms = SmsSender::new(settings.twilio.clone());
    let sink = Arc::new(Notifier::new(email, sms));

    let scheduler_config = SchedulerConfig {
        tick_interval_seconds: settings.scheduler.tick_interval_seconds,
        notify_timeout_seconds: settings.scheduler.notify_timeout_seconds,
    };
    let engine = Arc::new(SchedulerEngine::new(scheduler_config, store, sink));

    // Operational surface: health check plus the manual "run one tick now"
    // trigger used for tests and diagnostics.
    let ops_state = ops::OpsState {
        engine: engine.clone(),
        db: db_pool.clone(),
    };
    let addr = format!("{}:{}", settings.ops.host, settings.ops.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind ops server to {}", addr))?;
    info!(addr = %addr, "Ops server listening");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, ops::router(ops_state)).await {
            error!(error = %e, "Ops server error");
        }
    });

    let engine_for_shutdown = engine.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, initiating graceful shutdown");
            engine_for_shutdown.stop().await;
        }
    });

    engine
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("Scheduler error: {}", e))?;

    db_pool.close().await;
    info!("Scheduler stopped");
    Ok(())
}
