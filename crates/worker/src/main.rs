use std::sync::Arc;

use anyhow::Context as _;
use hostwright_events::{AlertRouter, EmailConfig, EmailDelivery, EventBus};
use hostwright_orchestrator::bootstrap::orchestrator_from_env;
use hostwright_orchestrator::store::PgStore;
use hostwright_worker::config::WorkerConfig;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "hostwright_worker=debug,hostwright_orchestrator=debug".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // --- Configuration ---
    let config = WorkerConfig::from_env();
    tracing::info!(concurrency = config.concurrency, "Loaded worker configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let pool = hostwright_db::create_pool(&database_url)
        .await
        .context("Failed to connect to database")?;
    hostwright_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    hostwright_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database ready");

    // --- Event bus and alerts ---
    let event_bus = Arc::new(EventBus::default());
    let email = EmailConfig::from_env().map(EmailDelivery::new);
    if email.is_none() {
        tracing::info!("SMTP not configured, alerts are logged only");
    }
    let alert_handle = tokio::spawn(AlertRouter::new(email).run(event_bus.subscribe()));

    // --- Orchestrator ---
    let orchestrator = orchestrator_from_env(Arc::new(PgStore::new(pool)), Arc::clone(&event_bus))
        .await
        .context("Failed to configure orchestrator")?;
    orchestrator
        .requeue_orphaned()
        .await
        .context("Failed to requeue orphaned operations")?;

    // --- Loops ---
    let cancel = CancellationToken::new();
    let tasks = hostwright_worker::spawn_all(&orchestrator, &config, &cancel);
    tracing::info!(tasks = tasks.len(), "Worker started");

    shutdown_signal().await;

    // --- Shutdown ---
    tracing::info!("Shutdown requested, waiting for in-flight work");
    cancel.cancel();
    for task in tasks {
        if tokio::time::timeout(config.shutdown_timeout, task.handle).await.is_err() {
            tracing::warn!(task = task.name, "Task did not stop in time; its operations will be requeued on next start");
        }
    }

    drop(orchestrator);
    drop(event_bus);
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), alert_handle).await;

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
