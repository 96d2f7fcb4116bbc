//! Periodic health sampling of every enabled server.

use std::time::Duration;

use hostwright_orchestrator::installer::ServerManager;
use tokio_util::sync::CancellationToken;

/// Run the health check loop until `cancel` is triggered.
pub async fn run(servers: ServerManager, every: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = every.as_secs(), "Server health checks started");
    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Server health checks stopping");
                break;
            }
            _ = interval.tick() => {
                match servers.check_all().await {
                    Ok(checked) => tracing::debug!(checked, "Server health checks finished"),
                    Err(e) => tracing::error!(error = %e, "Server health checks failed"),
                }
            }
        }
    }
}
