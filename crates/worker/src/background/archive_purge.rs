//! Hourly removal of deprovisioned site archives past their grace period.

use std::time::Duration;

use hostwright_orchestrator::sites::SiteManager;
use tokio_util::sync::CancellationToken;

/// Run the archive purge loop until `cancel` is triggered.
pub async fn run(sites: SiteManager, every: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = every.as_secs(), "Archive purge started");
    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Archive purge stopping");
                break;
            }
            _ = interval.tick() => {
                match sites.purge_expired_archives().await {
                    Ok(0) => tracing::debug!("Archive purge: nothing expired"),
                    Ok(purged) => tracing::info!(purged, "Archive purge: removed expired archives"),
                    Err(e) => tracing::error!(error = %e, "Archive purge failed"),
                }
            }
        }
    }
}
