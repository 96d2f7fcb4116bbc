//! Daily certificate maintenance: queue renewals for what is inside the
//! renewal window, then announce what is about to expire. The renewals
//! themselves run on the dispatcher, serialized with other work on each site.

use std::time::Duration;

use hostwright_orchestrator::certificates::CertificateManager;
use tokio_util::sync::CancellationToken;

/// Run the renewal sweep loop until `cancel` is triggered.
///
/// `alert_days` is the horizon for `ssl.expiring` announcements.
pub async fn run(certificates: CertificateManager, alert_days: i64, every: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = every.as_secs(), alert_days, "Certificate sweep started");
    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Certificate sweep stopping");
                break;
            }
            _ = interval.tick() => sweep(&certificates, alert_days).await,
        }
    }
}

async fn sweep(certificates: &CertificateManager, alert_days: i64) {
    if let Err(e) = certificates.renew_due().await {
        tracing::error!(error = %e, "Certificate sweep: queueing renewals failed");
    }

    match certificates.expiring_soon(alert_days).await {
        Ok(expiring) if expiring.is_empty() => {
            tracing::debug!("Certificate sweep: nothing expiring soon");
        }
        Ok(expiring) => {
            for cert in &expiring {
                tracing::warn!(
                    domain = %cert.domain,
                    days_remaining = cert.days_remaining,
                    "Certificate expiring soon",
                );
            }
        }
        Err(e) => tracing::error!(error = %e, "Certificate sweep: expiry check failed"),
    }
}
