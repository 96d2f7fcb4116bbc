//! Scheduled command runner.
//!
//! Every tick releases abandoned runs and starts every cron job whose
//! `next_run_at` has passed. Times are UTC.

use std::time::Duration;

use chrono::Utc;
use hostwright_orchestrator::scheduler::{Scheduler, TickSummary};
use tokio_util::sync::CancellationToken;

/// Run the scheduler tick loop until `cancel` is triggered.
pub async fn run(scheduler: Scheduler, every: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = every.as_secs(), "Cron scheduler started");
    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Cron scheduler stopping");
                break;
            }
            _ = interval.tick() => {
                match scheduler.tick(Utc::now()).await {
                    Ok(summary) if summary == TickSummary::default() => {
                        tracing::debug!("Cron scheduler: nothing due");
                    }
                    Ok(summary) => {
                        tracing::info!(
                            succeeded = summary.succeeded,
                            failed = summary.failed,
                            released = summary.released,
                            skipped = summary.skipped,
                            "Cron scheduler: tick finished",
                        );
                    }
                    Err(e) => tracing::error!(error = %e, "Cron scheduler: tick failed"),
                }
            }
        }
    }
}
