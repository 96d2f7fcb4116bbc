//! Operation dispatcher.
//!
//! Polls the queue every `poll_interval` and runs claimed operations on
//! spawned tasks, at most `concurrency` at a time. The store's claim never
//! hands out a job whose resource already has one running, so the
//! dispatcher itself needs no per-resource bookkeeping.

use std::sync::Arc;
use std::time::Duration;

use hostwright_core::error::CoreError;
use hostwright_orchestrator::store::OperationStore;
use hostwright_orchestrator::Orchestrator;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

pub struct Dispatcher {
    orchestrator: Orchestrator,
    permits: Arc<Semaphore>,
    poll_interval: Duration,
}

impl Dispatcher {
    pub fn new(orchestrator: Orchestrator, concurrency: usize, poll_interval: Duration) -> Self {
        Self {
            orchestrator,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            poll_interval,
        }
    }

    /// Run the dispatcher loop until `cancel` fires, then wait for
    /// in-flight operations to finish.
    pub async fn run(self, cancel: CancellationToken) {
        let mut tasks = JoinSet::new();
        let mut ticker = tokio::time::interval(self.poll_interval);
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            concurrency = self.permits.available_permits(),
            "Operation dispatcher started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(in_flight = tasks.len(), "Operation dispatcher shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    while tasks.try_join_next().is_some() {}
                    if let Err(e) = self.fill(&mut tasks).await {
                        tracing::error!(error = %e, "Dispatch cycle failed");
                    }
                }
            }
        }

        while tasks.join_next().await.is_some() {}
        tracing::info!("Operation dispatcher stopped");
    }

    /// Claim runnable operations while permits remain. Returns how many
    /// were started.
    pub async fn fill(&self, tasks: &mut JoinSet<()>) -> Result<usize, CoreError> {
        let mut started = 0;
        loop {
            let Ok(permit) = self.permits.clone().try_acquire_owned() else {
                break;
            };
            let Some(job) = self.orchestrator.ctx.store.claim_next_operation().await? else {
                break;
            };

            tracing::info!(job_id = job.id, kind = %job.kind, resource = %job.resource_key, "Operation claimed");
            let orchestrator = self.orchestrator.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let job_id = job.id;
                if let Err(e) = orchestrator.run_job(job).await {
                    tracing::error!(job_id, error = %e, "Failed to record operation outcome");
                }
            });
            started += 1;
        }
        Ok(started)
    }
}
