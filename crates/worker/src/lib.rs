//! The hostwright worker: runs queued operations and periodic maintenance.
//!
//! - [`dispatcher`] -- claims operations from the queue and runs them with
//!   bounded concurrency.
//! - [`background`] -- cron tick, certificate sweep, archive purge and
//!   server health loops.

pub mod background;
pub mod config;
pub mod dispatcher;

use hostwright_orchestrator::Orchestrator;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::dispatcher::Dispatcher;

/// A spawned loop and the name it is logged under.
pub struct WorkerTask {
    pub name: &'static str,
    pub handle: JoinHandle<()>,
}

/// Spawn the dispatcher and every maintenance loop. All of them stop when
/// `cancel` fires.
pub fn spawn_all(orchestrator: &Orchestrator, config: &WorkerConfig, cancel: &CancellationToken) -> Vec<WorkerTask> {
    let dispatcher = Dispatcher::new(orchestrator.clone(), config.concurrency, config.poll_interval);
    let alert_days = orchestrator.ctx.config.ssl_alert_days;

    vec![
        WorkerTask {
            name: "dispatcher",
            handle: tokio::spawn(dispatcher.run(cancel.clone())),
        },
        WorkerTask {
            name: "cron_tick",
            handle: tokio::spawn(background::cron_tick::run(
                orchestrator.scheduler.clone(),
                config.cron_tick_interval,
                cancel.clone(),
            )),
        },
        WorkerTask {
            name: "certificate_sweep",
            handle: tokio::spawn(background::certificate_sweep::run(
                orchestrator.certificates.clone(),
                alert_days,
                config.certificate_sweep_interval,
                cancel.clone(),
            )),
        },
        WorkerTask {
            name: "archive_purge",
            handle: tokio::spawn(background::archive_purge::run(
                orchestrator.sites.clone(),
                config.archive_purge_interval,
                cancel.clone(),
            )),
        },
        WorkerTask {
            name: "server_health",
            handle: tokio::spawn(background::server_health::run(
                orchestrator.servers.clone(),
                config.health_check_interval,
                cancel.clone(),
            )),
        },
    ]
}
