//! Periodic maintenance loops run by the worker.
//!
//! Each submodule provides a long-running async function intended to be
//! spawned via `tokio::spawn`. All loops accept a [`CancellationToken`]
//! for graceful shutdown and log, rather than return, per-cycle failures.
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

pub mod archive_purge;
pub mod certificate_sweep;
pub mod cron_tick;
pub mod server_health;
