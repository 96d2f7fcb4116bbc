//! Orchestration of hosting work on managed servers.
//!
//! Each manager owns one workflow and talks to the outside world through
//! three seams: the [`Store`](store::Store) for persisted state, the
//! [`RemoteClient`](hostwright_core::remote::RemoteClient) for host
//! commands, and the adapters in `hostwright-cloud` for external services.
//! [`Orchestrator`] bundles the managers and maps queued
//! [`Operation`]s onto them.

pub mod backup;
pub mod bootstrap;
pub mod certificates;
pub mod checkpoint;
pub mod config;
pub mod context;
pub mod dns;
pub mod executor;
pub mod git;
pub mod installer;
pub mod logs;
pub mod operations;
pub mod scheduler;
pub mod sites;
pub mod store;

pub use checkpoint::Checkpoint;
pub use config::OrchestratorConfig;
pub use context::Context;
pub use operations::{Operation, Orchestrator};
