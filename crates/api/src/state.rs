use std::sync::Arc;

use hostwright_db::DbPool;
use hostwright_orchestrator::Orchestrator;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    /// Database pool, for health reporting. `None` when running on the
    /// in-memory store.
    pub pool: Option<DbPool>,
    pub config: Arc<ServerConfig>,
    /// Managers and the operation queue.
    pub orchestrator: Orchestrator,
}
