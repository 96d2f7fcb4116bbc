//! Handlers for `/servers`.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use hostwright_core::types::DbId;
use hostwright_orchestrator::store::ServerStore;
use hostwright_orchestrator::Operation;

use crate::error::AppResult;
use crate::handlers::queue;
use crate::middleware::auth::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/servers
pub async fn list_servers(_admin: RequireAdmin, State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let servers = state.orchestrator.ctx.store.list_servers().await?;
    Ok(Json(DataResponse::new(servers)))
}

/// GET /api/v1/servers/{id}
pub async fn get_server(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(server_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let server = state.orchestrator.ctx.server(server_id).await?;
    Ok(Json(DataResponse::new(server)))
}

/// POST /api/v1/servers/{id}/provision
///
/// Install missing services on the host.
pub async fn provision_server(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(server_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    state.orchestrator.ctx.server(server_id).await?;
    queue(&state, Operation::ProvisionServer { server_id }).await
}

/// POST /api/v1/servers/{id}/health-check
pub async fn check_health(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(server_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    state.orchestrator.ctx.server(server_id).await?;
    queue(&state, Operation::CheckServerHealth { server_id }).await
}

/// POST /api/v1/servers/{id}/test
///
/// Inline reachability probe. An unreachable host answers 502.
pub async fn test_connection(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(server_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let server = state.orchestrator.ctx.server(server_id).await?;
    state.orchestrator.ctx.remote.test_connection(&server.target()).await?;
    tracing::info!(server_id, "Server connection test passed");
    Ok(Json(serde_json::json!({ "success": true, "reachable": true })))
}
