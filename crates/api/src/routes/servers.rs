//! Route definitions for the `/servers` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::servers;
use crate::state::AppState;

/// Routes mounted at `/servers`.
///
/// ```text
/// GET    /                    -> list_servers
/// GET    /{id}                -> get_server
/// POST   /{id}/provision      -> provision_server (queued)
/// POST   /{id}/health-check   -> check_health
/// POST   /{id}/test           -> test_connection
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(servers::list_servers))
        .route("/{id}", get(servers::get_server))
        .route("/{id}/provision", post(servers::provision_server))
        .route("/{id}/health-check", post(servers::check_health))
        .route("/{id}/test", post(servers::test_connection))
}
