//! Route definitions for the `/backups` resource.

use axum::routing::{delete, post};
use axum::Router;

use crate::handlers::backups;
use crate::state::AppState;

/// Routes mounted at `/backups`. Listing and creation live under
/// `/sites/{id}/backups`.
///
/// ```text
/// POST   /{id}/restore    -> restore_backup (queued)
/// DELETE /{id}            -> delete_backup
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}/restore", post(backups::restore_backup))
        .route("/{id}", delete(backups::delete_backup))
}
