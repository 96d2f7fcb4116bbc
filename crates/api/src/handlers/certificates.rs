//! Handlers for `/sites/{id}/ssl`.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use hostwright_core::types::DbId;
use hostwright_orchestrator::Operation;

use crate::error::AppResult;
use crate::handlers::queue_for_site;
use crate::middleware::auth::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/sites/{id}/ssl
///
/// Status, expiry and days remaining, refreshed from the host.
pub async fn check_certificate(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(website_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let status = state.orchestrator.certificates.check(website_id).await?;
    Ok(Json(DataResponse::new(status)))
}

/// POST /api/v1/sites/{id}/ssl
pub async fn issue_certificate(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(website_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    queue_for_site(&state, website_id, Operation::IssueCertificate { website_id }).await
}

/// POST /api/v1/sites/{id}/ssl/renew
pub async fn renew_certificate(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(website_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    queue_for_site(&state, website_id, Operation::RenewCertificate { website_id }).await
}
