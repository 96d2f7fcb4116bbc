//! Handlers for `/cron`.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use hostwright_core::error::CoreError;
use hostwright_core::types::DbId;
use hostwright_orchestrator::scheduler::Scheduler;
use hostwright_orchestrator::store::CronStore;
use hostwright_orchestrator::Operation;
use serde::Deserialize;

use crate::error::AppResult;
use crate::handlers::queue;
use crate::middleware::auth::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub expression: String,
}

/// POST /api/v1/cron/validate
///
/// Always `200`; an unparseable expression reports `valid: false`.
pub async fn validate_expression(
    _admin: RequireAdmin,
    Json(input): Json<ValidateRequest>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(DataResponse::new(Scheduler::validate(&input.expression))))
}

/// POST /api/v1/cron/jobs/{id}/run
pub async fn run_now(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    state
        .orchestrator
        .ctx
        .store
        .find_cron_job(job_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "CronJob",
            id: job_id,
        })?;
    queue(&state, Operation::RunCronJob { job_id }).await
}
