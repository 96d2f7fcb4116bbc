//! Handlers for `/jobs`: queued operation status and cancellation.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use hostwright_core::remote::redact::redact;
use hostwright_core::types::{DbId, Timestamp};
use hostwright_db::models::operation::{CancelOutcome, OperationJob};
use hostwright_db::models::status::OperationStatus;
use serde::Serialize;
use serde_json::Value;

use crate::error::AppResult;
use crate::middleware::auth::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

/// Public view of an [`OperationJob`], with credentials masked in its
/// parameters.
#[derive(Debug, Serialize)]
pub struct JobView {
    pub id: DbId,
    pub kind: String,
    pub resource_key: String,
    pub status: OperationStatus,
    pub params: Value,
    pub cancel_requested: bool,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl From<OperationJob> for JobView {
    fn from(job: OperationJob) -> Self {
        Self {
            id: job.id,
            status: job.status(),
            kind: job.kind,
            resource_key: job.resource_key,
            params: redact_value(job.params),
            cancel_requested: job.cancel_requested,
            result: job.result,
            error: job.error,
            started_at: job.started_at,
            completed_at: job.completed_at,
            created_at: job.created_at,
        }
    }
}

fn redact_value(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(redact(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(redact_value).collect()),
        Value::Object(map) => Value::Object(map.into_iter().map(|(k, v)| (k, redact_value(v))).collect()),
        other => other,
    }
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub success: bool,
    pub outcome: CancelOutcome,
}

/// GET /api/v1/jobs/{id}
pub async fn get_job(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = state.orchestrator.job(job_id).await?;
    Ok(Json(DataResponse::new(JobView::from(job))))
}

/// POST /api/v1/jobs/{id}/cancel
///
/// A pending job is cancelled outright; a running one stops at its next
/// checkpoint.
pub async fn cancel_job(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let outcome = state.orchestrator.cancel(job_id).await?;
    Ok(Json(CancelResponse { success: true, outcome }))
}
