//! Shared response envelope types for API handlers.
//!
//! Every successful body carries `success: true`; errors carry
//! `success: false` (see [`AppError`](crate::error::AppError)).

use hostwright_core::types::DbId;
use hostwright_db::models::operation::OperationJob;
use serde::Serialize;

/// Standard `{ "success": true, "data": T }` envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> DataResponse<T> {
    pub fn new(data: T) -> Self {
        Self { success: true, data }
    }
}

/// Body returned when a long-running operation has been queued.
///
/// Poll `GET /api/v1/jobs/{job_id}` for the outcome.
#[derive(Debug, Serialize)]
pub struct JobAccepted {
    pub success: bool,
    pub job_id: DbId,
    pub kind: String,
}

impl From<&OperationJob> for JobAccepted {
    fn from(job: &OperationJob) -> Self {
        Self {
            success: true,
            job_id: job.id,
            kind: job.kind.clone(),
        }
    }
}
