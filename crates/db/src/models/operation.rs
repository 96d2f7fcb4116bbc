//! Queued orchestration operations.

use hostwright_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

use super::status::{OperationStatus, StatusId};

/// A row from the `operation_jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct OperationJob {
    pub id: DbId,
    pub kind: String,
    /// Serialization key: `site:<id>`, `server:<id>` or `zone:<id>`.
    pub resource_key: String,
    pub params: serde_json::Value,
    pub status_id: StatusId,
    pub cancel_requested: bool,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl OperationJob {
    pub fn status(&self) -> OperationStatus {
        OperationStatus::from_id(self.status_id).unwrap_or(OperationStatus::Failed)
    }
}

/// Insert payload for an operation.
#[derive(Debug, Clone)]
pub struct NewOperation {
    pub kind: String,
    pub resource_key: String,
    pub params: serde_json::Value,
}

/// How a cancel request landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    /// The job had not started and is now `Cancelled`.
    Cancelled,
    /// The job is running; it stops at its next checkpoint.
    Requested,
    /// The job had already finished.
    AlreadyFinished,
}
