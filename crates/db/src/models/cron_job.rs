//! Scheduled job models.

use hostwright_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::{CronRunStatus, StatusId};

/// A row from the `cron_jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CronJob {
    pub id: DbId,
    pub website_id: DbId,
    pub name: String,
    pub schedule: String,
    pub command: String,
    pub is_enabled: bool,
    pub timeout_secs: i32,
    pub last_status_id: StatusId,
    pub last_run_at: Option<Timestamp>,
    pub last_output: Option<String>,
    pub last_duration_ms: Option<i64>,
    pub running_since: Option<Timestamp>,
    pub next_run_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl CronJob {
    pub fn last_status(&self) -> CronRunStatus {
        CronRunStatus::from_id(self.last_status_id).unwrap_or(CronRunStatus::Pending)
    }
}

/// DTO for creating a cron job.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCronJob {
    pub website_id: DbId,
    pub name: String,
    pub schedule: String,
    pub command: String,
    pub is_enabled: Option<bool>,
    pub timeout_secs: Option<i32>,
}

/// DTO for updating a cron job. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCronJob {
    pub name: Option<String>,
    pub schedule: Option<String>,
    pub command: Option<String>,
    pub is_enabled: Option<bool>,
    pub timeout_secs: Option<i32>,
}

/// What a finished run writes back.
#[derive(Debug, Clone)]
pub struct CronRunResult {
    pub status: CronRunStatus,
    pub output: String,
    pub duration_ms: i64,
    pub next_run_at: Option<Timestamp>,
}
