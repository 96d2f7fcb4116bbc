//! Repository for the `operation_jobs` table.
//!
//! Claiming skips jobs whose resource key already has a running job, so
//! operations on one site, server or zone run one at a time while
//! different resources proceed in parallel.

use sqlx::PgPool;
use hostwright_core::types::DbId;

use crate::models::operation::{CancelOutcome, NewOperation, OperationJob};
use crate::models::status::{OperationStatus, StatusId};

/// Column list for `operation_jobs` queries.
const COLUMNS: &str = "\
    id, kind, resource_key, params, status_id, cancel_requested, result, error, \
    started_at, completed_at, created_at, updated_at";

/// Provides queue operations for orchestration jobs.
pub struct OperationRepo;

impl OperationRepo {
    pub async fn enqueue(pool: &PgPool, input: &NewOperation) -> Result<OperationJob, sqlx::Error> {
        let query = format!(
            "INSERT INTO operation_jobs (kind, resource_key, params, status_id) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, OperationJob>(&query)
            .bind(&input.kind)
            .bind(&input.resource_key)
            .bind(&input.params)
            .bind(OperationStatus::Pending.id())
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<OperationJob>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM operation_jobs WHERE id = $1");
        sqlx::query_as::<_, OperationJob>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Atomically claim the oldest pending job whose resource is idle.
    ///
    /// Uses `SELECT FOR UPDATE SKIP LOCKED` to prevent double-dispatch
    /// when multiple dispatcher instances are running. Two instances can
    /// still pick different pending rows for the same resource before
    /// either commits; the unique index on running resource keys rejects
    /// the second, which is reported as nothing claimable.
    pub async fn claim_next(pool: &PgPool) -> Result<Option<OperationJob>, sqlx::Error> {
        match Self::try_claim_next(pool).await {
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                tracing::debug!("Lost claim race for a busy resource");
                Ok(None)
            }
            other => other,
        }
    }

    async fn try_claim_next(pool: &PgPool) -> Result<Option<OperationJob>, sqlx::Error> {
        let query = format!(
            "UPDATE operation_jobs \
             SET status_id = $1, started_at = NOW() \
             WHERE id = ( \
                 SELECT p.id FROM operation_jobs p \
                 WHERE p.status_id = $2 \
                   AND NOT EXISTS ( \
                       SELECT 1 FROM operation_jobs r \
                       WHERE r.resource_key = p.resource_key AND r.status_id = $1 \
                   ) \
                 ORDER BY p.created_at, p.id \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, OperationJob>(&query)
            .bind(OperationStatus::Running.id())
            .bind(OperationStatus::Pending.id())
            .fetch_optional(pool)
            .await
    }

    /// Whether a job of `kind` on `resource_key` is still pending or running.
    pub async fn has_open(pool: &PgPool, resource_key: &str, kind: &str) -> Result<bool, sqlx::Error> {
        let row: (bool,) = sqlx::query_as(
            "SELECT EXISTS ( \
                 SELECT 1 FROM operation_jobs \
                 WHERE resource_key = $1 AND kind = $2 AND status_id = ANY($3) \
             )",
        )
        .bind(resource_key)
        .bind(kind)
        .bind(vec![OperationStatus::Pending.id(), OperationStatus::Running.id()])
        .fetch_one(pool)
        .await?;
        Ok(row.0)
    }

    pub async fn complete(pool: &PgPool, id: DbId, result: &serde_json::Value) -> Result<(), sqlx::Error> {
        Self::finish(pool, id, OperationStatus::Completed, Some(result), None).await
    }

    pub async fn fail(pool: &PgPool, id: DbId, error: &str) -> Result<(), sqlx::Error> {
        Self::finish(pool, id, OperationStatus::Failed, None, Some(error)).await
    }

    /// Record abandonment at a checkpoint after a cancel request.
    pub async fn mark_cancelled(pool: &PgPool, id: DbId, detail: &str) -> Result<(), sqlx::Error> {
        Self::finish(pool, id, OperationStatus::Cancelled, None, Some(detail)).await
    }

    async fn finish(
        pool: &PgPool,
        id: DbId,
        status: OperationStatus,
        result: Option<&serde_json::Value>,
        error: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE operation_jobs SET status_id = $2, result = $3, error = $4, completed_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(status.id())
        .bind(result)
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Cancel a pending job outright, or flag a running one.
    pub async fn cancel(pool: &PgPool, id: DbId) -> Result<Option<CancelOutcome>, sqlx::Error> {
        let pending = sqlx::query(
            "UPDATE operation_jobs SET status_id = $2, completed_at = NOW(), error = 'Cancelled before start' \
             WHERE id = $1 AND status_id = $3",
        )
        .bind(id)
        .bind(OperationStatus::Cancelled.id())
        .bind(OperationStatus::Pending.id())
        .execute(pool)
        .await?;
        if pending.rows_affected() > 0 {
            return Ok(Some(CancelOutcome::Cancelled));
        }

        let running = sqlx::query(
            "UPDATE operation_jobs SET cancel_requested = true WHERE id = $1 AND status_id = $2",
        )
        .bind(id)
        .bind(OperationStatus::Running.id())
        .execute(pool)
        .await?;
        if running.rows_affected() > 0 {
            return Ok(Some(CancelOutcome::Requested));
        }

        let exists: Option<(StatusId,)> =
            sqlx::query_as("SELECT status_id FROM operation_jobs WHERE id = $1")
                .bind(id)
                .fetch_optional(pool)
                .await?;
        Ok(exists.map(|_| CancelOutcome::AlreadyFinished))
    }

    pub async fn is_cancel_requested(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let row: Option<(bool,)> =
            sqlx::query_as("SELECT cancel_requested FROM operation_jobs WHERE id = $1")
                .bind(id)
                .fetch_optional(pool)
                .await?;
        Ok(row.is_some_and(|(flag,)| flag))
    }

    /// Put jobs left `Running` by a stopped worker back in the queue.
    ///
    /// Call once at worker startup, before dispatching. Operations resume
    /// from their persisted progress.
    pub async fn requeue_orphaned(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE operation_jobs SET status_id = $1, started_at = NULL WHERE status_id = $2",
        )
        .bind(OperationStatus::Pending.id())
        .bind(OperationStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
