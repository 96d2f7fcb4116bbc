//! Repository for the `cron_jobs` table.
//!
//! A run is claimed by flipping `last_status_id` to `Running` in a single
//! conditional update. The scheduler tick and a manual "execute now" share
//! that claim, so at most one execution of a job is ever in flight. The
//! tick additionally requires the job to still be due, so a slot that a
//! manual run already consumed is not run again.

use sqlx::PgPool;
use hostwright_core::types::{DbId, Timestamp};

use crate::models::cron_job::{CreateCronJob, CronJob, CronRunResult, UpdateCronJob};
use crate::models::status::CronRunStatus;

/// Column list for `cron_jobs` queries.
const COLUMNS: &str = "\
    id, website_id, name, schedule, command, is_enabled, timeout_secs, last_status_id, \
    last_run_at, last_output, last_duration_ms, running_since, next_run_at, created_at, updated_at";

/// Provides CRUD and claim operations for cron jobs.
pub struct CronJobRepo;

impl CronJobRepo {
    pub async fn create(
        pool: &PgPool,
        input: &CreateCronJob,
        next_run_at: Timestamp,
    ) -> Result<CronJob, sqlx::Error> {
        let query = format!(
            "INSERT INTO cron_jobs (website_id, name, schedule, command, is_enabled, timeout_secs, next_run_at) \
             VALUES ($1, $2, $3, $4, COALESCE($5, true), COALESCE($6, 300), $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, CronJob>(&query)
            .bind(input.website_id)
            .bind(&input.name)
            .bind(&input.schedule)
            .bind(&input.command)
            .bind(input.is_enabled)
            .bind(input.timeout_secs)
            .bind(next_run_at)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<CronJob>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM cron_jobs WHERE id = $1");
        sqlx::query_as::<_, CronJob>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(pool: &PgPool, website_id: Option<DbId>) -> Result<Vec<CronJob>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM cron_jobs WHERE ($1::BIGINT IS NULL OR website_id = $1) ORDER BY id"
        );
        sqlx::query_as::<_, CronJob>(&query)
            .bind(website_id)
            .fetch_all(pool)
            .await
    }

    /// Apply a partial update. `next_run_at` is recomputed by the caller
    /// whenever the schedule changes.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdateCronJob,
        next_run_at: Option<Timestamp>,
    ) -> Result<Option<CronJob>, sqlx::Error> {
        let query = format!(
            "UPDATE cron_jobs SET \
                 name = COALESCE($2, name), \
                 schedule = COALESCE($3, schedule), \
                 command = COALESCE($4, command), \
                 is_enabled = COALESCE($5, is_enabled), \
                 timeout_secs = COALESCE($6, timeout_secs), \
                 next_run_at = COALESCE($7, next_run_at) \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, CronJob>(&query)
            .bind(id)
            .bind(&input.name)
            .bind(&input.schedule)
            .bind(&input.command)
            .bind(input.is_enabled)
            .bind(input.timeout_secs)
            .bind(next_run_at)
            .fetch_optional(pool)
            .await
    }

    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM cron_jobs WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Enabled jobs with `next_run_at <= now` that are not running.
    pub async fn list_due(pool: &PgPool, now: Timestamp) -> Result<Vec<CronJob>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM cron_jobs \
             WHERE is_enabled AND next_run_at IS NOT NULL AND next_run_at <= $1 AND last_status_id <> $2 \
             ORDER BY next_run_at"
        );
        sqlx::query_as::<_, CronJob>(&query)
            .bind(now)
            .bind(CronRunStatus::Running.id())
            .fetch_all(pool)
            .await
    }

    /// Mark a job `Running` unless it already is. Returns `None` when
    /// another claimant got there first.
    pub async fn claim(pool: &PgPool, id: DbId, now: Timestamp) -> Result<Option<CronJob>, sqlx::Error> {
        let query = format!(
            "UPDATE cron_jobs SET last_status_id = $2, running_since = $3 \
             WHERE id = $1 AND last_status_id <> $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, CronJob>(&query)
            .bind(id)
            .bind(CronRunStatus::Running.id())
            .bind(now)
            .fetch_optional(pool)
            .await
    }

    /// Claim a job for its scheduled slot: like [`claim`](Self::claim), but
    /// only while the job is enabled and still due at `now`. A run that
    /// finished in the meantime has moved `next_run_at` past `now`.
    pub async fn claim_due(pool: &PgPool, id: DbId, now: Timestamp) -> Result<Option<CronJob>, sqlx::Error> {
        let query = format!(
            "UPDATE cron_jobs SET last_status_id = $2, running_since = $3 \
             WHERE id = $1 AND last_status_id <> $2 \
               AND is_enabled AND next_run_at IS NOT NULL AND next_run_at <= $3 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, CronJob>(&query)
            .bind(id)
            .bind(CronRunStatus::Running.id())
            .bind(now)
            .fetch_optional(pool)
            .await
    }

    /// Store a finished run and the recomputed next run.
    pub async fn finish(pool: &PgPool, id: DbId, result: &CronRunResult) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE cron_jobs SET \
                 last_status_id = $2, last_output = $3, last_duration_ms = $4, \
                 last_run_at = running_since, running_since = NULL, next_run_at = $5 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(result.status.id())
        .bind(&result.output)
        .bind(result.duration_ms)
        .bind(result.next_run_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Running jobs whose claim is older than their timeout plus
    /// `margin_secs`; candidates for crash recovery.
    pub async fn list_stale_running(
        pool: &PgPool,
        now: Timestamp,
        margin_secs: i32,
    ) -> Result<Vec<CronJob>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM cron_jobs \
             WHERE last_status_id = $1 \
               AND running_since + make_interval(secs => timeout_secs + $3) < $2"
        );
        sqlx::query_as::<_, CronJob>(&query)
            .bind(CronRunStatus::Running.id())
            .bind(now)
            .bind(margin_secs)
            .fetch_all(pool)
            .await
    }
}
