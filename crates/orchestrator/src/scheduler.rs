//! Cron job execution: the periodic tick, manual runs and crash recovery.
//!
//! A job is claimed (`Running`) in the store before its command starts, and
//! both the tick and [`Scheduler::execute_now`] go through the same claim,
//! so a job never has two runs in flight. The tick's claim also requires the
//! job to still be due, so one scheduled slot runs at most once.

use std::time::Duration;

use chrono::Utc;
use hostwright_core::cron::{self, CronValidation};
use hostwright_core::error::CoreError;
use hostwright_core::shell::quote;
use hostwright_core::types::{DbId, Timestamp};
use hostwright_db::models::cron_job::{CronJob, CronRunResult};
use hostwright_db::models::status::CronRunStatus;
use hostwright_events::bus::CRON_FAILED;
use hostwright_events::PlatformEvent;
use serde::Serialize;

use crate::context::Context;
use crate::store::CronStore;

/// Stored output is cut to this many bytes.
pub const MAX_OUTPUT_BYTES: usize = 64 * 1024;

/// Grace on top of a job's timeout before a `Running` claim counts as abandoned.
pub const STALE_MARGIN_SECS: i32 = 120;

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    /// Abandoned runs released as failed.
    pub released: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Due jobs another run already held.
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy)]
enum Claim {
    /// Scheduled slot: the job must still be due.
    Due,
    Manual,
}

#[derive(Clone)]
pub struct Scheduler {
    ctx: Context,
}

impl Scheduler {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Validate an expression and preview its next runs (UTC).
    pub fn validate(expression: &str) -> CronValidation {
        cron::validate(expression, Utc::now())
    }

    /// Release abandoned runs, then run every due job concurrently.
    pub async fn tick(&self, now: Timestamp) -> Result<TickSummary, CoreError> {
        let mut summary = TickSummary::default();

        for job in self.ctx.store.list_stale_cron_jobs(now, STALE_MARGIN_SECS).await? {
            tracing::warn!(job_id = job.id, name = %job.name, "Releasing abandoned cron run");
            let result = CronRunResult {
                status: CronRunStatus::Failed,
                output: "Run abandoned: no result within the job timeout".into(),
                duration_ms: 0,
                next_run_at: cron::next_run(&job.schedule, now).ok(),
            };
            self.ctx.store.finish_cron_job(job.id, &result).await?;
            summary.released += 1;
        }

        let due = self.ctx.store.list_due_cron_jobs(now).await?;
        let runs = due.iter().map(|job| self.claim_and_run(job.id, now, Claim::Due));
        for outcome in futures::future::join_all(runs).await {
            match outcome {
                Ok(Some(CronRunStatus::Success)) => summary.succeeded += 1,
                Ok(Some(_)) => summary.failed += 1,
                Ok(None) => summary.skipped += 1,
                Err(e) => {
                    tracing::error!(error = %e, "Cron run could not be recorded");
                    summary.failed += 1;
                }
            }
        }

        if summary != TickSummary::default() {
            tracing::info!(
                released = summary.released,
                succeeded = summary.succeeded,
                failed = summary.failed,
                skipped = summary.skipped,
                "Cron tick finished",
            );
        }
        Ok(summary)
    }

    /// Run a job immediately, outside its schedule.
    pub async fn execute_now(&self, job_id: DbId) -> Result<CronJob, CoreError> {
        let job = self.job(job_id).await?;
        match self.claim_and_run(job.id, Utc::now(), Claim::Manual).await? {
            Some(_) => self.job(job_id).await,
            None => Err(CoreError::Conflict(format!("Cron job '{}' is already running", job.name))),
        }
    }

    async fn job(&self, id: DbId) -> Result<CronJob, CoreError> {
        self.ctx
            .store
            .find_cron_job(id)
            .await?
            .ok_or(CoreError::NotFound { entity: "CronJob", id })
    }

    /// `None` when the job was already claimed by another run, or (for a
    /// due claim) is no longer due.
    async fn claim_and_run(
        &self,
        job_id: DbId,
        now: Timestamp,
        claim: Claim,
    ) -> Result<Option<CronRunStatus>, CoreError> {
        let claimed = match claim {
            Claim::Due => self.ctx.store.claim_due_cron_job(job_id, now).await?,
            Claim::Manual => self.ctx.store.claim_cron_job(job_id, now).await?,
        };
        let Some(job) = claimed else {
            tracing::debug!(job_id, "Cron job already running or no longer due, skipped");
            return Ok(None);
        };

        let (status, output, duration_ms) = match self.execute(&job).await {
            Ok(ran) => ran,
            Err(e) => (CronRunStatus::Failed, e.to_string(), 0),
        };
        let finished = Utc::now();
        let result = CronRunResult {
            status,
            output: truncate_output(&output),
            duration_ms,
            next_run_at: cron::next_run(&job.schedule, finished).ok(),
        };
        self.ctx.store.finish_cron_job(job.id, &result).await?;

        if status == CronRunStatus::Failed {
            tracing::warn!(job_id = job.id, name = %job.name, "Cron job failed");
            self.ctx.publish(
                PlatformEvent::new(CRON_FAILED)
                    .with_source("cron_job", job.id)
                    .with_payload(serde_json::json!({
                        "name": job.name,
                        "website_id": job.website_id,
                        "output": tail(&result.output, 2000),
                    })),
            );
        } else {
            tracing::info!(job_id = job.id, name = %job.name, duration_ms, "Cron job succeeded");
        }
        Ok(Some(status))
    }

    /// Run the command as the site user in the site directory.
    async fn execute(&self, job: &CronJob) -> Result<(CronRunStatus, String, i64), CoreError> {
        let website = self.ctx.website(job.website_id).await?;
        let host = self.ctx.site_host(&website).await?;
        let script = format!("cd {} && {}", quote(&website.site_path), job.command);
        let command = format!("sudo -u {} -H -- sh -c {}", quote(&website.system_user), quote(&script));
        let timeout = Duration::from_secs(u64::try_from(job.timeout_secs.max(1)).unwrap_or(1));

        let outcome = self.ctx.remote.run(&host, &command, timeout).await?;
        let mut output = outcome.combined_output();
        if outcome.timed_out {
            output.push_str(&format!("\n[timed out after {} s]", job.timeout_secs));
        }
        let status = if outcome.success() {
            CronRunStatus::Success
        } else {
            CronRunStatus::Failed
        };
        Ok((status, output, outcome.duration_ms as i64))
    }
}

/// Cut output to [`MAX_OUTPUT_BYTES`] on a character boundary.
pub fn truncate_output(output: &str) -> String {
    if output.len() <= MAX_OUTPUT_BYTES {
        return output.to_string();
    }
    let mut end = MAX_OUTPUT_BYTES;
    while !output.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n[output truncated]", &output[..end])
}

fn tail(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_is_truncated_on_char_boundary() {
        let long = "é".repeat(MAX_OUTPUT_BYTES);
        let cut = truncate_output(&long);
        assert!(cut.ends_with("[output truncated]"));
        assert!(cut.len() <= MAX_OUTPUT_BYTES + 20);
        assert_eq!(truncate_output("short"), "short");
    }

    #[test]
    fn tail_keeps_the_end() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("ab", 3), "ab");
    }

    #[test]
    fn validate_previews_hourly_runs() {
        let v = Scheduler::validate("0 * * * *");
        assert!(v.valid);
        assert_eq!(v.next_runs.len(), cron::PREVIEW_RUNS);
        assert!(!Scheduler::validate("61 * * * *").valid);
    }
}
