mod common;

use assert_matches::assert_matches;
use chrono::{Duration, TimeZone, Utc};
use common::{harness, FakeExecutor};
use hostwright_core::cron;
use hostwright_core::error::CoreError;
use hostwright_core::site::SiteKind;
use hostwright_db::models::status::CronRunStatus;
use hostwright_events::bus::CRON_FAILED;
use hostwright_orchestrator::scheduler::{Scheduler, TickSummary, STALE_MARGIN_SECS};
use hostwright_orchestrator::store::CronStore;

#[tokio::test]
async fn due_job_runs_as_site_user_and_reschedules() {
    let exec = FakeExecutor::new();
    exec.respond("php artisan", "cache cleared");
    let h = harness(exec.clone());
    let site = h.active_site("app.example.com", SiteKind::Cms).await;
    let now = Utc::now();
    let job = h
        .store
        .add_cron_job(site.id, "*/5 * * * *", "php artisan cache:clear", Some(now - Duration::minutes(1)));

    let summary = Scheduler::new(h.ctx.clone()).tick(now).await.unwrap();

    assert_eq!(summary, TickSummary { succeeded: 1, ..Default::default() });
    let command = exec.commands().pop().unwrap();
    assert!(command.starts_with(&format!("sudo -u {} -H -- sh -c", site.system_user)));
    assert!(command.contains(&format!("cd {}", site.site_path)));

    let job = h.ctx.store.find_cron_job(job.id).await.unwrap().unwrap();
    assert_eq!(job.last_status(), CronRunStatus::Success);
    assert_eq!(job.last_output.as_deref(), Some("cache cleared"));
    assert!(job.last_run_at.is_some());
    assert!(job.running_since.is_none());
    assert!(job.next_run_at.unwrap() > now);
}

#[tokio::test]
async fn failed_run_is_recorded_and_alerted() {
    let exec = FakeExecutor::new();
    exec.fail_on("backup.sh", "disk full");
    let h = harness(exec.clone());
    let mut events = h.events.subscribe();
    let site = h.active_site("app.example.com", SiteKind::Static).await;
    let now = Utc::now();
    let job = h
        .store
        .add_cron_job(site.id, "0 3 * * *", "./backup.sh", Some(now - Duration::seconds(5)));

    let summary = Scheduler::new(h.ctx.clone()).tick(now).await.unwrap();

    assert_eq!(summary.failed, 1);
    let stored = h.ctx.store.find_cron_job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.last_status(), CronRunStatus::Failed);
    assert_eq!(stored.last_output.as_deref(), Some("disk full"));

    let event = events.recv().await.unwrap();
    assert_eq!(event.event_type, CRON_FAILED);
    assert_eq!(event.source_entity_id, Some(job.id));
}

#[tokio::test]
async fn running_job_is_never_started_twice() {
    let exec = FakeExecutor::new();
    let h = harness(exec.clone());
    let site = h.active_site("app.example.com", SiteKind::Static).await;
    let now = Utc::now();
    let job = h
        .store
        .add_cron_job(site.id, "* * * * *", "sleep 30", Some(now - Duration::minutes(1)));
    h.store.update_cron_job(job.id, |j| {
        j.last_status_id = CronRunStatus::Running.id();
        j.running_since = Some(now - Duration::seconds(10));
    });
    let scheduler = Scheduler::new(h.ctx.clone());

    assert_eq!(scheduler.tick(now).await.unwrap(), TickSummary::default());
    assert_matches!(scheduler.execute_now(job.id).await, Err(CoreError::Conflict(_)));
    assert!(exec.commands().is_empty());
}

#[tokio::test]
async fn abandoned_run_is_released_as_failed() {
    let h = harness(FakeExecutor::new());
    let site = h.active_site("app.example.com", SiteKind::Static).await;
    let now = Utc::now();
    let job = h.store.add_cron_job(site.id, "0 * * * *", "./long.sh", None);
    let abandoned_at = now - Duration::seconds(i64::from(job.timeout_secs + STALE_MARGIN_SECS) + 1);
    h.store.update_cron_job(job.id, |j| {
        j.last_status_id = CronRunStatus::Running.id();
        j.running_since = Some(abandoned_at);
    });

    let summary = Scheduler::new(h.ctx.clone()).tick(now).await.unwrap();

    assert_eq!(summary.released, 1);
    let job = h.ctx.store.find_cron_job(job.id).await.unwrap().unwrap();
    assert_eq!(job.last_status(), CronRunStatus::Failed);
    assert!(job.last_output.unwrap().contains("abandoned"));
    assert_eq!(job.last_run_at, Some(abandoned_at));
    assert!(job.next_run_at.is_some());
}

#[tokio::test]
async fn manual_run_outside_schedule() {
    let exec = FakeExecutor::new();
    let h = harness(exec.clone());
    let site = h.active_site("app.example.com", SiteKind::Static).await;
    let job = h.store.add_cron_job(site.id, "0 0 1 1 *", "echo hi", None);

    let ran = Scheduler::new(h.ctx.clone()).execute_now(job.id).await.unwrap();

    assert_eq!(ran.last_status(), CronRunStatus::Success);
    assert!(ran.next_run_at.is_some());
    assert_eq!(exec.count("echo hi"), 1);
}

#[tokio::test]
async fn slot_consumed_by_a_manual_run_is_not_claimed_again() {
    let exec = FakeExecutor::new();
    let h = harness(exec.clone());
    let site = h.active_site("app.example.com", SiteKind::Static).await;
    let now = Utc::now();
    let job = h
        .store
        .add_cron_job(site.id, "0 3 * * *", "./report.sh", Some(now - Duration::minutes(1)));
    let listed = h.ctx.store.list_due_cron_jobs(now).await.unwrap();
    assert_eq!(listed.len(), 1);

    let scheduler = Scheduler::new(h.ctx.clone());
    let ran = scheduler.execute_now(job.id).await.unwrap();
    assert!(ran.next_run_at.unwrap() > now);

    // A tick that listed the job before the manual run finished must not
    // run the same slot again.
    assert!(h.ctx.store.claim_due_cron_job(job.id, now).await.unwrap().is_none());
    assert_eq!(scheduler.tick(now).await.unwrap(), TickSummary::default());
    assert_eq!(exec.count("./report.sh"), 1);
}

#[tokio::test]
async fn disabled_job_is_not_claimed_for_its_slot() {
    let h = harness(FakeExecutor::new());
    let site = h.active_site("app.example.com", SiteKind::Static).await;
    let now = Utc::now();
    let job = h
        .store
        .add_cron_job(site.id, "* * * * *", "true", Some(now - Duration::minutes(1)));
    h.store.update_cron_job(job.id, |j| j.is_enabled = false);

    assert!(h.ctx.store.claim_due_cron_job(job.id, now).await.unwrap().is_none());
    assert!(h.ctx.store.claim_cron_job(job.id, now).await.unwrap().is_some());
}

#[test]
fn hourly_preview_starts_at_the_next_hour() {
    let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 5, 0).unwrap();
    let v = cron::validate("0 * * * *", now);
    assert!(v.valid);
    let hours: Vec<_> = (1..=5)
        .map(|h| Utc.with_ymd_and_hms(2025, 1, 1, h, 0, 0).unwrap())
        .collect();
    assert_eq!(v.next_runs, hours);
}
