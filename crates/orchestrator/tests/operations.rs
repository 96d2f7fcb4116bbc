mod common;

use common::{harness, FakeExecutor, Harness};
use hostwright_core::site::SiteKind;
use hostwright_db::models::operation::{CancelOutcome, NewOperation};
use hostwright_db::models::status::{OperationStatus, WebsiteStatus};
use hostwright_orchestrator::store::OperationStore;
use hostwright_orchestrator::{Operation, Orchestrator};

fn orchestrator(h: &Harness) -> Orchestrator {
    Orchestrator::new(h.ctx.clone(), None, vec![], None)
}

#[tokio::test]
async fn queued_provision_runs_to_completion() {
    let h = harness(FakeExecutor::new());
    let site = h.create_site("queued.example.com", SiteKind::Static, None).await;
    let orch = orchestrator(&h);

    let job = orch
        .enqueue(&Operation::ProvisionSite { website_id: site.id })
        .await
        .unwrap();
    assert_eq!(job.status(), OperationStatus::Pending);
    assert_eq!(job.kind, "provision_site");
    assert_eq!(job.resource_key, format!("site:{}", site.id));

    let done = orch.run_next().await.unwrap().unwrap();
    assert_eq!(done.status(), OperationStatus::Completed);
    assert_eq!(done.result.unwrap()["domain"], "queued.example.com");
    assert_eq!(
        h.ctx.website(site.id).await.unwrap().status(),
        WebsiteStatus::Active
    );
    assert!(orch.run_next().await.unwrap().is_none());
}

#[tokio::test]
async fn failed_operation_records_the_error() {
    let exec = FakeExecutor::new();
    exec.fail_on("useradd", "useradd: permission denied");
    let h = harness(exec);
    let site = h.create_site("broken.example.com", SiteKind::Static, None).await;
    let orch = orchestrator(&h);

    orch.enqueue(&Operation::ProvisionSite { website_id: site.id })
        .await
        .unwrap();
    let done = orch.run_next().await.unwrap().unwrap();

    assert_eq!(done.status(), OperationStatus::Failed);
    assert!(done.error.unwrap().contains("permission denied"));
}

#[tokio::test]
async fn pending_job_is_cancelled_immediately() {
    let h = harness(FakeExecutor::new());
    let site = h.create_site("a.example.com", SiteKind::Static, None).await;
    let orch = orchestrator(&h);
    let job = orch
        .enqueue(&Operation::ProvisionSite { website_id: site.id })
        .await
        .unwrap();

    assert_eq!(orch.cancel(job.id).await.unwrap(), CancelOutcome::Cancelled);
    assert_eq!(orch.job(job.id).await.unwrap().status(), OperationStatus::Cancelled);
    assert!(orch.run_next().await.unwrap().is_none());
    assert_eq!(orch.cancel(job.id).await.unwrap(), CancelOutcome::AlreadyFinished);
}

#[tokio::test]
async fn running_job_stops_at_its_next_checkpoint() {
    let exec = FakeExecutor::new();
    let h = harness(exec.clone());
    let site = h.create_site("a.example.com", SiteKind::Static, None).await;
    let orch = orchestrator(&h);
    let job = orch
        .enqueue(&Operation::ProvisionSite { website_id: site.id })
        .await
        .unwrap();

    let claimed = h.store.claim_next_operation().await.unwrap().unwrap();
    assert_eq!(orch.cancel(job.id).await.unwrap(), CancelOutcome::Requested);

    let finished = orch.run_job(claimed).await.unwrap();
    assert_eq!(finished.status(), OperationStatus::Cancelled);
    assert!(exec.commands().is_empty());
    assert_eq!(
        h.ctx.website(site.id).await.unwrap().status(),
        WebsiteStatus::Pending
    );
}

#[tokio::test]
async fn one_job_per_resource_at_a_time() {
    let h = harness(FakeExecutor::new());
    let first = h.create_site("one.example.com", SiteKind::Static, None).await;
    let second = h.create_site("two.example.com", SiteKind::Static, None).await;
    let orch = orchestrator(&h);

    let a = orch
        .enqueue(&Operation::ProvisionSite { website_id: first.id })
        .await
        .unwrap();
    let b = orch
        .enqueue(&Operation::SuspendSite { website_id: first.id })
        .await
        .unwrap();
    let c = orch
        .enqueue(&Operation::ProvisionSite { website_id: second.id })
        .await
        .unwrap();

    let claimed_a = h.store.claim_next_operation().await.unwrap().unwrap();
    let claimed_c = h.store.claim_next_operation().await.unwrap().unwrap();
    assert_eq!((claimed_a.id, claimed_c.id), (a.id, c.id));
    assert!(h.store.claim_next_operation().await.unwrap().is_none());

    orch.run_job(claimed_a).await.unwrap();
    let claimed_b = h.store.claim_next_operation().await.unwrap().unwrap();
    assert_eq!(claimed_b.id, b.id);
}

#[tokio::test]
async fn orphaned_jobs_are_requeued() {
    let h = harness(FakeExecutor::new());
    let site = h.create_site("a.example.com", SiteKind::Static, None).await;
    let orch = orchestrator(&h);
    let job = orch
        .enqueue(&Operation::ProvisionSite { website_id: site.id })
        .await
        .unwrap();
    h.store.claim_next_operation().await.unwrap();

    assert_eq!(orch.requeue_orphaned().await.unwrap(), 1);
    assert_eq!(orch.job(job.id).await.unwrap().status(), OperationStatus::Pending);
    let done = orch.run_next().await.unwrap().unwrap();
    assert_eq!(done.status(), OperationStatus::Completed);
}

#[tokio::test]
async fn malformed_params_fail_the_job() {
    let h = harness(FakeExecutor::new());
    let orch = orchestrator(&h);
    h.store
        .enqueue_operation(&NewOperation {
            kind: "provision_site".into(),
            resource_key: "site:99".into(),
            params: serde_json::json!({ "kind": "launch_rockets" }),
        })
        .await
        .unwrap();

    let done = orch.run_next().await.unwrap().unwrap();
    assert_eq!(done.status(), OperationStatus::Failed);
    assert!(done.error.unwrap().contains("Malformed"));
}
