mod common;

use assert_matches::assert_matches;
use chrono::{Duration, DurationRound, Utc};
use common::{harness, FakeExecutor};
use hostwright_core::error::CoreError;
use hostwright_core::site::SiteKind;
use hostwright_core::types::Timestamp;
use hostwright_db::models::status::{OperationStatus, SslStatus};
use hostwright_events::bus::{SSL_EXPIRING, SSL_FAILED, SSL_ISSUED};
use hostwright_orchestrator::certificates::{CertificateManager, RenewalSummary};
use hostwright_orchestrator::store::OperationStore;
use hostwright_orchestrator::{Operation, Orchestrator};

/// Whole-second expiry `days` from now, as `openssl x509 -enddate` prints it.
fn enddate_in(days: i64) -> (Timestamp, String) {
    let at = (Utc::now() + Duration::days(days))
        .duration_trunc(Duration::seconds(1))
        .unwrap();
    (at, format!("notAfter={}\n", at.format("%b %d %H:%M:%S %Y GMT")))
}

#[tokio::test]
async fn issues_and_switches_the_site_to_tls() {
    let exec = FakeExecutor::new();
    // Inside the renewal window, so certbot is asked for a new one.
    let (expires_at, enddate) = enddate_in(10);
    exec.respond("openssl x509", &enddate);
    let h = harness(exec.clone());
    let mut events = h.events.subscribe();
    let site = h.active_site("tls.example.com", SiteKind::Static).await;

    let info = CertificateManager::new(h.ctx.clone()).issue(site.id).await.unwrap();

    assert_eq!(info.expires_at, expires_at);
    assert!(exec.ran("certbot certonly --webroot"));
    let site = h.ctx.website(site.id).await.unwrap();
    assert_eq!(site.ssl_status(), SslStatus::Active);
    assert_eq!(site.ssl_expires_at, Some(expires_at));
    assert!(exec
        .uploads()
        .iter()
        .any(|(path, body)| path.ends_with("tls.example.com.conf") && body.contains("listen 443 ssl")));
    assert_eq!(events.recv().await.unwrap().event_type, SSL_ISSUED);
}

#[tokio::test]
async fn valid_certificate_is_not_requested_again() {
    let exec = FakeExecutor::new();
    let (expires_at, enddate) = enddate_in(80);
    exec.respond("openssl x509", &enddate);
    let h = harness(exec.clone());
    let site = h.active_site("valid.example.com", SiteKind::Static).await;
    let certificates = CertificateManager::new(h.ctx.clone());

    certificates.issue(site.id).await.unwrap();
    certificates.issue(site.id).await.unwrap();

    assert!(!exec.ran("certbot"));
    let site = h.ctx.website(site.id).await.unwrap();
    assert_eq!(site.ssl_status(), SslStatus::Active);
    assert_eq!(site.ssl_expires_at, Some(expires_at));
}

#[tokio::test]
async fn issuing_requires_an_active_site() {
    let h = harness(FakeExecutor::new());
    let site = h.create_site("pending.example.com", SiteKind::Static, None).await;

    let err = CertificateManager::new(h.ctx.clone())
        .issue(site.id)
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::Validation(_));
}

#[tokio::test]
async fn certbot_failure_marks_the_certificate_failed() {
    let exec = FakeExecutor::new();
    exec.fail_on("certbot", "too many certificates already issued");
    let h = harness(exec);
    let mut events = h.events.subscribe();
    let site = h.active_site("limited.example.com", SiteKind::Static).await;

    let err = CertificateManager::new(h.ctx.clone())
        .issue(site.id)
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::ExternalService { .. });

    let site = h.ctx.website(site.id).await.unwrap();
    assert_eq!(site.ssl_status(), SslStatus::Failed);
    assert!(site.ssl_error.unwrap().contains("too many certificates"));
    assert_eq!(events.recv().await.unwrap().event_type, SSL_FAILED);
}

#[tokio::test]
async fn sweep_renews_due_certificates_and_skips_expired_failures() {
    let exec = FakeExecutor::new();
    let (_, enddate) = enddate_in(89);
    exec.respond("openssl x509", &enddate);
    let h = harness(exec.clone());

    let due = h.active_site("due.example.com", SiteKind::Static).await;
    h.store.update_website(due.id, |w| {
        w.ssl_status_id = SslStatus::Active.id();
        w.ssl_expires_at = Some(Utc::now() + Duration::days(10));
    });
    let lapsed = h.active_site("lapsed.example.com", SiteKind::Static).await;
    h.store.update_website(lapsed.id, |w| {
        w.ssl_status_id = SslStatus::Failed.id();
        w.ssl_expires_at = Some(Utc::now() - Duration::days(1));
    });
    let fresh = h.active_site("fresh.example.com", SiteKind::Static).await;
    h.store.update_website(fresh.id, |w| {
        w.ssl_status_id = SslStatus::Active.id();
        w.ssl_expires_at = Some(Utc::now() + Duration::days(60));
    });

    let orch = Orchestrator::new(h.ctx.clone(), None, vec![], None);
    let summary = orch.certificates.renew_due().await.unwrap();

    assert_eq!(
        summary,
        RenewalSummary { queued: 1, already_queued: 0, skipped: 1 }
    );
    // Nothing touches the host until the queued job runs.
    assert!(!exec.ran("certbot renew"));
    let again = orch.certificates.renew_due().await.unwrap();
    assert_eq!((again.queued, again.already_queued), (0, 1));

    let job = orch.run_next().await.unwrap().unwrap();
    assert_eq!(job.kind, "renew_certificate");
    assert_eq!(job.resource_key, format!("site:{}", due.id));
    assert_eq!(job.status(), OperationStatus::Completed);
    assert!(orch.run_next().await.unwrap().is_none());
    assert_eq!(exec.count("certbot renew --cert-name due.example.com"), 1);
    assert!(!exec.ran("--cert-name lapsed.example.com"));
    assert!(!exec.ran("--cert-name fresh.example.com"));
}

#[tokio::test]
async fn queued_renewal_waits_for_running_work_on_the_site() {
    let exec = FakeExecutor::new();
    let (_, enddate) = enddate_in(89);
    exec.respond("openssl x509", &enddate);
    let h = harness(exec.clone());
    let site = h.active_site("busy.example.com", SiteKind::Static).await;
    h.store.update_website(site.id, |w| {
        w.ssl_status_id = SslStatus::Active.id();
        w.ssl_expires_at = Some(Utc::now() + Duration::days(5));
    });
    let orch = Orchestrator::new(h.ctx.clone(), None, vec![], None);

    // Another operation on the same site is already running.
    orch.enqueue(&Operation::SuspendSite { website_id: site.id }).await.unwrap();
    let running = h.store.claim_next_operation().await.unwrap().unwrap();

    orch.certificates.renew_due().await.unwrap();
    assert!(h.store.claim_next_operation().await.unwrap().is_none());
    assert!(!exec.ran("certbot renew"));

    orch.run_job(running).await.unwrap();
    let renewal = h.store.claim_next_operation().await.unwrap().unwrap();
    assert_eq!(renewal.kind, "renew_certificate");
}

#[tokio::test]
async fn expiring_certificates_are_announced() {
    let h = harness(FakeExecutor::new());
    let mut events = h.events.subscribe();
    let soon = h.active_site("soon.example.com", SiteKind::Static).await;
    h.store.update_website(soon.id, |w| {
        w.ssl_status_id = SslStatus::Active.id();
        w.ssl_expires_at = Some(Utc::now() + Duration::days(3));
    });
    let later = h.active_site("later.example.com", SiteKind::Static).await;
    h.store.update_website(later.id, |w| {
        w.ssl_status_id = SslStatus::Active.id();
        w.ssl_expires_at = Some(Utc::now() + Duration::days(40));
    });

    let expiring = CertificateManager::new(h.ctx.clone()).expiring_soon(7).await.unwrap();

    assert_eq!(expiring.len(), 1);
    assert_eq!(expiring[0].domain, "soon.example.com");
    let event = events.recv().await.unwrap();
    assert_eq!(event.event_type, SSL_EXPIRING);
    assert_eq!(event.payload["domain"], "soon.example.com");
}
