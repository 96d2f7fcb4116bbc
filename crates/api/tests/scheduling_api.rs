//! Cron, DNS and backup key endpoints.

mod common;

use axum::http::StatusCode;
use common::{body_json, TestApp};

#[tokio::test]
async fn valid_cron_expression_previews_runs() {
    let app = TestApp::new();
    let response = app
        .post_json(
            "/api/v1/cron/validate",
            serde_json::json!({ "expression": "*/15 * * * *" }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["valid"], true);
    assert_eq!(json["data"]["next_runs"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn invalid_cron_expression_is_reported_not_rejected() {
    let app = TestApp::new();
    let response = app
        .post_json(
            "/api/v1/cron/validate",
            serde_json::json!({ "expression": "61 * * * *" }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["valid"], false);
    assert!(json["data"]["error"].is_string());
}

#[tokio::test]
async fn run_cron_job_now_is_queued() {
    let app = TestApp::new();
    let site = app.create_static_site("cron.example.com").await;
    let job = app.store.add_cron_job(site, "0 3 * * *", "php artisan schedule:run", None);

    let response = app.post(&format!("/api/v1/cron/jobs/{}/run", job.id)).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(body_json(response).await["kind"], "run_cron_job");

    let response = app.post("/api/v1/cron/jobs/999999/run").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn common_records_require_an_ipv4_address() {
    let app = TestApp::new();
    let zone = app.store.add_zone("example.com");

    let response = app
        .post_json(
            &format!("/api/v1/dns/zones/{}/common-records", zone.id),
            serde_json::json!({ "ipv4": "2001:db8::1" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post_json(
            &format!("/api/v1/dns/zones/{}/common-records", zone.id),
            serde_json::json!({ "ipv4": "203.0.113.10" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(body_json(response).await["kind"], "add_common_records");
}

#[tokio::test]
async fn sync_of_unknown_zone_returns_404() {
    let app = TestApp::new();
    let response = app.post("/api/v1/dns/zones/999999/sync").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unsupported_key_size_is_rejected() {
    let app = TestApp::new();
    let response = app
        .post_json(
            "/api/v1/security/backup-key",
            serde_json::json!({ "bits": 1024 }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_backup_type_is_rejected() {
    let app = TestApp::new();
    let site = app.create_static_site("backup.example.com").await;

    let response = app
        .post_json(
            &format!("/api/v1/sites/{site}/backups"),
            serde_json::json!({ "type": "everything" }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn backup_type_is_accepted_under_either_field_name() {
    let app = TestApp::new();
    let site = app.create_static_site("kinds.example.com").await;

    for body in [
        serde_json::json!({ "type": "db" }),
        serde_json::json!({ "backup_type": "files" }),
    ] {
        let response = app
            .post_json(&format!("/api/v1/sites/{site}/backups"), body)
            .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    let listed = body_json(app.get(&format!("/api/v1/sites/{site}/backups")).await).await;
    let mut kinds: Vec<_> = listed["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["backup_kind"].as_str().unwrap().to_string())
        .collect();
    kinds.sort();
    assert_eq!(kinds, ["DatabaseOnly", "FilesOnly"]);
}
