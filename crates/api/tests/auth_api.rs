//! Admin token enforcement.

mod common;

use axum::body::Body;
use axum::http::header::AUTHORIZATION;
use axum::http::{Request, StatusCode};
use common::{body_json, TestApp};

#[tokio::test]
async fn missing_token_is_rejected() {
    let app = TestApp::new();
    let response = app
        .send(Request::get("/api/v1/sites").body(Body::empty()).unwrap())
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn wrong_token_is_rejected() {
    let app = TestApp::new();
    let response = app
        .send(
            Request::get("/api/v1/servers")
                .header(AUTHORIZATION, "Bearer not-the-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn non_bearer_scheme_is_rejected() {
    let app = TestApp::new();
    let response = app
        .send(
            Request::get("/api/v1/servers")
                .header(AUTHORIZATION, "Basic dXNlcjpwYXNz")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn valid_token_is_accepted() {
    let app = TestApp::new();
    let response = app.get("/api/v1/servers").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["data"][0]["name"], "web1");
}
