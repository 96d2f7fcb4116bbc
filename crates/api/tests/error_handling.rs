//! Tests for `AppError` → HTTP response mapping.
//!
//! These call `IntoResponse` directly on `AppError` values; no server needed.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use http_body_util::BodyExt;
use hostwright_api::error::AppError;
use hostwright_core::error::CoreError;

/// Helper: convert an `AppError` into its status code and parsed JSON body.
async fn error_to_response(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

#[tokio::test]
async fn not_found_error_returns_404() {
    let err = AppError::Core(CoreError::NotFound {
        entity: "Website",
        id: 42,
    });

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["success"], false);
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["error"], "Website with id 42 not found");
}

#[tokio::test]
async fn validation_error_returns_400() {
    let (status, json) = error_to_response(AppError::Core(CoreError::Validation("bad domain".into()))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(json["error"], "bad domain");
}

#[tokio::test]
async fn conflict_error_returns_409() {
    let (status, json) = error_to_response(AppError::Core(CoreError::Conflict("busy".into()))).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "CONFLICT");
}

#[tokio::test]
async fn entitlement_error_returns_403() {
    let (status, json) =
        error_to_response(AppError::Core(CoreError::Entitlement("plan lacks tenants".into()))).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["code"], "ENTITLEMENT_REQUIRED");
}

#[tokio::test]
async fn cancelled_error_returns_409() {
    let (status, json) = error_to_response(AppError::Core(CoreError::Cancelled("stopped".into()))).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "CANCELLED");
}

#[tokio::test]
async fn host_failures_are_gateway_errors() {
    let (status, json) = error_to_response(AppError::Core(CoreError::Connection {
        host: "web1".into(),
        message: "connection refused".into(),
    }))
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["code"], "CONNECTION_ERROR");

    let (status, json) = error_to_response(AppError::Core(CoreError::Command {
        command: "nginx -t".into(),
        exit_code: Some(1),
        stderr: "syntax error".into(),
    }))
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["code"], "COMMAND_FAILED");
}

#[tokio::test]
async fn internal_errors_do_not_leak_details() {
    let (status, json) =
        error_to_response(AppError::InternalError("pool exhausted at 10.0.0.5".into())).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERNAL_ERROR");
    assert_eq!(json["error"], "An internal error occurred");
}

#[tokio::test]
async fn row_not_found_returns_404() {
    let (status, json) = error_to_response(AppError::Database(sqlx::Error::RowNotFound)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
}
