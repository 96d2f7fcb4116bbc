//! Public receiver for git host push notifications.
//!
//! Authenticated by the per-site HMAC signature, not the admin token.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use hostwright_core::types::DbId;
use hostwright_core::webhook::{EVENT_HEADER, SIGNATURE_HEADER};
use hostwright_orchestrator::git::WebhookDecision;
use hostwright_orchestrator::Operation;

use crate::error::AppResult;
use crate::handlers::queue;
use crate::state::AppState;

/// POST /api/v1/git/webhook/{website_id}
///
/// A signed push to the tracked branch queues a pull (`202`); anything
/// else is acknowledged and ignored (`200`).
pub async fn receive(
    State(state): State<AppState>,
    Path(website_id): Path<DbId>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let decision = state
        .orchestrator
        .git
        .verify_webhook(website_id, header(EVENT_HEADER), header(SIGNATURE_HEADER), &body)
        .await?;

    match decision {
        WebhookDecision::Deploy => {
            tracing::info!(website_id, "Webhook push accepted, queueing pull");
            Ok(queue(&state, Operation::GitPull { website_id }).await?.into_response())
        }
        WebhookDecision::Ignore(reason) => {
            tracing::debug!(website_id, reason = %reason, "Webhook delivery ignored");
            Ok((
                StatusCode::OK,
                Json(serde_json::json!({ "success": true, "ignored": reason })),
            )
                .into_response())
        }
    }
}
