//! Public git webhook receiver. The only `/api/v1` route without the
//! admin token; deliveries are authenticated by signature instead.

use axum::routing::post;
use axum::Router;

use crate::handlers::webhook;
use crate::state::AppState;

/// Routes mounted at `/git/webhook`.
///
/// ```text
/// POST   /{website_id}    -> receive
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/{website_id}", post(webhook::receive))
}
