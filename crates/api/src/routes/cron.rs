use axum::routing::post;
use axum::Router;

use crate::handlers::cron;
use crate::state::AppState;

/// Routes mounted at `/cron`.
///
/// ```text
/// POST   /validate        -> validate_expression
/// POST   /jobs/{id}/run   -> run_now (queued)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/validate", post(cron::validate_expression))
        .route("/jobs/{id}/run", post(cron::run_now))
}
