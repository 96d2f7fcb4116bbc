use axum::routing::{get, post};
use axum::Router;

use crate::handlers::dns;
use crate::state::AppState;

/// Routes mounted at `/dns`.
///
/// ```text
/// POST   /zones/{id}/sync            -> sync_zone (queued)
/// POST   /zones/{id}/common-records  -> add_common_records (queued)
/// GET    /propagation                -> check_propagation
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/zones/{id}/sync", post(dns::sync_zone))
        .route("/zones/{id}/common-records", post(dns::add_common_records))
        .route("/propagation", get(dns::check_propagation))
}
