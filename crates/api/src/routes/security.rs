use axum::routing::get;
use axum::Router;

use crate::handlers::security;
use crate::state::AppState;

/// Routes mounted at `/security`.
///
/// ```text
/// GET    /backup-key          -> key_info
/// POST   /backup-key          -> generate_key
/// GET    /backup-key/private  -> download_private_key (once)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/backup-key",
            get(security::key_info).post(security::generate_key),
        )
        .route("/backup-key/private", get(security::download_private_key))
}
