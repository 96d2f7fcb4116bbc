//! Handlers for `/sites/{id}/logs`: read-only log access.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use hostwright_core::log_tail::LogKind;
use hostwright_core::types::{DbId, Timestamp};
use serde::Deserialize;

use crate::error::AppResult;
use crate::middleware::auth::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub lines: Option<usize>,
    /// Literal, case-insensitive filter.
    pub search: Option<String>,
    /// RFC 3339 lower bound on line timestamps.
    pub since: Option<Timestamp>,
}

/// GET /api/v1/sites/{id}/logs/{log}
///
/// `log` is one of `nginx_access`, `nginx_error`, `site_error`, `cms_debug`. A `search` takes precedence
/// over `since`; with neither, the tail of the log is returned.
pub async fn read_log(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path((website_id, log)): Path<(DbId, String)>,
    Query(params): Query<LogQuery>,
) -> AppResult<impl IntoResponse> {
    let log = LogKind::parse(&log)?;
    let logs = &state.orchestrator.logs;

    let excerpt = match (params.search.as_deref(), params.since) {
        (Some(pattern), _) => logs.search(website_id, log, pattern, params.lines).await?,
        (None, Some(since)) => logs.since(website_id, log, since).await?,
        (None, None) => logs.tail(website_id, log, params.lines).await?,
    };
    Ok(Json(DataResponse::new(excerpt)))
}
