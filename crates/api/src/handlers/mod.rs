//! Request handlers, one module per resource.
//!
//! Long-running work is queued as an operation and answered with
//! `202 Accepted` and a job id; everything else answers inline.

pub mod backups;
pub mod certificates;
pub mod cron;
pub mod dns;
pub mod git;
pub mod jobs;
pub mod logs;
pub mod security;
pub mod servers;
pub mod sites;
pub mod webhook;

use axum::http::StatusCode;
use axum::Json;
use hostwright_core::types::DbId;
use hostwright_orchestrator::sites::SiteManager;
use hostwright_orchestrator::Operation;

use crate::error::AppResult;
use crate::response::JobAccepted;
use crate::state::AppState;

/// Queue `operation` and answer `202` with the job id.
pub(crate) async fn queue(state: &AppState, operation: Operation) -> AppResult<(StatusCode, Json<JobAccepted>)> {
    let job = state.orchestrator.enqueue(&operation).await?;
    Ok((StatusCode::ACCEPTED, Json(JobAccepted::from(&job))))
}

/// Queue a site operation, refusing sites already mid-transition.
pub(crate) async fn queue_for_site(
    state: &AppState,
    website_id: DbId,
    operation: Operation,
) -> AppResult<(StatusCode, Json<JobAccepted>)> {
    let site = state.orchestrator.ctx.website(website_id).await?;
    SiteManager::ensure_idle(&site)?;
    queue(state, operation).await
}
