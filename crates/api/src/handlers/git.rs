//! Handlers for `/sites/{id}/git`: deployments from a git repository.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use hostwright_core::types::DbId;
use hostwright_orchestrator::git::MAX_HISTORY;
use hostwright_orchestrator::Operation;
use serde::Deserialize;
use validator::Validate;

use crate::error::AppResult;
use crate::handlers::queue_for_site;
use crate::middleware::auth::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

const DEFAULT_LIMIT: usize = 20;

#[derive(Debug, Deserialize, Validate)]
pub struct CloneRequest {
    /// May embed credentials; they are masked wherever the URL is shown.
    #[validate(length(min = 1, max = 2048))]
    pub repo_url: String,
    #[validate(length(min = 1, max = 255))]
    pub branch: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RollbackRequest {
    #[validate(length(min = 4, max = 64))]
    pub commit: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SwitchBranchRequest {
    #[validate(length(min = 1, max = 255))]
    pub branch: String,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

impl LimitQuery {
    fn resolve(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_HISTORY)
    }
}

/// POST /api/v1/sites/{id}/git/clone
pub async fn clone_repository(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(website_id): Path<DbId>,
    Json(input): Json<CloneRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    queue_for_site(
        &state,
        website_id,
        Operation::GitClone {
            website_id,
            repo_url: input.repo_url,
            branch: input.branch,
        },
    )
    .await
}

/// POST /api/v1/sites/{id}/git/pull
pub async fn pull(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(website_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    queue_for_site(&state, website_id, Operation::GitPull { website_id }).await
}

/// POST /api/v1/sites/{id}/git/rollback
pub async fn rollback(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(website_id): Path<DbId>,
    Json(input): Json<RollbackRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    queue_for_site(
        &state,
        website_id,
        Operation::GitRollback {
            website_id,
            commit: input.commit,
        },
    )
    .await
}

/// POST /api/v1/sites/{id}/git/branch
pub async fn switch_branch(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(website_id): Path<DbId>,
    Json(input): Json<SwitchBranchRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    queue_for_site(
        &state,
        website_id,
        Operation::GitSwitchBranch {
            website_id,
            branch: input.branch,
        },
    )
    .await
}

/// GET /api/v1/sites/{id}/git/history?limit=
pub async fn history(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(website_id): Path<DbId>,
    Query(params): Query<LimitQuery>,
) -> AppResult<impl IntoResponse> {
    let commits = state.orchestrator.git.history(website_id, params.resolve()).await?;
    Ok(Json(DataResponse::new(commits)))
}

/// GET /api/v1/sites/{id}/git/branches
pub async fn branches(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(website_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let branches = state.orchestrator.git.branches(website_id).await?;
    Ok(Json(DataResponse::new(branches)))
}

/// GET /api/v1/sites/{id}/git/status
pub async fn status(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(website_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let status = state.orchestrator.git.status(website_id).await?;
    Ok(Json(DataResponse::new(status)))
}

/// GET /api/v1/sites/{id}/git/deployments?limit=
pub async fn deployments(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(website_id): Path<DbId>,
    Query(params): Query<LimitQuery>,
) -> AppResult<impl IntoResponse> {
    let limit = params.resolve() as i64;
    let deployments = state.orchestrator.git.deployments(website_id, limit).await?;
    Ok(Json(DataResponse::new(deployments)))
}

/// POST /api/v1/sites/{id}/git/webhook
///
/// Issue a new webhook secret, invalidating the previous one. The secret
/// is only ever returned here.
pub async fn setup_webhook(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(website_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let setup = state
        .orchestrator
        .git
        .setup_webhook(website_id, &state.config.public_base_url)
        .await?;
    Ok(Json(DataResponse::new(setup)))
}
