//! Handlers for `/sites`: registration and lifecycle operations.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use hostwright_core::error::CoreError;
use hostwright_core::site::{DbEngine, SiteKind};
use hostwright_core::types::DbId;
use hostwright_db::models::status::WebsiteStatus;
use hostwright_orchestrator::sites::CreateSite;
use hostwright_orchestrator::store::WebsiteStore;
use hostwright_orchestrator::Operation;
use serde::Deserialize;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::handlers::{queue, queue_for_site};
use crate::middleware::auth::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSiteRequest {
    #[validate(length(min = 1, max = 253))]
    pub domain: String,
    pub kind: SiteKind,
    pub client_id: Option<DbId>,
    pub server_id: Option<DbId>,
    pub db_engine: Option<DbEngine>,
    #[validate(length(min = 1, max = 64))]
    pub db_name: Option<String>,
    #[validate(length(min = 1, max = 32))]
    pub db_user: Option<String>,
    #[serde(default)]
    pub tenant_apps: Vec<String>,
    #[validate(email)]
    pub admin_email: Option<String>,
}

impl From<CreateSiteRequest> for CreateSite {
    fn from(req: CreateSiteRequest) -> Self {
        CreateSite {
            domain: req.domain,
            kind: req.kind,
            client_id: req.client_id,
            server_id: req.server_id,
            db_engine: req.db_engine,
            db_name: req.db_name,
            db_user: req.db_user,
            tenant_apps: req.tenant_apps,
            admin_email: req.admin_email,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SiteListQuery {
    pub server_id: Option<DbId>,
}

/// GET /api/v1/sites
pub async fn list_sites(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Query(params): Query<SiteListQuery>,
) -> AppResult<impl IntoResponse> {
    let sites = state.orchestrator.ctx.store.list_websites(params.server_id).await?;
    Ok(Json(DataResponse::new(sites)))
}

/// POST /api/v1/sites
///
/// Register a site in `Pending`. Provisioning is a separate request.
pub async fn create_site(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Json(input): Json<CreateSiteRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    let site = state.orchestrator.sites.create(input.into()).await?;
    tracing::info!(website_id = site.id, domain = %site.domain, "Site registered");
    Ok((StatusCode::CREATED, Json(DataResponse::new(site))))
}

/// GET /api/v1/sites/{id}
pub async fn get_site(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(website_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let site = state.orchestrator.ctx.website(website_id).await?;
    Ok(Json(DataResponse::new(site)))
}

/// POST /api/v1/sites/{id}/provision
///
/// Also resumes a site left in `Provisioning` by a failed step.
pub async fn provision_site(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(website_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let site = state.orchestrator.ctx.website(website_id).await?;
    if site.status() == WebsiteStatus::Deprovisioning {
        return Err(AppError::Core(CoreError::Conflict(format!(
            "Site {} is being deprovisioned",
            site.domain
        ))));
    }
    queue(&state, Operation::ProvisionSite { website_id }).await
}

/// POST /api/v1/sites/{id}/deprovision
pub async fn deprovision_site(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(website_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    queue_for_site(&state, website_id, Operation::DeprovisionSite { website_id }).await
}

/// POST /api/v1/sites/{id}/suspend
pub async fn suspend_site(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(website_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    queue_for_site(&state, website_id, Operation::SuspendSite { website_id }).await
}

/// POST /api/v1/sites/{id}/unsuspend
pub async fn unsuspend_site(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(website_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    queue_for_site(&state, website_id, Operation::UnsuspendSite { website_id }).await
}

/// POST /api/v1/sites/{id}/regenerate-config
pub async fn regenerate_config(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(website_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    queue_for_site(&state, website_id, Operation::RegenerateConfig { website_id }).await
}
