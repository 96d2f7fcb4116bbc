//! Handlers for site backups and restores.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use hostwright_core::backup::BackupKind;
use hostwright_core::types::DbId;
use hostwright_db::models::backup::SiteBackup;
use hostwright_orchestrator::backup::BackupOptions;
use hostwright_orchestrator::store::BackupStore;
use hostwright_orchestrator::Operation;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::handlers::queue_for_site;
use crate::middleware::auth::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateBackupRequest {
    /// `full`, `db` or `files`.
    #[serde(rename = "type", alias = "backup_type")]
    pub backup_type: String,
    #[serde(default)]
    pub encrypt: bool,
    #[serde(default)]
    pub upload_to_cloud: bool,
}

/// Body for a queued backup: the Pending row plus the job running it.
#[derive(Debug, Serialize)]
pub struct BackupQueued {
    pub success: bool,
    pub job_id: DbId,
    pub backup: SiteBackup,
}

/// GET /api/v1/sites/{id}/backups
///
/// Newest first.
pub async fn list_backups(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(website_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let backups = state.orchestrator.backups.list_backups(website_id).await?;
    Ok(Json(DataResponse::new(backups)))
}

/// POST /api/v1/sites/{id}/backups
///
/// Records a Pending backup straight away so the caller can follow it,
/// then queues the run.
pub async fn create_backup(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(website_id): Path<DbId>,
    Json(input): Json<CreateBackupRequest>,
) -> AppResult<impl IntoResponse> {
    let kind = BackupKind::parse(&input.backup_type)?;
    let backup = state.orchestrator.backups.request_backup(website_id, kind).await?;
    let options = BackupOptions {
        encrypt: input.encrypt,
        upload_to_cloud: input.upload_to_cloud,
    };
    let job = state
        .orchestrator
        .enqueue(&Operation::RunBackup {
            website_id,
            backup_id: backup.id,
            options,
        })
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(BackupQueued {
            success: true,
            job_id: job.id,
            backup,
        }),
    ))
}

/// POST /api/v1/backups/{id}/restore
pub async fn restore_backup(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(backup_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let backup = find_backup(&state, backup_id).await?;
    queue_for_site(
        &state,
        backup.website_id,
        Operation::RestoreBackup {
            website_id: backup.website_id,
            backup_id,
        },
    )
    .await
}

/// DELETE /api/v1/backups/{id}
///
/// Removes the local archive and its cold copy.
pub async fn delete_backup(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(backup_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    state.orchestrator.backups.delete_backup(backup_id).await?;
    tracing::info!(backup_id, "Backup deleted");
    Ok(Json(serde_json::json!({ "success": true })))
}

async fn find_backup(state: &AppState, backup_id: DbId) -> AppResult<SiteBackup> {
    Ok(state
        .orchestrator
        .ctx
        .store
        .find_backup(backup_id)
        .await?
        .ok_or(hostwright_core::error::CoreError::NotFound {
            entity: "SiteBackup",
            id: backup_id,
        })?)
}
