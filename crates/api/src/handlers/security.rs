//! Handlers for the backup encryption key pair.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use hostwright_core::error::CoreError;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct GenerateKeyRequest {
    /// RSA modulus size; 3072 when absent.
    pub bits: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct PrivateKeyDownload {
    pub private_key_pem: String,
    pub warning: &'static str,
}

const ALLOWED_KEY_BITS: [usize; 3] = [2048, 3072, 4096];

const DOWNLOAD_WARNING: &str =
    "Store this key offline. It will not be shown again, and encrypted backups cannot be restored without it.";

/// GET /api/v1/security/backup-key
pub async fn key_info(_admin: RequireAdmin, State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let info = state.orchestrator.backups.key_info().await?;
    Ok(Json(DataResponse::new(info)))
}

/// POST /api/v1/security/backup-key
///
/// Generate or rotate the key pair.
pub async fn generate_key(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    input: Option<Json<GenerateKeyRequest>>,
) -> AppResult<impl IntoResponse> {
    let input = input.map(|Json(i)| i).unwrap_or_default();
    if let Some(bits) = input.bits {
        if !ALLOWED_KEY_BITS.contains(&bits) {
            return Err(AppError::Core(CoreError::Validation(format!(
                "Key size must be one of {ALLOWED_KEY_BITS:?} bits"
            ))));
        }
    }
    let info = state.orchestrator.backups.generate_key_pair(input.bits).await?;
    Ok(Json(DataResponse::new(info)))
}

/// GET /api/v1/security/backup-key/private
///
/// One-time download; later requests answer 409.
pub async fn download_private_key(
    _admin: RequireAdmin,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let pem = state.orchestrator.backups.download_private_key().await?;
    Ok(Json(DataResponse::new(PrivateKeyDownload {
        private_key_pem: pem,
        warning: DOWNLOAD_WARNING,
    })))
}
