//! Bearer-token authentication for operator endpoints.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use hostwright_core::error::CoreError;
use hostwright_core::hashing::sha256_hex;

use crate::error::AppError;
use crate::state::AppState;

/// Proof that the request carried the configured `ADMIN_TOKEN`.
///
/// Add it as a handler parameter to protect the endpoint:
///
/// ```ignore
/// async fn my_handler(_admin: RequireAdmin) -> AppResult<Json<()>> {
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RequireAdmin;

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Core(CoreError::Unauthorized("Missing Authorization header".into())))?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::Core(CoreError::Unauthorized(
                "Invalid Authorization format. Expected: Bearer <token>".into(),
            ))
        })?;

        if sha256_hex(token.trim().as_bytes()) != sha256_hex(state.config.admin_token.as_bytes()) {
            return Err(AppError::Core(CoreError::Unauthorized("Invalid token".into())));
        }

        Ok(RequireAdmin)
    }
}
