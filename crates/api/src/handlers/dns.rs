//! Handlers for `/dns`: zone sync and propagation checks.

use std::net::Ipv4Addr;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use hostwright_core::dns::RecordType;
use hostwright_core::error::CoreError;
use hostwright_core::types::DbId;
use hostwright_orchestrator::store::DnsStore;
use hostwright_orchestrator::Operation;
use serde::Deserialize;

use crate::error::AppResult;
use crate::handlers::queue;
use crate::middleware::auth::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CommonRecordsRequest {
    pub ipv4: String,
}

#[derive(Debug, Deserialize)]
pub struct PropagationQuery {
    pub domain: String,
    #[serde(rename = "type")]
    pub record_type: Option<String>,
}

async fn ensure_zone(state: &AppState, zone_id: DbId) -> AppResult<()> {
    state
        .orchestrator
        .ctx
        .store
        .find_zone(zone_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "DnsZone",
            id: zone_id,
        })?;
    Ok(())
}

/// POST /api/v1/dns/zones/{id}/sync
pub async fn sync_zone(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(zone_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    ensure_zone(&state, zone_id).await?;
    queue(&state, Operation::SyncZone { zone_id }).await
}

/// POST /api/v1/dns/zones/{id}/common-records
///
/// Add the usual apex, `www` and mail records pointing at `ipv4`, then
/// sync the zone.
pub async fn add_common_records(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(zone_id): Path<DbId>,
    Json(input): Json<CommonRecordsRequest>,
) -> AppResult<impl IntoResponse> {
    let ipv4: Ipv4Addr = input
        .ipv4
        .trim()
        .parse()
        .map_err(|_| CoreError::Validation(format!("'{}' is not an IPv4 address", input.ipv4)))?;
    ensure_zone(&state, zone_id).await?;
    queue(
        &state,
        Operation::AddCommonRecords {
            zone_id,
            ipv4: ipv4.to_string(),
        },
    )
    .await
}

/// GET /api/v1/dns/propagation?domain=&type=
///
/// `type` defaults to `A`.
pub async fn check_propagation(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Query(params): Query<PropagationQuery>,
) -> AppResult<impl IntoResponse> {
    let record_type = RecordType::parse(params.record_type.as_deref().unwrap_or("A"))?;
    let report = state
        .orchestrator
        .dns
        .check_propagation(params.domain.trim(), record_type)
        .await?;
    Ok(Json(DataResponse::new(report)))
}
