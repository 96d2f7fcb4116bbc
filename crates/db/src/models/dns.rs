//! DNS zone and record models.

use hostwright_core::dns::{DnsRecord, RecordType};
use hostwright_core::error::CoreError;
use hostwright_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `dns_zones` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DnsZone {
    pub id: DbId,
    pub zone_name: String,
    pub provider_zone_id: Option<String>,
    pub sync_enabled: bool,
    pub last_synced_at: Option<Timestamp>,
    pub last_sync_error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A row from the `dns_records` table, ordered by `position`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DnsRecordRow {
    pub id: DbId,
    pub zone_id: DbId,
    pub position: i32,
    pub record_type: String,
    pub name: String,
    pub value: String,
    pub ttl: i32,
    pub priority: Option<i32>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl DnsRecordRow {
    pub fn to_record(&self) -> Result<DnsRecord, CoreError> {
        Ok(DnsRecord {
            record_type: RecordType::parse(&self.record_type)?,
            name: self.name.clone(),
            value: self.value.clone(),
            ttl: self.ttl,
            priority: self.priority,
        })
    }
}

/// DTO for creating a zone.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateZone {
    pub zone_name: String,
    pub provider_zone_id: Option<String>,
    pub sync_enabled: Option<bool>,
}
