//! Repository for the `dns_zones` and `dns_records` tables.

use sqlx::PgPool;
use hostwright_core::dns::DnsRecord;
use hostwright_core::types::DbId;

use crate::models::dns::{CreateZone, DnsRecordRow, DnsZone};

/// Column list for `dns_zones` queries.
const ZONE_COLUMNS: &str = "\
    id, zone_name, provider_zone_id, sync_enabled, last_synced_at, last_sync_error, \
    created_at, updated_at";

/// Column list for `dns_records` queries.
const RECORD_COLUMNS: &str =
    "id, zone_id, position, record_type, name, value, ttl, priority, created_at, updated_at";

/// Provides CRUD operations for DNS zones and their records.
pub struct DnsRepo;

impl DnsRepo {
    pub async fn create_zone(pool: &PgPool, input: &CreateZone) -> Result<DnsZone, sqlx::Error> {
        let query = format!(
            "INSERT INTO dns_zones (zone_name, provider_zone_id, sync_enabled) \
             VALUES ($1, $2, COALESCE($3, true)) \
             RETURNING {ZONE_COLUMNS}"
        );
        sqlx::query_as::<_, DnsZone>(&query)
            .bind(&input.zone_name)
            .bind(&input.provider_zone_id)
            .bind(input.sync_enabled)
            .fetch_one(pool)
            .await
    }

    pub async fn find_zone(pool: &PgPool, id: DbId) -> Result<Option<DnsZone>, sqlx::Error> {
        let query = format!("SELECT {ZONE_COLUMNS} FROM dns_zones WHERE id = $1");
        sqlx::query_as::<_, DnsZone>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_zone_by_name(pool: &PgPool, name: &str) -> Result<Option<DnsZone>, sqlx::Error> {
        let query = format!("SELECT {ZONE_COLUMNS} FROM dns_zones WHERE zone_name = $1");
        sqlx::query_as::<_, DnsZone>(&query)
            .bind(name)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_zones(pool: &PgPool) -> Result<Vec<DnsZone>, sqlx::Error> {
        let query = format!("SELECT {ZONE_COLUMNS} FROM dns_zones ORDER BY zone_name");
        sqlx::query_as::<_, DnsZone>(&query).fetch_all(pool).await
    }

    pub async fn set_provider_zone_id(pool: &PgPool, id: DbId, provider_zone_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE dns_zones SET provider_zone_id = $2 WHERE id = $1")
            .bind(id)
            .bind(provider_zone_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Record the outcome of a sync. A successful sync clears the error.
    pub async fn record_sync(pool: &PgPool, id: DbId, error: Option<&str>) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE dns_zones SET \
                 last_synced_at = CASE WHEN $2::TEXT IS NULL THEN NOW() ELSE last_synced_at END, \
                 last_sync_error = $2 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Records of a zone in their stored order.
    pub async fn list_records(pool: &PgPool, zone_id: DbId) -> Result<Vec<DnsRecordRow>, sqlx::Error> {
        let query = format!(
            "SELECT {RECORD_COLUMNS} FROM dns_records WHERE zone_id = $1 ORDER BY position, id"
        );
        sqlx::query_as::<_, DnsRecordRow>(&query)
            .bind(zone_id)
            .fetch_all(pool)
            .await
    }

    /// Append a record at the end of the zone's sequence.
    pub async fn add_record(pool: &PgPool, zone_id: DbId, record: &DnsRecord) -> Result<DnsRecordRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO dns_records (zone_id, position, record_type, name, value, ttl, priority) \
             VALUES ($1, (SELECT COALESCE(MAX(position), 0) + 1 FROM dns_records WHERE zone_id = $1), \
                     $2, $3, $4, $5, $6) \
             RETURNING {RECORD_COLUMNS}"
        );
        sqlx::query_as::<_, DnsRecordRow>(&query)
            .bind(zone_id)
            .bind(record.record_type.as_str())
            .bind(&record.name)
            .bind(&record.value)
            .bind(record.ttl)
            .bind(record.priority)
            .fetch_one(pool)
            .await
    }

    pub async fn delete_record(pool: &PgPool, zone_id: DbId, record_id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM dns_records WHERE id = $1 AND zone_id = $2")
            .bind(record_id)
            .bind(zone_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
