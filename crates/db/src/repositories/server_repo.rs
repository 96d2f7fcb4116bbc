//! Repository for the `hosting_servers` table.

use sqlx::PgPool;
use hostwright_core::types::DbId;

use crate::models::server::{CreateServer, HealthSample, HostingServer};
use crate::models::status::{ServerHealth, WebsiteStatus};

/// Column list for `hosting_servers` queries.
const COLUMNS: &str = "\
    id, name, address, ssh_port, ssh_user, identity_file, is_local, is_enabled, \
    max_websites, installed_services, provisioned_at, health_status_id, \
    cpu_percent, memory_used_mb, memory_total_mb, disk_used_gb, disk_total_gb, \
    load_1, load_5, load_15, last_health_check_at, last_error, created_at, updated_at";

/// Provides CRUD operations for hosting servers.
pub struct ServerRepo;

impl ServerRepo {
    pub async fn create(pool: &PgPool, input: &CreateServer) -> Result<HostingServer, sqlx::Error> {
        let query = format!(
            "INSERT INTO hosting_servers (name, address, ssh_port, ssh_user, identity_file, is_local, max_websites) \
             VALUES ($1, $2, COALESCE($3, 22), COALESCE($4, 'root'), $5, COALESCE($6, false), COALESCE($7, 100)) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, HostingServer>(&query)
            .bind(&input.name)
            .bind(&input.address)
            .bind(input.ssh_port)
            .bind(&input.ssh_user)
            .bind(&input.identity_file)
            .bind(input.is_local)
            .bind(input.max_websites)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<HostingServer>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM hosting_servers WHERE id = $1");
        sqlx::query_as::<_, HostingServer>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_name(pool: &PgPool, name: &str) -> Result<Option<HostingServer>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM hosting_servers WHERE name = $1");
        sqlx::query_as::<_, HostingServer>(&query)
            .bind(name)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<HostingServer>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM hosting_servers ORDER BY name");
        sqlx::query_as::<_, HostingServer>(&query).fetch_all(pool).await
    }

    /// Record the installed-service inventory after provisioning.
    pub async fn set_inventory(
        pool: &PgPool,
        id: DbId,
        services: &[String],
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE hosting_servers \
             SET installed_services = $2, provisioned_at = NOW(), last_error = NULL \
             WHERE id = $1",
        )
        .bind(id)
        .bind(serde_json::json!(services))
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn set_error(pool: &PgPool, id: DbId, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE hosting_servers SET last_error = $2 WHERE id = $1")
            .bind(id)
            .bind(error)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Store a health check result. Metrics are left unchanged when the
    /// sample has none (host unreachable).
    pub async fn record_health(
        pool: &PgPool,
        id: DbId,
        sample: &HealthSample,
    ) -> Result<(), sqlx::Error> {
        let m = sample.metrics.as_ref();
        sqlx::query(
            "UPDATE hosting_servers SET \
                 health_status_id = $2, \
                 cpu_percent = COALESCE($3, cpu_percent), \
                 memory_used_mb = COALESCE($4, memory_used_mb), \
                 memory_total_mb = COALESCE($5, memory_total_mb), \
                 disk_used_gb = COALESCE($6, disk_used_gb), \
                 disk_total_gb = COALESCE($7, disk_total_gb), \
                 load_1 = COALESCE($8, load_1), \
                 load_5 = COALESCE($9, load_5), \
                 load_15 = COALESCE($10, load_15), \
                 last_health_check_at = NOW(), \
                 last_error = $11 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(sample.health.id())
        .bind(m.map(|m| m.cpu_percent))
        .bind(m.map(|m| m.memory_used_mb))
        .bind(m.map(|m| m.memory_total_mb))
        .bind(m.map(|m| m.disk_used_gb))
        .bind(m.map(|m| m.disk_total_gb))
        .bind(m.map(|m| m.load_1))
        .bind(m.map(|m| m.load_5))
        .bind(m.map(|m| m.load_15))
        .bind(&sample.error)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Enabled, healthy servers under capacity with their site counts,
    /// least loaded first.
    pub async fn list_with_capacity(pool: &PgPool) -> Result<Vec<(HostingServer, i64)>, sqlx::Error> {
        let servers = Self::list(pool).await?;
        let counts: Vec<(DbId, i64)> = sqlx::query_as(
            "SELECT server_id, COUNT(*) FROM websites WHERE status_id <> $1 GROUP BY server_id",
        )
        .bind(WebsiteStatus::Deprovisioning.id())
        .fetch_all(pool)
        .await?;

        let mut out: Vec<(HostingServer, i64)> = servers
            .into_iter()
            .filter(|s| s.is_enabled && s.health() == ServerHealth::Healthy)
            .map(|s| {
                let n = counts.iter().find(|(id, _)| *id == s.id).map_or(0, |(_, n)| *n);
                (s, n)
            })
            .filter(|(s, n)| *n < i64::from(s.max_websites))
            .collect();
        out.sort_by_key(|(s, n)| (*n, s.id));
        Ok(out)
    }
}
