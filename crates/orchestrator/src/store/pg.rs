//! [`Store`](super::Store) backed by PostgreSQL through the repositories.

use async_trait::async_trait;
use hostwright_core::backup::BackupKind;
use hostwright_core::dns::DnsRecord;
use hostwright_core::error::CoreError;
use hostwright_core::types::{DbId, Timestamp};
use hostwright_db::models::backup::{CompletedBackup, NewKeyPair, SecuritySettings, SiteBackup};
use hostwright_db::models::client::Client;
use hostwright_db::models::cron_job::{CronJob, CronRunResult};
use hostwright_db::models::dns::{DnsRecordRow, DnsZone};
use hostwright_db::models::operation::{CancelOutcome, NewOperation, OperationJob};
use hostwright_db::models::server::{HealthSample, HostingServer};
use hostwright_db::models::status::{SslStatus, WebsiteStatus};
use hostwright_db::models::website::{CreateWebsite, Deployment, NewDeployment, Website, WebsiteArchive};
use hostwright_db::repositories::{
    BackupRepo, ClientRepo, CronJobRepo, DnsRepo, OperationRepo, SecuritySettingsRepo, ServerRepo,
    WebsiteRepo,
};
use hostwright_db::DbPool;

use super::{
    BackupStore, ClientStore, CronStore, DnsStore, OperationStore, ServerStore, StoreResult,
    WebsiteStore,
};

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

/// Map a database error into the domain taxonomy.
///
/// Unique violations on `uq_` constraints are conflicts; everything else
/// is internal.
pub fn db_error(err: sqlx::Error) -> CoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            let constraint = db_err.constraint().unwrap_or("unknown");
            if constraint.starts_with("uq_") {
                return CoreError::Conflict(format!(
                    "Duplicate value violates unique constraint: {constraint}"
                ));
            }
        }
    }
    tracing::error!(error = %err, "Database error");
    CoreError::Internal(format!("database error: {err}"))
}

#[async_trait]
impl ServerStore for PgStore {
    async fn find_server(&self, id: DbId) -> StoreResult<Option<HostingServer>> {
        ServerRepo::find_by_id(&self.pool, id).await.map_err(db_error)
    }

    async fn find_server_by_name(&self, name: &str) -> StoreResult<Option<HostingServer>> {
        ServerRepo::find_by_name(&self.pool, name).await.map_err(db_error)
    }

    async fn list_servers(&self) -> StoreResult<Vec<HostingServer>> {
        ServerRepo::list(&self.pool).await.map_err(db_error)
    }

    async fn servers_with_capacity(&self) -> StoreResult<Vec<(HostingServer, i64)>> {
        ServerRepo::list_with_capacity(&self.pool).await.map_err(db_error)
    }

    async fn set_server_inventory(&self, id: DbId, services: &[String]) -> StoreResult<()> {
        ServerRepo::set_inventory(&self.pool, id, services).await.map_err(db_error)
    }

    async fn set_server_error(&self, id: DbId, error: &str) -> StoreResult<()> {
        ServerRepo::set_error(&self.pool, id, error).await.map_err(db_error)
    }

    async fn record_server_health(&self, id: DbId, sample: &HealthSample) -> StoreResult<()> {
        ServerRepo::record_health(&self.pool, id, sample).await.map_err(db_error)
    }
}

#[async_trait]
impl ClientStore for PgStore {
    async fn find_client(&self, id: DbId) -> StoreResult<Option<Client>> {
        ClientRepo::find_by_id(&self.pool, id).await.map_err(db_error)
    }

    async fn count_client_websites(&self, id: DbId) -> StoreResult<i64> {
        ClientRepo::count_websites(&self.pool, id).await.map_err(db_error)
    }
}

#[async_trait]
impl WebsiteStore for PgStore {
    async fn create_website(&self, input: &CreateWebsite) -> StoreResult<Website> {
        WebsiteRepo::create(&self.pool, input).await.map_err(db_error)
    }

    async fn find_website(&self, id: DbId) -> StoreResult<Option<Website>> {
        WebsiteRepo::find_by_id(&self.pool, id).await.map_err(db_error)
    }

    async fn find_website_by_domain(&self, domain: &str) -> StoreResult<Option<Website>> {
        WebsiteRepo::find_by_domain(&self.pool, domain).await.map_err(db_error)
    }

    async fn list_websites(&self, server_id: Option<DbId>) -> StoreResult<Vec<Website>> {
        WebsiteRepo::list(&self.pool, server_id).await.map_err(db_error)
    }

    async fn transition_website(
        &self,
        id: DbId,
        from: &[WebsiteStatus],
        to: WebsiteStatus,
    ) -> StoreResult<Option<Website>> {
        WebsiteRepo::transition(&self.pool, id, from, to).await.map_err(db_error)
    }

    async fn set_website_status(&self, id: DbId, status: WebsiteStatus, error: Option<&str>) -> StoreResult<()> {
        WebsiteRepo::set_status(&self.pool, id, status, error).await.map_err(db_error)
    }

    async fn set_provision_step(&self, id: DbId, step: Option<&str>) -> StoreResult<()> {
        WebsiteRepo::set_step(&self.pool, id, step).await.map_err(db_error)
    }

    async fn set_ssl(
        &self,
        id: DbId,
        status: SslStatus,
        expires_at: Option<Timestamp>,
        error: Option<&str>,
    ) -> StoreResult<()> {
        WebsiteRepo::set_ssl(&self.pool, id, status, expires_at, error)
            .await
            .map_err(db_error)
    }

    async fn list_ssl_expiring(&self, before: Timestamp) -> StoreResult<Vec<Website>> {
        WebsiteRepo::list_ssl_expiring(&self.pool, before).await.map_err(db_error)
    }

    async fn set_git(&self, id: DbId, repo_url: Option<&str>, branch: Option<&str>) -> StoreResult<()> {
        WebsiteRepo::set_git(&self.pool, id, repo_url, branch).await.map_err(db_error)
    }

    async fn record_deployment(&self, input: &NewDeployment) -> StoreResult<Deployment> {
        WebsiteRepo::record_deployment(&self.pool, input).await.map_err(db_error)
    }

    async fn list_deployments(&self, website_id: DbId, limit: i64) -> StoreResult<Vec<Deployment>> {
        WebsiteRepo::list_deployments(&self.pool, website_id, limit)
            .await
            .map_err(db_error)
    }

    async fn set_webhook_secret(&self, id: DbId, secret: Option<&str>) -> StoreResult<()> {
        WebsiteRepo::set_webhook_secret(&self.pool, id, secret).await.map_err(db_error)
    }

    async fn insert_archive(
        &self,
        website: &Website,
        archive_path: &str,
        purge_after: Timestamp,
    ) -> StoreResult<WebsiteArchive> {
        WebsiteRepo::insert_archive(&self.pool, website, archive_path, purge_after)
            .await
            .map_err(db_error)
    }

    async fn list_expired_archives(&self, now: Timestamp) -> StoreResult<Vec<WebsiteArchive>> {
        WebsiteRepo::list_expired_archives(&self.pool, now).await.map_err(db_error)
    }

    async fn mark_archive_purged(&self, id: DbId) -> StoreResult<()> {
        WebsiteRepo::mark_archive_purged(&self.pool, id).await.map_err(db_error)
    }
}

#[async_trait]
impl DnsStore for PgStore {
    async fn find_zone(&self, id: DbId) -> StoreResult<Option<DnsZone>> {
        DnsRepo::find_zone(&self.pool, id).await.map_err(db_error)
    }

    async fn find_zone_by_name(&self, name: &str) -> StoreResult<Option<DnsZone>> {
        DnsRepo::find_zone_by_name(&self.pool, name).await.map_err(db_error)
    }

    async fn list_zone_records(&self, zone_id: DbId) -> StoreResult<Vec<DnsRecordRow>> {
        DnsRepo::list_records(&self.pool, zone_id).await.map_err(db_error)
    }

    async fn add_zone_record(&self, zone_id: DbId, record: &DnsRecord) -> StoreResult<DnsRecordRow> {
        DnsRepo::add_record(&self.pool, zone_id, record).await.map_err(db_error)
    }

    async fn set_provider_zone_id(&self, id: DbId, provider_zone_id: &str) -> StoreResult<()> {
        DnsRepo::set_provider_zone_id(&self.pool, id, provider_zone_id)
            .await
            .map_err(db_error)
    }

    async fn record_zone_sync(&self, id: DbId, error: Option<&str>) -> StoreResult<()> {
        DnsRepo::record_sync(&self.pool, id, error).await.map_err(db_error)
    }
}

#[async_trait]
impl CronStore for PgStore {
    async fn find_cron_job(&self, id: DbId) -> StoreResult<Option<CronJob>> {
        CronJobRepo::find_by_id(&self.pool, id).await.map_err(db_error)
    }

    async fn list_due_cron_jobs(&self, now: Timestamp) -> StoreResult<Vec<CronJob>> {
        CronJobRepo::list_due(&self.pool, now).await.map_err(db_error)
    }

    async fn claim_cron_job(&self, id: DbId, now: Timestamp) -> StoreResult<Option<CronJob>> {
        CronJobRepo::claim(&self.pool, id, now).await.map_err(db_error)
    }

    async fn claim_due_cron_job(&self, id: DbId, now: Timestamp) -> StoreResult<Option<CronJob>> {
        CronJobRepo::claim_due(&self.pool, id, now).await.map_err(db_error)
    }

    async fn finish_cron_job(&self, id: DbId, result: &CronRunResult) -> StoreResult<()> {
        CronJobRepo::finish(&self.pool, id, result).await.map_err(db_error)
    }

    async fn list_stale_cron_jobs(&self, now: Timestamp, margin_secs: i32) -> StoreResult<Vec<CronJob>> {
        CronJobRepo::list_stale_running(&self.pool, now, margin_secs)
            .await
            .map_err(db_error)
    }
}

#[async_trait]
impl BackupStore for PgStore {
    async fn create_backup(&self, website_id: DbId, kind: BackupKind) -> StoreResult<SiteBackup> {
        BackupRepo::create(&self.pool, website_id, kind).await.map_err(db_error)
    }

    async fn find_backup(&self, id: DbId) -> StoreResult<Option<SiteBackup>> {
        BackupRepo::find_by_id(&self.pool, id).await.map_err(db_error)
    }

    async fn list_backups(&self, website_id: DbId) -> StoreResult<Vec<SiteBackup>> {
        BackupRepo::list_for_website(&self.pool, website_id).await.map_err(db_error)
    }

    async fn mark_backup_in_progress(&self, id: DbId) -> StoreResult<bool> {
        BackupRepo::mark_in_progress(&self.pool, id).await.map_err(db_error)
    }

    async fn complete_backup(&self, id: DbId, done: &CompletedBackup) -> StoreResult<()> {
        BackupRepo::complete(&self.pool, id, done).await.map_err(db_error)
    }

    async fn fail_backup(&self, id: DbId, error: &str) -> StoreResult<()> {
        BackupRepo::fail(&self.pool, id, error).await.map_err(db_error)
    }

    async fn delete_backup(&self, id: DbId) -> StoreResult<bool> {
        BackupRepo::delete(&self.pool, id).await.map_err(db_error)
    }

    async fn security_settings(&self) -> StoreResult<SecuritySettings> {
        SecuritySettingsRepo::get(&self.pool).await.map_err(db_error)
    }

    async fn store_key_pair(&self, key: &NewKeyPair) -> StoreResult<SecuritySettings> {
        SecuritySettingsRepo::store_key_pair(&self.pool, key).await.map_err(db_error)
    }

    async fn claim_private_key_download(&self) -> StoreResult<bool> {
        SecuritySettingsRepo::claim_private_key_download(&self.pool)
            .await
            .map_err(db_error)
    }
}

#[async_trait]
impl OperationStore for PgStore {
    async fn enqueue_operation(&self, input: &NewOperation) -> StoreResult<OperationJob> {
        OperationRepo::enqueue(&self.pool, input).await.map_err(db_error)
    }

    async fn find_operation(&self, id: DbId) -> StoreResult<Option<OperationJob>> {
        OperationRepo::find_by_id(&self.pool, id).await.map_err(db_error)
    }

    async fn claim_next_operation(&self) -> StoreResult<Option<OperationJob>> {
        OperationRepo::claim_next(&self.pool).await.map_err(db_error)
    }

    async fn has_open_operation(&self, resource_key: &str, kind: &str) -> StoreResult<bool> {
        OperationRepo::has_open(&self.pool, resource_key, kind)
            .await
            .map_err(db_error)
    }

    async fn complete_operation(&self, id: DbId, result: &serde_json::Value) -> StoreResult<()> {
        OperationRepo::complete(&self.pool, id, result).await.map_err(db_error)
    }

    async fn fail_operation(&self, id: DbId, error: &str) -> StoreResult<()> {
        OperationRepo::fail(&self.pool, id, error).await.map_err(db_error)
    }

    async fn mark_operation_cancelled(&self, id: DbId, detail: &str) -> StoreResult<()> {
        OperationRepo::mark_cancelled(&self.pool, id, detail).await.map_err(db_error)
    }

    async fn cancel_operation(&self, id: DbId) -> StoreResult<Option<CancelOutcome>> {
        OperationRepo::cancel(&self.pool, id).await.map_err(db_error)
    }

    async fn is_cancel_requested(&self, id: DbId) -> StoreResult<bool> {
        OperationRepo::is_cancel_requested(&self.pool, id).await.map_err(db_error)
    }

    async fn requeue_orphaned_operations(&self) -> StoreResult<u64> {
        OperationRepo::requeue_orphaned(&self.pool).await.map_err(db_error)
    }
}
