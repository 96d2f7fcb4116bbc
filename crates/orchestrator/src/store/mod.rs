//! Persistence seam for the orchestration managers.
//!
//! The managers only talk to [`Store`]. [`PgStore`] delegates to the
//! `hostwright-db` repositories; [`MemoryStore`] keeps everything in
//! process for single-node tooling and tests.

pub mod memory;
pub mod pg;

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

pub use memory::MemoryStore;
pub use pg::PgStore;

pub type StoreResult<T> = Result<T, CoreError>;

#[async_trait]
pub trait ServerStore: Send + Sync {
    async fn find_server(&self, id: DbId) -> StoreResult<Option<HostingServer>>;
    async fn find_server_by_name(&self, name: &str) -> StoreResult<Option<HostingServer>>;
    async fn list_servers(&self) -> StoreResult<Vec<HostingServer>>;
    /// Enabled, healthy servers under capacity with their site counts, least loaded first.
    async fn servers_with_capacity(&self) -> StoreResult<Vec<(HostingServer, i64)>>;
    async fn set_server_inventory(&self, id: DbId, services: &[String]) -> StoreResult<()>;
    async fn set_server_error(&self, id: DbId, error: &str) -> StoreResult<()>;
    async fn record_server_health(&self, id: DbId, sample: &HealthSample) -> StoreResult<()>;
}

#[async_trait]
pub trait ClientStore: Send + Sync {
    async fn find_client(&self, id: DbId) -> StoreResult<Option<Client>>;
    async fn count_client_websites(&self, id: DbId) -> StoreResult<i64>;
}

#[async_trait]
pub trait WebsiteStore: Send + Sync {
    async fn create_website(&self, input: &CreateWebsite) -> StoreResult<Website>;
    async fn find_website(&self, id: DbId) -> StoreResult<Option<Website>>;
    async fn find_website_by_domain(&self, domain: &str) -> StoreResult<Option<Website>>;
    async fn list_websites(&self, server_id: Option<DbId>) -> StoreResult<Vec<Website>>;
    /// Compare-and-set on status. `None` when the site is not in any of `from`.
    async fn transition_website(
        &self,
        id: DbId,
        from: &[WebsiteStatus],
        to: WebsiteStatus,
    ) -> StoreResult<Option<Website>>;
    async fn set_website_status(&self, id: DbId, status: WebsiteStatus, error: Option<&str>) -> StoreResult<()>;
    async fn set_provision_step(&self, id: DbId, step: Option<&str>) -> StoreResult<()>;
    async fn set_ssl(
        &self,
        id: DbId,
        status: SslStatus,
        expires_at: Option<Timestamp>,
        error: Option<&str>,
    ) -> StoreResult<()>;
    async fn list_ssl_expiring(&self, before: Timestamp) -> StoreResult<Vec<Website>>;
    async fn set_git(&self, id: DbId, repo_url: Option<&str>, branch: Option<&str>) -> StoreResult<()>;
    async fn record_deployment(&self, input: &NewDeployment) -> StoreResult<Deployment>;
    async fn list_deployments(&self, website_id: DbId, limit: i64) -> StoreResult<Vec<Deployment>>;
    async fn set_webhook_secret(&self, id: DbId, secret: Option<&str>) -> StoreResult<()>;
    async fn insert_archive(
        &self,
        website: &Website,
        archive_path: &str,
        purge_after: Timestamp,
    ) -> StoreResult<WebsiteArchive>;
    async fn list_expired_archives(&self, now: Timestamp) -> StoreResult<Vec<WebsiteArchive>>;
    async fn mark_archive_purged(&self, id: DbId) -> StoreResult<()>;
}

#[async_trait]
pub trait DnsStore: Send + Sync {
    async fn find_zone(&self, id: DbId) -> StoreResult<Option<DnsZone>>;
    async fn find_zone_by_name(&self, name: &str) -> StoreResult<Option<DnsZone>>;
    async fn list_zone_records(&self, zone_id: DbId) -> StoreResult<Vec<DnsRecordRow>>;
    async fn add_zone_record(&self, zone_id: DbId, record: &DnsRecord) -> StoreResult<DnsRecordRow>;
    async fn set_provider_zone_id(&self, id: DbId, provider_zone_id: &str) -> StoreResult<()>;
    async fn record_zone_sync(&self, id: DbId, error: Option<&str>) -> StoreResult<()>;
}

#[async_trait]
pub trait CronStore: Send + Sync {
    async fn find_cron_job(&self, id: DbId) -> StoreResult<Option<CronJob>>;
    async fn list_due_cron_jobs(&self, now: Timestamp) -> StoreResult<Vec<CronJob>>;
    /// Mark a job Running unless it already is. `None` when another run holds it.
    async fn claim_cron_job(&self, id: DbId, now: Timestamp) -> StoreResult<Option<CronJob>>;
    /// Like `claim_cron_job`, but only while the job is enabled and `next_run_at <= now`.
    async fn claim_due_cron_job(&self, id: DbId, now: Timestamp) -> StoreResult<Option<CronJob>>;
    async fn finish_cron_job(&self, id: DbId, result: &CronRunResult) -> StoreResult<()>;
    /// Running jobs whose claim is older than their timeout plus `margin_secs`.
    async fn list_stale_cron_jobs(&self, now: Timestamp, margin_secs: i32) -> StoreResult<Vec<CronJob>>;
}

#[async_trait]
pub trait BackupStore: Send + Sync {
    async fn create_backup(&self, website_id: DbId, kind: BackupKind) -> StoreResult<SiteBackup>;
    async fn find_backup(&self, id: DbId) -> StoreResult<Option<SiteBackup>>;
    async fn list_backups(&self, website_id: DbId) -> StoreResult<Vec<SiteBackup>>;
    /// Pending -> In Progress. `false` when the backup was not Pending.
    async fn mark_backup_in_progress(&self, id: DbId) -> StoreResult<bool>;
    async fn complete_backup(&self, id: DbId, done: &CompletedBackup) -> StoreResult<()>;
    async fn fail_backup(&self, id: DbId, error: &str) -> StoreResult<()>;
    async fn delete_backup(&self, id: DbId) -> StoreResult<bool>;
    async fn security_settings(&self) -> StoreResult<SecuritySettings>;
    async fn store_key_pair(&self, key: &NewKeyPair) -> StoreResult<SecuritySettings>;
    /// Mark the private key downloaded. `false` if it already was (or none exists).
    async fn claim_private_key_download(&self) -> StoreResult<bool>;
}

#[async_trait]
pub trait OperationStore: Send + Sync {
    async fn enqueue_operation(&self, input: &NewOperation) -> StoreResult<OperationJob>;
    async fn find_operation(&self, id: DbId) -> StoreResult<Option<OperationJob>>;
    /// Claim the oldest Pending job whose resource has nothing Running.
    async fn claim_next_operation(&self) -> StoreResult<Option<OperationJob>>;
    /// Whether a job of `kind` on `resource_key` is still Pending or Running.
    async fn has_open_operation(&self, resource_key: &str, kind: &str) -> StoreResult<bool>;
    async fn complete_operation(&self, id: DbId, result: &serde_json::Value) -> StoreResult<()>;
    async fn fail_operation(&self, id: DbId, error: &str) -> StoreResult<()>;
    async fn mark_operation_cancelled(&self, id: DbId, detail: &str) -> StoreResult<()>;
    async fn cancel_operation(&self, id: DbId) -> StoreResult<Option<CancelOutcome>>;
    async fn is_cancel_requested(&self, id: DbId) -> StoreResult<bool>;
    async fn requeue_orphaned_operations(&self) -> StoreResult<u64>;
}

/// Everything the orchestration managers persist.
pub trait Store:
    ServerStore + ClientStore + WebsiteStore + DnsStore + CronStore + BackupStore + OperationStore
{
}

impl<T> Store for T where
    T: ServerStore + ClientStore + WebsiteStore + DnsStore + CronStore + BackupStore + OperationStore
{
}
