//! In-process [`Store`](super::Store).
//!
//! Mirrors the PostgreSQL semantics the managers rely on: compare-and-set
//! status transitions, exclusive cron claims and per-resource job claims.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
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
use hostwright_db::models::status::{
    BackupStatus, CronRunStatus, OperationStatus, ServerHealth, SslStatus, WebsiteStatus,
};
use hostwright_db::models::website::{CreateWebsite, Deployment, NewDeployment, Website, WebsiteArchive};

use super::{
    BackupStore, ClientStore, CronStore, DnsStore, OperationStore, ServerStore, StoreResult,
    WebsiteStore,
};

#[derive(Default)]
struct Tables {
    next_id: DbId,
    servers: BTreeMap<DbId, HostingServer>,
    clients: BTreeMap<DbId, Client>,
    websites: BTreeMap<DbId, Website>,
    archives: BTreeMap<DbId, WebsiteArchive>,
    deployments: BTreeMap<DbId, Deployment>,
    zones: BTreeMap<DbId, DnsZone>,
    records: BTreeMap<DbId, DnsRecordRow>,
    cron_jobs: BTreeMap<DbId, CronJob>,
    backups: BTreeMap<DbId, SiteBackup>,
    operations: BTreeMap<DbId, OperationJob>,
    settings: Option<SecuritySettings>,
}

impl Tables {
    fn id(&mut self) -> DbId {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

fn now() -> Timestamp {
    Utc::now()
}

fn not_found(entity: &'static str, id: DbId) -> CoreError {
    CoreError::NotFound { entity, id }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        // A panic while holding the lock only happens inside a failing test.
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ── Seeding ──

    /// Register an enabled, healthy server.
    pub fn add_server(&self, name: &str, address: &str, is_local: bool) -> HostingServer {
        let mut t = self.lock();
        let id = t.id();
        let server = HostingServer {
            id,
            name: name.to_string(),
            address: address.to_string(),
            ssh_port: 22,
            ssh_user: "root".to_string(),
            identity_file: None,
            is_local,
            is_enabled: true,
            max_websites: 100,
            installed_services: serde_json::json!([]),
            provisioned_at: None,
            health_status_id: ServerHealth::Healthy.id(),
            cpu_percent: None,
            memory_used_mb: None,
            memory_total_mb: None,
            disk_used_gb: None,
            disk_total_gb: None,
            load_1: None,
            load_5: None,
            load_15: None,
            last_health_check_at: None,
            last_error: None,
            created_at: now(),
            updated_at: now(),
        };
        t.servers.insert(id, server.clone());
        server
    }

    pub fn add_client(&self, name: &str, max_websites: i32, features: &[&str]) -> Client {
        let mut t = self.lock();
        let id = t.id();
        let client = Client {
            id,
            name: name.to_string(),
            email: format!("{}@example.com", name.to_ascii_lowercase()),
            max_websites,
            plan_features: serde_json::json!(features),
            created_at: now(),
            updated_at: now(),
        };
        t.clients.insert(id, client.clone());
        client
    }

    pub fn add_zone(&self, zone_name: &str) -> DnsZone {
        let mut t = self.lock();
        let id = t.id();
        let zone = DnsZone {
            id,
            zone_name: zone_name.to_string(),
            provider_zone_id: None,
            sync_enabled: true,
            last_synced_at: None,
            last_sync_error: None,
            created_at: now(),
            updated_at: now(),
        };
        t.zones.insert(id, zone.clone());
        zone
    }

    pub fn add_cron_job(
        &self,
        website_id: DbId,
        schedule: &str,
        command: &str,
        next_run_at: Option<Timestamp>,
    ) -> CronJob {
        let mut t = self.lock();
        let id = t.id();
        let job = CronJob {
            id,
            website_id,
            name: format!("job-{id}"),
            schedule: schedule.to_string(),
            command: command.to_string(),
            is_enabled: true,
            timeout_secs: 300,
            last_status_id: CronRunStatus::Pending.id(),
            last_run_at: None,
            last_output: None,
            last_duration_ms: None,
            running_since: None,
            next_run_at,
            created_at: now(),
            updated_at: now(),
        };
        t.cron_jobs.insert(id, job.clone());
        job
    }

    pub fn update_server(&self, id: DbId, f: impl FnOnce(&mut HostingServer)) {
        if let Some(s) = self.lock().servers.get_mut(&id) {
            f(s);
        }
    }

    pub fn update_website(&self, id: DbId, f: impl FnOnce(&mut Website)) {
        if let Some(w) = self.lock().websites.get_mut(&id) {
            f(w);
        }
    }

    pub fn update_cron_job(&self, id: DbId, f: impl FnOnce(&mut CronJob)) {
        if let Some(j) = self.lock().cron_jobs.get_mut(&id) {
            f(j);
        }
    }

    pub fn update_backup(&self, id: DbId, f: impl FnOnce(&mut SiteBackup)) {
        if let Some(b) = self.lock().backups.get_mut(&id) {
            f(b);
        }
    }

    pub fn archives(&self) -> Vec<WebsiteArchive> {
        self.lock().archives.values().cloned().collect()
    }

    fn empty_settings() -> SecuritySettings {
        SecuritySettings {
            id: 1,
            public_key_pem: None,
            sealed_private_key: None,
            key_fingerprint: None,
            key_generated_at: None,
            private_key_downloaded_at: None,
            created_at: now(),
            updated_at: now(),
        }
    }
}

#[async_trait]
impl ServerStore for MemoryStore {
    async fn find_server(&self, id: DbId) -> StoreResult<Option<HostingServer>> {
        Ok(self.lock().servers.get(&id).cloned())
    }

    async fn find_server_by_name(&self, name: &str) -> StoreResult<Option<HostingServer>> {
        Ok(self.lock().servers.values().find(|s| s.name == name).cloned())
    }

    async fn list_servers(&self) -> StoreResult<Vec<HostingServer>> {
        Ok(self.lock().servers.values().cloned().collect())
    }

    async fn servers_with_capacity(&self) -> StoreResult<Vec<(HostingServer, i64)>> {
        let t = self.lock();
        let mut out: Vec<(HostingServer, i64)> = t
            .servers
            .values()
            .filter(|s| s.is_enabled && s.health() == ServerHealth::Healthy)
            .map(|s| {
                let n = t
                    .websites
                    .values()
                    .filter(|w| w.server_id == s.id && w.status() != WebsiteStatus::Deprovisioning)
                    .count() as i64;
                (s.clone(), n)
            })
            .filter(|(s, n)| *n < i64::from(s.max_websites))
            .collect();
        out.sort_by_key(|(s, n)| (*n, s.id));
        Ok(out)
    }

    async fn set_server_inventory(&self, id: DbId, services: &[String]) -> StoreResult<()> {
        let mut t = self.lock();
        let s = t.servers.get_mut(&id).ok_or_else(|| not_found("HostingServer", id))?;
        s.installed_services = serde_json::json!(services);
        s.provisioned_at = Some(now());
        s.last_error = None;
        Ok(())
    }

    async fn set_server_error(&self, id: DbId, error: &str) -> StoreResult<()> {
        let mut t = self.lock();
        let s = t.servers.get_mut(&id).ok_or_else(|| not_found("HostingServer", id))?;
        s.last_error = Some(error.to_string());
        Ok(())
    }

    async fn record_server_health(&self, id: DbId, sample: &HealthSample) -> StoreResult<()> {
        let mut t = self.lock();
        let s = t.servers.get_mut(&id).ok_or_else(|| not_found("HostingServer", id))?;
        s.health_status_id = sample.health.id();
        if let Some(m) = &sample.metrics {
            s.cpu_percent = Some(m.cpu_percent);
            s.memory_used_mb = Some(m.memory_used_mb);
            s.memory_total_mb = Some(m.memory_total_mb);
            s.disk_used_gb = Some(m.disk_used_gb);
            s.disk_total_gb = Some(m.disk_total_gb);
            s.load_1 = Some(m.load_1);
            s.load_5 = Some(m.load_5);
            s.load_15 = Some(m.load_15);
        }
        s.last_health_check_at = Some(now());
        s.last_error = sample.error.clone();
        Ok(())
    }
}

#[async_trait]
impl ClientStore for MemoryStore {
    async fn find_client(&self, id: DbId) -> StoreResult<Option<Client>> {
        Ok(self.lock().clients.get(&id).cloned())
    }

    async fn count_client_websites(&self, id: DbId) -> StoreResult<i64> {
        Ok(self
            .lock()
            .websites
            .values()
            .filter(|w| w.client_id == Some(id))
            .count() as i64)
    }
}

#[async_trait]
impl WebsiteStore for MemoryStore {
    async fn create_website(&self, input: &CreateWebsite) -> StoreResult<Website> {
        let mut t = self.lock();
        if t.websites.values().any(|w| w.domain == input.domain) {
            return Err(CoreError::Conflict(
                "Duplicate value violates unique constraint: uq_websites_domain".into(),
            ));
        }
        let id = t.id();
        let website = Website {
            id,
            domain: input.domain.clone(),
            site_kind: input.site_kind.clone(),
            client_id: input.client_id,
            server_id: input.server_id,
            status_id: WebsiteStatus::Pending.id(),
            provision_step: None,
            last_error: None,
            system_user: input.system_user.clone(),
            site_path: input.site_path.clone(),
            php_version: input.php_version.clone(),
            db_engine: input.db_engine.clone(),
            db_name: input.db_name.clone(),
            db_user: input.db_user.clone(),
            db_password: input.db_password.clone(),
            tenant_apps: serde_json::json!(input.tenant_apps),
            admin_email: input.admin_email.clone(),
            ssl_status_id: SslStatus::None.id(),
            ssl_expires_at: None,
            ssl_issued_at: None,
            ssl_error: None,
            git_repo_url: None,
            git_branch: None,
            current_commit: None,
            deploy_status_id: None,
            last_deployed_at: None,
            webhook_secret: None,
            created_at: now(),
            updated_at: now(),
        };
        t.websites.insert(id, website.clone());
        Ok(website)
    }

    async fn find_website(&self, id: DbId) -> StoreResult<Option<Website>> {
        Ok(self.lock().websites.get(&id).cloned())
    }

    async fn find_website_by_domain(&self, domain: &str) -> StoreResult<Option<Website>> {
        Ok(self.lock().websites.values().find(|w| w.domain == domain).cloned())
    }

    async fn list_websites(&self, server_id: Option<DbId>) -> StoreResult<Vec<Website>> {
        let mut sites: Vec<Website> = self
            .lock()
            .websites
            .values()
            .filter(|w| server_id.is_none_or(|id| w.server_id == id))
            .cloned()
            .collect();
        sites.sort_by(|a, b| a.domain.cmp(&b.domain));
        Ok(sites)
    }

    async fn transition_website(
        &self,
        id: DbId,
        from: &[WebsiteStatus],
        to: WebsiteStatus,
    ) -> StoreResult<Option<Website>> {
        let mut t = self.lock();
        match t.websites.get_mut(&id) {
            Some(w) if from.contains(&w.status()) => {
                w.status_id = to.id();
                w.updated_at = now();
                Ok(Some(w.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn set_website_status(&self, id: DbId, status: WebsiteStatus, error: Option<&str>) -> StoreResult<()> {
        let mut t = self.lock();
        let w = t.websites.get_mut(&id).ok_or_else(|| not_found("Website", id))?;
        w.status_id = status.id();
        w.last_error = error.map(String::from);
        Ok(())
    }

    async fn set_provision_step(&self, id: DbId, step: Option<&str>) -> StoreResult<()> {
        let mut t = self.lock();
        let w = t.websites.get_mut(&id).ok_or_else(|| not_found("Website", id))?;
        w.provision_step = step.map(String::from);
        Ok(())
    }

    async fn set_ssl(
        &self,
        id: DbId,
        status: SslStatus,
        expires_at: Option<Timestamp>,
        error: Option<&str>,
    ) -> StoreResult<()> {
        let mut t = self.lock();
        let w = t.websites.get_mut(&id).ok_or_else(|| not_found("Website", id))?;
        w.ssl_status_id = status.id();
        if expires_at.is_some() {
            w.ssl_expires_at = expires_at;
            if status == SslStatus::Active {
                w.ssl_issued_at = Some(now());
            }
        }
        w.ssl_error = error.map(String::from);
        Ok(())
    }

    async fn list_ssl_expiring(&self, before: Timestamp) -> StoreResult<Vec<Website>> {
        let mut sites: Vec<Website> = self
            .lock()
            .websites
            .values()
            .filter(|w| matches!(w.ssl_status(), SslStatus::Active | SslStatus::Failed))
            .filter(|w| w.ssl_expires_at.is_some_and(|at| at < before))
            .cloned()
            .collect();
        sites.sort_by_key(|w| w.ssl_expires_at);
        Ok(sites)
    }

    async fn set_git(&self, id: DbId, repo_url: Option<&str>, branch: Option<&str>) -> StoreResult<()> {
        let mut t = self.lock();
        let w = t.websites.get_mut(&id).ok_or_else(|| not_found("Website", id))?;
        w.git_repo_url = repo_url.map(String::from);
        w.git_branch = branch.map(String::from);
        Ok(())
    }

    async fn record_deployment(&self, input: &NewDeployment) -> StoreResult<Deployment> {
        let mut t = self.lock();
        let w = t
            .websites
            .get_mut(&input.website_id)
            .ok_or_else(|| not_found("Website", input.website_id))?;
        if let Some(commit) = &input.commit_hash {
            w.current_commit = Some(commit.clone());
        }
        if let Some(branch) = &input.branch {
            w.git_branch = Some(branch.clone());
        }
        w.deploy_status_id = Some(input.status.id());
        w.last_deployed_at = Some(now());

        let id = t.id();
        let deployment = Deployment {
            id,
            website_id: input.website_id,
            action: input.action.to_string(),
            branch: input.branch.clone(),
            commit_hash: input.commit_hash.clone(),
            status_id: input.status.id(),
            message: input.message.clone(),
            created_at: now(),
            updated_at: now(),
        };
        t.deployments.insert(id, deployment.clone());
        Ok(deployment)
    }

    async fn list_deployments(&self, website_id: DbId, limit: i64) -> StoreResult<Vec<Deployment>> {
        Ok(self
            .lock()
            .deployments
            .values()
            .rev()
            .filter(|d| d.website_id == website_id)
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect())
    }

    async fn set_webhook_secret(&self, id: DbId, secret: Option<&str>) -> StoreResult<()> {
        let mut t = self.lock();
        let w = t.websites.get_mut(&id).ok_or_else(|| not_found("Website", id))?;
        w.webhook_secret = secret.map(String::from);
        Ok(())
    }

    async fn insert_archive(
        &self,
        website: &Website,
        archive_path: &str,
        purge_after: Timestamp,
    ) -> StoreResult<WebsiteArchive> {
        let mut t = self.lock();
        let id = t.id();
        let archive = WebsiteArchive {
            id,
            website_id: Some(website.id),
            server_id: website.server_id,
            domain: website.domain.clone(),
            archive_path: archive_path.to_string(),
            purge_after,
            purged_at: None,
            created_at: now(),
            updated_at: now(),
        };
        t.archives.insert(id, archive.clone());
        Ok(archive)
    }

    async fn list_expired_archives(&self, at: Timestamp) -> StoreResult<Vec<WebsiteArchive>> {
        Ok(self
            .lock()
            .archives
            .values()
            .filter(|a| a.purged_at.is_none() && a.purge_after <= at)
            .cloned()
            .collect())
    }

    async fn mark_archive_purged(&self, id: DbId) -> StoreResult<()> {
        if let Some(a) = self.lock().archives.get_mut(&id) {
            a.purged_at = Some(now());
        }
        Ok(())
    }
}

#[async_trait]
impl DnsStore for MemoryStore {
    async fn find_zone(&self, id: DbId) -> StoreResult<Option<DnsZone>> {
        Ok(self.lock().zones.get(&id).cloned())
    }

    async fn find_zone_by_name(&self, name: &str) -> StoreResult<Option<DnsZone>> {
        Ok(self.lock().zones.values().find(|z| z.zone_name == name).cloned())
    }

    async fn list_zone_records(&self, zone_id: DbId) -> StoreResult<Vec<DnsRecordRow>> {
        let mut rows: Vec<DnsRecordRow> = self
            .lock()
            .records
            .values()
            .filter(|r| r.zone_id == zone_id)
            .cloned()
            .collect();
        rows.sort_by_key(|r| (r.position, r.id));
        Ok(rows)
    }

    async fn add_zone_record(&self, zone_id: DbId, record: &DnsRecord) -> StoreResult<DnsRecordRow> {
        let mut t = self.lock();
        let position = t
            .records
            .values()
            .filter(|r| r.zone_id == zone_id)
            .map(|r| r.position)
            .max()
            .unwrap_or(0)
            + 1;
        let id = t.id();
        let row = DnsRecordRow {
            id,
            zone_id,
            position,
            record_type: record.record_type.as_str().to_string(),
            name: record.name.clone(),
            value: record.value.clone(),
            ttl: record.ttl,
            priority: record.priority,
            created_at: now(),
            updated_at: now(),
        };
        t.records.insert(id, row.clone());
        Ok(row)
    }

    async fn set_provider_zone_id(&self, id: DbId, provider_zone_id: &str) -> StoreResult<()> {
        let mut t = self.lock();
        let z = t.zones.get_mut(&id).ok_or_else(|| not_found("DnsZone", id))?;
        z.provider_zone_id = Some(provider_zone_id.to_string());
        Ok(())
    }

    async fn record_zone_sync(&self, id: DbId, error: Option<&str>) -> StoreResult<()> {
        let mut t = self.lock();
        let z = t.zones.get_mut(&id).ok_or_else(|| not_found("DnsZone", id))?;
        if error.is_none() {
            z.last_synced_at = Some(now());
        }
        z.last_sync_error = error.map(String::from);
        Ok(())
    }
}

impl MemoryStore {
    fn claim_cron_where(&self, id: DbId, at: Timestamp, eligible: impl FnOnce(&CronJob) -> bool) -> Option<CronJob> {
        let mut t = self.lock();
        match t.cron_jobs.get_mut(&id) {
            Some(j) if j.last_status() != CronRunStatus::Running && eligible(j) => {
                j.last_status_id = CronRunStatus::Running.id();
                j.running_since = Some(at);
                Some(j.clone())
            }
            _ => None,
        }
    }
}

#[async_trait]
impl CronStore for MemoryStore {
    async fn find_cron_job(&self, id: DbId) -> StoreResult<Option<CronJob>> {
        Ok(self.lock().cron_jobs.get(&id).cloned())
    }

    async fn list_due_cron_jobs(&self, at: Timestamp) -> StoreResult<Vec<CronJob>> {
        let mut due: Vec<CronJob> = self
            .lock()
            .cron_jobs
            .values()
            .filter(|j| j.is_enabled && j.last_status() != CronRunStatus::Running)
            .filter(|j| j.next_run_at.is_some_and(|next| next <= at))
            .cloned()
            .collect();
        due.sort_by_key(|j| j.next_run_at);
        Ok(due)
    }

    async fn claim_cron_job(&self, id: DbId, at: Timestamp) -> StoreResult<Option<CronJob>> {
        Ok(self.claim_cron_where(id, at, |_| true))
    }

    async fn claim_due_cron_job(&self, id: DbId, at: Timestamp) -> StoreResult<Option<CronJob>> {
        Ok(self.claim_cron_where(id, at, |j| {
            j.is_enabled && j.next_run_at.is_some_and(|next| next <= at)
        }))
    }

    async fn finish_cron_job(&self, id: DbId, result: &CronRunResult) -> StoreResult<()> {
        let mut t = self.lock();
        let j = t.cron_jobs.get_mut(&id).ok_or_else(|| not_found("CronJob", id))?;
        j.last_status_id = result.status.id();
        j.last_output = Some(result.output.clone());
        j.last_duration_ms = Some(result.duration_ms);
        j.last_run_at = j.running_since.take();
        j.next_run_at = result.next_run_at;
        Ok(())
    }

    async fn list_stale_cron_jobs(&self, at: Timestamp, margin_secs: i32) -> StoreResult<Vec<CronJob>> {
        Ok(self
            .lock()
            .cron_jobs
            .values()
            .filter(|j| j.last_status() == CronRunStatus::Running)
            .filter(|j| {
                j.running_since.is_some_and(|since| {
                    since + chrono::Duration::seconds(i64::from(j.timeout_secs + margin_secs)) < at
                })
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl BackupStore for MemoryStore {
    async fn create_backup(&self, website_id: DbId, kind: BackupKind) -> StoreResult<SiteBackup> {
        let mut t = self.lock();
        let id = t.id();
        let backup = SiteBackup {
            id,
            website_id,
            backup_kind: kind.as_str().to_string(),
            status_id: BackupStatus::Pending.id(),
            file_path: None,
            file_size: None,
            encrypted: false,
            key_fingerprint: None,
            cloud_url: None,
            error: None,
            started_at: None,
            completed_at: None,
            created_at: now(),
            updated_at: now(),
        };
        t.backups.insert(id, backup.clone());
        Ok(backup)
    }

    async fn find_backup(&self, id: DbId) -> StoreResult<Option<SiteBackup>> {
        Ok(self.lock().backups.get(&id).cloned())
    }

    async fn list_backups(&self, website_id: DbId) -> StoreResult<Vec<SiteBackup>> {
        Ok(self
            .lock()
            .backups
            .values()
            .rev()
            .filter(|b| b.website_id == website_id)
            .cloned()
            .collect())
    }

    async fn mark_backup_in_progress(&self, id: DbId) -> StoreResult<bool> {
        let mut t = self.lock();
        match t.backups.get_mut(&id) {
            Some(b) if b.status() == BackupStatus::Pending => {
                b.status_id = BackupStatus::InProgress.id();
                b.started_at = Some(now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete_backup(&self, id: DbId, done: &CompletedBackup) -> StoreResult<()> {
        let mut t = self.lock();
        let b = t.backups.get_mut(&id).ok_or_else(|| not_found("SiteBackup", id))?;
        b.status_id = BackupStatus::Completed.id();
        b.file_path = Some(done.file_path.clone());
        b.file_size = Some(done.file_size);
        b.encrypted = done.encrypted;
        b.key_fingerprint = done.key_fingerprint.clone();
        b.cloud_url = done.cloud_url.clone();
        b.error = None;
        b.completed_at = Some(now());
        Ok(())
    }

    async fn fail_backup(&self, id: DbId, error: &str) -> StoreResult<()> {
        let mut t = self.lock();
        let b = t.backups.get_mut(&id).ok_or_else(|| not_found("SiteBackup", id))?;
        b.status_id = BackupStatus::Failed.id();
        b.error = Some(error.to_string());
        b.file_path = None;
        b.file_size = None;
        b.cloud_url = None;
        b.completed_at = Some(now());
        Ok(())
    }

    async fn delete_backup(&self, id: DbId) -> StoreResult<bool> {
        Ok(self.lock().backups.remove(&id).is_some())
    }

    async fn security_settings(&self) -> StoreResult<SecuritySettings> {
        Ok(self.lock().settings.clone().unwrap_or_else(Self::empty_settings))
    }

    async fn store_key_pair(&self, key: &NewKeyPair) -> StoreResult<SecuritySettings> {
        let mut t = self.lock();
        let mut settings = t.settings.clone().unwrap_or_else(Self::empty_settings);
        settings.public_key_pem = Some(key.public_key_pem.clone());
        settings.sealed_private_key = Some(key.sealed_private_key.clone());
        settings.key_fingerprint = Some(key.key_fingerprint.clone());
        settings.key_generated_at = Some(now());
        settings.private_key_downloaded_at = None;
        t.settings = Some(settings.clone());
        Ok(settings)
    }

    async fn claim_private_key_download(&self) -> StoreResult<bool> {
        let mut t = self.lock();
        match t.settings.as_mut() {
            Some(s) if s.sealed_private_key.is_some() && s.private_key_downloaded_at.is_none() => {
                s.private_key_downloaded_at = Some(now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl OperationStore for MemoryStore {
    async fn enqueue_operation(&self, input: &NewOperation) -> StoreResult<OperationJob> {
        let mut t = self.lock();
        let id = t.id();
        let job = OperationJob {
            id,
            kind: input.kind.clone(),
            resource_key: input.resource_key.clone(),
            params: input.params.clone(),
            status_id: OperationStatus::Pending.id(),
            cancel_requested: false,
            result: None,
            error: None,
            started_at: None,
            completed_at: None,
            created_at: now(),
            updated_at: now(),
        };
        t.operations.insert(id, job.clone());
        Ok(job)
    }

    async fn find_operation(&self, id: DbId) -> StoreResult<Option<OperationJob>> {
        Ok(self.lock().operations.get(&id).cloned())
    }

    async fn claim_next_operation(&self) -> StoreResult<Option<OperationJob>> {
        let mut t = self.lock();
        let busy: Vec<String> = t
            .operations
            .values()
            .filter(|j| j.status() == OperationStatus::Running)
            .map(|j| j.resource_key.clone())
            .collect();
        let next = t
            .operations
            .values_mut()
            .find(|j| j.status() == OperationStatus::Pending && !busy.contains(&j.resource_key));
        Ok(next.map(|j| {
            j.status_id = OperationStatus::Running.id();
            j.started_at = Some(now());
            j.clone()
        }))
    }

    async fn complete_operation(&self, id: DbId, result: &serde_json::Value) -> StoreResult<()> {
        let mut t = self.lock();
        let j = t.operations.get_mut(&id).ok_or_else(|| not_found("OperationJob", id))?;
        j.status_id = OperationStatus::Completed.id();
        j.result = Some(result.clone());
        j.completed_at = Some(now());
        Ok(())
    }

    async fn fail_operation(&self, id: DbId, error: &str) -> StoreResult<()> {
        let mut t = self.lock();
        let j = t.operations.get_mut(&id).ok_or_else(|| not_found("OperationJob", id))?;
        j.status_id = OperationStatus::Failed.id();
        j.error = Some(error.to_string());
        j.completed_at = Some(now());
        Ok(())
    }

    async fn mark_operation_cancelled(&self, id: DbId, detail: &str) -> StoreResult<()> {
        let mut t = self.lock();
        let j = t.operations.get_mut(&id).ok_or_else(|| not_found("OperationJob", id))?;
        j.status_id = OperationStatus::Cancelled.id();
        j.error = Some(detail.to_string());
        j.completed_at = Some(now());
        Ok(())
    }

    async fn cancel_operation(&self, id: DbId) -> StoreResult<Option<CancelOutcome>> {
        let mut t = self.lock();
        let Some(j) = t.operations.get_mut(&id) else {
            return Ok(None);
        };
        Ok(Some(match j.status() {
            OperationStatus::Pending => {
                j.status_id = OperationStatus::Cancelled.id();
                j.error = Some("Cancelled before start".into());
                j.completed_at = Some(now());
                CancelOutcome::Cancelled
            }
            OperationStatus::Running => {
                j.cancel_requested = true;
                CancelOutcome::Requested
            }
            _ => CancelOutcome::AlreadyFinished,
        }))
    }

    async fn is_cancel_requested(&self, id: DbId) -> StoreResult<bool> {
        Ok(self.lock().operations.get(&id).is_some_and(|j| j.cancel_requested))
    }

    async fn has_open_operation(&self, resource_key: &str, kind: &str) -> StoreResult<bool> {
        Ok(self.lock().operations.values().any(|j| {
            j.resource_key == resource_key
                && j.kind == kind
                && matches!(j.status(), OperationStatus::Pending | OperationStatus::Running)
        }))
    }

    async fn requeue_orphaned_operations(&self) -> StoreResult<u64> {
        let mut t = self.lock();
        let mut n = 0;
        for j in t.operations.values_mut() {
            if j.status() == OperationStatus::Running {
                j.status_id = OperationStatus::Pending.id();
                j.started_at = None;
                n += 1;
            }
        }
        Ok(n)
    }
}
