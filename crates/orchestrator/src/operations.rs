//! Queued orchestration operations and the bundle of managers that runs them.
//!
//! Every long-running request becomes an [`Operation`] stored as an
//! `operation_jobs` row. Each operation names the resource it mutates; the
//! store never hands out two jobs for one resource at the same time, so
//! work on one site, server or zone is serialized while unrelated work
//! runs in parallel.

use std::sync::Arc;

use hostwright_cloud::{DnsProvider, DnsResolver, ObjectStorage};
use hostwright_core::backup::BackupKind;
use hostwright_core::error::CoreError;
use hostwright_core::types::DbId;
use hostwright_db::models::operation::{CancelOutcome, NewOperation, OperationJob};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backup::{BackupEngine, BackupOptions};
use crate::certificates::CertificateManager;
use crate::checkpoint::Checkpoint;
use crate::context::Context;
use crate::dns::DnsSynchronizer;
use crate::git::GitDeployer;
use crate::installer::ServerManager;
use crate::logs::LogGateway;
use crate::scheduler::Scheduler;
use crate::sites::SiteManager;
use crate::store::OperationStore;

/// A unit of long-running work, persisted as the job's params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    ProvisionServer { server_id: DbId },
    CheckServerHealth { server_id: DbId },
    ProvisionSite { website_id: DbId },
    DeprovisionSite { website_id: DbId },
    SuspendSite { website_id: DbId },
    UnsuspendSite { website_id: DbId },
    RegenerateConfig { website_id: DbId },
    IssueCertificate { website_id: DbId },
    RenewCertificate { website_id: DbId },
    SyncZone { zone_id: DbId },
    AddCommonRecords { zone_id: DbId, ipv4: String },
    CreateBackup {
        website_id: DbId,
        backup_kind: BackupKind,
        #[serde(default)]
        options: BackupOptions,
    },
    RunBackup {
        website_id: DbId,
        backup_id: DbId,
        #[serde(default)]
        options: BackupOptions,
    },
    RestoreBackup { website_id: DbId, backup_id: DbId },
    GitClone {
        website_id: DbId,
        repo_url: String,
        branch: Option<String>,
    },
    GitPull { website_id: DbId },
    GitRollback { website_id: DbId, commit: String },
    GitSwitchBranch { website_id: DbId, branch: String },
    RunCronJob { job_id: DbId },
}

impl Operation {
    /// The `kind` tag, as stored in the job row.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::ProvisionServer { .. } => "provision_server",
            Operation::CheckServerHealth { .. } => "check_server_health",
            Operation::ProvisionSite { .. } => "provision_site",
            Operation::DeprovisionSite { .. } => "deprovision_site",
            Operation::SuspendSite { .. } => "suspend_site",
            Operation::UnsuspendSite { .. } => "unsuspend_site",
            Operation::RegenerateConfig { .. } => "regenerate_config",
            Operation::IssueCertificate { .. } => "issue_certificate",
            Operation::RenewCertificate { .. } => "renew_certificate",
            Operation::SyncZone { .. } => "sync_zone",
            Operation::AddCommonRecords { .. } => "add_common_records",
            Operation::CreateBackup { .. } => "create_backup",
            Operation::RunBackup { .. } => "run_backup",
            Operation::RestoreBackup { .. } => "restore_backup",
            Operation::GitClone { .. } => "git_clone",
            Operation::GitPull { .. } => "git_pull",
            Operation::GitRollback { .. } => "git_rollback",
            Operation::GitSwitchBranch { .. } => "git_switch_branch",
            Operation::RunCronJob { .. } => "run_cron_job",
        }
    }

    /// Key under which operations are serialized.
    pub fn resource_key(&self) -> String {
        match self {
            Operation::ProvisionServer { server_id } | Operation::CheckServerHealth { server_id } => {
                format!("server:{server_id}")
            }
            Operation::SyncZone { zone_id } | Operation::AddCommonRecords { zone_id, .. } => {
                format!("zone:{zone_id}")
            }
            Operation::RunCronJob { job_id } => format!("cron:{job_id}"),
            Operation::ProvisionSite { website_id }
            | Operation::DeprovisionSite { website_id }
            | Operation::SuspendSite { website_id }
            | Operation::UnsuspendSite { website_id }
            | Operation::RegenerateConfig { website_id }
            | Operation::IssueCertificate { website_id }
            | Operation::RenewCertificate { website_id }
            | Operation::CreateBackup { website_id, .. }
            | Operation::RunBackup { website_id, .. }
            | Operation::RestoreBackup { website_id, .. }
            | Operation::GitClone { website_id, .. }
            | Operation::GitPull { website_id }
            | Operation::GitRollback { website_id, .. }
            | Operation::GitSwitchBranch { website_id, .. } => format!("site:{website_id}"),
        }
    }
}

/// Every manager, sharing one [`Context`].
#[derive(Clone)]
pub struct Orchestrator {
    pub ctx: Context,
    pub servers: ServerManager,
    pub sites: SiteManager,
    pub certificates: CertificateManager,
    pub dns: DnsSynchronizer,
    pub backups: BackupEngine,
    pub git: GitDeployer,
    pub scheduler: Scheduler,
    pub logs: LogGateway,
}

impl Orchestrator {
    pub fn new(
        ctx: Context,
        dns_provider: Option<Arc<dyn DnsProvider>>,
        resolvers: Vec<Box<dyn DnsResolver>>,
        storage: Option<Arc<dyn ObjectStorage>>,
    ) -> Self {
        Self {
            servers: ServerManager::new(ctx.clone()),
            sites: SiteManager::new(ctx.clone()),
            certificates: CertificateManager::new(ctx.clone()),
            dns: DnsSynchronizer::new(ctx.clone(), dns_provider, resolvers),
            backups: BackupEngine::new(ctx.clone(), storage),
            git: GitDeployer::new(ctx.clone()),
            scheduler: Scheduler::new(ctx.clone()),
            logs: LogGateway::new(ctx.clone()),
            ctx,
        }
    }

    // -----------------------------------------------------------------------
    // Queue
    // -----------------------------------------------------------------------

    /// Queue an operation for the worker.
    pub async fn enqueue(&self, operation: &Operation) -> Result<OperationJob, CoreError> {
        enqueue(&self.ctx, operation).await
    }

    pub async fn job(&self, job_id: DbId) -> Result<OperationJob, CoreError> {
        self.ctx
            .store
            .find_operation(job_id)
            .await?
            .ok_or(CoreError::NotFound { entity: "OperationJob", id: job_id })
    }

    /// Cancel a queued job, or ask a running one to stop at its next checkpoint.
    pub async fn cancel(&self, job_id: DbId) -> Result<CancelOutcome, CoreError> {
        let outcome = self
            .ctx
            .store
            .cancel_operation(job_id)
            .await?
            .ok_or(CoreError::NotFound { entity: "OperationJob", id: job_id })?;
        tracing::info!(job_id, outcome = ?outcome, "Cancel requested");
        Ok(outcome)
    }

    /// Claim the next runnable job and run it to a terminal state.
    /// `None` when nothing is runnable.
    pub async fn run_next(&self) -> Result<Option<OperationJob>, CoreError> {
        match self.ctx.store.claim_next_operation().await? {
            Some(job) => self.run_job(job).await.map(Some),
            None => Ok(None),
        }
    }

    /// Run a claimed job and record its outcome.
    pub async fn run_job(&self, job: OperationJob) -> Result<OperationJob, CoreError> {
        let result = match serde_json::from_value::<Operation>(job.params.clone()) {
            Ok(operation) => {
                let checkpoint = Checkpoint::for_job(self.ctx.store.clone(), job.id);
                self.execute(&operation, &checkpoint).await
            }
            Err(e) => Err(CoreError::Validation(format!("Malformed operation parameters: {e}"))),
        };

        match result {
            Ok(value) => {
                self.ctx.store.complete_operation(job.id, &value).await?;
                tracing::info!(job_id = job.id, kind = %job.kind, "Operation completed");
            }
            Err(CoreError::Cancelled(detail)) => {
                self.ctx.store.mark_operation_cancelled(job.id, &detail).await?;
                tracing::info!(job_id = job.id, kind = %job.kind, detail = %detail, "Operation cancelled");
            }
            Err(e) => {
                self.ctx.store.fail_operation(job.id, &e.to_string()).await?;
                tracing::error!(job_id = job.id, kind = %job.kind, error = %e, "Operation failed");
            }
        }
        self.job(job.id).await
    }

    /// Run an operation in place and return its JSON result.
    pub async fn execute(&self, operation: &Operation, checkpoint: &Checkpoint) -> Result<Value, CoreError> {
        checkpoint.check("start").await?;
        match operation {
            Operation::ProvisionServer { server_id } => {
                let services = self.servers.provision_server(*server_id).await?;
                Ok(serde_json::json!({ "installed_services": services }))
            }
            Operation::CheckServerHealth { server_id } => {
                let sample = self.servers.check_health(*server_id).await?;
                Ok(serde_json::json!({
                    "health": sample.health,
                    "metrics": sample.metrics,
                    "error": sample.error,
                }))
            }
            Operation::ProvisionSite { website_id } => json(self.sites.provision(*website_id, checkpoint).await?),
            Operation::DeprovisionSite { website_id } => {
                json(self.sites.deprovision(*website_id, checkpoint).await?)
            }
            Operation::SuspendSite { website_id } => json(self.sites.suspend(*website_id).await?),
            Operation::UnsuspendSite { website_id } => json(self.sites.unsuspend(*website_id).await?),
            Operation::RegenerateConfig { website_id } => json(self.sites.regenerate_config(*website_id).await?),
            Operation::IssueCertificate { website_id } => json(self.certificates.issue(*website_id).await?),
            Operation::RenewCertificate { website_id } => json(self.certificates.renew(*website_id).await?),
            Operation::SyncZone { zone_id } => json(self.dns.sync(*zone_id).await?),
            Operation::AddCommonRecords { zone_id, ipv4 } => {
                json(self.dns.add_common_records(*zone_id, ipv4).await?)
            }
            Operation::CreateBackup {
                website_id,
                backup_kind,
                options,
            } => json(
                self.backups
                    .create_backup(*website_id, *backup_kind, *options, checkpoint)
                    .await?,
            ),
            Operation::RunBackup { backup_id, options, .. } => {
                json(self.backups.run_backup(*backup_id, *options, checkpoint).await?)
            }
            Operation::RestoreBackup { backup_id, .. } => {
                json(self.backups.restore_backup(*backup_id, checkpoint).await?)
            }
            Operation::GitClone {
                website_id,
                repo_url,
                branch,
            } => json(self.git.clone(*website_id, repo_url, branch.as_deref()).await?),
            Operation::GitPull { website_id } => json(self.git.pull(*website_id).await?),
            Operation::GitRollback { website_id, commit } => json(self.git.rollback(*website_id, commit).await?),
            Operation::GitSwitchBranch { website_id, branch } => {
                json(self.git.switch_branch(*website_id, branch).await?)
            }
            Operation::RunCronJob { job_id } => json(self.scheduler.execute_now(*job_id).await?),
        }
    }

    /// Put jobs left `Running` by a stopped worker back in the queue.
    pub async fn requeue_orphaned(&self) -> Result<u64, CoreError> {
        let count = self.ctx.store.requeue_orphaned_operations().await?;
        if count > 0 {
            tracing::warn!(count, "Requeued operations orphaned by a previous worker");
        }
        Ok(count)
    }
}

fn json<T: Serialize>(value: T) -> Result<Value, CoreError> {
    serde_json::to_value(value).map_err(|e| CoreError::Internal(format!("Failed to encode result: {e}")))
}

/// Queue `operation` on its resource. Managers that schedule follow-up work
/// (the certificate sweep) go through here rather than running it inline.
pub(crate) async fn enqueue(ctx: &Context, operation: &Operation) -> Result<OperationJob, CoreError> {
    let params = serde_json::to_value(operation)
        .map_err(|e| CoreError::Internal(format!("Failed to encode operation: {e}")))?;
    let job = ctx
        .store
        .enqueue_operation(&NewOperation {
            kind: operation.kind().to_string(),
            resource_key: operation.resource_key(),
            params,
        })
        .await?;
    tracing::info!(job_id = job.id, kind = %job.kind, resource = %job.resource_key, "Operation queued");
    Ok(job)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operations_are_tagged_by_kind() {
        let op = Operation::ProvisionSite { website_id: 7 };
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["kind"], op.kind());
        assert_eq!(value["website_id"], 7);
        assert_eq!(serde_json::from_value::<Operation>(value).unwrap(), op);
    }

    #[test]
    fn resource_keys_group_by_target() {
        assert_eq!(Operation::ProvisionSite { website_id: 3 }.resource_key(), "site:3");
        assert_eq!(
            Operation::RestoreBackup { website_id: 3, backup_id: 9 }.resource_key(),
            "site:3"
        );
        assert_eq!(Operation::SyncZone { zone_id: 2 }.resource_key(), "zone:2");
        assert_eq!(Operation::ProvisionServer { server_id: 1 }.resource_key(), "server:1");
    }

    #[test]
    fn backup_options_default_when_absent() {
        let op: Operation = serde_json::from_value(serde_json::json!({
            "kind": "create_backup",
            "website_id": 1,
            "backup_kind": "DatabaseOnly",
        }))
        .unwrap();
        assert_matches::assert_matches!(
            op,
            Operation::CreateBackup { backup_kind: BackupKind::DatabaseOnly, options, .. }
                if !options.encrypt && !options.upload_to_cloud
        );
    }
}
