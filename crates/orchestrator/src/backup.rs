//! Site backups, restores and the backup key pair.
//!
//! A backup is staged on the site's host, downloaded into `BACKUP_DIR`,
//! optionally encrypted and optionally copied to cold storage. Restores run
//! the same path in reverse behind a maintenance page.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use hostwright_cloud::ObjectStorage;
use hostwright_core::backup::{self, BackupKind, ENCRYPTED_SUFFIX};
use hostwright_core::envelope::{self, DEFAULT_KEY_BITS};
use hostwright_core::error::CoreError;
use hostwright_core::nginx::ServeMode;
use hostwright_core::remote::HostTarget;
use hostwright_core::types::{DbId, Timestamp};
use hostwright_db::models::backup::{CompletedBackup, NewKeyPair, SiteBackup};
use hostwright_db::models::status::{BackupStatus, WebsiteStatus};
use hostwright_db::models::website::Website;
use hostwright_events::bus::{BACKUP_COMPLETED, BACKUP_FAILED, RESTORE_FAILED};
use hostwright_events::PlatformEvent;
use serde::{Deserialize, Serialize};

use crate::checkpoint::Checkpoint;
use crate::context::Context;
use crate::sites::{install_server_block, serve_mode, SiteManager};
use crate::store::{BackupStore, WebsiteStore};

/// Per-run backup choices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupOptions {
    #[serde(default)]
    pub encrypt: bool,
    #[serde(default)]
    pub upload_to_cloud: bool,
}

/// The backup key pair as shown to operators. The private key is never
/// included here.
#[derive(Debug, Clone, Serialize)]
pub struct KeyInfo {
    pub public_key_pem: Option<String>,
    pub private_key_masked: Option<String>,
    pub fingerprint: Option<String>,
    pub generated_at: Option<Timestamp>,
    pub private_key_downloaded: bool,
}

#[derive(Clone)]
pub struct BackupEngine {
    ctx: Context,
    storage: Option<Arc<dyn ObjectStorage>>,
}

impl BackupEngine {
    pub fn new(ctx: Context, storage: Option<Arc<dyn ObjectStorage>>) -> Self {
        Self { ctx, storage }
    }

    async fn backup(&self, id: DbId) -> Result<SiteBackup, CoreError> {
        self.ctx
            .store
            .find_backup(id)
            .await?
            .ok_or(CoreError::NotFound { entity: "SiteBackup", id })
    }

    fn storage(&self) -> Result<&Arc<dyn ObjectStorage>, CoreError> {
        self.storage
            .as_ref()
            .ok_or_else(|| CoreError::external("cloud storage", "no cold storage is configured"))
    }

    // -----------------------------------------------------------------------
    // Backups
    // -----------------------------------------------------------------------

    /// Record a `Pending` backup after checking the site can produce it.
    pub async fn request_backup(&self, website_id: DbId, kind: BackupKind) -> Result<SiteBackup, CoreError> {
        let website = self.ctx.website(website_id).await?;
        if kind.includes_database() && website.database().is_none() {
            return Err(CoreError::Validation(format!(
                "Site {} has no database; choose a files-only backup",
                website.domain
            )));
        }
        if !matches!(website.status(), WebsiteStatus::Active | WebsiteStatus::Suspended) {
            return Err(CoreError::Validation(format!(
                "Site {} is {} and cannot be backed up",
                website.domain,
                website.status().name()
            )));
        }
        self.ctx.store.create_backup(website_id, kind).await
    }

    /// Request and run a backup in one call.
    pub async fn create_backup(
        &self,
        website_id: DbId,
        kind: BackupKind,
        options: BackupOptions,
        checkpoint: &Checkpoint,
    ) -> Result<SiteBackup, CoreError> {
        let pending = self.request_backup(website_id, kind).await?;
        self.run_backup(pending.id, options, checkpoint).await
    }

    /// Take a `Pending` backup through to `Completed` or `Failed`.
    ///
    /// On failure no artifact is left behind on the host or locally.
    pub async fn run_backup(
        &self,
        backup_id: DbId,
        options: BackupOptions,
        checkpoint: &Checkpoint,
    ) -> Result<SiteBackup, CoreError> {
        let record = self.backup(backup_id).await?;
        if !self.ctx.store.mark_backup_in_progress(backup_id).await? {
            if record.status() == BackupStatus::InProgress {
                // Left over from a worker that stopped mid-run.
                self.ctx
                    .store
                    .fail_backup(backup_id, "Backup was interrupted before completion")
                    .await?;
            }
            return Err(CoreError::Conflict(format!(
                "Backup {backup_id} is {} and cannot be run",
                record.status().name()
            )));
        }

        let website = self.ctx.website(record.website_id).await?;
        let kind = record.kind()?;
        let mut produced: Vec<PathBuf> = Vec::new();

        match self.produce(&website, kind, options, checkpoint, &mut produced).await {
            Ok(done) => {
                self.ctx.store.complete_backup(backup_id, &done).await?;
                tracing::info!(
                    backup_id,
                    domain = %website.domain,
                    kind = kind.as_str(),
                    file_size = done.file_size,
                    encrypted = done.encrypted,
                    cloud = done.cloud_url.is_some(),
                    "Backup completed",
                );
                self.ctx.publish(
                    PlatformEvent::new(BACKUP_COMPLETED)
                        .with_source("site_backup", backup_id)
                        .with_payload(serde_json::json!({
                            "domain": website.domain,
                            "kind": kind.as_str(),
                            "file_size": done.file_size,
                        })),
                );
                self.backup(backup_id).await
            }
            Err(e) => {
                for path in &produced {
                    remove_local(path).await;
                }
                let message = e.to_string();
                tracing::error!(backup_id, domain = %website.domain, error = %message, "Backup failed");
                self.ctx.store.fail_backup(backup_id, &message).await?;
                self.ctx.publish(
                    PlatformEvent::new(BACKUP_FAILED)
                        .with_source("site_backup", backup_id)
                        .with_payload(serde_json::json!({ "domain": website.domain, "error": message })),
                );
                Err(e)
            }
        }
    }

    async fn produce(
        &self,
        website: &Website,
        kind: BackupKind,
        options: BackupOptions,
        checkpoint: &Checkpoint,
        produced: &mut Vec<PathBuf>,
    ) -> Result<CompletedBackup, CoreError> {
        let public_key = if options.encrypt {
            let settings = self.ctx.store.security_settings().await?;
            let pem = settings
                .public_key_pem
                .ok_or_else(|| CoreError::Validation("No backup key pair has been generated".into()))?;
            Some((pem, settings.key_fingerprint))
        } else {
            None
        };
        if options.upload_to_cloud {
            self.storage()?;
        }

        checkpoint.check("stage").await?;
        let host = self.ctx.site_host(website).await?;
        let base = backup::archive_base(&website.domain, kind, Utc::now());
        let artifact = backup::artifact_name(&base, kind);
        let stage_dir = format!("{}/{base}", self.ctx.config.remote_staging_dir.trim_end_matches('/'));

        let local_dir = self.ctx.config.backup_dir.join(&website.domain);
        tokio::fs::create_dir_all(&local_dir)
            .await
            .map_err(|e| CoreError::Internal(format!("Failed to create {}: {e}", local_dir.display())))?;
        let mut local_path = local_dir.join(&artifact);
        produced.push(local_path.clone());

        let staged = self.stage(&host, website, kind, &stage_dir, &artifact, &local_path).await;
        if let Err(e) = self.ctx.exec(&host, &backup::cleanup_command(&stage_dir)).await {
            tracing::warn!(host = %host.name, stage_dir, error = %e, "Failed to remove backup staging directory");
        }
        staged?;

        let mut key_fingerprint = None;
        if let Some((pem, fingerprint)) = public_key {
            checkpoint.check("encrypt").await?;
            let encrypted = PathBuf::from(format!("{}{ENCRYPTED_SUFFIX}", local_path.display()));
            produced.push(encrypted.clone());
            let (src, dst) = (local_path.clone(), encrypted.clone());
            tokio::task::spawn_blocking(move || envelope::encrypt_file(&pem, &src, &dst))
                .await
                .map_err(|e| CoreError::Internal(format!("Encryption task failed: {e}")))??;
            remove_local(&local_path).await;
            local_path = encrypted;
            key_fingerprint = fingerprint;
        }

        let file_size = tokio::fs::metadata(&local_path)
            .await
            .map_err(|e| CoreError::Internal(format!("Failed to stat {}: {e}", local_path.display())))?
            .len() as i64;

        let cloud_url = if options.upload_to_cloud {
            checkpoint.check("upload").await?;
            let name = file_name(&local_path)?;
            Some(self.storage()?.upload(&local_path, &name).await?)
        } else {
            None
        };

        Ok(CompletedBackup {
            file_path: local_path.to_string_lossy().into_owned(),
            file_size,
            encrypted: options.encrypt,
            key_fingerprint,
            cloud_url,
        })
    }

    async fn stage(
        &self,
        host: &HostTarget,
        website: &Website,
        kind: BackupKind,
        stage_dir: &str,
        artifact: &str,
        local_path: &Path,
    ) -> Result<(), CoreError> {
        let database = website.database().map(|(engine, name, _)| (engine, name));
        for command in backup::stage_commands(kind, &website.site_path, database, stage_dir, artifact)? {
            self.ctx.exec(host, &command).await?;
        }
        self.ctx
            .remote
            .download(host, &format!("{stage_dir}/{artifact}"), local_path)
            .await
    }

    /// Replace a site's files and/or database with a completed backup.
    ///
    /// A live site serves a maintenance page while data is replaced. Any
    /// failure leaves the site in `Error`.
    pub async fn restore_backup(&self, backup_id: DbId, checkpoint: &Checkpoint) -> Result<Website, CoreError> {
        let record = self.backup(backup_id).await?;
        if record.status() != BackupStatus::Completed {
            return Err(CoreError::Validation(format!(
                "Backup {backup_id} is {} and cannot be restored",
                record.status().name()
            )));
        }
        let website = self.ctx.website(record.website_id).await?;
        SiteManager::ensure_idle(&website)?;
        let kind = record.kind()?;

        let workdir = tempfile::tempdir()
            .map_err(|e| CoreError::Internal(format!("Failed to create restore directory: {e}")))?;
        let artifact = self.fetch_artifact(&record, workdir.path()).await?;
        checkpoint.check("restore").await?;

        let host = self.ctx.site_host(&website).await?;
        let live = matches!(website.status(), WebsiteStatus::Active | WebsiteStatus::Suspended);
        let stage_dir = format!(
            "{}/restore_{backup_id}_{}",
            self.ctx.config.remote_staging_dir.trim_end_matches('/'),
            Utc::now().format("%Y%m%d_%H%M%S")
        );

        let result = self.replace(&host, &website, kind, live, &stage_dir, &artifact).await;
        if let Err(e) = self.ctx.exec(&host, &backup::cleanup_command(&stage_dir)).await {
            tracing::warn!(host = %host.name, stage_dir, error = %e, "Failed to remove restore staging directory");
        }

        match result {
            Ok(()) => {
                tracing::info!(backup_id, domain = %website.domain, kind = kind.as_str(), "Backup restored");
                self.ctx.website(website.id).await
            }
            Err(e) => {
                let message = format!("Restore from backup {backup_id} failed: {e}");
                tracing::error!(backup_id, domain = %website.domain, error = %e, "Restore failed");
                self.ctx
                    .store
                    .set_website_status(website.id, WebsiteStatus::Error, Some(&message))
                    .await?;
                self.ctx.publish(
                    PlatformEvent::new(RESTORE_FAILED)
                        .with_source("website", website.id)
                        .with_payload(serde_json::json!({
                            "domain": website.domain,
                            "backup_id": backup_id,
                            "error": e.to_string(),
                        })),
                );
                Err(e)
            }
        }
    }

    async fn replace(
        &self,
        host: &HostTarget,
        website: &Website,
        kind: BackupKind,
        live: bool,
        stage_dir: &str,
        artifact: &Path,
    ) -> Result<(), CoreError> {
        let name = file_name(artifact)?;
        self.ctx
            .exec(host, &format!("mkdir -p {}", hostwright_core::shell::quote(stage_dir)))
            .await?;
        self.ctx
            .remote
            .upload(host, artifact, &format!("{stage_dir}/{name}"))
            .await?;

        if live {
            install_server_block(&self.ctx, host, website, ServeMode::Maintenance).await?;
        }
        let database = website.database().map(|(engine, name, _)| (engine, name));
        for command in backup::restore_commands(kind, &website.site_path, database, stage_dir, &name)? {
            self.ctx.exec(host, &command).await?;
        }
        if live {
            install_server_block(&self.ctx, host, website, serve_mode(website)).await?;
        }
        Ok(())
    }

    /// A plaintext copy of the backup artifact inside `workdir`.
    async fn fetch_artifact(&self, record: &SiteBackup, workdir: &Path) -> Result<PathBuf, CoreError> {
        let local = record.file_path.as_deref().map(PathBuf::from);
        let source = match local {
            Some(path) if tokio::fs::try_exists(&path).await.unwrap_or(false) => path,
            _ => {
                let url = record.cloud_url.as_deref().ok_or_else(|| {
                    CoreError::Validation(format!("Backup {} has no local file or cloud copy", record.id))
                })?;
                let name = url.rsplit('/').next().unwrap_or("artifact").to_string();
                let target = workdir.join(name);
                self.storage()?.download(url, &target).await?;
                target
            }
        };

        if !record.encrypted {
            return Ok(source);
        }
        let private_pem = self.private_key_pem().await?;
        let name = file_name(&source)?;
        let plain = workdir.join(name.strip_suffix(ENCRYPTED_SUFFIX).unwrap_or(&name));
        let dst = plain.clone();
        tokio::task::spawn_blocking(move || envelope::decrypt_file(&private_pem, &source, &dst))
            .await
            .map_err(|e| CoreError::Internal(format!("Decryption task failed: {e}")))??;
        Ok(plain)
    }

    /// Remove a backup's local file, cloud copy and record.
    pub async fn delete_backup(&self, backup_id: DbId) -> Result<(), CoreError> {
        let record = self.backup(backup_id).await?;
        if record.status() == BackupStatus::InProgress {
            return Err(CoreError::Conflict(format!("Backup {backup_id} is in progress")));
        }
        if let Some(url) = &record.cloud_url {
            self.storage()?.delete(url).await?;
        }
        self.ctx.store.delete_backup(backup_id).await?;
        if let Some(path) = &record.file_path {
            remove_local(Path::new(path)).await;
        }
        tracing::info!(backup_id, "Backup deleted");
        Ok(())
    }

    /// A site's backups, newest first.
    pub async fn list_backups(&self, website_id: DbId) -> Result<Vec<SiteBackup>, CoreError> {
        self.ctx.website(website_id).await?;
        self.ctx.store.list_backups(website_id).await
    }

    // -----------------------------------------------------------------------
    // Key pair
    // -----------------------------------------------------------------------

    /// Generate (or rotate) the backup key pair. Backups encrypted with an
    /// earlier key keep needing that key to restore.
    pub async fn generate_key_pair(&self, bits: Option<usize>) -> Result<KeyInfo, CoreError> {
        let bits = bits.unwrap_or(DEFAULT_KEY_BITS);
        let pair = tokio::task::spawn_blocking(move || envelope::generate_key_pair(bits))
            .await
            .map_err(|e| CoreError::Internal(format!("Key generation task failed: {e}")))??;
        let sealed = envelope::seal(&self.ctx.config.master_key, pair.private_pem.as_bytes())?;

        self.ctx
            .store
            .store_key_pair(&NewKeyPair {
                public_key_pem: pair.public_pem.clone(),
                sealed_private_key: sealed,
                key_fingerprint: pair.fingerprint.clone(),
            })
            .await?;
        tracing::info!(fingerprint = %pair.fingerprint, bits, "Backup key pair generated");
        self.key_info().await
    }

    pub async fn key_info(&self) -> Result<KeyInfo, CoreError> {
        let settings = self.ctx.store.security_settings().await?;
        let private_key_masked = match &settings.sealed_private_key {
            Some(sealed) => {
                let pem = envelope::open(&self.ctx.config.master_key, sealed)?;
                Some(envelope::mask_private_key(&String::from_utf8_lossy(&pem)))
            }
            None => None,
        };
        Ok(KeyInfo {
            public_key_pem: settings.public_key_pem,
            private_key_masked,
            fingerprint: settings.key_fingerprint,
            generated_at: settings.key_generated_at,
            private_key_downloaded: settings.private_key_downloaded_at.is_some(),
        })
    }

    /// Hand out the private key exactly once.
    pub async fn download_private_key(&self) -> Result<String, CoreError> {
        let pem = self.private_key_pem().await?;
        if !self.ctx.store.claim_private_key_download().await? {
            return Err(CoreError::Conflict("The private key has already been downloaded".into()));
        }
        tracing::warn!("Backup private key downloaded");
        Ok(pem)
    }

    async fn private_key_pem(&self) -> Result<String, CoreError> {
        let settings = self.ctx.store.security_settings().await?;
        let sealed = settings
            .sealed_private_key
            .ok_or_else(|| CoreError::Validation("No backup key pair has been generated".into()))?;
        let pem = envelope::open(&self.ctx.config.master_key, &sealed)?;
        String::from_utf8(pem).map_err(|_| CoreError::Internal("Stored private key is not valid UTF-8".into()))
    }
}

fn file_name(path: &Path) -> Result<String, CoreError> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| CoreError::Internal(format!("{} has no file name", path.display())))
}

async fn remove_local(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove local file"),
    }
}
