mod common;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use assert_matches::assert_matches;
use common::{harness, harness_with, local_executor, FakeExecutor, Harness};
use hostwright_cloud::{DirectoryStorage, ObjectStorage};
use hostwright_core::backup::{BackupKind, ENCRYPTED_SUFFIX};
use hostwright_core::error::CoreError;
use hostwright_core::site::{FailurePolicy, SiteKind};
use hostwright_db::models::status::{BackupStatus, WebsiteStatus};
use hostwright_db::models::website::Website;
use hostwright_events::bus::BACKUP_FAILED;
use hostwright_orchestrator::backup::{BackupEngine, BackupOptions};
use hostwright_orchestrator::Checkpoint;
use tempfile::TempDir;

/// A harness whose "remote" host is this machine, with stand-in database
/// and web server tools, and one active CMS site with files and a database.
struct LocalSite {
    h: Harness,
    tools: TempDir,
    site: Website,
}

impl LocalSite {
    async fn new() -> Self {
        let tools = tempfile::tempdir().unwrap();
        let h = harness_with(Arc::new(local_executor(tools.path())), FailurePolicy::RepairInPlace);
        let site = h.active_site("shop.example.com", SiteKind::Cms).await;

        std::fs::create_dir_all(&site.site_path).unwrap();
        std::fs::write(Path::new(&site.site_path).join("index.php"), "<?php echo 'v1';").unwrap();
        std::fs::write(self_db(tools.path(), &site), "CREATE TABLE orders (id int);\n").unwrap();
        Self { h, tools, site }
    }

    fn db_file(&self) -> PathBuf {
        self_db(self.tools.path(), &self.site)
    }

    fn site_file(&self, name: &str) -> PathBuf {
        Path::new(&self.site.site_path).join(name)
    }

    fn engine(&self, storage: Option<Arc<dyn ObjectStorage>>) -> BackupEngine {
        BackupEngine::new(self.h.ctx.clone(), storage)
    }
}

fn self_db(tools: &Path, site: &Website) -> PathBuf {
    tools.join("db").join(format!("{}.sql", site.db_name.as_deref().unwrap()))
}

#[tokio::test]
async fn encrypted_full_backup_restores_files_and_database() {
    let local = LocalSite::new().await;
    let engine = local.engine(None);
    engine.generate_key_pair(Some(1024)).await.unwrap();

    let options = BackupOptions {
        encrypt: true,
        upload_to_cloud: false,
    };
    let backup = engine
        .create_backup(local.site.id, BackupKind::Full, options, &Checkpoint::none())
        .await
        .unwrap();

    assert_eq!(backup.status(), BackupStatus::Completed);
    assert!(backup.encrypted);
    assert!(backup.key_fingerprint.is_some());
    let file_path = backup.file_path.clone().unwrap();
    assert!(file_path.ends_with(&format!(".tar.gz{ENCRYPTED_SUFFIX}")));
    assert!(Path::new(&file_path).exists());
    assert!(!Path::new(file_path.trim_end_matches(ENCRYPTED_SUFFIX)).exists());

    // Damage the site after the backup.
    std::fs::write(local.site_file("index.php"), "<?php echo 'broken';").unwrap();
    std::fs::write(local.site_file("stray.txt"), "left behind").unwrap();
    std::fs::write(local.db_file(), "DROP TABLE orders;\n").unwrap();

    let restored = engine.restore_backup(backup.id, &Checkpoint::none()).await.unwrap();

    assert_eq!(restored.status(), WebsiteStatus::Active);
    assert_eq!(
        std::fs::read_to_string(local.site_file("index.php")).unwrap(),
        "<?php echo 'v1';"
    );
    assert!(!local.site_file("stray.txt").exists());
    assert_eq!(
        std::fs::read_to_string(local.db_file()).unwrap(),
        "CREATE TABLE orders (id int);\n"
    );

    let conf = std::fs::read_to_string(local.h.path("nginx/shop.example.com.conf")).unwrap();
    assert!(!conf.contains("Maintenance"), "live server block is back");
}

#[tokio::test]
async fn database_only_backup_stays_local() {
    let local = LocalSite::new().await;

    let backup = local
        .engine(None)
        .create_backup(
            local.site.id,
            BackupKind::DatabaseOnly,
            BackupOptions::default(),
            &Checkpoint::none(),
        )
        .await
        .unwrap();

    assert_eq!(backup.status(), BackupStatus::Completed);
    assert!(backup.file_size.unwrap() > 0);
    assert!(backup.cloud_url.is_none());
    assert!(!backup.encrypted);
    let file_path = backup.file_path.unwrap();
    assert!(file_path.ends_with("_db.sql"));
    assert_eq!(
        std::fs::read_to_string(&file_path).unwrap(),
        "CREATE TABLE orders (id int);\n"
    );

    let staging = local.h.path("staging");
    let leftovers = std::fs::read_dir(&staging).map(|d| d.count()).unwrap_or(0);
    assert_eq!(leftovers, 0, "staging directory is cleaned up");
}

#[tokio::test]
async fn restore_falls_back_to_the_cold_copy() {
    let local = LocalSite::new().await;
    let cold = tempfile::tempdir().unwrap();
    let engine = local.engine(Some(Arc::new(DirectoryStorage::new(cold.path()))));

    let backup = engine
        .create_backup(
            local.site.id,
            BackupKind::DatabaseOnly,
            BackupOptions {
                encrypt: false,
                upload_to_cloud: true,
            },
            &Checkpoint::none(),
        )
        .await
        .unwrap();
    let url = backup.cloud_url.clone().unwrap();
    assert!(url.starts_with("file://"));

    std::fs::remove_file(backup.file_path.as_deref().unwrap()).unwrap();
    std::fs::write(local.db_file(), "").unwrap();

    engine.restore_backup(backup.id, &Checkpoint::none()).await.unwrap();
    assert_eq!(
        std::fs::read_to_string(local.db_file()).unwrap(),
        "CREATE TABLE orders (id int);\n"
    );

    engine.delete_backup(backup.id).await.unwrap();
    assert_eq!(std::fs::read_dir(cold.path()).unwrap().count(), 0);
    assert!(engine.list_backups(local.site.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_cold_delete_keeps_the_local_archive_and_record() {
    let local = LocalSite::new().await;
    let cold = tempfile::tempdir().unwrap();
    let engine = local.engine(Some(Arc::new(DirectoryStorage::new(cold.path()))));
    let backup = engine
        .create_backup(
            local.site.id,
            BackupKind::DatabaseOnly,
            BackupOptions {
                encrypt: false,
                upload_to_cloud: true,
            },
            &Checkpoint::none(),
        )
        .await
        .unwrap();

    // A bucket the stored url does not belong to refuses the delete.
    let elsewhere = tempfile::tempdir().unwrap();
    let misconfigured = local.engine(Some(Arc::new(DirectoryStorage::new(elsewhere.path()))));
    assert!(misconfigured.delete_backup(backup.id).await.is_err());

    assert!(Path::new(backup.file_path.as_deref().unwrap()).exists());
    assert_eq!(engine.list_backups(local.site.id).await.unwrap().len(), 1);
    assert_eq!(std::fs::read_dir(cold.path()).unwrap().count(), 1);

    engine.delete_backup(backup.id).await.unwrap();
    assert!(!Path::new(backup.file_path.as_deref().unwrap()).exists());
    assert!(engine.list_backups(local.site.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn encryption_without_a_key_fails_cleanly() {
    let exec = FakeExecutor::new();
    let h = harness(exec.clone());
    let mut events = h.events.subscribe();
    let site = h.active_site("shop.example.com", SiteKind::Cms).await;
    let engine = BackupEngine::new(h.ctx.clone(), None);

    let err = engine
        .create_backup(
            site.id,
            BackupKind::DatabaseOnly,
            BackupOptions {
                encrypt: true,
                upload_to_cloud: false,
            },
            &Checkpoint::none(),
        )
        .await
        .unwrap_err();

    assert_matches!(err, CoreError::Validation(_));
    let backups = engine.list_backups(site.id).await.unwrap();
    assert_eq!(backups[0].status(), BackupStatus::Failed);
    assert!(backups[0].file_path.is_none());
    assert!(exec.commands().is_empty());
    assert_eq!(events.recv().await.unwrap().event_type, BACKUP_FAILED);
}

#[tokio::test]
async fn static_sites_have_no_database_backup() {
    let h = harness(FakeExecutor::new());
    let site = h.active_site("static.example.com", SiteKind::Static).await;
    let engine = BackupEngine::new(h.ctx.clone(), None);

    assert_matches!(
        engine.request_backup(site.id, BackupKind::DatabaseOnly).await,
        Err(CoreError::Validation(_))
    );
    assert!(engine.request_backup(site.id, BackupKind::FilesOnly).await.is_ok());
}

#[tokio::test]
async fn interrupted_backup_is_failed_on_rerun() {
    let h = harness(FakeExecutor::new());
    let site = h.active_site("shop.example.com", SiteKind::Cms).await;
    let engine = BackupEngine::new(h.ctx.clone(), None);
    let pending = engine.request_backup(site.id, BackupKind::Full).await.unwrap();
    h.store
        .update_backup(pending.id, |b| b.status_id = BackupStatus::InProgress.id());

    assert_matches!(
        engine
            .run_backup(pending.id, BackupOptions::default(), &Checkpoint::none())
            .await,
        Err(CoreError::Conflict(_))
    );
    let backup = &engine.list_backups(site.id).await.unwrap()[0];
    assert_eq!(backup.status(), BackupStatus::Failed);
    assert!(backup.error.as_deref().unwrap().contains("interrupted"));
}

#[tokio::test]
async fn private_key_is_downloadable_once() {
    let h = harness(FakeExecutor::new());
    let engine = BackupEngine::new(h.ctx.clone(), None);

    assert_matches!(engine.download_private_key().await, Err(CoreError::Validation(_)));

    let info = engine.generate_key_pair(Some(1024)).await.unwrap();
    assert!(info.public_key_pem.unwrap().contains("PUBLIC KEY"));
    assert!(!info.private_key_downloaded);
    let masked = info.private_key_masked.unwrap();
    assert!(!masked.is_empty());

    let pem = engine.download_private_key().await.unwrap();
    assert!(pem.contains("PRIVATE KEY"));
    assert_ne!(pem, masked);

    assert_matches!(engine.download_private_key().await, Err(CoreError::Conflict(_)));
    assert!(engine.key_info().await.unwrap().private_key_downloaded);
}
