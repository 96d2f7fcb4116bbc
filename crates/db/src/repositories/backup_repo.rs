//! Repository for the `site_backups` table.

use sqlx::PgPool;
use hostwright_core::backup::BackupKind;
use hostwright_core::types::DbId;

use crate::models::backup::{CompletedBackup, SiteBackup};
use crate::models::status::BackupStatus;

/// Column list for `site_backups` queries.
const COLUMNS: &str = "\
    id, website_id, backup_kind, status_id, file_path, file_size, encrypted, key_fingerprint, \
    cloud_url, error, started_at, completed_at, created_at, updated_at";

/// Provides CRUD operations for site backups.
pub struct BackupRepo;

impl BackupRepo {
    /// Insert a `Pending` backup.
    pub async fn create(pool: &PgPool, website_id: DbId, kind: BackupKind) -> Result<SiteBackup, sqlx::Error> {
        let query = format!(
            "INSERT INTO site_backups (website_id, backup_kind, status_id) \
             VALUES ($1, $2, $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SiteBackup>(&query)
            .bind(website_id)
            .bind(kind.as_str())
            .bind(BackupStatus::Pending.id())
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<SiteBackup>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM site_backups WHERE id = $1");
        sqlx::query_as::<_, SiteBackup>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Backups of a site, newest first.
    pub async fn list_for_website(pool: &PgPool, website_id: DbId) -> Result<Vec<SiteBackup>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM site_backups WHERE website_id = $1 ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, SiteBackup>(&query)
            .bind(website_id)
            .fetch_all(pool)
            .await
    }

    /// `Pending -> InProgress`. Returns `false` if the backup was not pending.
    pub async fn mark_in_progress(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE site_backups SET status_id = $2, started_at = NOW() WHERE id = $1 AND status_id = $3",
        )
        .bind(id)
        .bind(BackupStatus::InProgress.id())
        .bind(BackupStatus::Pending.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn complete(pool: &PgPool, id: DbId, done: &CompletedBackup) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE site_backups SET \
                 status_id = $2, file_path = $3, file_size = $4, encrypted = $5, \
                 key_fingerprint = $6, cloud_url = $7, error = NULL, completed_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(BackupStatus::Completed.id())
        .bind(&done.file_path)
        .bind(done.file_size)
        .bind(done.encrypted)
        .bind(&done.key_fingerprint)
        .bind(&done.cloud_url)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Mark failed and forget any file reference.
    pub async fn fail(pool: &PgPool, id: DbId, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE site_backups SET status_id = $2, error = $3, file_path = NULL, file_size = NULL, \
                 cloud_url = NULL, completed_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(BackupStatus::Failed.id())
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM site_backups WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
