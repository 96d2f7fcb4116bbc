//! Site backup and security settings models.

use hostwright_core::backup::BackupKind;
use hostwright_core::error::CoreError;
use hostwright_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

use super::status::{BackupStatus, StatusId};

/// A row from the `site_backups` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SiteBackup {
    pub id: DbId,
    pub website_id: DbId,
    pub backup_kind: String,
    pub status_id: StatusId,
    pub file_path: Option<String>,
    pub file_size: Option<i64>,
    pub encrypted: bool,
    pub key_fingerprint: Option<String>,
    pub cloud_url: Option<String>,
    pub error: Option<String>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl SiteBackup {
    pub fn status(&self) -> BackupStatus {
        BackupStatus::from_id(self.status_id).unwrap_or(BackupStatus::Failed)
    }

    pub fn kind(&self) -> Result<BackupKind, CoreError> {
        BackupKind::parse(&self.backup_kind)
    }
}

/// Completion data for a backup.
#[derive(Debug, Clone)]
pub struct CompletedBackup {
    pub file_path: String,
    pub file_size: i64,
    pub encrypted: bool,
    pub key_fingerprint: Option<String>,
    pub cloud_url: Option<String>,
}

/// The `security_settings` singleton row.
#[derive(Debug, Clone, FromRow)]
pub struct SecuritySettings {
    pub id: i16,
    pub public_key_pem: Option<String>,
    /// Private key PEM sealed with the master key.
    pub sealed_private_key: Option<Vec<u8>>,
    pub key_fingerprint: Option<String>,
    pub key_generated_at: Option<Timestamp>,
    pub private_key_downloaded_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A freshly generated key pair to store.
#[derive(Debug, Clone)]
pub struct NewKeyPair {
    pub public_key_pem: String,
    pub sealed_private_key: Vec<u8>,
    pub key_fingerprint: String,
}
