//! Backup kinds, archive naming and the host-side staging commands.
//!
//! A backup is staged in its own directory on the host:
//!
//! ```text
//! {staging}/{base}/database.sql     DatabaseOnly, Full
//! {staging}/{base}/files.tar.gz     FilesOnly, Full
//! {staging}/{base}/{artifact}       the single file that is downloaded
//! ```
//!
//! `DatabaseOnly` ships the dump as-is, `FilesOnly` ships the files tarball,
//! and `Full` wraps both in an outer tarball.

use serde::{Deserialize, Serialize};

use crate::database;
use crate::error::CoreError;
use crate::shell::quote;
use crate::site::DbEngine;
use crate::types::Timestamp;

/// Name of the database dump inside a staging directory or full archive.
pub const DUMP_FILE: &str = "database.sql";

/// Name of the files tarball inside a staging directory or full archive.
pub const FILES_ARCHIVE: &str = "files.tar.gz";

/// Suffix appended to encrypted artifacts.
pub const ENCRYPTED_SUFFIX: &str = ".enc";

/// What a backup contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackupKind {
    Full,
    DatabaseOnly,
    FilesOnly,
}

impl BackupKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackupKind::Full => "Full",
            BackupKind::DatabaseOnly => "DatabaseOnly",
            BackupKind::FilesOnly => "FilesOnly",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let key: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match key.as_str() {
            "full" => Ok(BackupKind::Full),
            "databaseonly" | "database" | "db" => Ok(BackupKind::DatabaseOnly),
            "filesonly" | "files" => Ok(BackupKind::FilesOnly),
            _ => Err(CoreError::Validation(format!("Unknown backup type '{raw}'"))),
        }
    }

    /// Short tag used in archive names.
    pub fn tag(self) -> &'static str {
        match self {
            BackupKind::Full => "full",
            BackupKind::DatabaseOnly => "db",
            BackupKind::FilesOnly => "files",
        }
    }

    pub fn includes_database(self) -> bool {
        matches!(self, BackupKind::Full | BackupKind::DatabaseOnly)
    }

    pub fn includes_files(self) -> bool {
        matches!(self, BackupKind::Full | BackupKind::FilesOnly)
    }

    fn extension(self) -> &'static str {
        match self {
            BackupKind::DatabaseOnly => ".sql",
            BackupKind::Full | BackupKind::FilesOnly => ".tar.gz",
        }
    }
}

/// `{domain}_{YYYYMMDD_HHMMSS}_{tag}`, the stem shared by staging dirs and artifacts.
pub fn archive_base(domain: &str, kind: BackupKind, at: Timestamp) -> String {
    format!("{domain}_{}_{}", at.format("%Y%m%d_%H%M%S"), kind.tag())
}

/// Final file name of the (unencrypted) artifact.
pub fn artifact_name(base: &str, kind: BackupKind) -> String {
    format!("{base}{}", kind.extension())
}

/// Commands that snapshot the site into `stage_dir/artifact`.
///
/// `database` is `(engine, db_name)` and must be present when the kind
/// includes a database.
pub fn stage_commands(
    kind: BackupKind,
    site_path: &str,
    database: Option<(DbEngine, &str)>,
    stage_dir: &str,
    artifact: &str,
) -> Result<Vec<String>, CoreError> {
    let dump = format!("{stage_dir}/{DUMP_FILE}");
    let files = format!("{stage_dir}/{FILES_ARCHIVE}");
    let out = format!("{stage_dir}/{artifact}");

    let mut commands = vec![format!("mkdir -p {}", quote(stage_dir))];
    if kind.includes_database() {
        let (engine, db_name) = database.ok_or_else(|| {
            CoreError::Validation("Site has no database to back up".into())
        })?;
        commands.push(database::dump_command(engine, db_name, &dump));
    }
    if kind.includes_files() {
        commands.push(format!("tar -czf {} -C {} .", quote(&files), quote(site_path)));
    }
    commands.push(match kind {
        BackupKind::DatabaseOnly => format!("mv {} {}", quote(&dump), quote(&out)),
        BackupKind::FilesOnly => format!("mv {} {}", quote(&files), quote(&out)),
        BackupKind::Full => format!(
            "tar -czf {} -C {} {DUMP_FILE} {FILES_ARCHIVE} && rm -f {} {}",
            quote(&out),
            quote(stage_dir),
            quote(&dump),
            quote(&files)
        ),
    });
    Ok(commands)
}

/// Commands that restore from `stage_dir/artifact` (already decrypted and uploaded).
///
/// The site directory is emptied before files are extracted so the tree
/// matches the archive exactly.
pub fn restore_commands(
    kind: BackupKind,
    site_path: &str,
    database: Option<(DbEngine, &str)>,
    stage_dir: &str,
    artifact: &str,
) -> Result<Vec<String>, CoreError> {
    let input = format!("{stage_dir}/{artifact}");
    let dump = format!("{stage_dir}/{DUMP_FILE}");
    let files = format!("{stage_dir}/{FILES_ARCHIVE}");

    let mut commands = Vec::new();
    let (dump_path, files_path) = match kind {
        BackupKind::Full => {
            commands.push(format!("tar -xzf {} -C {}", quote(&input), quote(stage_dir)));
            (dump, files)
        }
        BackupKind::DatabaseOnly => (input.clone(), files),
        BackupKind::FilesOnly => (dump, input.clone()),
    };

    if kind.includes_files() {
        commands.push(format!(
            "mkdir -p {0} && find {0} -mindepth 1 -delete && tar -xzf {1} -C {0}",
            quote(site_path),
            quote(&files_path)
        ));
    }
    if kind.includes_database() {
        let (engine, db_name) = database.ok_or_else(|| {
            CoreError::Validation("Site has no database to restore into".into())
        })?;
        commands.push(database::restore_command(engine, db_name, &dump_path));
    }
    Ok(commands)
}

/// Remove a staging directory on the host.
pub fn cleanup_command(stage_dir: &str) -> String {
    format!("rm -rf {}", quote(stage_dir))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn naming() {
        let at = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let base = archive_base("example.com", BackupKind::DatabaseOnly, at);
        assert_eq!(base, "example.com_20250102_030405_db");
        assert_eq!(artifact_name(&base, BackupKind::DatabaseOnly), "example.com_20250102_030405_db.sql");
        assert_eq!(
            artifact_name(&archive_base("a.com", BackupKind::Full, at), BackupKind::Full),
            "a.com_20250102_030405_full.tar.gz"
        );
    }

    #[test]
    fn kinds_parse_loosely() {
        assert_eq!(BackupKind::parse("DatabaseOnly").unwrap(), BackupKind::DatabaseOnly);
        assert_eq!(BackupKind::parse("Database Only").unwrap(), BackupKind::DatabaseOnly);
        assert_eq!(BackupKind::parse("files_only").unwrap(), BackupKind::FilesOnly);
        assert_eq!(BackupKind::parse("Full").unwrap(), BackupKind::Full);
        assert!(BackupKind::parse("incremental").is_err());
    }

    #[test]
    fn database_backup_requires_database() {
        assert!(stage_commands(BackupKind::DatabaseOnly, "/s", None, "/st", "a.sql").is_err());
        let cmds = stage_commands(BackupKind::FilesOnly, "/s", None, "/st", "a.tar.gz").unwrap();
        assert_eq!(cmds.len(), 3);
        assert!(cmds[1].starts_with("tar -czf /st/files.tar.gz -C /s ."));
    }

    #[test]
    fn full_backup_wraps_both_parts() {
        let cmds = stage_commands(
            BackupKind::Full,
            "/s",
            Some((DbEngine::Mariadb, "db1")),
            "/st",
            "x.tar.gz",
        )
        .unwrap();
        assert!(cmds[1].contains("mysqldump"));
        assert!(cmds.last().unwrap().contains("database.sql files.tar.gz"));

        let restore = restore_commands(
            BackupKind::Full,
            "/s",
            Some((DbEngine::Mariadb, "db1")),
            "/st",
            "x.tar.gz",
        )
        .unwrap();
        assert_eq!(restore[0], "tar -xzf /st/x.tar.gz -C /st");
        assert!(restore[1].contains("find /s -mindepth 1 -delete"));
        assert_eq!(restore[2], "mysql db1 < /st/database.sql");
    }
}
