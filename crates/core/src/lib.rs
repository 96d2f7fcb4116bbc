//! Hostwright domain core.
//!
//! Pure logic and host-facing primitives shared by every other crate:
//!
//! - [`remote`] -- command execution on managed hosts (SSH or local shell)
//!   with retries, per-host locking and redacted logging.
//! - [`cron`] -- cron expression parsing and run previews.
//! - [`dns`] -- record validation, provider reconciliation plans, quorum.
//! - [`envelope`] -- streaming envelope encryption for backup archives.
//! - [`site`], [`nginx`], [`php_fpm`], [`database`], [`certificate`], [`backup`],
//!   [`log_tail`], [`metrics`] -- command builders and parsers for the
//!   provisioning workflows.

pub mod backup;
pub mod certificate;
pub mod cron;
pub mod database;
pub mod dns;
pub mod envelope;
pub mod error;
pub mod hashing;
pub mod hex;
pub mod locks;
pub mod log_tail;
pub mod metrics;
pub mod nginx;
pub mod php_fpm;
pub mod remote;
pub mod shell;
pub mod site;
pub mod types;
pub mod webhook;
