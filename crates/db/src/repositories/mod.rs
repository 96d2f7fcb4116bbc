//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument.

pub mod backup_repo;
pub mod client_repo;
pub mod cron_job_repo;
pub mod dns_repo;
pub mod operation_repo;
pub mod security_settings_repo;
pub mod server_repo;
pub mod website_repo;

pub use backup_repo::BackupRepo;
pub use client_repo::ClientRepo;
pub use cron_job_repo::CronJobRepo;
pub use dns_repo::DnsRepo;
pub use operation_repo::OperationRepo;
pub use security_settings_repo::SecuritySettingsRepo;
pub use server_repo::ServerRepo;
pub use website_repo::WebsiteRepo;
