//! External service adapters.
//!
//! - [`storage`] -- cold storage for backup archives (S3-compatible).
//! - [`dns_provider`] -- authoritative DNS record CRUD (Cloudflare v4).
//! - [`resolver`] -- public DNS-over-HTTPS resolvers for propagation checks.

pub mod config;
pub mod dns_provider;
pub mod error;
pub mod resolver;
pub mod storage;

pub use config::CloudConfig;
pub use dns_provider::{CloudflareProvider, DnsProvider};
pub use error::CloudError;
pub use resolver::{DnsResolver, DohResolver};
pub use storage::{DirectoryStorage, ObjectStorage, S3Storage};
