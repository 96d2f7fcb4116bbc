//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - A `Deserialize` create DTO for inserts

pub mod backup;
pub mod client;
pub mod cron_job;
pub mod dns;
pub mod operation;
pub mod server;
pub mod status;
pub mod website;
