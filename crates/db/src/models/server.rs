//! Hosting server models.

use hostwright_core::metrics::HostMetrics;
use hostwright_core::remote::HostTarget;
use hostwright_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::{ServerHealth, StatusId};

/// A row from the `hosting_servers` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct HostingServer {
    pub id: DbId,
    pub name: String,
    pub address: String,
    pub ssh_port: i32,
    pub ssh_user: String,
    pub identity_file: Option<String>,
    pub is_local: bool,
    pub is_enabled: bool,
    pub max_websites: i32,
    pub installed_services: serde_json::Value,
    pub provisioned_at: Option<Timestamp>,
    pub health_status_id: StatusId,
    pub cpu_percent: Option<f64>,
    pub memory_used_mb: Option<i64>,
    pub memory_total_mb: Option<i64>,
    pub disk_used_gb: Option<i64>,
    pub disk_total_gb: Option<i64>,
    pub load_1: Option<f64>,
    pub load_5: Option<f64>,
    pub load_15: Option<f64>,
    pub last_health_check_at: Option<Timestamp>,
    pub last_error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl HostingServer {
    /// Connection details for the remote execution client.
    pub fn target(&self) -> HostTarget {
        HostTarget {
            name: self.name.clone(),
            address: self.address.clone(),
            port: u16::try_from(self.ssh_port).unwrap_or(22),
            user: self.ssh_user.clone(),
            identity_file: self.identity_file.clone(),
        }
    }

    pub fn health(&self) -> ServerHealth {
        ServerHealth::from_id(self.health_status_id).unwrap_or(ServerHealth::Unknown)
    }

    /// Installed services recorded by the last provisioning run.
    pub fn services(&self) -> Vec<String> {
        serde_json::from_value(self.installed_services.clone()).unwrap_or_default()
    }
}

/// DTO for registering a server.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateServer {
    pub name: String,
    pub address: String,
    pub ssh_port: Option<i32>,
    pub ssh_user: Option<String>,
    pub identity_file: Option<String>,
    pub is_local: Option<bool>,
    pub max_websites: Option<i32>,
}

/// Health sample written by a health check.
#[derive(Debug, Clone)]
pub struct HealthSample {
    pub health: ServerHealth,
    pub metrics: Option<HostMetrics>,
    pub error: Option<String>,
}
