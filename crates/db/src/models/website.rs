//! Hosted website, archive and deployment models.

use hostwright_core::error::CoreError;
use hostwright_core::remote::redact::redact;
use hostwright_core::site::{DbEngine, ProvisionStep, SiteKind};
use hostwright_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::{DeploymentStatus, SslStatus, StatusId, WebsiteStatus};

/// A row from the `websites` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Website {
    pub id: DbId,
    pub domain: String,
    pub site_kind: String,
    pub client_id: Option<DbId>,
    pub server_id: DbId,
    pub status_id: StatusId,
    pub provision_step: Option<String>,
    pub last_error: Option<String>,
    pub system_user: String,
    pub site_path: String,
    pub php_version: Option<String>,
    pub db_engine: Option<String>,
    pub db_name: Option<String>,
    pub db_user: Option<String>,
    #[serde(skip_serializing)]
    pub db_password: Option<String>,
    pub tenant_apps: serde_json::Value,
    pub admin_email: Option<String>,
    pub ssl_status_id: StatusId,
    pub ssl_expires_at: Option<Timestamp>,
    pub ssl_issued_at: Option<Timestamp>,
    pub ssl_error: Option<String>,
    /// May embed credentials; masked when serialized.
    #[serde(serialize_with = "serialize_redacted")]
    pub git_repo_url: Option<String>,
    pub git_branch: Option<String>,
    pub current_commit: Option<String>,
    pub deploy_status_id: Option<StatusId>,
    pub last_deployed_at: Option<Timestamp>,
    #[serde(skip_serializing)]
    pub webhook_secret: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

fn serialize_redacted<S: serde::Serializer>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) => serializer.serialize_some(&redact(v)),
        None => serializer.serialize_none(),
    }
}

impl Website {
    pub fn status(&self) -> WebsiteStatus {
        WebsiteStatus::from_id(self.status_id).unwrap_or(WebsiteStatus::Error)
    }

    pub fn ssl_status(&self) -> SslStatus {
        SslStatus::from_id(self.ssl_status_id).unwrap_or(SslStatus::None)
    }

    pub fn deploy_status(&self) -> Option<DeploymentStatus> {
        self.deploy_status_id.and_then(DeploymentStatus::from_id)
    }

    pub fn kind(&self) -> Result<SiteKind, CoreError> {
        SiteKind::parse(&self.site_kind)
    }

    /// Last completed provisioning step, if any.
    pub fn step(&self) -> Option<ProvisionStep> {
        self.provision_step.as_deref().and_then(ProvisionStep::parse)
    }

    /// Engine, name and user of the site's database when it has one.
    pub fn database(&self) -> Option<(DbEngine, &str, &str)> {
        let engine = DbEngine::parse(self.db_engine.as_deref()?).ok()?;
        Some((engine, self.db_name.as_deref()?, self.db_user.as_deref()?))
    }

    /// Apps to install on a tenant site.
    pub fn apps(&self) -> Vec<String> {
        serde_json::from_value(self.tenant_apps.clone()).unwrap_or_default()
    }
}

/// Insert payload for a website, built by the API after validation and
/// derivation of the system user, paths and database identifiers.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateWebsite {
    pub domain: String,
    pub site_kind: String,
    pub client_id: Option<DbId>,
    pub server_id: DbId,
    pub system_user: String,
    pub site_path: String,
    pub php_version: Option<String>,
    pub db_engine: Option<String>,
    pub db_name: Option<String>,
    pub db_user: Option<String>,
    pub db_password: Option<String>,
    pub tenant_apps: Vec<String>,
    pub admin_email: Option<String>,
}

/// A row from the `website_archives` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WebsiteArchive {
    pub id: DbId,
    pub website_id: Option<DbId>,
    pub server_id: DbId,
    pub domain: String,
    pub archive_path: String,
    pub purge_after: Timestamp,
    pub purged_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A row from the `deployments` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Deployment {
    pub id: DbId,
    pub website_id: DbId,
    pub action: String,
    pub branch: Option<String>,
    pub commit_hash: Option<String>,
    pub status_id: StatusId,
    pub message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Insert payload for a deployment record.
#[derive(Debug, Clone)]
pub struct NewDeployment {
    pub website_id: DbId,
    pub action: &'static str,
    pub branch: Option<String>,
    pub commit_hash: Option<String>,
    pub status: DeploymentStatus,
    pub message: Option<String>,
}
