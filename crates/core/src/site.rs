//! Site naming, validation and the provisioning step sequence.

use std::sync::LazyLock;

use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Maximum length of a fully qualified domain name.
pub const MAX_DOMAIN_LENGTH: usize = 253;

/// Maximum length of a derived system user name.
pub const MAX_SYSTEM_USER_LENGTH: usize = 32;

/// Maximum length of a database name.
pub const MAX_DB_NAME_LENGTH: usize = 64;

/// Maximum length of a database user name.
pub const MAX_DB_USER_LENGTH: usize = 32;

/// Length of generated database passwords.
pub const DB_PASSWORD_LENGTH: usize = 24;

/// Entitlement a client plan must grant for tenant sites.
pub const TENANT_ENTITLEMENT: &str = "tenant_sites";

static DOMAIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9.-]+$").expect("valid regex"));

static DB_IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_]+$").expect("valid regex"));

// ---------------------------------------------------------------------------
// Site kinds
// ---------------------------------------------------------------------------

/// What a site is, which decides its provisioning hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteKind {
    /// Plain files served by the web server.
    Static,
    /// A CMS installation (WordPress) backed by a database.
    Cms,
    /// A tenant on a multi-tenant application, gated by plan entitlement.
    Tenant,
}

impl SiteKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SiteKind::Static => "static",
            SiteKind::Cms => "cms",
            SiteKind::Tenant => "tenant",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "static" => Ok(SiteKind::Static),
            "cms" | "wordpress" => Ok(SiteKind::Cms),
            "tenant" => Ok(SiteKind::Tenant),
            other => Err(CoreError::Validation(format!("Unknown site kind '{other}'"))),
        }
    }

    pub fn needs_database(self) -> bool {
        !matches!(self, SiteKind::Static)
    }
}

/// Database server flavour used by a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DbEngine {
    Mariadb,
    Postgres,
}

impl DbEngine {
    pub fn as_str(self) -> &'static str {
        match self {
            DbEngine::Mariadb => "mariadb",
            DbEngine::Postgres => "postgres",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "mariadb" | "mysql" => Ok(DbEngine::Mariadb),
            "postgres" | "postgresql" => Ok(DbEngine::Postgres),
            other => Err(CoreError::Validation(format!("Unknown database engine '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Provisioning steps
// ---------------------------------------------------------------------------

/// Ordered provisioning steps. The current step is persisted after each
/// one completes so an interrupted run can resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionStep {
    PreProvision,
    CreateDirectories,
    /// PHP-FPM pool for the site user. A no-op for static sites.
    WritePhpPool,
    WriteServerBlock,
    CreateDatabase,
    PostProvision,
    ReloadWebServer,
    Done,
}

impl ProvisionStep {
    /// All steps in execution order.
    pub const ALL: [ProvisionStep; 8] = [
        ProvisionStep::PreProvision,
        ProvisionStep::CreateDirectories,
        ProvisionStep::WritePhpPool,
        ProvisionStep::WriteServerBlock,
        ProvisionStep::CreateDatabase,
        ProvisionStep::PostProvision,
        ProvisionStep::ReloadWebServer,
        ProvisionStep::Done,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProvisionStep::PreProvision => "pre_provision",
            ProvisionStep::CreateDirectories => "create_directories",
            ProvisionStep::WritePhpPool => "write_php_pool",
            ProvisionStep::WriteServerBlock => "write_server_block",
            ProvisionStep::CreateDatabase => "create_database",
            ProvisionStep::PostProvision => "post_provision",
            ProvisionStep::ReloadWebServer => "reload_web_server",
            ProvisionStep::Done => "done",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == raw)
    }

    /// The step after this one, or `None` after [`ProvisionStep::Done`].
    pub fn next(self) -> Option<Self> {
        let idx = Self::ALL.iter().position(|s| *s == self)?;
        Self::ALL.get(idx + 1).copied()
    }
}

/// What to do when a provisioning step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Keep completed infrastructure and report where it stopped.
    RepairInPlace,
    /// Undo completed steps in reverse order.
    Rollback,
}

impl FailurePolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "repair" | "repair_in_place" => Some(FailurePolicy::RepairInPlace),
            "rollback" => Some(FailurePolicy::Rollback),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Naming and validation
// ---------------------------------------------------------------------------

/// Normalize and validate a domain name.
pub fn validate_domain(raw: &str) -> Result<String, CoreError> {
    let domain = raw.trim().trim_end_matches('.').to_ascii_lowercase();
    if domain.is_empty() {
        return Err(CoreError::Validation("Domain is required".into()));
    }
    if domain.len() > MAX_DOMAIN_LENGTH {
        return Err(CoreError::Validation(format!(
            "Domain must be at most {MAX_DOMAIN_LENGTH} characters"
        )));
    }
    if !DOMAIN_RE.is_match(&domain) {
        return Err(CoreError::Validation(format!(
            "Invalid domain '{domain}': only lowercase letters, digits, dots and hyphens are allowed"
        )));
    }
    if !domain.contains('.')
        || domain.contains("..")
        || domain.starts_with(['.', '-'])
        || domain.split('.').any(|label| label.is_empty() || label.starts_with('-') || label.ends_with('-'))
    {
        return Err(CoreError::Validation(format!("Invalid domain '{domain}'")));
    }
    Ok(domain)
}

/// Derive the Unix account that owns a site's files.
pub fn system_user_for(domain: &str) -> String {
    let mut user = String::from("site_");
    user.extend(
        domain
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase()),
    );
    user.truncate(MAX_SYSTEM_USER_LENGTH);
    user
}

/// Document root for a site: `{web_root}/{user}/data/www/{domain}`.
pub fn site_path(web_root: &str, system_user: &str, domain: &str) -> String {
    format!(
        "{}/{system_user}/data/www/{domain}",
        web_root.trim_end_matches('/')
    )
}

/// Validate a database or database-user identifier.
pub fn validate_db_identifier(kind: &str, name: &str, max_len: usize) -> Result<(), CoreError> {
    if name.is_empty() || name.len() > max_len {
        return Err(CoreError::Validation(format!(
            "{kind} must be 1-{max_len} characters"
        )));
    }
    if !DB_IDENT_RE.is_match(name) {
        return Err(CoreError::Validation(format!(
            "{kind} '{name}' may only contain letters, digits and underscores"
        )));
    }
    Ok(())
}

/// Default database name and user for a site, derived from its system user.
pub fn default_db_identifiers(system_user: &str) -> (String, String) {
    let mut db_name = format!("{system_user}_db");
    db_name.truncate(MAX_DB_NAME_LENGTH);
    let mut db_user = system_user.to_string();
    db_user.truncate(MAX_DB_USER_LENGTH);
    (db_name, db_user)
}

/// Generate an alphanumeric database password.
pub fn generate_db_password() -> String {
    rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(DB_PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
