//! Site lifecycle: creation, provisioning, suspension and archival.
//!
//! ```text
//! Pending -> Provisioning -> Active <-> Suspended
//! Active/Suspended/Error -> Deprovisioning -> Pending
//! any step failure -> Error (or Provisioning with last_error, when repairing)
//! ```

pub mod hooks;
mod lifecycle;
mod provision;

use hostwright_core::error::CoreError;
use hostwright_core::nginx::{self, ServeMode, ServerBlock, TlsPaths};
use hostwright_core::php_fpm;
use hostwright_core::remote::HostTarget;
use hostwright_core::site::{self, DbEngine, SiteKind, MAX_DB_NAME_LENGTH, MAX_DB_USER_LENGTH};
use hostwright_core::types::DbId;
use hostwright_db::models::status::{SslStatus, WebsiteStatus};
use hostwright_db::models::website::{CreateWebsite, Website};
use serde::Deserialize;

use crate::context::Context;
use crate::installer::ServerManager;
use crate::store::{ClientStore, WebsiteStore};

/// Request to register a new site.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSite {
    pub domain: String,
    pub kind: SiteKind,
    pub client_id: Option<DbId>,
    /// Placement; the least-loaded healthy server when absent.
    pub server_id: Option<DbId>,
    pub db_engine: Option<DbEngine>,
    pub db_name: Option<String>,
    pub db_user: Option<String>,
    #[serde(default)]
    pub tenant_apps: Vec<String>,
    pub admin_email: Option<String>,
}

#[derive(Clone)]
pub struct SiteManager {
    ctx: Context,
    servers: ServerManager,
}

impl SiteManager {
    pub fn new(ctx: Context) -> Self {
        let servers = ServerManager::new(ctx.clone());
        Self { ctx, servers }
    }

    /// Validate and record a site in `Pending`. Nothing touches a host yet.
    pub async fn create(&self, input: CreateSite) -> Result<Website, CoreError> {
        let domain = site::validate_domain(&input.domain)?;
        if self.ctx.store.find_website_by_domain(&domain).await?.is_some() {
            return Err(CoreError::Conflict(format!("Site {domain} already exists")));
        }

        if let Some(client_id) = input.client_id {
            let client = self
                .ctx
                .store
                .find_client(client_id)
                .await?
                .ok_or(CoreError::NotFound {
                    entity: "Client",
                    id: client_id,
                })?;
            let count = self.ctx.store.count_client_websites(client_id).await?;
            if count >= i64::from(client.max_websites) {
                return Err(CoreError::Validation(format!(
                    "Client '{}' has reached its limit of {} websites",
                    client.name, client.max_websites
                )));
            }
        }

        for app in &input.tenant_apps {
            if app.is_empty() || !app.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(CoreError::Validation(format!("Invalid app name '{app}'")));
            }
        }

        let server = match input.server_id {
            Some(id) => self.ctx.server(id).await?,
            None => self.servers.select_server().await?,
        };

        let system_user = site::system_user_for(&domain);
        let site_path = site::site_path(&self.ctx.config.web_root, &system_user, &domain);

        let (db_engine, db_name, db_user, db_password) = if input.kind.needs_database() {
            let (default_name, default_user) = site::default_db_identifiers(&system_user);
            let (db_name, db_user) = if input.kind == SiteKind::Tenant {
                // The tenant application connects as a user named after its database.
                let name = input.db_name.unwrap_or(default_user);
                (name.clone(), name)
            } else {
                (
                    input.db_name.unwrap_or(default_name),
                    input.db_user.unwrap_or(default_user),
                )
            };
            site::validate_db_identifier("Database name", &db_name, MAX_DB_NAME_LENGTH)?;
            site::validate_db_identifier("Database user", &db_user, MAX_DB_USER_LENGTH)?;
            (
                Some(input.db_engine.unwrap_or(DbEngine::Mariadb).as_str().to_string()),
                Some(db_name),
                Some(db_user),
                Some(site::generate_db_password()),
            )
        } else {
            (None, None, None, None)
        };

        let php_version = (input.kind != SiteKind::Static).then(|| self.ctx.config.php_version.clone());

        let website = self
            .ctx
            .store
            .create_website(&CreateWebsite {
                domain,
                site_kind: input.kind.as_str().to_string(),
                client_id: input.client_id,
                server_id: server.id,
                system_user,
                site_path,
                php_version,
                db_engine,
                db_name,
                db_user,
                db_password,
                tenant_apps: input.tenant_apps,
                admin_email: input.admin_email,
            })
            .await?;

        tracing::info!(
            website_id = website.id,
            domain = %website.domain,
            server = %server.name,
            kind = %website.site_kind,
            "Site created",
        );
        Ok(website)
    }

    /// Reject work on a site that is mid-transition.
    pub fn ensure_idle(website: &Website) -> Result<(), CoreError> {
        let status = website.status();
        if status.is_transitional() {
            return Err(CoreError::Conflict(format!(
                "Site {} is {}",
                website.domain,
                status.name()
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Server blocks
// ---------------------------------------------------------------------------

/// Server block for a site in the given mode. TLS is on once a
/// certificate is active.
pub fn server_block(website: &Website, mode: ServeMode) -> ServerBlock {
    ServerBlock {
        domain: website.domain.clone(),
        document_root: website.site_path.clone(),
        php_socket: website
            .php_version
            .as_ref()
            .map(|v| php_fpm::socket_path(v, &website.system_user)),
        tls: (website.ssl_status() == SslStatus::Active).then(|| TlsPaths::letsencrypt(&website.domain)),
        mode,
    }
}

/// How a site should be served given its status.
pub fn serve_mode(website: &Website) -> ServeMode {
    match website.status() {
        WebsiteStatus::Suspended => ServeMode::Suspended,
        _ => ServeMode::Live,
    }
}

/// Write a site's server block and reload nginx, holding the host lock.
pub async fn install_server_block(
    ctx: &Context,
    host: &HostTarget,
    website: &Website,
    mode: ServeMode,
) -> Result<(), CoreError> {
    let _guard = ctx.remote.lock_host(host).await;
    write_server_block(ctx, host, website, mode).await?;
    ctx.exec(host, nginx::RELOAD_COMMAND).await?;
    Ok(())
}

async fn write_server_block(
    ctx: &Context,
    host: &HostTarget,
    website: &Website,
    mode: ServeMode,
) -> Result<(), CoreError> {
    let path = nginx::config_path(&ctx.config.nginx_conf_dir, &website.domain);
    ctx.write_file(host, &path, &server_block(website, mode).render()).await
}

/// Write and activate the site's PHP-FPM pool. Static sites have none.
/// Callers hold the host lock.
async fn write_php_pool(ctx: &Context, host: &HostTarget, website: &Website) -> Result<(), CoreError> {
    let Some(version) = website.php_version.as_deref() else {
        return Ok(());
    };
    let pool = php_fpm::Pool {
        domain: &website.domain,
        system_user: &website.system_user,
        php_version: version,
        web_root: &ctx.config.web_root,
    };
    ctx.write_file(host, &php_fpm::pool_path(version, &website.domain), &pool.render())
        .await?;
    ctx.exec(host, &php_fpm::install_command(version, &website.domain)).await?;
    Ok(())
}
