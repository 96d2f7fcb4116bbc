//! Per-kind provisioning hooks.

use async_trait::async_trait;
use hostwright_core::error::CoreError;
use hostwright_core::remote::HostTarget;
use hostwright_core::shell::quote;
use hostwright_core::site::{self, SiteKind, TENANT_ENTITLEMENT};
use hostwright_db::models::website::Website;

use crate::context::Context;
use crate::store::ClientStore;

/// What a kind of site adds around the common provisioning steps.
#[async_trait]
pub trait SiteHooks: Send + Sync {
    fn kind(&self) -> SiteKind;

    fn needs_database(&self) -> bool {
        self.kind().needs_database()
    }

    /// Runs before anything touches the host. Must not have side effects.
    async fn pre_provision(&self, _ctx: &Context, _website: &Website) -> Result<(), CoreError> {
        Ok(())
    }

    /// Runs after directories, server block and database exist.
    async fn post_provision(&self, _ctx: &Context, _host: &HostTarget, _website: &Website) -> Result<(), CoreError> {
        Ok(())
    }
}

pub fn hooks_for(kind: SiteKind) -> &'static dyn SiteHooks {
    match kind {
        SiteKind::Static => &StaticSite,
        SiteKind::Cms => &CmsSite,
        SiteKind::Tenant => &TenantSite,
    }
}

fn database_of(website: &Website) -> Result<(&str, &str, &str), CoreError> {
    match (&website.db_name, &website.db_user, &website.db_password) {
        (Some(name), Some(user), Some(password)) => Ok((name, user, password)),
        _ => Err(CoreError::Validation(format!(
            "Site {} has no database credentials",
            website.domain
        ))),
    }
}

// ── Static ──

pub struct StaticSite;

#[async_trait]
impl SiteHooks for StaticSite {
    fn kind(&self) -> SiteKind {
        SiteKind::Static
    }
}

// ── CMS ──

pub struct CmsSite;

impl CmsSite {
    /// wp-cli commands that download, configure and install WordPress.
    /// Each one is skipped when its result already exists.
    pub fn install_commands(website: &Website) -> Result<Vec<String>, CoreError> {
        let (db_name, db_user, db_password) = database_of(website)?;
        let wp = format!(
            "sudo -u {} -- wp --path={}",
            quote(&website.system_user),
            quote(&website.site_path)
        );
        let admin_email = website
            .admin_email
            .clone()
            .unwrap_or_else(|| format!("admin@{}", website.domain));
        let path = quote(&website.site_path);

        Ok(vec![
            format!("[ -f {path}/wp-includes/version.php ] || {wp} core download --quiet"),
            format!(
                "[ -f {path}/wp-config.php ] || {wp} config create --dbname={} --dbuser={} --dbpass={} --dbhost=localhost --skip-check --quiet",
                quote(db_name),
                quote(db_user),
                quote(db_password),
            ),
            format!(
                "{wp} core is-installed || {wp} core install --url={} --title={} --admin_user=admin --admin_email={} --skip-email --quiet",
                quote(&format!("https://{}", website.domain)),
                quote(&website.domain),
                quote(&admin_email),
            ),
        ])
    }
}

#[async_trait]
impl SiteHooks for CmsSite {
    fn kind(&self) -> SiteKind {
        SiteKind::Cms
    }

    async fn post_provision(&self, ctx: &Context, host: &HostTarget, website: &Website) -> Result<(), CoreError> {
        for command in Self::install_commands(website)? {
            ctx.exec(host, &command).await?;
        }
        tracing::info!(domain = %website.domain, "WordPress installed");
        Ok(())
    }
}

// ── Tenant ──

pub struct TenantSite;

impl TenantSite {
    /// Bench commands that create the tenant, install its apps and tag it.
    pub fn install_commands(bench_path: &str, website: &Website) -> Result<Vec<String>, CoreError> {
        let (db_name, _, db_password) = database_of(website)?;
        let bench = format!("cd {} && bench", quote(bench_path));
        let domain = quote(&website.domain);

        let mut commands = vec![format!(
            "[ -d {}/sites/{domain} ] || ({bench} new-site {domain} --db-name={} --db-password={} --admin-password={} --no-setup-db --no-mariadb-socket)",
            quote(bench_path),
            quote(db_name),
            quote(db_password),
            quote(&site::generate_db_password()),
        )];
        let apps = website.apps();
        if !apps.is_empty() {
            let apps: Vec<String> = apps.iter().map(|a| quote(a)).collect();
            commands.push(format!("{bench} --site {domain} install-app {}", apps.join(" ")));
        }
        commands.push(format!("{bench} --site {domain} set-config app_role tenant"));
        Ok(commands)
    }
}

#[async_trait]
impl SiteHooks for TenantSite {
    fn kind(&self) -> SiteKind {
        SiteKind::Tenant
    }

    async fn pre_provision(&self, ctx: &Context, website: &Website) -> Result<(), CoreError> {
        let client_id = website.client_id.ok_or_else(|| {
            CoreError::Entitlement(format!("Tenant site {} has no owning client", website.domain))
        })?;
        let client = ctx.store.find_client(client_id).await?.ok_or(CoreError::NotFound {
            entity: "Client",
            id: client_id,
        })?;
        if !client.has_feature(TENANT_ENTITLEMENT) {
            return Err(CoreError::Entitlement(format!(
                "Client '{}' plan does not include {TENANT_ENTITLEMENT}",
                client.name
            )));
        }
        Ok(())
    }

    async fn post_provision(&self, ctx: &Context, host: &HostTarget, website: &Website) -> Result<(), CoreError> {
        for command in Self::install_commands(&ctx.config.tenant_bench_path, website)? {
            ctx.exec(host, &command).await?;
        }
        tracing::info!(domain = %website.domain, apps = ?website.apps(), "Tenant site created");
        Ok(())
    }
}
