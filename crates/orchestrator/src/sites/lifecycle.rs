//! Suspension, configuration rewrites, archival and purging.

use chrono::{Duration, Utc};
use hostwright_core::database;
use hostwright_core::error::CoreError;
use hostwright_core::nginx::{self, ServeMode};
use hostwright_core::php_fpm;
use hostwright_core::shell::quote;
use hostwright_core::types::DbId;
use hostwright_db::models::status::{SslStatus, WebsiteStatus};
use hostwright_db::models::website::{Website, WebsiteArchive};
use hostwright_events::bus::SITE_DEPROVISIONED;
use hostwright_events::PlatformEvent;

use super::{install_server_block, serve_mode, SiteManager};
use crate::checkpoint::Checkpoint;
use crate::store::WebsiteStore;

/// Statuses a site may be deprovisioned from.
const DEPROVISIONABLE: &[WebsiteStatus] = &[
    WebsiteStatus::Active,
    WebsiteStatus::Suspended,
    WebsiteStatus::Error,
];

/// Name of the database dump inside a site archive.
const ARCHIVE_DUMP: &str = "database.sql";

impl SiteManager {
    /// Serve the suspended page instead of the site.
    pub async fn suspend(&self, website_id: DbId) -> Result<Website, CoreError> {
        self.swap_mode(website_id, WebsiteStatus::Active, WebsiteStatus::Suspended, ServeMode::Suspended)
            .await
    }

    pub async fn unsuspend(&self, website_id: DbId) -> Result<Website, CoreError> {
        self.swap_mode(website_id, WebsiteStatus::Suspended, WebsiteStatus::Active, ServeMode::Live)
            .await
    }

    async fn swap_mode(
        &self,
        website_id: DbId,
        from: WebsiteStatus,
        to: WebsiteStatus,
        mode: ServeMode,
    ) -> Result<Website, CoreError> {
        let website = self.ctx.website(website_id).await?;
        Self::ensure_idle(&website)?;
        if website.status() != from {
            return Err(CoreError::Conflict(format!(
                "Site {} is {}, expected {}",
                website.domain,
                website.status().name(),
                from.name()
            )));
        }

        let host = self.ctx.site_host(&website).await?;
        install_server_block(&self.ctx, &host, &website, mode).await?;

        self.ctx
            .store
            .transition_website(website_id, &[from], to)
            .await?
            .ok_or_else(|| CoreError::Conflict(format!("Site {} changed state concurrently", website.domain)))?;
        tracing::info!(domain = %website.domain, status = to.name(), "Site serve mode changed");
        self.ctx.website(website_id).await
    }

    /// Rewrite the server block from current state (TLS, suspension) and reload.
    pub async fn regenerate_config(&self, website_id: DbId) -> Result<Website, CoreError> {
        let website = self.ctx.website(website_id).await?;
        Self::ensure_idle(&website)?;
        if !matches!(website.status(), WebsiteStatus::Active | WebsiteStatus::Suspended) {
            return Err(CoreError::Validation(format!(
                "Site {} is {} and has no live configuration",
                website.domain,
                website.status().name()
            )));
        }
        let host = self.ctx.site_host(&website).await?;
        install_server_block(&self.ctx, &host, &website, serve_mode(&website)).await?;
        tracing::info!(domain = %website.domain, "Server block regenerated");
        Ok(website)
    }

    /// Archive the site directory and database, remove its server block and
    /// return the site to `Pending`.
    ///
    /// Nothing is deleted: the archive is kept for the configured grace
    /// period and removed by [`purge_expired_archives`](Self::purge_expired_archives).
    /// Cancellation is only honoured before the archive starts.
    pub async fn deprovision(&self, website_id: DbId, checkpoint: &Checkpoint) -> Result<WebsiteArchive, CoreError> {
        let current = self.ctx.website(website_id).await?;
        checkpoint.check("archive_files").await?;
        let website = self
            .ctx
            .store
            .transition_website(website_id, DEPROVISIONABLE, WebsiteStatus::Deprovisioning)
            .await?
            .ok_or_else(|| {
                CoreError::Conflict(format!(
                    "Site {} cannot be deprovisioned while {}",
                    current.domain,
                    current.status().name()
                ))
            })?;

        match self.archive(&website).await {
            Ok(archive) => {
                self.ctx.store.set_provision_step(website.id, None).await?;
                self.ctx.store.set_ssl(website.id, SslStatus::None, None, None).await?;
                self.ctx
                    .store
                    .set_website_status(website.id, WebsiteStatus::Pending, None)
                    .await?;
                tracing::info!(domain = %website.domain, archive = %archive.archive_path, "Site deprovisioned");
                self.ctx.publish(
                    PlatformEvent::new(SITE_DEPROVISIONED)
                        .with_source("website", website.id)
                        .with_payload(serde_json::json!({
                            "domain": website.domain,
                            "archive_path": archive.archive_path,
                            "purge_after": archive.purge_after,
                        })),
                );
                Ok(archive)
            }
            Err(e) => {
                tracing::error!(domain = %website.domain, error = %e, "Deprovisioning failed");
                self.ctx
                    .store
                    .set_website_status(website.id, WebsiteStatus::Error, Some(&e.to_string()))
                    .await?;
                Err(e)
            }
        }
    }

    async fn archive(&self, website: &Website) -> Result<WebsiteArchive, CoreError> {
        let host = self.ctx.site_host(website).await?;
        let now = Utc::now();
        let archive_path = format!(
            "{}/{}_{}",
            self.ctx.config.archive_root(),
            website.domain,
            now.format("%Y%m%d_%H%M%S")
        );
        let archive = quote(&archive_path);

        self.ctx.exec(&host, &format!("mkdir -p {archive}")).await?;
        if let Some((engine, db_name, _)) = website.database() {
            let dump = format!("{archive_path}/{ARCHIVE_DUMP}");
            self.ctx
                .exec(&host, &database::dump_command(engine, db_name, &dump))
                .await?;
        }
        let site = quote(&website.site_path);
        self.ctx
            .exec(&host, &format!("if [ -d {site} ]; then mv {site} {archive}/files; fi"))
            .await?;

        {
            let _guard = self.ctx.remote.lock_host(&host).await;
            let conf = nginx::config_path(&self.ctx.config.nginx_conf_dir, &website.domain);
            self.ctx.exec(&host, &format!("rm -f {}", quote(&conf))).await?;
            self.ctx.exec(&host, nginx::RELOAD_COMMAND).await?;
            if let Some(version) = website.php_version.as_deref() {
                self.ctx
                    .exec(&host, &php_fpm::remove_command(version, &website.domain))
                    .await?;
            }
        }

        if let Some((engine, db_name, db_user)) = website.database() {
            self.ctx
                .exec(&host, &database::drop_command(engine, db_name, db_user))
                .await?;
        }

        let purge_after = now + Duration::days(self.ctx.config.archive_grace_days);
        self.ctx
            .store
            .insert_archive(website, &archive_path, purge_after)
            .await
    }

    /// Delete archives whose grace period has passed. Returns how many were purged.
    pub async fn purge_expired_archives(&self) -> Result<usize, CoreError> {
        let archive_root = format!("{}/", self.ctx.config.archive_root());
        let mut purged = 0;

        for archive in self.ctx.store.list_expired_archives(Utc::now()).await? {
            if !archive.archive_path.starts_with(&archive_root) || archive.archive_path.contains("..") {
                tracing::error!(path = %archive.archive_path, "Refusing to purge path outside the archive root");
                continue;
            }
            let host = match self.ctx.server(archive.server_id).await {
                Ok(server) => server.target(),
                Err(e) => {
                    tracing::warn!(archive_id = archive.id, error = %e, "Archive server missing");
                    continue;
                }
            };
            match self
                .ctx
                .exec(&host, &format!("rm -rf {}", quote(&archive.archive_path)))
                .await
            {
                Ok(_) => {
                    self.ctx.store.mark_archive_purged(archive.id).await?;
                    tracing::info!(domain = %archive.domain, path = %archive.archive_path, "Archive purged");
                    purged += 1;
                }
                Err(e) => tracing::warn!(path = %archive.archive_path, error = %e, "Archive purge failed"),
            }
        }
        Ok(purged)
    }
}
