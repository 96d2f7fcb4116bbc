//! The persisted provisioning step machine.

use hostwright_core::database;
use hostwright_core::error::CoreError;
use hostwright_core::nginx::{self, ServeMode};
use hostwright_core::php_fpm;
use hostwright_core::remote::HostTarget;
use hostwright_core::shell::quote;
use hostwright_core::site::{FailurePolicy, ProvisionStep};
use hostwright_core::types::DbId;
use hostwright_db::models::status::WebsiteStatus;
use hostwright_db::models::website::Website;
use hostwright_events::bus::{SITE_PROVISIONED, SITE_PROVISION_FAILED};
use hostwright_events::PlatformEvent;

use super::hooks::{hooks_for, SiteHooks};
use super::{write_php_pool, write_server_block, SiteManager};
use crate::checkpoint::Checkpoint;
use crate::store::WebsiteStore;

/// Statuses provisioning may start or resume from.
const PROVISIONABLE: &[WebsiteStatus] = &[
    WebsiteStatus::Pending,
    WebsiteStatus::Error,
    WebsiteStatus::Provisioning,
];

impl SiteManager {
    /// Run the remaining provisioning steps and flip the site to `Active`.
    ///
    /// The last completed step is persisted after each step, so a resumed
    /// run starts where the previous one stopped.
    pub async fn provision(&self, website_id: DbId, checkpoint: &Checkpoint) -> Result<Website, CoreError> {
        let current = self.ctx.website(website_id).await?;
        let hooks = hooks_for(current.kind()?);

        let website = self
            .ctx
            .store
            .transition_website(website_id, PROVISIONABLE, WebsiteStatus::Provisioning)
            .await?
            .ok_or_else(|| {
                CoreError::Conflict(format!(
                    "Site {} cannot be provisioned while {}",
                    current.domain,
                    current.status().name()
                ))
            })?;
        let host = self.ctx.site_host(&website).await?;

        let mut next = match website.step() {
            Some(done) => done.next(),
            None => Some(ProvisionStep::PreProvision),
        };
        let mut completed: Vec<ProvisionStep> = ProvisionStep::ALL
            .into_iter()
            .take_while(|s| Some(*s) != next)
            .collect();
        if website.step().is_some() {
            tracing::info!(domain = %website.domain, resume_at = ?next, "Resuming provisioning");
        }

        while let Some(step) = next {
            let result = match checkpoint.check(step.as_str()).await {
                Ok(()) => self.run_step(step, hooks, &host, &website).await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                return Err(self.handle_failure(&website, &host, step, &completed, e).await);
            }
            self.ctx
                .store
                .set_provision_step(website.id, Some(step.as_str()))
                .await?;
            tracing::info!(domain = %website.domain, step = step.as_str(), "Provisioning step completed");
            completed.push(step);
            next = step.next();
        }

        self.ctx
            .store
            .set_website_status(website.id, WebsiteStatus::Active, None)
            .await?;
        tracing::info!(website_id = website.id, domain = %website.domain, "Site provisioned");
        self.ctx.publish(
            PlatformEvent::new(SITE_PROVISIONED)
                .with_source("website", website.id)
                .with_payload(serde_json::json!({ "domain": website.domain })),
        );
        self.ctx.website(website.id).await
    }

    async fn run_step(
        &self,
        step: ProvisionStep,
        hooks: &dyn SiteHooks,
        host: &HostTarget,
        website: &Website,
    ) -> Result<(), CoreError> {
        match step {
            ProvisionStep::PreProvision => hooks.pre_provision(&self.ctx, website).await,
            ProvisionStep::CreateDirectories => {
                self.ctx.exec(host, &self.directories_command(website)).await?;
                Ok(())
            }
            ProvisionStep::WritePhpPool => {
                let _guard = self.ctx.remote.lock_host(host).await;
                write_php_pool(&self.ctx, host, website).await
            }
            ProvisionStep::WriteServerBlock => {
                let _guard = self.ctx.remote.lock_host(host).await;
                write_server_block(&self.ctx, host, website, ServeMode::Live).await
            }
            ProvisionStep::CreateDatabase => {
                if !hooks.needs_database() {
                    return Ok(());
                }
                let (engine, db_name, db_user) = website.database().ok_or_else(|| {
                    CoreError::Validation(format!("Site {} has no database settings", website.domain))
                })?;
                let password = website.db_password.as_deref().unwrap_or_default();
                self.ctx
                    .exec(host, &database::create_command(engine, db_name, db_user, password))
                    .await?;
                Ok(())
            }
            ProvisionStep::PostProvision => hooks.post_provision(&self.ctx, host, website).await,
            ProvisionStep::ReloadWebServer => {
                self.ctx
                    .remote
                    .run_exclusive(host, nginx::RELOAD_COMMAND, self.ctx.config.command_timeout)
                    .await?;
                Ok(())
            }
            ProvisionStep::Done => Ok(()),
        }
    }

    fn directories_command(&self, website: &Website) -> String {
        let user = quote(&website.system_user);
        let home = quote(&format!(
            "{}/{}",
            self.ctx.config.web_root.trim_end_matches('/'),
            website.system_user
        ));
        format!(
            "(id -u {user} >/dev/null 2>&1 || useradd --system --create-home --home-dir {home} --shell /usr/sbin/nologin {user}) && \
             mkdir -p {logs} && chown -R {user}:www-data {home} && chmod 750 {home} && chmod -R g+rX {home}",
            logs = quote(&format!("{}/logs", website.site_path)),
        )
    }

    /// Record a failed step according to the failure policy and return the error.
    async fn handle_failure(
        &self,
        website: &Website,
        host: &HostTarget,
        step: ProvisionStep,
        completed: &[ProvisionStep],
        error: CoreError,
    ) -> CoreError {
        let message = error.to_string();

        let recorded = if matches!(error, CoreError::Cancelled(_)) {
            self.ctx
                .store
                .set_website_status(
                    website.id,
                    WebsiteStatus::Pending,
                    Some(&format!("Provisioning cancelled before {}", step.as_str())),
                )
                .await
        } else {
            match self.ctx.config.failure_policy {
                FailurePolicy::RepairInPlace => {
                    // A failed reload leaves working infrastructure behind; keep it for repair.
                    let status = if step == ProvisionStep::ReloadWebServer {
                        WebsiteStatus::Provisioning
                    } else {
                        WebsiteStatus::Error
                    };
                    self.ctx
                        .store
                        .set_website_status(website.id, status, Some(&message))
                        .await
                }
                FailurePolicy::Rollback => {
                    self.rollback(website, host, completed).await;
                    match self.ctx.store.set_provision_step(website.id, None).await {
                        Ok(()) => {
                            self.ctx
                                .store
                                .set_website_status(website.id, WebsiteStatus::Pending, Some(&message))
                                .await
                        }
                        Err(e) => Err(e),
                    }
                }
            }
        };
        if let Err(e) = recorded {
            tracing::error!(website_id = website.id, error = %e, "Failed to record provisioning failure");
        }

        tracing::error!(
            website_id = website.id,
            domain = %website.domain,
            step = step.as_str(),
            error = %message,
            "Provisioning failed",
        );
        self.ctx.publish(
            PlatformEvent::new(SITE_PROVISION_FAILED)
                .with_source("website", website.id)
                .with_payload(serde_json::json!({
                    "domain": website.domain,
                    "step": step.as_str(),
                    "error": message,
                })),
        );
        error
    }

    /// Undo completed steps in reverse order. Undo failures are logged and skipped.
    async fn rollback(&self, website: &Website, host: &HostTarget, completed: &[ProvisionStep]) {
        for step in completed.iter().rev() {
            let command = match step {
                ProvisionStep::CreateDirectories => Some(format!("rm -rf {}", quote(&website.site_path))),
                ProvisionStep::WritePhpPool => website
                    .php_version
                    .as_deref()
                    .map(|v| php_fpm::remove_command(v, &website.domain)),
                ProvisionStep::WriteServerBlock => Some(format!(
                    "rm -f {}",
                    quote(&nginx::config_path(&self.ctx.config.nginx_conf_dir, &website.domain))
                )),
                ProvisionStep::CreateDatabase => website
                    .database()
                    .map(|(engine, name, user)| database::drop_command(engine, name, user)),
                _ => None,
            };
            let Some(command) = command else { continue };
            match self.ctx.exec(host, &command).await {
                Ok(_) => tracing::info!(domain = %website.domain, step = step.as_str(), "Rolled back step"),
                Err(e) => tracing::warn!(
                    domain = %website.domain,
                    step = step.as_str(),
                    error = %e,
                    "Rollback of step failed",
                ),
            }
        }
    }
}
