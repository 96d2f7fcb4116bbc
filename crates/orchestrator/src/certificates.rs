//! Certificate issuance, renewal sweeps and expiry reporting.

use chrono::{Duration, Utc};
use hostwright_core::certificate::{self, CertificateInfo};
use hostwright_core::error::CoreError;
use hostwright_core::remote::HostTarget;
use hostwright_core::types::{DbId, Timestamp};
use hostwright_db::models::status::{SslStatus, WebsiteStatus};
use hostwright_db::models::website::Website;
use hostwright_events::bus::{SSL_EXPIRING, SSL_FAILED, SSL_ISSUED};
use hostwright_events::PlatformEvent;
use serde::Serialize;

use crate::context::Context;
use crate::operations::{self, Operation};
use crate::sites::{install_server_block, serve_mode, SiteManager};
use crate::store::{OperationStore, WebsiteStore};

const CA: &str = "certificate authority";

/// Certificate state as reported to callers.
#[derive(Debug, Clone, Serialize)]
pub struct CertificateStatus {
    pub domain: String,
    pub status: SslStatus,
    pub expires_at: Option<Timestamp>,
    pub days_remaining: Option<i64>,
    pub error: Option<String>,
}

/// Outcome of one renewal sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenewalSummary {
    /// Renewals queued on their site by this sweep.
    pub queued: usize,
    /// Sites that already had a renewal waiting or running.
    pub already_queued: usize,
    /// Failed certificates that had already expired and are left for an operator.
    pub skipped: usize,
}

#[derive(Clone)]
pub struct CertificateManager {
    ctx: Context,
}

impl CertificateManager {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Obtain a certificate for an active site and switch its server block to TLS.
    ///
    /// A certificate already on the host and outside the renewal window is
    /// returned unchanged.
    pub async fn issue(&self, website_id: DbId) -> Result<CertificateInfo, CoreError> {
        let website = self.ctx.website(website_id).await?;
        SiteManager::ensure_idle(&website)?;
        if website.status() != WebsiteStatus::Active {
            return Err(CoreError::Validation(format!(
                "Site {} must be active to issue a certificate (currently {})",
                website.domain,
                website.status().name()
            )));
        }
        let host = self.ctx.site_host(&website).await?;
        let now = Utc::now();

        if let Some(expires_at) = self.read_expiry(&host, &website.domain).await? {
            if !certificate::needs_renewal(expires_at, now, self.ctx.config.ssl_renewal_threshold_days) {
                if website.ssl_status() != SslStatus::Active || website.ssl_expires_at != Some(expires_at) {
                    self.activate(&host, &website, expires_at).await?;
                }
                tracing::info!(domain = %website.domain, %expires_at, "Certificate still valid, nothing to issue");
                return Ok(CertificateInfo::new(&website.domain, expires_at, now));
            }
        }

        self.ctx
            .store
            .set_ssl(website.id, SslStatus::Pending, None, None)
            .await?;
        let command = certificate::issue_command(
            &website.domain,
            &website.site_path,
            self.ctx.config.certbot_email.as_deref(),
        );
        let expires_at = self.obtain(&host, &website, &command).await?;
        self.activate(&host, &website, expires_at).await?;

        tracing::info!(domain = %website.domain, %expires_at, "Certificate issued");
        self.ctx.publish(
            PlatformEvent::new(SSL_ISSUED)
                .with_source("website", website.id)
                .with_payload(serde_json::json!({ "domain": website.domain, "expires_at": expires_at })),
        );
        Ok(CertificateInfo::new(&website.domain, expires_at, now))
    }

    /// Force renewal of a site's certificate.
    pub async fn renew(&self, website_id: DbId) -> Result<CertificateInfo, CoreError> {
        let website = self.ctx.website(website_id).await?;
        let host = self.ctx.site_host(&website).await?;
        let command = certificate::renew_command(&website.domain);
        let expires_at = self.obtain(&host, &website, &command).await?;
        self.activate(&host, &website, expires_at).await?;
        tracing::info!(domain = %website.domain, %expires_at, "Certificate renewed");
        Ok(CertificateInfo::new(&website.domain, expires_at, Utc::now()))
    }

    /// Queue a renewal for every certificate inside the renewal window.
    ///
    /// Renewals rewrite the server block, so they run as `renew_certificate`
    /// operations on the site's queue and never overlap a restore, deploy or
    /// lifecycle change of the same site. A certificate whose last renewal
    /// failed is retried only while it has not yet expired.
    pub async fn renew_due(&self) -> Result<RenewalSummary, CoreError> {
        let now = Utc::now();
        let cutoff = now + Duration::days(self.ctx.config.ssl_renewal_threshold_days);
        let mut summary = RenewalSummary::default();

        for website in self.ctx.store.list_ssl_expiring(cutoff).await? {
            let expired = website.ssl_expires_at.is_some_and(|at| at <= now);
            if website.ssl_status() == SslStatus::Failed && expired {
                summary.skipped += 1;
                continue;
            }
            if website.status().is_transitional() {
                continue;
            }
            let operation = Operation::RenewCertificate { website_id: website.id };
            if self
                .ctx
                .store
                .has_open_operation(&operation.resource_key(), operation.kind())
                .await?
            {
                summary.already_queued += 1;
                continue;
            }
            operations::enqueue(&self.ctx, &operation).await?;
            tracing::info!(domain = %website.domain, "Certificate renewal queued");
            summary.queued += 1;
        }

        tracing::info!(
            queued = summary.queued,
            already_queued = summary.already_queued,
            skipped = summary.skipped,
            "Certificate renewal sweep finished",
        );
        Ok(summary)
    }

    /// Active certificates expiring within `days`, each announced as `ssl.expiring`.
    pub async fn expiring_soon(&self, days: i64) -> Result<Vec<CertificateInfo>, CoreError> {
        let now = Utc::now();
        let sites = self
            .ctx
            .store
            .list_ssl_expiring(now + Duration::days(days))
            .await?;

        let mut expiring = Vec::new();
        for website in sites {
            let Some(expires_at) = website.ssl_expires_at else {
                continue;
            };
            let info = CertificateInfo::new(&website.domain, expires_at, now);
            self.ctx.publish(
                PlatformEvent::new(SSL_EXPIRING)
                    .with_source("website", website.id)
                    .with_payload(serde_json::json!({
                        "domain": info.domain,
                        "expires_at": info.expires_at,
                        "days_remaining": info.days_remaining,
                        "ssl_status": website.ssl_status(),
                    })),
            );
            expiring.push(info);
        }
        Ok(expiring)
    }

    /// Current status, refreshing the expiry from the host when it has a certificate.
    pub async fn check(&self, website_id: DbId) -> Result<CertificateStatus, CoreError> {
        let website = self.ctx.website(website_id).await?;
        let host = self.ctx.site_host(&website).await?;
        let on_host = self.read_expiry(&host, &website.domain).await?;

        if let Some(expires_at) = on_host {
            if website.ssl_status() == SslStatus::Active && website.ssl_expires_at != Some(expires_at) {
                self.ctx
                    .store
                    .set_ssl(website.id, SslStatus::Active, Some(expires_at), None)
                    .await?;
            }
        }

        let expires_at = on_host.or(website.ssl_expires_at);
        Ok(CertificateStatus {
            domain: website.domain.clone(),
            status: website.ssl_status(),
            expires_at,
            days_remaining: expires_at.map(|at| certificate::days_remaining(at, Utc::now())),
            error: website.ssl_error.clone(),
        })
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn read_expiry(&self, host: &HostTarget, domain: &str) -> Result<Option<Timestamp>, CoreError> {
        let outcome = self.ctx.exec(host, &certificate::enddate_command(domain)).await?;
        certificate::parse_enddate(&outcome.stdout)
    }

    /// Run certbot and read back the new expiry; failures mark the site `Failed`.
    async fn obtain(&self, host: &HostTarget, website: &Website, command: &str) -> Result<Timestamp, CoreError> {
        let result = async {
            self.ctx.exec(host, command).await.map_err(|e| match e {
                CoreError::Command { stderr, .. } => CoreError::external(CA, stderr.trim().to_string()),
                other => other,
            })?;
            self.read_expiry(host, &website.domain)
                .await?
                .ok_or_else(|| CoreError::external(CA, "no certificate found after issuance"))
        }
        .await;

        if let Err(e) = &result {
            let message = e.to_string();
            tracing::error!(domain = %website.domain, error = %message, "Certificate request failed");
            self.ctx
                .store
                .set_ssl(website.id, SslStatus::Failed, None, Some(&message))
                .await?;
            self.ctx.publish(
                PlatformEvent::new(SSL_FAILED)
                    .with_source("website", website.id)
                    .with_payload(serde_json::json!({ "domain": website.domain, "error": message })),
            );
        }
        result
    }

    /// Record the certificate and serve the site over TLS.
    async fn activate(&self, host: &HostTarget, website: &Website, expires_at: Timestamp) -> Result<(), CoreError> {
        self.ctx
            .store
            .set_ssl(website.id, SslStatus::Active, Some(expires_at), None)
            .await?;
        let refreshed = self.ctx.website(website.id).await?;
        install_server_block(&self.ctx, host, &refreshed, serve_mode(&refreshed)).await
    }
}
