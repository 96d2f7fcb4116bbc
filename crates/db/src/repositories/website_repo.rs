//! Repository for the `websites`, `website_archives` and `deployments` tables.
//!
//! Status changes go through [`WebsiteRepo::transition`], a compare-and-set
//! on the current status, so two operations racing on one site cannot both
//! win.

use sqlx::PgPool;
use hostwright_core::types::{DbId, Timestamp};

use crate::models::status::{SslStatus, StatusId, WebsiteStatus};
use crate::models::website::{CreateWebsite, Deployment, NewDeployment, Website, WebsiteArchive};

/// Column list for `websites` queries.
const COLUMNS: &str = "\
    id, domain, site_kind, client_id, server_id, status_id, provision_step, last_error, \
    system_user, site_path, php_version, db_engine, db_name, db_user, db_password, \
    tenant_apps, admin_email, ssl_status_id, ssl_expires_at, ssl_issued_at, ssl_error, \
    git_repo_url, git_branch, current_commit, deploy_status_id, last_deployed_at, \
    webhook_secret, created_at, updated_at";

/// Column list for `website_archives` queries.
const ARCHIVE_COLUMNS: &str =
    "id, website_id, server_id, domain, archive_path, purge_after, purged_at, created_at, updated_at";

/// Column list for `deployments` queries.
const DEPLOYMENT_COLUMNS: &str =
    "id, website_id, action, branch, commit_hash, status_id, message, created_at, updated_at";

/// Provides CRUD operations for hosted websites.
pub struct WebsiteRepo;

impl WebsiteRepo {
    pub async fn create(pool: &PgPool, input: &CreateWebsite) -> Result<Website, sqlx::Error> {
        let query = format!(
            "INSERT INTO websites (domain, site_kind, client_id, server_id, system_user, site_path, \
                 php_version, db_engine, db_name, db_user, db_password, tenant_apps, admin_email) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Website>(&query)
            .bind(&input.domain)
            .bind(&input.site_kind)
            .bind(input.client_id)
            .bind(input.server_id)
            .bind(&input.system_user)
            .bind(&input.site_path)
            .bind(&input.php_version)
            .bind(&input.db_engine)
            .bind(&input.db_name)
            .bind(&input.db_user)
            .bind(&input.db_password)
            .bind(serde_json::json!(input.tenant_apps))
            .bind(&input.admin_email)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Website>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM websites WHERE id = $1");
        sqlx::query_as::<_, Website>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_domain(pool: &PgPool, domain: &str) -> Result<Option<Website>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM websites WHERE domain = $1");
        sqlx::query_as::<_, Website>(&query)
            .bind(domain)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(pool: &PgPool, server_id: Option<DbId>) -> Result<Vec<Website>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM websites WHERE ($1::BIGINT IS NULL OR server_id = $1) ORDER BY domain"
        );
        sqlx::query_as::<_, Website>(&query)
            .bind(server_id)
            .fetch_all(pool)
            .await
    }

    /// Move to `to` only if the current status is one of `from`.
    ///
    /// Returns the updated row, or `None` when the status did not match.
    pub async fn transition(
        pool: &PgPool,
        id: DbId,
        from: &[WebsiteStatus],
        to: WebsiteStatus,
    ) -> Result<Option<Website>, sqlx::Error> {
        let from: Vec<StatusId> = from.iter().map(|s| s.id()).collect();
        let query = format!(
            "UPDATE websites SET status_id = $3 \
             WHERE id = $1 AND status_id = ANY($2) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Website>(&query)
            .bind(id)
            .bind(&from)
            .bind(to.id())
            .fetch_optional(pool)
            .await
    }

    /// Set status and error detail unconditionally (failure paths).
    pub async fn set_status(
        pool: &PgPool,
        id: DbId,
        status: WebsiteStatus,
        error: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE websites SET status_id = $2, last_error = $3 WHERE id = $1")
            .bind(id)
            .bind(status.id())
            .bind(error)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Persist the last completed provisioning step.
    pub async fn set_step(pool: &PgPool, id: DbId, step: Option<&str>) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE websites SET provision_step = $2 WHERE id = $1")
            .bind(id)
            .bind(step)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn set_ssl(
        pool: &PgPool,
        id: DbId,
        status: SslStatus,
        expires_at: Option<Timestamp>,
        error: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE websites SET \
                 ssl_status_id = $2, \
                 ssl_expires_at = COALESCE($3, ssl_expires_at), \
                 ssl_issued_at = CASE WHEN $2 = $5 AND $3 IS NOT NULL THEN NOW() ELSE ssl_issued_at END, \
                 ssl_error = $4 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(status.id())
        .bind(expires_at)
        .bind(error)
        .bind(SslStatus::Active.id())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Sites whose certificate is Active or Failed and expires before `before`.
    pub async fn list_ssl_expiring(pool: &PgPool, before: Timestamp) -> Result<Vec<Website>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM websites \
             WHERE ssl_status_id = ANY($1) AND ssl_expires_at IS NOT NULL AND ssl_expires_at < $2 \
             ORDER BY ssl_expires_at"
        );
        sqlx::query_as::<_, Website>(&query)
            .bind(vec![SslStatus::Active.id(), SslStatus::Failed.id()])
            .bind(before)
            .fetch_all(pool)
            .await
    }

    pub async fn set_git(
        pool: &PgPool,
        id: DbId,
        repo_url: Option<&str>,
        branch: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE websites SET git_repo_url = $2, git_branch = $3 WHERE id = $1")
            .bind(id)
            .bind(repo_url)
            .bind(branch)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Record a deployment outcome on the site and in its history.
    pub async fn record_deployment(pool: &PgPool, input: &NewDeployment) -> Result<Deployment, sqlx::Error> {
        let mut tx = pool.begin().await?;
        sqlx::query(
            "UPDATE websites SET \
                 current_commit = COALESCE($2, current_commit), \
                 git_branch = COALESCE($3, git_branch), \
                 deploy_status_id = $4, \
                 last_deployed_at = NOW() \
             WHERE id = $1",
        )
        .bind(input.website_id)
        .bind(&input.commit_hash)
        .bind(&input.branch)
        .bind(input.status.id())
        .execute(&mut *tx)
        .await?;

        let query = format!(
            "INSERT INTO deployments (website_id, action, branch, commit_hash, status_id, message) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {DEPLOYMENT_COLUMNS}"
        );
        let deployment = sqlx::query_as::<_, Deployment>(&query)
            .bind(input.website_id)
            .bind(input.action)
            .bind(&input.branch)
            .bind(&input.commit_hash)
            .bind(input.status.id())
            .bind(&input.message)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(deployment)
    }

    pub async fn list_deployments(
        pool: &PgPool,
        website_id: DbId,
        limit: i64,
    ) -> Result<Vec<Deployment>, sqlx::Error> {
        let query = format!(
            "SELECT {DEPLOYMENT_COLUMNS} FROM deployments WHERE website_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2"
        );
        sqlx::query_as::<_, Deployment>(&query)
            .bind(website_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    pub async fn set_webhook_secret(
        pool: &PgPool,
        id: DbId,
        secret: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE websites SET webhook_secret = $2 WHERE id = $1")
            .bind(id)
            .bind(secret)
            .execute(pool)
            .await?;
        Ok(())
    }

    // ── Archives ──

    pub async fn insert_archive(
        pool: &PgPool,
        website: &Website,
        archive_path: &str,
        purge_after: Timestamp,
    ) -> Result<WebsiteArchive, sqlx::Error> {
        let query = format!(
            "INSERT INTO website_archives (website_id, server_id, domain, archive_path, purge_after) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {ARCHIVE_COLUMNS}"
        );
        sqlx::query_as::<_, WebsiteArchive>(&query)
            .bind(website.id)
            .bind(website.server_id)
            .bind(&website.domain)
            .bind(archive_path)
            .bind(purge_after)
            .fetch_one(pool)
            .await
    }

    /// Archives past their grace period that have not been purged.
    pub async fn list_expired_archives(
        pool: &PgPool,
        now: Timestamp,
    ) -> Result<Vec<WebsiteArchive>, sqlx::Error> {
        let query = format!(
            "SELECT {ARCHIVE_COLUMNS} FROM website_archives \
             WHERE purged_at IS NULL AND purge_after <= $1 ORDER BY purge_after"
        );
        sqlx::query_as::<_, WebsiteArchive>(&query)
            .bind(now)
            .fetch_all(pool)
            .await
    }

    pub async fn mark_archive_purged(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE website_archives SET purged_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}
