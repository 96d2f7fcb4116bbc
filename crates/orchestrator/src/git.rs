//! Git deployments into a site's directory and webhook-triggered pulls.

use hostwright_core::error::CoreError;
use hostwright_core::remote::{redact, HostTarget};
use hostwright_core::shell::quote;
use hostwright_core::types::DbId;
use hostwright_core::webhook;
use hostwright_db::models::status::DeploymentStatus;
use hostwright_db::models::website::{Deployment, NewDeployment, Website};
use hostwright_events::bus::{DEPLOY_COMPLETED, DEPLOY_FAILED};
use hostwright_events::PlatformEvent;
use serde::Serialize;

use crate::context::Context;
use crate::sites::SiteManager;
use crate::store::WebsiteStore;

const GIT: &str = "git host";

/// Branch used when a site has none recorded.
pub const DEFAULT_BRANCH: &str = "main";

/// Upper bound for one history request.
pub const MAX_HISTORY: usize = 200;

/// One commit from `git log`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitInfo {
    pub hash: String,
    pub author: String,
    pub email: String,
    pub date: String,
    pub message: String,
}

/// Working tree state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GitStatus {
    pub branch: String,
    pub commit: String,
    pub clean: bool,
    /// `git status --porcelain` lines.
    pub changes: Vec<String>,
}

/// What a caller needs to register a webhook with the git host.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookSetup {
    pub url: String,
    pub secret: String,
}

/// What an authenticated webhook delivery asks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "reason", rename_all = "snake_case")]
pub enum WebhookDecision {
    Deploy,
    Ignore(String),
}

#[derive(Clone)]
pub struct GitDeployer {
    ctx: Context,
}

impl GitDeployer {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Run a git command as the site user, reporting failures with
    /// credentials masked. The working tree belongs to that user, and git
    /// refuses repositories owned by someone else.
    async fn git(&self, host: &HostTarget, website: &Website, args: &str) -> Result<String, CoreError> {
        let command = git_command(website, args);
        match self.ctx.exec(host, &command).await {
            Ok(outcome) => Ok(outcome.stdout),
            Err(CoreError::Command { stderr, .. }) => Err(CoreError::external(GIT, redact::redact(stderr.trim()))),
            Err(e) => Err(e),
        }
    }

    async fn head(&self, host: &HostTarget, website: &Website) -> Result<String, CoreError> {
        Ok(self.git(host, website, "rev-parse HEAD").await?.trim().to_string())
    }

    /// Clone `repo_url` into an empty site directory (a `logs/` directory is allowed).
    pub async fn clone(&self, website_id: DbId, repo_url: &str, branch: Option<&str>) -> Result<Deployment, CoreError> {
        let website = self.ctx.website(website_id).await?;
        SiteManager::ensure_idle(&website)?;
        let branch = branch.unwrap_or(DEFAULT_BRANCH);
        validate_ref(branch)?;
        if repo_url.trim().is_empty() || repo_url.contains(char::is_whitespace) {
            return Err(CoreError::Validation("Repository URL is invalid".into()));
        }
        let host = self.ctx.site_host(&website).await?;

        let dir = quote(&website.site_path);
        let empty = self
            .ctx
            .remote
            .run(
                &host,
                &format!("[ ! -d {dir} ] || [ -z \"$(ls -A {dir} | grep -v '^logs$')\" ]"),
                self.ctx.config.command_timeout,
            )
            .await?;
        if !empty.success() {
            return Err(CoreError::Validation(format!(
                "Site directory for {} is not empty",
                website.domain
            )));
        }

        let result = async {
            self.ctx
                .exec(
                    &host,
                    &format!(
                        "mkdir -p {dir} && chown {}:www-data {dir}",
                        quote(&website.system_user)
                    ),
                )
                .await?;
            self.git(&host, &website, "init -q").await?;
            self.git(&host, &website, &format!("remote add origin {}", quote(repo_url)))
                .await?;
            self.git(&host, &website, &format!("fetch -q origin {}", quote(branch)))
                .await?;
            self.git(
                &host,
                &website,
                &format!("checkout -q -B {0} origin/{0}", quote(branch)),
            )
            .await?;
            self.git(&host, &website, &format!("branch -q --set-upstream-to=origin/{}", quote(branch)))
                .await?;
            self.head(&host, &website).await
        }
        .await;

        if result.is_ok() {
            self.ctx
                .store
                .set_git(website.id, Some(&redact::redact(repo_url)), Some(branch))
                .await?;
        }
        self.record(&website, "clone", Some(branch), result).await
    }

    /// Pull the tracked branch.
    pub async fn pull(&self, website_id: DbId) -> Result<Deployment, CoreError> {
        let website = self.ctx.website(website_id).await?;
        SiteManager::ensure_idle(&website)?;
        let branch = tracked_branch(&website)?;
        let host = self.ctx.site_host(&website).await?;

        let result = async {
            self.git(&host, &website, &format!("pull -q origin {}", quote(&branch)))
                .await?;
            self.head(&host, &website).await
        }
        .await;
        self.record(&website, "pull", Some(&branch), result).await
    }

    /// Hard-reset the working tree to `commit`.
    pub async fn rollback(&self, website_id: DbId, commit: &str) -> Result<Deployment, CoreError> {
        let website = self.ctx.website(website_id).await?;
        SiteManager::ensure_idle(&website)?;
        tracked_branch(&website)?;
        validate_commit(commit)?;
        let host = self.ctx.site_host(&website).await?;

        let result = async {
            self.git(&host, &website, &format!("cat-file -e {commit}^{{commit}}"))
                .await
                .map_err(|_| CoreError::Validation(format!("Commit {commit} does not exist")))?;
            self.git(&host, &website, &format!("reset -q --hard {commit}")).await?;
            self.head(&host, &website).await
        }
        .await;
        self.record(&website, "rollback", website.git_branch.as_deref(), result)
            .await
    }

    /// Fetch and check out another branch, which becomes the tracked one.
    pub async fn switch_branch(&self, website_id: DbId, branch: &str) -> Result<Deployment, CoreError> {
        let website = self.ctx.website(website_id).await?;
        SiteManager::ensure_idle(&website)?;
        tracked_branch(&website)?;
        validate_ref(branch)?;
        let host = self.ctx.site_host(&website).await?;

        let result = async {
            self.git(&host, &website, &format!("fetch -q origin {}", quote(branch)))
                .await?;
            self.git(&host, &website, &format!("checkout -q -B {0} origin/{0}", quote(branch)))
                .await?;
            self.git(&host, &website, &format!("branch -q --set-upstream-to=origin/{}", quote(branch)))
                .await?;
            self.head(&host, &website).await
        }
        .await;

        if result.is_ok() {
            self.ctx
                .store
                .set_git(website.id, website.git_repo_url.as_deref(), Some(branch))
                .await?;
        }
        self.record(&website, "switch_branch", Some(branch), result).await
    }

    /// Commits on the current branch, newest first.
    pub async fn history(&self, website_id: DbId, limit: usize) -> Result<Vec<CommitInfo>, CoreError> {
        let website = self.ctx.website(website_id).await?;
        tracked_branch(&website)?;
        let host = self.ctx.site_host(&website).await?;
        let limit = limit.clamp(1, MAX_HISTORY);
        let output = self
            .git(
                &host,
                &website,
                &format!("log -n {limit} --pretty=format:'%H|%an|%ae|%ad|%s' --date=iso"),
            )
            .await?;
        Ok(parse_log(&output))
    }

    /// Local and remote branch names, deduplicated.
    pub async fn branches(&self, website_id: DbId) -> Result<Vec<String>, CoreError> {
        let website = self.ctx.website(website_id).await?;
        tracked_branch(&website)?;
        let host = self.ctx.site_host(&website).await?;
        self.git(&host, &website, "fetch -q --prune origin").await?;
        let output = self
            .git(&host, &website, "branch -a --format='%(refname:short)'")
            .await?;
        Ok(parse_branches(&output))
    }

    pub async fn status(&self, website_id: DbId) -> Result<GitStatus, CoreError> {
        let website = self.ctx.website(website_id).await?;
        tracked_branch(&website)?;
        let host = self.ctx.site_host(&website).await?;
        let branch = self.git(&host, &website, "rev-parse --abbrev-ref HEAD").await?;
        let commit = self.head(&host, &website).await?;
        let changes: Vec<String> = self
            .git(&host, &website, "status --porcelain")
            .await?
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect();
        Ok(GitStatus {
            branch: branch.trim().to_string(),
            commit,
            clean: changes.is_empty(),
            changes,
        })
    }

    /// Past deployments, newest first.
    pub async fn deployments(&self, website_id: DbId, limit: i64) -> Result<Vec<Deployment>, CoreError> {
        self.ctx.website(website_id).await?;
        self.ctx.store.list_deployments(website_id, limit).await
    }

    // -----------------------------------------------------------------------
    // Webhooks
    // -----------------------------------------------------------------------

    /// Issue a new webhook secret, replacing any previous one.
    pub async fn setup_webhook(&self, website_id: DbId, public_base_url: &str) -> Result<WebhookSetup, CoreError> {
        let website = self.ctx.website(website_id).await?;
        tracked_branch(&website)?;
        let secret = webhook::generate_secret();
        self.ctx.store.set_webhook_secret(website.id, Some(&secret)).await?;
        tracing::info!(domain = %website.domain, "Webhook secret issued");
        Ok(WebhookSetup {
            url: webhook_url(public_base_url, website.id),
            secret,
        })
    }

    /// Authenticate a delivery and decide whether it should trigger a pull.
    pub async fn verify_webhook(
        &self,
        website_id: DbId,
        event: Option<&str>,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<WebhookDecision, CoreError> {
        let website = self.ctx.website(website_id).await?;
        let secret = website
            .webhook_secret
            .as_deref()
            .ok_or_else(|| CoreError::Unauthorized("Webhook is not configured for this site".into()))?;
        let signature = signature.ok_or_else(|| CoreError::Unauthorized("Missing webhook signature".into()))?;
        if !webhook::verify(secret, body, signature) {
            tracing::warn!(domain = %website.domain, "Webhook signature mismatch");
            return Err(CoreError::Unauthorized("Invalid webhook signature".into()));
        }

        match event.unwrap_or("push") {
            "ping" => return Ok(WebhookDecision::Ignore("ping".into())),
            "push" => {}
            other => return Ok(WebhookDecision::Ignore(format!("event '{other}' is not handled"))),
        }

        let payload: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| CoreError::Validation(format!("Webhook payload is not JSON: {e}")))?;
        let tracked = website.git_branch.as_deref().unwrap_or(DEFAULT_BRANCH);
        match webhook::pushed_branch(&payload) {
            Some(branch) if branch == tracked => Ok(WebhookDecision::Deploy),
            Some(branch) => Ok(WebhookDecision::Ignore(format!("push to '{branch}', tracking '{tracked}'"))),
            None => Ok(WebhookDecision::Ignore("push is not to a branch".into())),
        }
    }

    async fn record(
        &self,
        website: &Website,
        action: &'static str,
        branch: Option<&str>,
        result: Result<String, CoreError>,
    ) -> Result<Deployment, CoreError> {
        let (status, commit, message) = match &result {
            Ok(commit) => {
                let status = if action == "rollback" {
                    DeploymentStatus::RolledBack
                } else {
                    DeploymentStatus::Success
                };
                (status, Some(commit.clone()), None)
            }
            Err(e) => (DeploymentStatus::Failed, None, Some(redact::redact(&e.to_string()))),
        };

        let deployment = self
            .ctx
            .store
            .record_deployment(&NewDeployment {
                website_id: website.id,
                action,
                branch: branch.map(String::from),
                commit_hash: commit,
                status,
                message: message.clone(),
            })
            .await?;

        match result {
            Ok(commit) => {
                tracing::info!(domain = %website.domain, action, commit = %commit, "Deployment finished");
                self.ctx.publish(
                    PlatformEvent::new(DEPLOY_COMPLETED)
                        .with_source("website", website.id)
                        .with_payload(serde_json::json!({
                            "domain": website.domain,
                            "action": action,
                            "commit": commit,
                        })),
                );
                Ok(deployment)
            }
            Err(e) => {
                tracing::error!(domain = %website.domain, action, error = %message.unwrap_or_default(), "Deployment failed");
                self.ctx.publish(
                    PlatformEvent::new(DEPLOY_FAILED)
                        .with_source("website", website.id)
                        .with_payload(serde_json::json!({
                            "domain": website.domain,
                            "action": action,
                            "error": redact::redact(&e.to_string()),
                        })),
                );
                Err(e)
            }
        }
    }
}

/// `git -C <site dir> <args>` run as the site's system user.
pub fn git_command(website: &Website, args: &str) -> String {
    format!(
        "sudo -u {} -H -- git -C {} {args}",
        quote(&website.system_user),
        quote(&website.site_path)
    )
}

fn tracked_branch(website: &Website) -> Result<String, CoreError> {
    if website.git_repo_url.is_none() {
        return Err(CoreError::Validation(format!(
            "Site {} has no git repository",
            website.domain
        )));
    }
    Ok(website.git_branch.clone().unwrap_or_else(|| DEFAULT_BRANCH.to_string()))
}

/// Callback URL registered with the git host.
pub fn webhook_url(public_base_url: &str, website_id: DbId) -> String {
    format!("{}/api/v1/git/webhook/{website_id}", public_base_url.trim_end_matches('/'))
}

/// Branch names git would accept, without option-looking or range syntax.
fn validate_ref(name: &str) -> Result<(), CoreError> {
    let ok = !name.is_empty()
        && name.len() <= 200
        && !name.starts_with('-')
        && !name.starts_with('/')
        && !name.ends_with('/')
        && !name.ends_with(".lock")
        && !name.contains("..")
        && !name.contains("//")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'));
    if ok {
        Ok(())
    } else {
        Err(CoreError::Validation(format!("Invalid branch name '{name}'")))
    }
}

fn validate_commit(hash: &str) -> Result<(), CoreError> {
    if (7..=40).contains(&hash.len()) && hash.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!("Invalid commit hash '{hash}'")))
    }
}

/// Parse `git log --pretty=format:%H|%an|%ae|%ad|%s` output.
pub fn parse_log(output: &str) -> Vec<CommitInfo> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.splitn(5, '|');
            Some(CommitInfo {
                hash: parts.next()?.trim().to_string(),
                author: parts.next()?.to_string(),
                email: parts.next()?.to_string(),
                date: parts.next()?.to_string(),
                message: parts.next()?.to_string(),
            })
        })
        .filter(|c| !c.hash.is_empty())
        .collect()
}

/// Branch names from `git branch -a --format=%(refname:short)`.
pub fn parse_branches(output: &str) -> Vec<String> {
    let mut names: Vec<String> = output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && *l != "origin" && !l.ends_with("/HEAD"))
        .map(|l| l.strip_prefix("origin/").unwrap_or(l).to_string())
        .collect();
    names.sort();
    names.dedup();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_lines_keep_pipes_in_subject() {
        let out = "abc123|Ann|ann@example.com|2025-01-02 10:00:00 +0000|fix: a | b\n\
                   def456|Bob|bob@example.com|2025-01-01 09:00:00 +0000|initial";
        let commits = parse_log(out);
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].hash, "abc123");
        assert_eq!(commits[0].message, "fix: a | b");
        assert_eq!(commits[1].author, "Bob");
        assert!(parse_log("").is_empty());
    }

    #[test]
    fn branches_merge_local_and_remote() {
        let out = "main\nfeature/x\norigin/HEAD\norigin/main\norigin/develop\norigin\n";
        assert_eq!(parse_branches(out), vec!["develop", "feature/x", "main"]);
    }

    #[test]
    fn branch_names_are_restricted() {
        assert!(validate_ref("main").is_ok());
        assert!(validate_ref("release/1.2").is_ok());
        assert!(validate_ref("--upload-pack=x").is_err());
        assert!(validate_ref("a..b").is_err());
        assert!(validate_ref("a b").is_err());
        assert!(validate_commit("abc1234").is_ok());
        assert!(validate_commit("HEAD~1").is_err());
    }

    #[test]
    fn webhook_url_is_under_api() {
        assert_eq!(
            webhook_url("https://panel.example.com/", 42),
            "https://panel.example.com/api/v1/git/webhook/42"
        );
    }
}
