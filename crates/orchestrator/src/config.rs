use std::path::PathBuf;
use std::time::Duration;

use hostwright_core::certificate::{DEFAULT_ALERT_DAYS, DEFAULT_RENEWAL_THRESHOLD_DAYS};
use hostwright_core::site::FailurePolicy;

/// Orchestration settings shared by the API and the worker.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Parent of every site's home directory.
    pub web_root: String,
    /// Directory nginx includes site configuration from.
    pub nginx_conf_dir: String,
    /// Days an archived site directory is kept before purging.
    pub archive_grace_days: i64,
    pub ssl_renewal_threshold_days: i64,
    pub ssl_alert_days: i64,
    pub failure_policy: FailurePolicy,
    /// Local directory completed backups are kept in.
    pub backup_dir: PathBuf,
    /// Scratch directory on managed hosts.
    pub remote_staging_dir: String,
    /// Upper bound for one remote command.
    pub command_timeout: Duration,
    /// Default per-job timeout for scheduled commands.
    pub cron_timeout_secs: i32,
    pub certbot_email: Option<String>,
    /// PHP-FPM version used for new PHP sites.
    pub php_version: String,
    /// Bench directory of the multi-tenant application tenant sites live in.
    pub tenant_bench_path: String,
    /// Seals the backup private key at rest.
    pub master_key: [u8; 32],
}

impl OrchestratorConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default                    |
    /// |------------------------------|----------------------------|
    /// | `WEB_ROOT`                   | `/var/www`                 |
    /// | `NGINX_CONF_DIR`             | `/etc/nginx/sites-enabled` |
    /// | `ARCHIVE_GRACE_DAYS`         | `30`                       |
    /// | `SSL_RENEWAL_THRESHOLD_DAYS` | `30`                       |
    /// | `SSL_ALERT_DAYS`             | `7`                        |
    /// | `PROVISION_FAILURE_POLICY`   | `repair`                   |
    /// | `BACKUP_DIR`                 | `/var/backups/hostwright`  |
    /// | `REMOTE_STAGING_DIR`         | `/var/tmp/hostwright`      |
    /// | `COMMAND_TIMEOUT_SECS`       | `900`                      |
    /// | `CRON_TIMEOUT_SECS`          | `300`                      |
    /// | `CERTBOT_EMAIL`              | unset                      |
    /// | `PHP_VERSION`                | `8.2`                      |
    /// | `TENANT_BENCH_PATH`          | `/home/frappe/frappe-bench`|
    /// | `MASTER_KEY`                 | required, 64 hex chars     |
    pub fn from_env() -> Self {
        let var = |key: &str, default: &str| std::env::var(key).unwrap_or_else(|_| default.into());

        let failure_policy = FailurePolicy::parse(&var("PROVISION_FAILURE_POLICY", "repair"))
            .expect("PROVISION_FAILURE_POLICY must be 'repair' or 'rollback'");

        let master_key = std::env::var("MASTER_KEY")
            .ok()
            .and_then(|hex| parse_master_key(&hex))
            .expect("MASTER_KEY must be set to 64 hex characters");

        Self {
            web_root: var("WEB_ROOT", "/var/www"),
            nginx_conf_dir: var("NGINX_CONF_DIR", "/etc/nginx/sites-enabled"),
            archive_grace_days: var("ARCHIVE_GRACE_DAYS", "30")
                .parse()
                .expect("ARCHIVE_GRACE_DAYS must be a valid i64"),
            ssl_renewal_threshold_days: var(
                "SSL_RENEWAL_THRESHOLD_DAYS",
                &DEFAULT_RENEWAL_THRESHOLD_DAYS.to_string(),
            )
            .parse()
            .expect("SSL_RENEWAL_THRESHOLD_DAYS must be a valid i64"),
            ssl_alert_days: var("SSL_ALERT_DAYS", &DEFAULT_ALERT_DAYS.to_string())
                .parse()
                .expect("SSL_ALERT_DAYS must be a valid i64"),
            failure_policy,
            backup_dir: PathBuf::from(var("BACKUP_DIR", "/var/backups/hostwright")),
            remote_staging_dir: var("REMOTE_STAGING_DIR", "/var/tmp/hostwright"),
            command_timeout: Duration::from_secs(
                var("COMMAND_TIMEOUT_SECS", "900")
                    .parse()
                    .expect("COMMAND_TIMEOUT_SECS must be a valid u64"),
            ),
            cron_timeout_secs: var("CRON_TIMEOUT_SECS", "300")
                .parse()
                .expect("CRON_TIMEOUT_SECS must be a valid i32"),
            certbot_email: std::env::var("CERTBOT_EMAIL").ok().filter(|v| !v.is_empty()),
            php_version: var("PHP_VERSION", "8.2"),
            tenant_bench_path: var("TENANT_BENCH_PATH", "/home/frappe/frappe-bench"),
            master_key,
        }
    }

    /// Root-owned directory archived site trees are moved into.
    pub fn archive_root(&self) -> String {
        format!("{}/_archived", self.web_root.trim_end_matches('/'))
    }
}

/// Decode a 32-byte key given as hex.
pub fn parse_master_key(hex: &str) -> Option<[u8; 32]> {
    hostwright_core::hex::decode(hex.trim())?.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_key_must_be_32_bytes() {
        let hex = "00".repeat(32);
        assert_eq!(parse_master_key(&hex), Some([0u8; 32]));
        assert_eq!(parse_master_key("abcd"), None);
        assert_eq!(parse_master_key(&"zz".repeat(32)), None);
    }
}
