//! Service installation, health checks and server placement.

use hostwright_core::error::CoreError;
use hostwright_core::metrics::{self, HostMetrics};
use hostwright_core::shell::quote;
use hostwright_core::types::DbId;
use hostwright_db::models::server::{HealthSample, HostingServer};
use hostwright_db::models::status::ServerHealth;
use hostwright_events::bus::SERVER_UNHEALTHY;
use hostwright_events::PlatformEvent;

use crate::context::Context;
use crate::store::ServerStore;

/// PHP-FPM versions the installer knows how to set up.
pub const SUPPORTED_PHP_VERSIONS: &[&str] = &["8.1", "8.2", "8.3"];

const INVENTORY_PREFIX: &str = "INSTALLED:";

/// Idempotent installer: only missing packages are installed, and every
/// service present at the end is reported on an `INSTALLED:<name>` line.
const INSTALL_SCRIPT: &str = r#"#!/usr/bin/env bash
set -euo pipefail
export DEBIAN_FRONTEND=noninteractive
PHP_VERSION="${1:-8.2}"
UPDATED=0

have_pkg() {
    dpkg-query -W -f='${Status}' "$1" 2>/dev/null | grep -q "install ok installed"
}

ensure_pkg() {
    local name="$1"
    shift
    local missing=()
    for pkg in "$@"; do
        have_pkg "$pkg" || missing+=("$pkg")
    done
    if [ "${#missing[@]}" -gt 0 ]; then
        if [ "$UPDATED" -eq 0 ]; then
            apt-get update -qq
            UPDATED=1
        fi
        apt-get install -y -qq "${missing[@]}"
    fi
    echo "INSTALLED:$name"
}

ensure_service() {
    systemctl enable --now "$1" >/dev/null 2>&1 || true
}

ensure_pkg nginx nginx
ensure_service nginx

ensure_pkg mariadb mariadb-server mariadb-client
ensure_service mariadb

ensure_pkg "php${PHP_VERSION}-fpm" "php${PHP_VERSION}-fpm" "php${PHP_VERSION}-mysql" \
    "php${PHP_VERSION}-curl" "php${PHP_VERSION}-gd" "php${PHP_VERSION}-mbstring" \
    "php${PHP_VERSION}-xml" "php${PHP_VERSION}-zip"
ensure_service "php${PHP_VERSION}-fpm"

ensure_pkg certbot certbot

ensure_pkg exim4 exim4
ensure_service exim4
ensure_pkg dovecot dovecot-imapd dovecot-pop3d
ensure_service dovecot

ensure_pkg fail2ban fail2ban
ensure_service fail2ban

if ! command -v wp >/dev/null 2>&1; then
    curl -fsSL -o /usr/local/bin/wp https://raw.githubusercontent.com/wp-cli/builds/gh-pages/phar/wp-cli.phar
    chmod +x /usr/local/bin/wp
fi
echo "INSTALLED:wp-cli"
"#;

/// Service names reported by the installer, in output order.
pub fn parse_inventory(output: &str) -> Vec<String> {
    let mut services: Vec<String> = Vec::new();
    for line in output.lines() {
        if let Some(name) = line.trim().strip_prefix(INVENTORY_PREFIX) {
            let name = name.trim();
            if !name.is_empty() && !services.iter().any(|s| s == name) {
                services.push(name.to_string());
            }
        }
    }
    services
}

#[derive(Clone)]
pub struct ServerManager {
    ctx: Context,
}

impl ServerManager {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Install missing services and record the resulting inventory.
    pub async fn provision_server(&self, server_id: DbId) -> Result<Vec<String>, CoreError> {
        let server = self.ctx.server(server_id).await?;
        let php = &self.ctx.config.php_version;
        if !SUPPORTED_PHP_VERSIONS.contains(&php.as_str()) {
            return Err(CoreError::Validation(format!(
                "Unsupported PHP version '{php}', expected one of {}",
                SUPPORTED_PHP_VERSIONS.join(", ")
            )));
        }

        tracing::info!(server = %server.name, "Provisioning server");
        match self.install(&server, php).await {
            Ok(services) => {
                self.ctx.store.set_server_inventory(server.id, &services).await?;
                tracing::info!(server = %server.name, services = ?services, "Server provisioned");
                Ok(services)
            }
            Err(e) => {
                tracing::error!(server = %server.name, error = %e, "Server provisioning failed");
                self.ctx.store.set_server_error(server.id, &e.to_string()).await?;
                Err(e)
            }
        }
    }

    async fn install(&self, server: &HostingServer, php: &str) -> Result<Vec<String>, CoreError> {
        let host = server.target();
        let script = format!(
            "{}/install-services.sh",
            self.ctx.config.remote_staging_dir.trim_end_matches('/')
        );
        self.ctx.write_file(&host, &script, INSTALL_SCRIPT).await?;
        let outcome = self
            .ctx
            .remote
            .run_exclusive(
                &host,
                &format!("bash {} {}", quote(&script), quote(php)),
                self.ctx.config.command_timeout,
            )
            .await?;
        Ok(parse_inventory(&outcome.stdout))
    }

    /// Sample host metrics and persist the resulting health.
    pub async fn check_health(&self, server_id: DbId) -> Result<HealthSample, CoreError> {
        let server = self.ctx.server(server_id).await?;
        let sample = match self.sample(&server).await {
            Ok(m) => HealthSample {
                health: if m.is_healthy() {
                    ServerHealth::Healthy
                } else {
                    ServerHealth::Unhealthy
                },
                error: (!m.is_healthy()).then(|| {
                    format!(
                        "Resource usage too high: memory {:.0}%, disk {:.0}%",
                        m.memory_percent(),
                        m.disk_percent()
                    )
                }),
                metrics: Some(m),
            },
            Err(e) => HealthSample {
                health: ServerHealth::Unhealthy,
                metrics: None,
                error: Some(e.to_string()),
            },
        };

        self.ctx.store.record_server_health(server.id, &sample).await?;
        if sample.health == ServerHealth::Unhealthy {
            tracing::warn!(server = %server.name, error = ?sample.error, "Server unhealthy");
            self.ctx.publish(
                PlatformEvent::new(SERVER_UNHEALTHY)
                    .with_source("hosting_server", server.id)
                    .with_payload(serde_json::json!({
                        "server": server.name,
                        "error": sample.error,
                    })),
            );
        }
        Ok(sample)
    }

    async fn sample(&self, server: &HostingServer) -> Result<HostMetrics, CoreError> {
        let outcome = self.ctx.exec(&server.target(), metrics::HEALTH_COMMAND).await?;
        metrics::parse_health(&outcome.stdout)
    }

    /// Health-check every enabled server; failures are logged, not returned.
    pub async fn check_all(&self) -> Result<usize, CoreError> {
        let servers = self.ctx.store.list_servers().await?;
        let mut checked = 0;
        for server in servers.into_iter().filter(|s| s.is_enabled) {
            match self.check_health(server.id).await {
                Ok(_) => checked += 1,
                Err(e) => tracing::error!(server = %server.name, error = %e, "Health check failed"),
            }
        }
        Ok(checked)
    }

    /// Least-loaded enabled, healthy server with spare capacity.
    pub async fn select_server(&self) -> Result<HostingServer, CoreError> {
        self.ctx
            .store
            .servers_with_capacity()
            .await?
            .into_iter()
            .next()
            .map(|(server, _)| server)
            .ok_or_else(|| CoreError::Validation("No healthy server has free capacity".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inventory_lines_are_deduplicated() {
        let out = "Reading package lists...\nINSTALLED:nginx\nINSTALLED:mariadb\n  INSTALLED:nginx\nINSTALLED:\nINSTALLED:wp-cli\n";
        assert_eq!(parse_inventory(out), vec!["nginx", "mariadb", "wp-cli"]);
    }

    #[test]
    fn script_reports_every_service() {
        for name in ["nginx", "mariadb", "certbot", "exim4", "dovecot", "fail2ban", "wp-cli"] {
            assert!(INSTALL_SCRIPT.contains(name), "{name} missing from installer");
        }
        assert!(INSTALL_SCRIPT.contains("INSTALLED:$name"));
    }
}
