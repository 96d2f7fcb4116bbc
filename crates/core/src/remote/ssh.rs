//! Transport that shells out to the system `ssh` and `scp` binaries.
//!
//! Always runs in batch mode so a missing key or unknown host fails fast
//! instead of prompting.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::subprocess::run_command;
use super::{CommandOutcome, HostTarget, RemoteError, RemoteExecutor, SSH_CONNECTION_FAILURE_EXIT};
use crate::shell::quote;

/// Upper bound for a single `scp` transfer.
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(6 * 3600);

/// Substrings of ssh/scp stderr that mean the session never started.
const CONNECTION_FAILURE_MARKERS: &[&str] = &[
    "Connection refused",
    "Connection timed out",
    "Operation timed out",
    "No route to host",
    "Network is unreachable",
    "Could not resolve hostname",
    "Connection closed by",
    "Connection reset by",
    "Host key verification failed",
    "Permission denied (publickey",
    "kex_exchange_identification",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKeyChecking {
    /// Trust on first use, then require a match.
    AcceptNew,
    /// Require the key to already be in known_hosts.
    Strict,
    /// Disable checking.
    Off,
}

impl HostKeyChecking {
    fn option_value(self) -> &'static str {
        match self {
            Self::AcceptNew => "accept-new",
            Self::Strict => "yes",
            Self::Off => "no",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "accept-new" | "accept_new" => Some(Self::AcceptNew),
            "yes" | "strict" => Some(Self::Strict),
            "no" | "off" => Some(Self::Off),
            _ => None,
        }
    }
}

/// SSH transport settings.
#[derive(Debug, Clone)]
pub struct SshConfig {
    pub connect_timeout_secs: u64,
    pub host_key_checking: HostKeyChecking,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            host_key_checking: HostKeyChecking::AcceptNew,
        }
    }
}

impl SshConfig {
    /// Load from environment variables with defaults.
    ///
    /// | Env Var                         | Default      |
    /// |---------------------------------|--------------|
    /// | `SSH_CONNECT_TIMEOUT_SECS`      | `10`         |
    /// | `SSH_STRICT_HOST_KEY_CHECKING`  | `accept-new` |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            connect_timeout_secs: std::env::var("SSH_CONNECT_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.connect_timeout_secs),
            host_key_checking: std::env::var("SSH_STRICT_HOST_KEY_CHECKING")
                .ok()
                .and_then(|v| HostKeyChecking::parse(&v))
                .unwrap_or(defaults.host_key_checking),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SshExecutor {
    config: SshConfig,
}

impl SshExecutor {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    /// Options shared by `ssh` and `scp`.
    fn common_options(&self, host: &HostTarget) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            format!("ConnectTimeout={}", self.config.connect_timeout_secs),
            "-o".to_string(),
            "ConnectionAttempts=1".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!(
                "StrictHostKeyChecking={}",
                self.config.host_key_checking.option_value()
            ),
        ];
        if self.config.host_key_checking == HostKeyChecking::Off {
            args.push("-o".into());
            args.push("UserKnownHostsFile=/dev/null".into());
        }
        if let Some(key) = &host.identity_file {
            args.push("-i".into());
            args.push(key.clone());
            args.push("-o".into());
            args.push("IdentitiesOnly=yes".into());
        }
        args
    }

    /// Full `ssh` argument list for running `command` on `host`.
    pub fn ssh_args(&self, host: &HostTarget, command: &str) -> Vec<String> {
        let mut args = vec!["-p".to_string(), host.port.to_string()];
        args.extend(self.common_options(host));
        args.push("--".into());
        args.push(host.destination());
        // ssh joins its trailing arguments with spaces, so pass one quoted word.
        args.push(format!("sh -c {}", quote(command)));
        args
    }

    fn scp_args(&self, host: &HostTarget, from: String, to: String) -> Vec<String> {
        let mut args = vec!["-q".to_string(), "-P".to_string(), host.port.to_string()];
        args.extend(self.common_options(host));
        args.push("--".into());
        args.push(from);
        args.push(to);
        args
    }

    async fn scp(&self, host: &HostTarget, args: Vec<String>) -> Result<(), RemoteError> {
        let mut cmd = Command::new("scp");
        cmd.args(&args);
        let outcome = run_command(&mut cmd, None, TRANSFER_TIMEOUT).await?;
        if outcome.success() {
            return Ok(());
        }
        if looks_like_connection_failure(&outcome.stderr) {
            return Err(RemoteError::Unreachable {
                host: host.name.clone(),
                message: outcome.stderr.trim().to_string(),
            });
        }
        Err(RemoteError::Transfer(if outcome.timed_out {
            "transfer timed out".to_string()
        } else {
            outcome.stderr.trim().to_string()
        }))
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn execute(
        &self,
        host: &HostTarget,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutcome, RemoteError> {
        let mut cmd = Command::new("ssh");
        cmd.args(self.ssh_args(host, command));
        let outcome = run_command(&mut cmd, None, timeout).await?;

        if outcome.exit_code == Some(SSH_CONNECTION_FAILURE_EXIT)
            && looks_like_connection_failure(&outcome.stderr)
        {
            return Err(RemoteError::Unreachable {
                host: host.name.clone(),
                message: outcome.stderr.trim().to_string(),
            });
        }
        Ok(outcome)
    }

    async fn upload(
        &self,
        host: &HostTarget,
        local: &Path,
        remote_path: &str,
    ) -> Result<(), RemoteError> {
        let to = format!("{}:{}", host.destination(), remote_path);
        let args = self.scp_args(host, local.display().to_string(), to);
        self.scp(host, args).await
    }

    async fn download(
        &self,
        host: &HostTarget,
        remote_path: &str,
        local: &Path,
    ) -> Result<(), RemoteError> {
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let from = format!("{}:{}", host.destination(), remote_path);
        let args = self.scp_args(host, from, local.display().to_string());
        self.scp(host, args).await
    }
}

/// Whether ssh/scp stderr indicates the connection itself failed.
pub fn looks_like_connection_failure(stderr: &str) -> bool {
    CONNECTION_FAILURE_MARKERS
        .iter()
        .any(|marker| stderr.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(identity: Option<&str>) -> HostTarget {
        HostTarget {
            name: "web1".into(),
            address: "203.0.113.7".into(),
            port: 2222,
            user: "deploy".into(),
            identity_file: identity.map(String::from),
        }
    }

    #[test]
    fn ssh_args_quote_the_script_as_one_word() {
        let exec = SshExecutor::default();
        let args = exec.ssh_args(&host(None), "echo 'hi there' && ls");
        assert_eq!(&args[..2], &["-p", "2222"]);
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.contains(&"StrictHostKeyChecking=accept-new".to_string()));
        let dest_idx = args.iter().position(|a| a == "deploy@203.0.113.7").unwrap();
        assert_eq!(args[dest_idx - 1], "--");
        assert_eq!(args.last().unwrap(), r"sh -c 'echo '\''hi there'\'' && ls'");
    }

    #[test]
    fn identity_file_forces_identities_only() {
        let exec = SshExecutor::default();
        let args = exec.ssh_args(&host(Some("/keys/id_ed25519")), "true");
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[i + 1], "/keys/id_ed25519");
        assert!(args.contains(&"IdentitiesOnly=yes".to_string()));
    }

    #[test]
    fn disabled_host_key_checking_skips_known_hosts() {
        let exec = SshExecutor::new(SshConfig {
            connect_timeout_secs: 3,
            host_key_checking: HostKeyChecking::Off,
        });
        let args = exec.ssh_args(&host(None), "true");
        assert!(args.contains(&"UserKnownHostsFile=/dev/null".to_string()));
        assert!(args.contains(&"ConnectTimeout=3".to_string()));
    }

    #[test]
    fn connection_failures_are_recognised() {
        assert!(looks_like_connection_failure(
            "ssh: connect to host 203.0.113.7 port 22: Connection refused"
        ));
        assert!(looks_like_connection_failure(
            "ssh: Could not resolve hostname nope: Name or service not known"
        ));
        assert!(!looks_like_connection_failure("bash: foo: command not found"));
    }

    #[test]
    fn host_key_checking_parses_aliases() {
        assert_eq!(HostKeyChecking::parse("strict"), Some(HostKeyChecking::Strict));
        assert_eq!(HostKeyChecking::parse("NO"), Some(HostKeyChecking::Off));
        assert_eq!(HostKeyChecking::parse("maybe"), None);
    }
}
