//! Remote execution against managed hosts.
//!
//! [`RemoteExecutor`] is the transport seam (SSH or the local shell).
//! [`RemoteClient`] wraps a transport with connection retries, per-host
//! serialization of mutating work, and redacted command logging. Callers
//! get a [`CommandOutcome`] for every command that actually ran; only an
//! unreachable host surfaces as an error.

pub mod local;
pub mod redact;
pub mod retry;
pub mod ssh;
pub mod subprocess;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;

use crate::error::CoreError;
use crate::locks::KeyedLocks;

pub use local::LocalExecutor;
pub use retry::RetryPolicy;
pub use ssh::{SshConfig, SshExecutor};

/// Exit code `ssh` itself uses for connection-level failures.
pub const SSH_CONNECTION_FAILURE_EXIT: i32 = 255;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Connection details for a managed host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostTarget {
    /// Stable name, used as the per-host lock key and in logs.
    pub name: String,
    /// Hostname or IP address.
    pub address: String,
    pub port: u16,
    pub user: String,
    /// Private key file for key-based authentication.
    pub identity_file: Option<String>,
}

impl HostTarget {
    /// `user@address` destination string for ssh/scp.
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.address)
    }
}

/// Result of a command that ran to completion or was killed on timeout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandOutcome {
    /// Process exit code. `None` when killed by a signal or on timeout.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub timed_out: bool,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }

    /// Convert a non-zero exit into [`CoreError::Command`].
    ///
    /// `command` should already be redacted.
    pub fn check(self, command: &str) -> Result<Self, CoreError> {
        if self.success() {
            return Ok(self);
        }
        let stderr = if self.timed_out {
            format!("timed out after {} ms", self.duration_ms)
        } else if self.stderr.trim().is_empty() {
            self.stdout.trim().to_string()
        } else {
            self.stderr.trim().to_string()
        };
        Err(CoreError::Command {
            command: command.to_string(),
            exit_code: self.exit_code,
            stderr,
        })
    }

    /// Stdout followed by stderr, for storing as a job's output.
    pub fn combined_output(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }
}

/// Transport-level failure: the command never got to run.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("cannot reach {host}: {message}")]
    Unreachable { host: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file transfer failed: {0}")]
    Transfer(String),
}

impl RemoteError {
    pub fn is_connection(&self) -> bool {
        matches!(self, RemoteError::Unreachable { .. })
    }
}

// ---------------------------------------------------------------------------
// Transport trait
// ---------------------------------------------------------------------------

/// A way of running shell commands and moving files on a host.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run `command` through `sh -c` on `host`, killing it after `timeout`.
    async fn execute(
        &self,
        host: &HostTarget,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutcome, RemoteError>;

    /// Copy a local file to `remote_path` on the host.
    async fn upload(&self, host: &HostTarget, local: &Path, remote_path: &str)
        -> Result<(), RemoteError>;

    /// Copy `remote_path` on the host to a local file.
    async fn download(
        &self,
        host: &HostTarget,
        remote_path: &str,
        local: &Path,
    ) -> Result<(), RemoteError>;
}

// ---------------------------------------------------------------------------
// RemoteClient
// ---------------------------------------------------------------------------

/// Retrying, logging front-end over a [`RemoteExecutor`].
#[derive(Clone)]
pub struct RemoteClient {
    executor: Arc<dyn RemoteExecutor>,
    retry: RetryPolicy,
    host_locks: KeyedLocks,
}

impl RemoteClient {
    pub fn new(executor: Arc<dyn RemoteExecutor>, retry: RetryPolicy) -> Self {
        Self {
            executor,
            retry,
            host_locks: KeyedLocks::default(),
        }
    }

    /// Acquire the host's mutex. Hold the guard across a sequence of
    /// commands that rewrite configuration and reload services.
    pub async fn lock_host(&self, host: &HostTarget) -> OwnedMutexGuard<()> {
        self.host_locks.lock(&host.name).await
    }

    /// Run a command, retrying only when the host cannot be reached.
    ///
    /// A non-zero exit is returned as a normal [`CommandOutcome`].
    pub async fn run(
        &self,
        host: &HostTarget,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutcome, CoreError> {
        let redacted = redact::redact(command);
        let mut attempt = 0u32;

        loop {
            match self.executor.execute(host, command, timeout).await {
                Ok(outcome) => {
                    if outcome.success() {
                        tracing::info!(
                            host = %host.name,
                            command = %redacted,
                            duration_ms = outcome.duration_ms,
                            "Remote command succeeded",
                        );
                    } else {
                        tracing::warn!(
                            host = %host.name,
                            command = %redacted,
                            exit_code = ?outcome.exit_code,
                            timed_out = outcome.timed_out,
                            stderr = %redact::redact(outcome.stderr.trim()),
                            "Remote command failed",
                        );
                    }
                    return Ok(outcome);
                }
                Err(e) if e.is_connection() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        host = %host.name,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Host unreachable, retrying",
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(host = %host.name, command = %redacted, error = %e, "Remote command could not run");
                    return Err(connection_error(host, e));
                }
            }
        }
    }

    /// Run a command and turn a non-zero exit into [`CoreError::Command`].
    pub async fn run_checked(
        &self,
        host: &HostTarget,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutcome, CoreError> {
        self.run(host, command, timeout)
            .await?
            .check(&redact::redact(command))
    }

    /// Run a mutating command while holding the host's mutex.
    pub async fn run_exclusive(
        &self,
        host: &HostTarget,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutcome, CoreError> {
        let _guard = self.lock_host(host).await;
        self.run_checked(host, command, timeout).await
    }

    /// Upload a file, retrying connection failures.
    pub async fn upload(
        &self,
        host: &HostTarget,
        local: &Path,
        remote_path: &str,
    ) -> Result<(), CoreError> {
        let mut attempt = 0u32;
        loop {
            match self.executor.upload(host, local, remote_path).await {
                Ok(()) => {
                    tracing::info!(host = %host.name, remote_path, "Uploaded file");
                    return Ok(());
                }
                Err(e) if e.is_connection() && attempt < self.retry.max_retries => {
                    tokio::time::sleep(self.retry.delay_for(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(connection_error(host, e)),
            }
        }
    }

    /// Download a file, retrying connection failures.
    pub async fn download(
        &self,
        host: &HostTarget,
        remote_path: &str,
        local: &Path,
    ) -> Result<(), CoreError> {
        let mut attempt = 0u32;
        loop {
            match self.executor.download(host, remote_path, local).await {
                Ok(()) => {
                    tracing::info!(host = %host.name, remote_path, "Downloaded file");
                    return Ok(());
                }
                Err(e) if e.is_connection() && attempt < self.retry.max_retries => {
                    tokio::time::sleep(self.retry.delay_for(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(connection_error(host, e)),
            }
        }
    }

    /// Cheap reachability probe.
    pub async fn test_connection(&self, host: &HostTarget) -> Result<(), CoreError> {
        self.run_checked(host, "echo ok", Duration::from_secs(30))
            .await
            .map(|_| ())
    }
}

fn connection_error(host: &HostTarget, err: RemoteError) -> CoreError {
    match err {
        RemoteError::Unreachable { message, .. } => CoreError::Connection {
            host: host.name.clone(),
            message,
        },
        other => CoreError::Connection {
            host: host.name.clone(),
            message: redact::redact(&other.to_string()),
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
