//! Transport selection for registered servers.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use hostwright_core::remote::{
    CommandOutcome, HostTarget, LocalExecutor, RemoteError, RemoteExecutor, SshConfig, SshExecutor,
};

/// Runs commands for loopback hosts in the local shell and everything
/// else over ssh.
pub struct HostExecutor {
    ssh: SshExecutor,
    local: LocalExecutor,
}

impl HostExecutor {
    pub fn new(ssh: SshConfig) -> Self {
        Self {
            ssh: SshExecutor::new(ssh),
            local: LocalExecutor::new(),
        }
    }

    fn pick(&self, host: &HostTarget) -> &dyn RemoteExecutor {
        if is_loopback(&host.address) {
            &self.local
        } else {
            &self.ssh
        }
    }
}

/// Whether a server address refers to the control host itself.
pub fn is_loopback(address: &str) -> bool {
    matches!(address.trim(), "localhost" | "127.0.0.1" | "::1")
}

#[async_trait]
impl RemoteExecutor for HostExecutor {
    async fn execute(
        &self,
        host: &HostTarget,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutcome, RemoteError> {
        self.pick(host).execute(host, command, timeout).await
    }

    async fn upload(&self, host: &HostTarget, local: &Path, remote_path: &str) -> Result<(), RemoteError> {
        self.pick(host).upload(host, local, remote_path).await
    }

    async fn download(&self, host: &HostTarget, remote_path: &str, local: &Path) -> Result<(), RemoteError> {
        self.pick(host).download(host, remote_path, local).await
    }
}
