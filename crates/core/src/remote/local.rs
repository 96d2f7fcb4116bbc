//! Transport that runs commands on the control host itself.
//!
//! Used for servers registered as `localhost` and in tests.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::subprocess::run_command;
use super::{CommandOutcome, HostTarget, RemoteError, RemoteExecutor};

#[derive(Debug, Clone, Default)]
pub struct LocalExecutor {
    env: Vec<(String, String)>,
    working_directory: Option<PathBuf>,
}

impl LocalExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an environment variable for every spawned command.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Run every command from `dir` instead of the process working directory.
    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }
}

#[async_trait]
impl RemoteExecutor for LocalExecutor {
    async fn execute(
        &self,
        _host: &HostTarget,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutcome, RemoteError> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &self.working_directory {
            cmd.current_dir(dir);
        }
        Ok(run_command(&mut cmd, None, timeout).await?)
    }

    async fn upload(
        &self,
        _host: &HostTarget,
        local: &Path,
        remote_path: &str,
    ) -> Result<(), RemoteError> {
        copy_file(local, Path::new(remote_path)).await
    }

    async fn download(
        &self,
        _host: &HostTarget,
        remote_path: &str,
        local: &Path,
    ) -> Result<(), RemoteError> {
        copy_file(Path::new(remote_path), local).await
    }
}

async fn copy_file(from: &Path, to: &Path) -> Result<(), RemoteError> {
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::copy(from, to)
        .await
        .map_err(|e| RemoteError::Transfer(format!("{} -> {}: {e}", from.display(), to.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn localhost() -> HostTarget {
        HostTarget {
            name: "local".into(),
            address: "localhost".into(),
            port: 22,
            user: "root".into(),
            identity_file: None,
        }
    }

    #[tokio::test]
    async fn runs_shell_with_extra_env() {
        let exec = LocalExecutor::new().with_env("HW_GREETING", "hi");
        let out = exec
            .execute(&localhost(), "echo $HW_GREETING", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "hi");
        assert!(out.success());
    }

    #[tokio::test]
    async fn upload_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.txt");
        tokio::fs::write(&src, b"payload").await.unwrap();
        let dest = dir.path().join("nested/deeper/b.txt");

        LocalExecutor::new()
            .upload(&localhost(), &src, dest.to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn download_of_missing_file_is_transfer_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = LocalExecutor::new()
            .download(&localhost(), "/nonexistent/file", &dir.path().join("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Transfer(_)));
    }
}
