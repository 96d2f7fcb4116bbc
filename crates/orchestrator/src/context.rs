use std::path::Path;
use std::sync::Arc;

use hostwright_core::error::CoreError;
use hostwright_core::remote::{CommandOutcome, HostTarget, RemoteClient};
use hostwright_core::types::DbId;
use hostwright_db::models::server::HostingServer;
use hostwright_db::models::website::Website;
use hostwright_events::{EventBus, PlatformEvent};
use tokio::io::AsyncWriteExt;

use crate::config::OrchestratorConfig;
use crate::store::{ServerStore, Store, WebsiteStore};

/// Everything a manager needs, cheaply cloneable.
#[derive(Clone)]
pub struct Context {
    pub store: Arc<dyn Store>,
    pub remote: RemoteClient,
    pub config: Arc<OrchestratorConfig>,
    pub events: Arc<EventBus>,
}

impl Context {
    pub fn new(
        store: Arc<dyn Store>,
        remote: RemoteClient,
        config: Arc<OrchestratorConfig>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            remote,
            config,
            events,
        }
    }

    pub async fn website(&self, id: DbId) -> Result<Website, CoreError> {
        self.store
            .find_website(id)
            .await?
            .ok_or(CoreError::NotFound { entity: "Website", id })
    }

    pub async fn server(&self, id: DbId) -> Result<HostingServer, CoreError> {
        self.store
            .find_server(id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "HostingServer",
                id,
            })
    }

    /// Host a site lives on.
    pub async fn site_host(&self, website: &Website) -> Result<HostTarget, CoreError> {
        Ok(self.server(website.server_id).await?.target())
    }

    /// Run a command with the configured timeout, failing on non-zero exit.
    pub async fn exec(&self, host: &HostTarget, command: &str) -> Result<CommandOutcome, CoreError> {
        self.remote
            .run_checked(host, command, self.config.command_timeout)
            .await
    }

    /// Write `contents` to `remote_path` on the host via a local temp file.
    pub async fn write_file(&self, host: &HostTarget, remote_path: &str, contents: &str) -> Result<(), CoreError> {
        let tmp = tempfile::NamedTempFile::new()
            .map_err(|e| CoreError::Internal(format!("Failed to create temp file: {e}")))?;
        let mut file = tokio::fs::File::from_std(
            tmp.reopen()
                .map_err(|e| CoreError::Internal(format!("Failed to open temp file: {e}")))?,
        );
        file.write_all(contents.as_bytes())
            .await
            .map_err(|e| CoreError::Internal(format!("Failed to write temp file: {e}")))?;
        file.flush()
            .await
            .map_err(|e| CoreError::Internal(format!("Failed to write temp file: {e}")))?;

        if let Some(parent) = Path::new(remote_path).parent() {
            let dir = parent.to_string_lossy();
            self.exec(host, &format!("mkdir -p {}", hostwright_core::shell::quote(&dir)))
                .await?;
        }
        self.remote.upload(host, tmp.path(), remote_path).await
    }

    pub fn publish(&self, event: PlatformEvent) {
        self.events.publish(event);
    }
}
