#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hostwright_core::remote::{
    CommandOutcome, HostTarget, LocalExecutor, RemoteClient, RemoteError, RemoteExecutor, RetryPolicy,
};
use hostwright_core::site::{FailurePolicy, SiteKind};
use hostwright_db::models::server::HostingServer;
use hostwright_db::models::status::WebsiteStatus;
use hostwright_db::models::website::Website;
use hostwright_events::EventBus;
use hostwright_orchestrator::sites::{CreateSite, SiteManager};
use hostwright_orchestrator::store::{MemoryStore, Store};
use hostwright_orchestrator::{Context, OrchestratorConfig};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Scripted executor
// ---------------------------------------------------------------------------

/// Records every command and answers from a list of substring rules.
/// Commands matching no rule succeed with empty output.
#[derive(Default)]
pub struct FakeExecutor {
    rules: Mutex<Vec<(String, CommandOutcome)>>,
    commands: Mutex<Vec<String>>,
    uploads: Mutex<Vec<(String, String)>>,
}

impl FakeExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Commands containing `needle` exit 1 with `stderr`.
    pub fn fail_on(&self, needle: &str, stderr: &str) {
        self.rules.lock().unwrap().push((
            needle.to_string(),
            CommandOutcome {
                exit_code: Some(1),
                stderr: stderr.to_string(),
                ..Default::default()
            },
        ));
    }

    /// Commands containing `needle` succeed printing `stdout`.
    pub fn respond(&self, needle: &str, stdout: &str) {
        self.rules.lock().unwrap().push((
            needle.to_string(),
            CommandOutcome {
                exit_code: Some(0),
                stdout: stdout.to_string(),
                ..Default::default()
            },
        ));
    }

    pub fn clear_rules(&self) {
        self.rules.lock().unwrap().clear();
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn clear_commands(&self) {
        self.commands.lock().unwrap().clear();
    }

    pub fn ran(&self, needle: &str) -> bool {
        self.commands().iter().any(|c| c.contains(needle))
    }

    pub fn count(&self, needle: &str) -> usize {
        self.commands().iter().filter(|c| c.contains(needle)).count()
    }

    /// `(remote_path, contents)` of every uploaded file.
    pub fn uploads(&self) -> Vec<(String, String)> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteExecutor for FakeExecutor {
    async fn execute(
        &self,
        _host: &HostTarget,
        command: &str,
        _timeout: Duration,
    ) -> Result<CommandOutcome, RemoteError> {
        self.commands.lock().unwrap().push(command.to_string());
        let rules = self.rules.lock().unwrap();
        let outcome = rules
            .iter()
            .find(|(needle, _)| command.contains(needle.as_str()))
            .map(|(_, outcome)| outcome.clone())
            .unwrap_or(CommandOutcome {
                exit_code: Some(0),
                ..Default::default()
            });
        Ok(outcome)
    }

    async fn upload(&self, _host: &HostTarget, local: &Path, remote_path: &str) -> Result<(), RemoteError> {
        let contents = tokio::fs::read_to_string(local).await.unwrap_or_default();
        self.uploads
            .lock()
            .unwrap()
            .push((remote_path.to_string(), contents));
        Ok(())
    }

    async fn download(&self, _host: &HostTarget, _remote_path: &str, local: &Path) -> Result<(), RemoteError> {
        tokio::fs::write(local, b"artifact").await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub ctx: Context,
    pub store: Arc<MemoryStore>,
    pub events: Arc<EventBus>,
    pub server: HostingServer,
    pub dir: TempDir,
}

impl Harness {
    pub fn sites(&self) -> SiteManager {
        SiteManager::new(self.ctx.clone())
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    /// Register a site on the harness server.
    pub async fn create_site(&self, domain: &str, kind: SiteKind, client_id: Option<i64>) -> Website {
        self.sites()
            .create(CreateSite {
                domain: domain.to_string(),
                kind,
                client_id,
                server_id: Some(self.server.id),
                db_engine: None,
                db_name: None,
                db_user: None,
                tenant_apps: vec![],
                admin_email: None,
            })
            .await
            .unwrap()
    }

    /// A site already in `Active`, without touching the executor.
    pub async fn active_site(&self, domain: &str, kind: SiteKind) -> Website {
        let site = self.create_site(domain, kind, None).await;
        self.store.update_website(site.id, |w| {
            w.status_id = WebsiteStatus::Active.id();
            w.provision_step = Some("done".into());
        });
        self.ctx.website(site.id).await.unwrap()
    }
}

pub fn config(dir: &Path, policy: FailurePolicy) -> OrchestratorConfig {
    OrchestratorConfig {
        web_root: dir.join("www").to_string_lossy().into_owned(),
        nginx_conf_dir: dir.join("nginx").to_string_lossy().into_owned(),
        archive_grace_days: 30,
        ssl_renewal_threshold_days: 30,
        ssl_alert_days: 7,
        failure_policy: policy,
        backup_dir: dir.join("backups"),
        remote_staging_dir: dir.join("staging").to_string_lossy().into_owned(),
        command_timeout: Duration::from_secs(60),
        cron_timeout_secs: 300,
        certbot_email: None,
        php_version: "8.2".into(),
        tenant_bench_path: "/home/frappe/frappe-bench".into(),
        master_key: [7u8; 32],
    }
}

pub fn harness_with(executor: Arc<dyn RemoteExecutor>, policy: FailurePolicy) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let server = store.add_server("web1", "203.0.113.10", false);
    let events = Arc::new(EventBus::new(256));
    let ctx = Context::new(
        store.clone() as Arc<dyn Store>,
        RemoteClient::new(executor, RetryPolicy::none()),
        Arc::new(config(dir.path(), policy)),
        events.clone(),
    );
    Harness {
        ctx,
        store,
        events,
        server,
        dir,
    }
}

pub fn harness(executor: Arc<FakeExecutor>) -> Harness {
    harness_with(executor, FailurePolicy::RepairInPlace)
}

// ---------------------------------------------------------------------------
// Local shell with stand-in service binaries
// ---------------------------------------------------------------------------

/// Write an executable shell script.
pub fn write_script(path: &Path, body: &str) {
    use std::os::unix::fs::PermissionsExt;
    std::fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// A [`LocalExecutor`] whose `PATH` starts with stand-ins for `mysql`,
/// `mysqldump`, `nginx` and `systemctl`. Databases are files under
/// `{dir}/db/{name}.sql`.
pub fn local_executor(dir: &Path) -> LocalExecutor {
    let bin = dir.join("bin");
    let db = dir.join("db");
    std::fs::create_dir_all(&bin).unwrap();
    std::fs::create_dir_all(&db).unwrap();

    // mysqldump [options] <db>: the last argument names the database.
    write_script(
        &bin.join("mysqldump"),
        &format!("for a in \"$@\"; do name=\"$a\"; done\ncat \"{}/$name.sql\"", db.display()),
    );
    // mysql <db> < dump  |  mysql -e <sql>
    write_script(
        &bin.join("mysql"),
        &format!(
            "if [ \"$1\" = \"-e\" ]; then exit 0; fi\ncat > \"{}/$1.sql\"",
            db.display()
        ),
    );
    write_script(&bin.join("nginx"), "exit 0");
    write_script(&bin.join("systemctl"), "exit 0");

    let path = format!("{}:{}", bin.display(), std::env::var("PATH").unwrap_or_default());
    LocalExecutor::new().with_env("PATH", path)
}
