mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use common::{harness, harness_with, FakeExecutor};
use hostwright_core::error::CoreError;
use hostwright_core::site::{FailurePolicy, SiteKind, TENANT_ENTITLEMENT};
use hostwright_db::models::operation::NewOperation;
use hostwright_db::models::status::WebsiteStatus;
use hostwright_events::bus::{SITE_DEPROVISIONED, SITE_PROVISIONED, SITE_PROVISION_FAILED};
use hostwright_orchestrator::store::OperationStore;
use hostwright_orchestrator::{Checkpoint, Context};

const RELOAD: &str = "systemctl reload nginx";

#[tokio::test]
async fn provisions_a_static_site() {
    let exec = FakeExecutor::new();
    let h = harness(exec.clone());
    let mut events = h.events.subscribe();
    let site = h.create_site("shop.example.com", SiteKind::Static, None).await;
    assert_eq!(site.status(), WebsiteStatus::Pending);

    let site = h.sites().provision(site.id, &Checkpoint::none()).await.unwrap();

    assert_eq!(site.status(), WebsiteStatus::Active);
    assert_eq!(site.provision_step.as_deref(), Some("done"));
    assert!(exec.ran("useradd"));
    assert!(exec.ran(RELOAD));
    assert!(!exec.ran("CREATE DATABASE"));
    assert!(exec
        .uploads()
        .iter()
        .any(|(path, body)| path.ends_with("shop.example.com.conf") && body.contains("server_name shop.example.com")));
    assert_eq!(events.recv().await.unwrap().event_type, SITE_PROVISIONED);
}

#[tokio::test]
async fn database_failure_never_reaches_reload_when_repairing() {
    let exec = FakeExecutor::new();
    exec.fail_on("CREATE DATABASE", "ERROR 1045: Access denied");
    let h = harness(exec.clone());
    let mut events = h.events.subscribe();
    let site = h.create_site("blog.example.com", SiteKind::Cms, None).await;

    let err = h.sites().provision(site.id, &Checkpoint::none()).await.unwrap_err();
    assert_matches!(err, CoreError::Command { .. });

    let site = h.ctx.website(site.id).await.unwrap();
    assert_eq!(site.status(), WebsiteStatus::Error);
    assert_eq!(site.provision_step.as_deref(), Some("write_server_block"));
    assert!(site.last_error.unwrap().contains("Access denied"));
    assert!(!exec.ran(RELOAD));
    assert!(!exec.ran("wp --path"));

    let event = events.recv().await.unwrap();
    assert_eq!(event.event_type, SITE_PROVISION_FAILED);
    assert_eq!(event.payload["step"], "create_database");
}

#[tokio::test]
async fn database_failure_rolls_back_completed_steps() {
    let exec = FakeExecutor::new();
    exec.fail_on("CREATE DATABASE", "ERROR 1045: Access denied");
    let h = harness_with(exec.clone(), FailurePolicy::Rollback);
    let site = h.create_site("blog.example.com", SiteKind::Cms, None).await;

    h.sites().provision(site.id, &Checkpoint::none()).await.unwrap_err();

    let after = h.ctx.website(site.id).await.unwrap();
    assert_eq!(after.status(), WebsiteStatus::Pending);
    assert!(after.provision_step.is_none());
    assert!(!exec.ran(RELOAD));

    let commands = exec.commands();
    let conf_removed = commands
        .iter()
        .position(|c| c.starts_with("rm -f") && c.contains("blog.example.com.conf"))
        .expect("server block removed");
    let dir_removed = commands
        .iter()
        .position(|c| c.starts_with("rm -rf") && c.contains(&site.site_path))
        .expect("site directory removed");
    assert!(conf_removed < dir_removed, "undo runs in reverse order");
}

#[tokio::test]
async fn failed_reload_resumes_without_redoing_earlier_steps() {
    let exec = FakeExecutor::new();
    exec.fail_on(RELOAD, "nginx: configuration test failed");
    let h = harness(exec.clone());
    let site = h.create_site("blog.example.com", SiteKind::Cms, None).await;

    h.sites().provision(site.id, &Checkpoint::none()).await.unwrap_err();
    let stalled = h.ctx.website(site.id).await.unwrap();
    assert_eq!(stalled.status(), WebsiteStatus::Provisioning);
    assert_eq!(stalled.provision_step.as_deref(), Some("post_provision"));
    assert!(exec.ran("CREATE DATABASE"));

    exec.clear_rules();
    exec.clear_commands();
    let site = h.sites().provision(site.id, &Checkpoint::none()).await.unwrap();

    assert_eq!(site.status(), WebsiteStatus::Active);
    assert!(!exec.ran("CREATE DATABASE"));
    assert!(!exec.ran("useradd"));
    assert_eq!(exec.count(RELOAD), 1);
}

#[tokio::test]
async fn tenant_without_entitlement_touches_nothing() {
    let exec = FakeExecutor::new();
    let h = harness(exec.clone());
    let client = h.store.add_client("Acme", 10, &[]);
    let site = h.create_site("acme.example.com", SiteKind::Tenant, Some(client.id)).await;

    let err = h.sites().provision(site.id, &Checkpoint::none()).await.unwrap_err();

    assert_matches!(err, CoreError::Entitlement(msg) if msg.contains(TENANT_ENTITLEMENT));
    assert!(exec.commands().is_empty());
    assert!(exec.uploads().is_empty());
}

#[tokio::test]
async fn entitled_tenant_runs_bench() {
    let exec = FakeExecutor::new();
    let h = harness(exec.clone());
    let client = h.store.add_client("Acme", 10, &[TENANT_ENTITLEMENT]);
    let site = h.create_site("acme.example.com", SiteKind::Tenant, Some(client.id)).await;
    assert_eq!(site.db_name, site.db_user);

    let site = h.sites().provision(site.id, &Checkpoint::none()).await.unwrap();

    assert_eq!(site.status(), WebsiteStatus::Active);
    assert!(exec.ran("bench new-site"));
    assert!(exec.ran("set-config app_role tenant"));
}

#[tokio::test]
async fn transitional_sites_reject_new_work() {
    let h = harness(FakeExecutor::new());
    let site = h.create_site("busy.example.com", SiteKind::Static, None).await;
    h.store
        .update_website(site.id, |w| w.status_id = WebsiteStatus::Deprovisioning.id());

    assert_matches!(
        h.sites().provision(site.id, &Checkpoint::none()).await,
        Err(CoreError::Conflict(_))
    );
    assert_matches!(h.sites().suspend(site.id).await, Err(CoreError::Conflict(_)));
}

#[tokio::test]
async fn cancel_between_steps_returns_site_to_pending() {
    let exec = FakeExecutor::new();
    let h = harness(exec.clone());
    let site = h.create_site("slow.example.com", SiteKind::Static, None).await;

    let job = h
        .store
        .enqueue_operation(&NewOperation {
            kind: "provision_site".into(),
            resource_key: format!("site:{}", site.id),
            params: serde_json::json!({}),
        })
        .await
        .unwrap();
    h.store.claim_next_operation().await.unwrap();
    h.store.cancel_operation(job.id).await.unwrap();

    let checkpoint = Checkpoint::for_job(h.ctx.store.clone(), job.id);
    let err = h.sites().provision(site.id, &checkpoint).await.unwrap_err();

    assert_matches!(err, CoreError::Cancelled(_));
    let site = h.ctx.website(site.id).await.unwrap();
    assert_eq!(site.status(), WebsiteStatus::Pending);
    assert_eq!(
        site.last_error.as_deref(),
        Some("Provisioning cancelled before pre_provision")
    );
    assert!(exec.commands().is_empty());
}

#[tokio::test]
async fn suspend_and_unsuspend_swap_the_server_block() {
    let exec = FakeExecutor::new();
    let h = harness(exec.clone());
    let site = h.active_site("shop.example.com", SiteKind::Static).await;

    let suspended = h.sites().suspend(site.id).await.unwrap();
    assert_eq!(suspended.status(), WebsiteStatus::Suspended);
    assert!(exec.uploads().last().unwrap().1.contains("Site suspended"));

    assert_matches!(h.sites().suspend(site.id).await, Err(CoreError::Conflict(_)));

    let live = h.sites().unsuspend(site.id).await.unwrap();
    assert_eq!(live.status(), WebsiteStatus::Active);
    assert!(!exec.uploads().last().unwrap().1.contains("Site suspended"));
    assert_eq!(exec.count(RELOAD), 2);
}

#[tokio::test]
async fn deprovision_archives_and_returns_to_pending() {
    let exec = FakeExecutor::new();
    let h = harness(exec.clone());
    let mut events = h.events.subscribe();
    let site = h.active_site("blog.example.com", SiteKind::Cms).await;

    let archive = h.sites().deprovision(site.id, &Checkpoint::none()).await.unwrap();

    assert!(archive
        .archive_path
        .starts_with(&format!("{}/blog.example.com_", h.ctx.config.archive_root())));
    assert!(archive.purge_after > chrono::Utc::now() + chrono::Duration::days(29));
    assert_eq!(h.store.archives().len(), 1);

    let commands = exec.commands();
    let dump = commands.iter().position(|c| c.contains("mysqldump")).unwrap();
    let drop = commands.iter().position(|c| c.contains("DROP DATABASE")).unwrap();
    assert!(dump < drop, "database is dumped before it is dropped");
    assert!(exec.ran(RELOAD));

    let site = h.ctx.website(site.id).await.unwrap();
    assert_eq!(site.status(), WebsiteStatus::Pending);
    assert!(site.provision_step.is_none());
    assert_eq!(events.recv().await.unwrap().event_type, SITE_DEPROVISIONED);

    assert_matches!(
        h.sites().deprovision(site.id, &Checkpoint::none()).await,
        Err(CoreError::Conflict(_))
    );
}

#[tokio::test]
async fn expired_archives_are_purged_once() {
    let exec = FakeExecutor::new();
    let h = harness(exec.clone());
    let mut config = (*h.ctx.config).clone();
    config.archive_grace_days = 0;
    let ctx = Context::new(h.ctx.store.clone(), h.ctx.remote.clone(), Arc::new(config), h.events.clone());
    let sites = hostwright_orchestrator::sites::SiteManager::new(ctx);

    let site = h.active_site("old.example.com", SiteKind::Static).await;
    let archive = sites.deprovision(site.id, &Checkpoint::none()).await.unwrap();

    assert_eq!(sites.purge_expired_archives().await.unwrap(), 1);
    assert!(exec.ran(&format!("rm -rf {}", archive.archive_path)));
    assert_eq!(sites.purge_expired_archives().await.unwrap(), 0);
}

#[tokio::test]
async fn php_sites_get_a_pool_running_as_the_site_user() {
    let exec = FakeExecutor::new();
    let h = harness(exec.clone());
    let site = h.create_site("blog.example.com", SiteKind::Cms, None).await;

    h.sites().provision(site.id, &Checkpoint::none()).await.unwrap();

    let uploads = exec.uploads();
    let (_, pool) = uploads
        .iter()
        .find(|(path, _)| path == "/etc/php/8.2/fpm/pool.d/blog.example.com.conf")
        .expect("pool written");
    assert!(pool.contains(&format!("user = {}\n", site.system_user)));
    let socket = format!("/run/php/php8.2-fpm-{}.sock", site.system_user);
    assert!(pool.contains(&format!("listen = {socket}\n")));
    let (_, block) = uploads
        .iter()
        .find(|(path, _)| path.starts_with(&h.ctx.config.nginx_conf_dir) && path.ends_with("blog.example.com.conf"))
        .expect("server block written");
    assert!(block.contains(&format!("fastcgi_pass unix:{socket};")));

    let commands = exec.commands();
    let validated = commands.iter().position(|c| c.contains("php-fpm8.2 -t")).unwrap();
    let database = commands.iter().position(|c| c.contains("CREATE DATABASE")).unwrap();
    assert!(validated < database);
    assert!(exec.ran("systemctl reload php8.2-fpm"));
}

#[tokio::test]
async fn static_sites_have_no_pool() {
    let exec = FakeExecutor::new();
    let h = harness(exec.clone());
    let site = h.create_site("shop.example.com", SiteKind::Static, None).await;

    h.sites().provision(site.id, &Checkpoint::none()).await.unwrap();

    assert!(!exec.uploads().iter().any(|(path, _)| path.contains("pool.d")));
    assert!(!exec.ran("php-fpm"));
}

#[tokio::test]
async fn pool_is_removed_on_rollback_and_deprovision() {
    let exec = FakeExecutor::new();
    exec.fail_on("CREATE DATABASE", "ERROR 1045: Access denied");
    let h = harness_with(exec.clone(), FailurePolicy::Rollback);
    let site = h.create_site("blog.example.com", SiteKind::Cms, None).await;

    h.sites().provision(site.id, &Checkpoint::none()).await.unwrap_err();

    let remove_pool = "rm -f /etc/php/8.2/fpm/pool.d/blog.example.com.conf";
    let commands = exec.commands();
    let pool_removed = commands.iter().position(|c| c.starts_with(remove_pool)).expect("pool removed");
    let dir_removed = commands
        .iter()
        .position(|c| c.starts_with("rm -rf") && c.contains(&site.site_path))
        .unwrap();
    assert!(pool_removed < dir_removed);

    exec.clear_rules();
    exec.clear_commands();
    let site = h.active_site("news.example.com", SiteKind::Cms).await;
    h.sites().deprovision(site.id, &Checkpoint::none()).await.unwrap();

    assert!(exec.ran("rm -f /etc/php/8.2/fpm/pool.d/news.example.com.conf && systemctl reload php8.2-fpm"));
}
