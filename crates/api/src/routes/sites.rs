//! Route definitions for the `/sites` resource and its sub-resources.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{backups, certificates, git, logs, sites};
use crate::state::AppState;

/// Routes mounted at `/sites`.
///
/// ```text
/// GET    /                          -> list_sites
/// POST   /                          -> create_site
/// GET    /{id}                      -> get_site
/// POST   /{id}/provision            -> provision_site (queued)
/// POST   /{id}/deprovision          -> deprovision_site (queued)
/// POST   /{id}/suspend              -> suspend_site (queued)
/// POST   /{id}/unsuspend            -> unsuspend_site (queued)
/// POST   /{id}/regenerate-config    -> regenerate_config (queued)
///
/// GET    /{id}/ssl                  -> check_certificate
/// POST   /{id}/ssl                  -> issue_certificate (queued)
/// POST   /{id}/ssl/renew            -> renew_certificate (queued)
///
/// GET    /{id}/backups              -> list_backups
/// POST   /{id}/backups              -> create_backup (queued)
///
/// POST   /{id}/git/clone            -> clone_repository (queued)
/// POST   /{id}/git/pull             -> pull (queued)
/// POST   /{id}/git/rollback         -> rollback (queued)
/// POST   /{id}/git/branch           -> switch_branch (queued)
/// GET    /{id}/git/history          -> history
/// GET    /{id}/git/branches         -> branches
/// GET    /{id}/git/status           -> status
/// GET    /{id}/git/deployments      -> deployments
/// POST   /{id}/git/webhook          -> setup_webhook
///
/// GET    /{id}/logs/{log}           -> read_log
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(sites::list_sites).post(sites::create_site))
        .route("/{id}", get(sites::get_site))
        .route("/{id}/provision", post(sites::provision_site))
        .route("/{id}/deprovision", post(sites::deprovision_site))
        .route("/{id}/suspend", post(sites::suspend_site))
        .route("/{id}/unsuspend", post(sites::unsuspend_site))
        .route("/{id}/regenerate-config", post(sites::regenerate_config))
        // Certificates.
        .route(
            "/{id}/ssl",
            get(certificates::check_certificate).post(certificates::issue_certificate),
        )
        .route("/{id}/ssl/renew", post(certificates::renew_certificate))
        // Backups.
        .route(
            "/{id}/backups",
            get(backups::list_backups).post(backups::create_backup),
        )
        // Git deployments.
        .route("/{id}/git/clone", post(git::clone_repository))
        .route("/{id}/git/pull", post(git::pull))
        .route("/{id}/git/rollback", post(git::rollback))
        .route("/{id}/git/branch", post(git::switch_branch))
        .route("/{id}/git/history", get(git::history))
        .route("/{id}/git/branches", get(git::branches))
        .route("/{id}/git/status", get(git::status))
        .route("/{id}/git/deployments", get(git::deployments))
        .route("/{id}/git/webhook", post(git::setup_webhook))
        // Logs.
        .route("/{id}/logs/{log}", get(logs::read_log))
}
