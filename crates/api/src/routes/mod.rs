pub mod backups;
pub mod cron;
pub mod dns;
pub mod health;
pub mod jobs;
pub mod security;
pub mod servers;
pub mod sites;
pub mod webhook;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Every route requires the admin bearer token except the git webhook
/// receiver.
///
/// ```text
/// /servers                                 list
/// /servers/{id}                            get
/// /servers/{id}/provision                  install the hosting stack (POST)
/// /servers/{id}/health-check               sample metrics now (POST)
/// /servers/{id}/test                       reachability probe (POST)
///
/// /sites                                   list, register
/// /sites/{id}                              get
/// /sites/{id}/provision                    provision (POST)
/// /sites/{id}/deprovision                  deprovision and archive (POST)
/// /sites/{id}/suspend, /unsuspend          maintenance page on/off (POST)
/// /sites/{id}/regenerate-config            rewrite nginx config (POST)
/// /sites/{id}/ssl                          certificate status, issue
/// /sites/{id}/ssl/renew                    renew (POST)
/// /sites/{id}/backups                      list, create
/// /sites/{id}/git/*                        clone, pull, rollback, branch,
///                                          history, branches, status,
///                                          deployments, webhook setup
/// /sites/{id}/logs/{log}                   tail, search, since
///
/// /backups/{id}/restore                    restore (POST)
/// /backups/{id}                            delete
///
/// /security/backup-key                     key info, generate
/// /security/backup-key/private             one-time private key download
///
/// /dns/zones/{id}/sync                     push zone to provider (POST)
/// /dns/zones/{id}/common-records           add apex/www/mail records (POST)
/// /dns/propagation                         resolver quorum check
///
/// /cron/validate                           parse and preview (POST)
/// /cron/jobs/{id}/run                      run now (POST)
///
/// /jobs/{id}                               queued operation status
/// /jobs/{id}/cancel                        cancel (POST)
///
/// /git/webhook/{website_id}                push receiver (public, signed)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/servers", servers::router())
        .nest("/sites", sites::router())
        .nest("/backups", backups::router())
        .nest("/security", security::router())
        .nest("/dns", dns::router())
        .nest("/cron", cron::router())
        .nest("/jobs", jobs::router())
        .nest("/git/webhook", webhook::router())
}
