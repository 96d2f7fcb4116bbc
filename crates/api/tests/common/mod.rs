#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use hostwright_core::remote::{CommandOutcome, HostTarget, RemoteClient, RemoteError, RemoteExecutor, RetryPolicy};
use hostwright_core::site::FailurePolicy;
use hostwright_events::EventBus;
use hostwright_orchestrator::store::{MemoryStore, Store};
use hostwright_orchestrator::{Context, Orchestrator, OrchestratorConfig};
use tempfile::TempDir;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use hostwright_api::config::ServerConfig;
use hostwright_api::routes;
use hostwright_api::state::AppState;

pub const ADMIN_TOKEN: &str = "test-admin-token";

/// Every command succeeds silently.
struct QuietHost;

#[async_trait]
impl RemoteExecutor for QuietHost {
    async fn execute(&self, _host: &HostTarget, _command: &str, _timeout: Duration) -> Result<CommandOutcome, RemoteError> {
        Ok(CommandOutcome {
            exit_code: Some(0),
            ..Default::default()
        })
    }

    async fn upload(&self, _host: &HostTarget, _local: &Path, _remote_path: &str) -> Result<(), RemoteError> {
        Ok(())
    }

    async fn download(&self, _host: &HostTarget, _remote_path: &str, local: &Path) -> Result<(), RemoteError> {
        tokio::fs::write(local, b"").await?;
        Ok(())
    }
}

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        admin_token: ADMIN_TOKEN.to_string(),
        public_base_url: "https://panel.example.com".to_string(),
    }
}

/// An application backed by the in-memory store, with one registered server.
pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub server_id: i64,
    _dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let server = store.add_server("web1", "203.0.113.10", false);
        let path = |rel: &str| dir.path().join(rel).to_string_lossy().into_owned();
        let config = OrchestratorConfig {
            web_root: path("www"),
            nginx_conf_dir: path("nginx"),
            archive_grace_days: 30,
            ssl_renewal_threshold_days: 30,
            ssl_alert_days: 7,
            failure_policy: FailurePolicy::RepairInPlace,
            backup_dir: dir.path().join("backups"),
            remote_staging_dir: path("staging"),
            command_timeout: Duration::from_secs(10),
            cron_timeout_secs: 300,
            certbot_email: None,
            php_version: "8.2".into(),
            tenant_bench_path: "/home/frappe/frappe-bench".into(),
            master_key: [1u8; 32],
        };
        let ctx = Context::new(
            Arc::clone(&store) as Arc<dyn Store>,
            RemoteClient::new(Arc::new(QuietHost), RetryPolicy::none()),
            Arc::new(config),
            Arc::new(EventBus::new(64)),
        );
        let state = AppState {
            pool: None,
            config: Arc::new(test_config()),
            orchestrator: Orchestrator::new(ctx, None, vec![], None),
        };
        Self {
            state,
            store,
            server_id: server.id,
            _dir: dir,
        }
    }

    /// Build the full application router with all middleware layers.
    ///
    /// This mirrors the router construction in `main.rs` so integration
    /// tests exercise the same middleware stack production uses.
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(["http://localhost:5173".parse().unwrap()])
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers([CONTENT_TYPE, AUTHORIZATION])
            .allow_credentials(true)
            .max_age(Duration::from_secs(3600));

        let request_id_header = HeaderName::from_static("x-request-id");

        Router::new()
            .merge(routes::health::router())
            .nest("/api/v1", routes::api_routes())
            .layer(CatchPanicLayer::new())
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                Duration::from_secs(30),
            ))
            .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                    .on_response(DefaultOnResponse::new().level(Level::INFO)),
            )
            .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
            .layer(cors)
            .with_state(self.state.clone())
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router().oneshot(request).await.unwrap()
    }

    /// Authenticated GET.
    pub async fn get(&self, uri: &str) -> Response {
        self.send(authed(Method::GET, uri).body(Body::empty()).unwrap())
            .await
    }

    /// Authenticated POST with a JSON body.
    pub async fn post_json(&self, uri: &str, body: serde_json::Value) -> Response {
        self.send(
            authed(Method::POST, uri)
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    /// Authenticated POST without a body.
    pub async fn post(&self, uri: &str) -> Response {
        self.send(authed(Method::POST, uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn delete(&self, uri: &str) -> Response {
        self.send(authed(Method::DELETE, uri).body(Body::empty()).unwrap())
            .await
    }

    /// Register a static site on the test server and return its id.
    pub async fn create_static_site(&self, domain: &str) -> i64 {
        let response = self
            .post_json(
                "/api/v1/sites",
                serde_json::json!({
                    "domain": domain,
                    "kind": "static",
                    "server_id": self.server_id,
                }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await["data"]["id"].as_i64().unwrap()
    }
}

fn authed(method: Method, uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(AUTHORIZATION, format!("Bearer {ADMIN_TOKEN}"))
}

/// Collect a response body as JSON.
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
