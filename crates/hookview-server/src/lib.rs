//! HookView server: receives webhooks over HTTP, keeps the most recent ones
//! per namespace and serves them back as JSON and HTML.

pub mod api;
pub mod client;
pub mod config;
pub mod dashboard;
pub mod middleware;
pub mod static_assets;

use api::{AppState, error::panic_response, health, webhooks};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::Method,
    routing::{get, post},
};
use config::ServerConfig;
use hookview_storage::{
    EntryStore, JsonFileBackend, MemoryBackend, SnapshotBackend, SnapshotWriter, load_snapshot,
};
use middleware::{RateLimiter, default_rate_limit_middleware, rate_limit_middleware};
use std::sync::Arc;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Largest accepted request body.
pub const BODY_LIMIT_BYTES: usize = 10 * 1024 * 1024;

/// Shared services behind every handler.
pub struct AppCore {
    pub store: Arc<EntryStore>,
    pub snapshots: SnapshotWriter,
    pub rate_limiter: RateLimiter,
    pub trust_proxy: bool,
}

impl AppCore {
    /// Build the core from configuration, loading the last snapshot when
    /// persistence is enabled. Must be called from within a Tokio runtime.
    pub fn from_config(config: &ServerConfig) -> Self {
        let backend: Arc<dyn SnapshotBackend> = if config.persist {
            Arc::new(JsonFileBackend::new(config.data_file.clone()))
        } else {
            Arc::new(MemoryBackend::new())
        };
        Self::with_backend(config, backend)
    }

    pub fn with_backend(config: &ServerConfig, backend: Arc<dyn SnapshotBackend>) -> Self {
        let snapshot = load_snapshot(backend.as_ref());
        let store = Arc::new(EntryStore::from_snapshot(snapshot, config.max_entries));
        info!(
            location = %backend.location(),
            namespaces = store.namespaces().len(),
            webhooks = store.count(None),
            "Webhook store ready"
        );

        let snapshots = SnapshotWriter::start(store.clone(), backend);
        Self {
            store,
            snapshots,
            rate_limiter: RateLimiter::new(config.rate_limit),
            trust_proxy: config.trust_proxy,
        }
    }
}

/// Assemble every route with its middleware.
pub fn build_router(state: AppState) -> Router {
    // Receive routes are the only rate-limited ones.
    let namespaced_receive = Router::new()
        .route("/api/webhooks/{namespace}", post(webhooks::receive_webhook))
        .route("/webhook/{namespace}", post(webhooks::receive_webhook))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ));
    let default_receive = Router::new()
        .route("/webhook", post(webhooks::receive_default_webhook))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            default_rate_limit_middleware,
        ));

    let routes = Router::new()
        .route("/", get(dashboard::index))
        .route("/webhook", get(dashboard::namespaces))
        .route("/webhook/{namespace}", get(dashboard::namespace))
        .route(
            "/api/webhooks",
            get(webhooks::list_all_webhooks).delete(webhooks::clear_all_webhooks),
        )
        .route(
            "/api/webhooks/{namespace}",
            get(webhooks::list_webhooks).delete(webhooks::clear_webhooks),
        )
        .route("/health", get(health::health))
        .route("/health/{namespace}", get(health::namespace_health))
        .merge(namespaced_receive)
        .merge(default_receive)
        .fallback(static_assets::static_handler);

    with_layers(routes).with_state(state)
}

fn with_layers(router: Router<AppState>) -> Router<AppState> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    router
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
