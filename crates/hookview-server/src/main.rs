#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::Context;
use hookview_server::{AppCore, build_router, config::ServerConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// How often idle rate limit keys are dropped.
const RATE_LIMIT_SWEEP_PERIOD: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing logger
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,hookview_server=debug".into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Starting HookView webhook server");

    let config = ServerConfig::load()?;
    let addr = config.socket_addr()?;
    if config.persist {
        info!(data_file = %config.data_file.display(), "Persistence enabled");
    } else {
        info!("Persistence disabled, webhooks are kept in memory only");
    }

    let core = Arc::new(AppCore::from_config(&config));
    let sweeper = core.rate_limiter.spawn_sweeper(RATE_LIMIT_SWEEP_PERIOD);
    let app = build_router(core.clone());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    let local_addr = listener.local_addr()?;

    info!("Webhook demo server running on http://{}", local_addr);
    info!("Webhook endpoint: http://{}/webhook/<namespace>", local_addr);
    info!("Health check: http://{}/health", local_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    sweeper.abort();
    match core.snapshots.shutdown().await {
        Ok(outcome) => match outcome.result {
            Ok(bytes) => info!(bytes, "Final snapshot written"),
            Err(e) => warn!(error = %e, "Final snapshot failed"),
        },
        Err(e) => error!(error = %e, "Snapshot writer unavailable at shutdown"),
    }

    info!("HookView stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
