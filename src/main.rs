//! Cache proxy - prompt-cache normalizing reverse proxy
//!
//! This is the main entry point. One listener is started per configured upstream.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use cache_proxy::{routes, AppState, Config};
use futures::future::try_join_all;
use tokio::{signal, sync::watch};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing; RUST_LOG wins over LOG_LEVEL
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cache_proxy::config::log_filter_from_env().into()),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!("Starting cache proxy");

    let config = Config::from_env()?;
    info!("Configuration loaded successfully");

    routes::metrics::init_metrics();
    info!("Metrics initialized");

    let states = config
        .proxies()
        .into_iter()
        .map(|proxy| AppState::new(proxy, config.client.clone()).map(Arc::new))
        .collect::<Result<Vec<_>>>()?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let servers = states
        .iter()
        .map(|state| serve(Arc::clone(state), shutdown_rx.clone()));
    let result = try_join_all(servers).await;

    // Pooled clients are released on every exit path
    for state in &states {
        state.shutdown().await;
    }

    result?;
    info!("Cache proxy shutdown complete");
    Ok(())
}

/// Run one proxy instance until shutdown
async fn serve(state: Arc<AppState>, shutdown: watch::Receiver<bool>) -> Result<()> {
    let flavor = state.config.flavor;
    let addr: SocketAddr = state
        .config
        .bind_address()
        .parse()
        .with_context(|| format!("Invalid bind address for {} proxy", flavor))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {} proxy on {}", flavor, addr))?;

    info!(
        upstream = %flavor,
        upstream_url = %state.handler.endpoints().messages,
        cache_policy = %state.config.cache_policy.describe(),
        "{} listening on {}",
        flavor.service_name(),
        addr
    );

    let app = routes::create_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown(shutdown))
        .await
        .with_context(|| format!("{} proxy server failed", flavor))?;

    info!(upstream = %flavor, "Server stopped");
    Ok(())
}

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    // A dropped sender also ends the wait
    let _ = shutdown.wait_for(|stopped| *stopped).await;
}

/// Handle graceful shutdown signals
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating shutdown");
        }
    }
}
