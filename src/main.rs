use std::net::SocketAddr;
use std::process::ExitCode;

use axum::Router;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use api_commons::{AppState, Config, MetricsRegistry, build_router, utils};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!("Starting api_commons demo v{}", env!("CARGO_PKG_VERSION"));

    match run().await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

/// Run the application, returning an exit code on error.
async fn run() -> Result<(), exitcode::ExitCode> {
    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {e}");
        exitcode::CONFIG
    })?;
    info!(
        host = %config.host,
        port = %config.port,
        service = %config.service_name,
        allowed_keys = config.allowed_api_keys.len(),
        "Configuration loaded"
    );

    // Build the metrics registry, with its own listener when METRICS_PORT > 0
    let registry = match config.metrics_addr() {
        Some(metrics_addr) => {
            let (registry, exporter) = MetricsRegistry::with_http_listener(
                &config.service_name,
                config.duplicate_metric_policy,
                metrics_addr,
            )
            .map_err(|e| {
                error!("Failed to start metrics listener: {e}");
                exitcode::UNAVAILABLE
            })?;
            tokio::spawn(async move {
                if let Err(e) = exporter.await {
                    warn!("Metrics listener stopped: {e:?}");
                }
            });
            info!("Metrics listening on http://{metrics_addr}/metrics");
            registry
        }
        None => MetricsRegistry::new(&config.service_name, config.duplicate_metric_policy)
            .map_err(|e| {
                error!("Failed to build metrics registry: {e}");
                exitcode::CONFIG
            })?,
    };

    // Build application state and router
    let addr = config.server_addr();
    let state = AppState::new(config, registry);
    let app = build_router(state, Router::new()).map_err(|e| {
        error!("Failed to build router: {e}");
        exitcode::CONFIG
    })?;

    // Start server
    let addr: SocketAddr = addr.parse().map_err(|e| {
        error!("Invalid server address: {e}");
        exitcode::CONFIG
    })?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to {addr}: {e}");
        exitcode::UNAVAILABLE
    })?;

    info!("Server listening on http://{addr}");
    info!("API endpoints:");
    info!("  GET  /health           - Health check");
    info!("  GET  /metrics          - Prometheus metrics");

    // Start server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(utils::shutdown_signal())
        .await
        .map_err(|e| {
            error!("Server error: {e}");
            exitcode::SOFTWARE
        })?;

    info!("Server shutdown complete");
    Ok(())
}
