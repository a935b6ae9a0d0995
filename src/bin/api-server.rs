//! Alphagate API Server
//!
//! HTTP API for submission checks, readiness checks and baseline syncs.

use alphagate::config::{get_environment, get_port, AppConfig};
use alphagate::core::bootstrap;
use alphagate::core::http::start_server;
use alphagate::logging;
use alphagate::metrics::Metrics;
use dotenvy::dotenv;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Load environment variables from .env if present
    dotenv().ok();

    logging::init_logging();

    let port = get_port();
    let config = AppConfig::from_env();

    info!("Starting Alphagate API Server");
    info!(environment = %get_environment(), "Environment");
    info!(port = port, "HTTP Server: http://0.0.0.0:{}", port);
    info!(cache_dir = %config.cache_dir.display(), "Returns cache: {}", config.cache_dir.display());

    let metrics = Arc::new(Metrics::new()?);
    let components = bootstrap::build(&config, metrics.clone()).await?;

    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(port, metrics, Some(components.checker)).await {
            error!(error = %e, "HTTP server error");
        }
    });

    info!("API server started, waiting for shutdown signal...");
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Shutting down API server...");
        }
        _ = server_handle => {
            error!("HTTP server stopped");
        }
    }

    Ok(())
}
