//! Alphagate Baseline Sync
//!
//! Keeps the local returns cache current for the configured regions and pools.
//! Runs once, or on an interval when `SYNC_INTERVAL_SECONDS` is set.

use alphagate::config::{get_environment, get_sync_scopes, AppConfig};
use alphagate::core::bootstrap;
use alphagate::logging;
use alphagate::metrics::Metrics;
use dotenvy::dotenv;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();

    logging::init_logging();

    let interval: u64 = env::var("SYNC_INTERVAL_SECONDS")
        .ok()
        .and_then(|i| i.parse().ok())
        .unwrap_or(0);

    let config = AppConfig::from_env();
    let scopes = get_sync_scopes()?;

    info!("Starting Alphagate Baseline Sync");
    info!(environment = %get_environment(), "Environment");
    info!(
        scopes = ?scopes.iter().map(|s| s.key()).collect::<Vec<_>>(),
        "Scopes: {}",
        scopes.iter().map(|s| s.key()).collect::<Vec<_>>().join(", ")
    );
    if scopes.is_empty() {
        return Err("no syncable scopes configured (SYNC_REGIONS / SYNC_POOLS)".into());
    }

    let metrics = Arc::new(Metrics::new()?);
    let components = bootstrap::build(&config, metrics).await?;
    let synchronizer = components.synchronizer;

    let run = async {
        loop {
            for scope in &scopes {
                match synchronizer.sync(scope).await {
                    Ok(report) if report.is_complete() => {}
                    Ok(report) => {
                        warn!(
                            scope = %scope,
                            failed = report.failed.len(),
                            "Baseline {} incomplete: {} alphas failed",
                            scope,
                            report.failed.len()
                        );
                    }
                    Err(e) => {
                        error!(scope = %scope, error = %e, "Baseline sync for {} failed", scope);
                    }
                }
            }

            if interval == 0 {
                break;
            }
            info!(interval = interval, "Next sync in {} seconds", interval);
            tokio::time::sleep(Duration::from_secs(interval)).await;
        }
    };

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Shutting down baseline sync; committed entries are kept");
        }
        _ = run => {
            info!("Baseline sync finished");
        }
    }

    Ok(())
}
