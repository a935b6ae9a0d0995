//! Wiring shared by the binaries

use std::sync::Arc;
use tracing::info;

use crate::baseline::BaselineSynchronizer;
use crate::cache::ReturnsCache;
use crate::config::{get_session_cookie, AppConfig};
use crate::core::poller::Poller;
use crate::correlation::{CorrelationEngine, CorrelationGate};
use crate::metrics::Metrics;
use crate::services::BrainClient;
use crate::submission::SubmissionChecker;

pub struct Components {
    pub client: Arc<BrainClient>,
    pub cache: Arc<ReturnsCache>,
    pub synchronizer: Arc<BaselineSynchronizer>,
    pub checker: Arc<SubmissionChecker>,
}

/// Build the platform client, cache, synchronizer and checker from `config`
pub async fn build(
    config: &AppConfig,
    metrics: Arc<Metrics>,
) -> Result<Components, Box<dyn std::error::Error + Send + Sync>> {
    let client = Arc::new(match get_session_cookie() {
        Some(cookie) => BrainClient::with_session(&config.api_url, &cookie)?,
        None => BrainClient::new(&config.api_url)?,
    });
    info!(api_url = %client.base_url(), "Platform API: {}", client.base_url());

    let cache = Arc::new(ReturnsCache::open(&config.cache_dir)?);
    metrics.cached_alphas.set(cache.len().await as i64);

    let poller = Poller::new(config.poller.clone()).with_metrics(metrics.clone());
    let synchronizer = Arc::new(
        BaselineSynchronizer::new(client.clone(), cache.clone(), poller.clone(), config.sync.clone())
            .with_metrics(metrics.clone()),
    );
    let checker = Arc::new(
        SubmissionChecker::new(
            client.clone(),
            client.clone(),
            synchronizer.clone(),
            CorrelationEngine::new(config.engine.clone()),
            CorrelationGate::new(config.gate.clone()),
            poller,
            config.checker.clone(),
        )
        .with_metrics(metrics),
    );

    Ok(Components {
        client,
        cache,
        synchronizer,
        checker,
    })
}
