//! Baseline synchronization: keeps the returns cache in step with the registry

use backon::{ExponentialBuilder, Retryable};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::cache::ReturnsCache;
use crate::core::poller::Poller;
use crate::error::{CheckError, ServiceError, Stage};
use crate::metrics::Metrics;
use crate::models::{AlphaDetails, AlphaId, CachedAlphaEntry, PoolKind, ReturnSeries, SyncScope};
use crate::services::AlphaRegistry;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub page_size: usize,
    /// Upper bound on fetching one alpha's series, polling included
    pub alpha_timeout: Duration,
    pub roster_retries: usize,
    pub roster_backoff: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            alpha_timeout: Duration::from_secs(120),
            roster_retries: 5,
            roster_backoff: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncFailure {
    pub alpha_id: AlphaId,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub scope: SyncScope,
    /// Roster alphas belonging to the scope
    pub listed: usize,
    pub fetched: Vec<AlphaId>,
    pub reused: usize,
    pub removed: Vec<AlphaId>,
    pub failed: Vec<SyncFailure>,
}

impl SyncReport {
    fn new(scope: SyncScope) -> Self {
        Self {
            scope,
            listed: 0,
            fetched: Vec::new(),
            reused: 0,
            removed: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// Every listed alpha made it into the cache
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    fn changed(&self) -> bool {
        !self.fetched.is_empty() || !self.removed.is_empty()
    }
}

pub struct BaselineSynchronizer {
    registry: Arc<dyn AlphaRegistry>,
    cache: Arc<ReturnsCache>,
    poller: Poller,
    config: SyncConfig,
    metrics: Option<Arc<Metrics>>,
    scope_locks: Mutex<HashMap<SyncScope, Arc<Mutex<()>>>>,
}

impl BaselineSynchronizer {
    pub fn new(
        registry: Arc<dyn AlphaRegistry>,
        cache: Arc<ReturnsCache>,
        poller: Poller,
        config: SyncConfig,
    ) -> Self {
        Self {
            registry,
            cache,
            poller,
            config,
            metrics: None,
            scope_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn cache(&self) -> &Arc<ReturnsCache> {
        &self.cache
    }

    async fn scope_lock(&self, scope: &SyncScope) -> Arc<Mutex<()>> {
        let mut locks = self.scope_locks.lock().await;
        locks
            .entry(scope.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Bring the cached baseline for `scope` in line with the registry.
    ///
    /// Only one sync per scope runs at a time; a concurrent request waits for
    /// the running one and then re-checks, which fetches nothing new. Entries
    /// are committed one at a time and the index is flushed when the scope is
    /// marked synced; dropping this future keeps the entries covered by the
    /// last index checkpoint.
    pub async fn sync(&self, scope: &SyncScope) -> Result<SyncReport, CheckError> {
        if !scope.pool_kind.supports_local() {
            return Err(CheckError::Precondition {
                pool_kind: scope.pool_kind,
                detail: "production alphas are never cached locally".to_string(),
            });
        }

        let lock = self.scope_lock(scope).await;
        let _guard = lock.lock().await;

        info!(scope = %scope, "BaselineSynchronizer: syncing {}", scope);

        let roster = self.fetch_roster(scope).await.map_err(|source| CheckError::Service {
            pool_kind: scope.pool_kind,
            stage: Stage::Sync,
            source,
        })?;

        let mut report = SyncReport::new(scope.clone());
        report.listed = roster.len();

        let current: HashSet<&AlphaId> = roster.iter().map(|a| &a.id).collect();
        for stale in self.cache.snapshot(scope).await {
            if !current.contains(&stale.id) {
                self.cache
                    .remove(&stale.id)
                    .await
                    .map_err(|source| cache_error(scope, source))?;
                report.removed.push(stale.id.clone());
            }
        }

        for details in &roster {
            if self.reuse_cached(scope, details).await? {
                report.reused += 1;
                continue;
            }

            match self.fetch_series(&details.id).await {
                Ok(series) => {
                    let entry = CachedAlphaEntry::from_details(details, true, series);
                    self.cache
                        .put(entry)
                        .await
                        .map_err(|source| cache_error(scope, source))?;
                    if let Some(metrics) = &self.metrics {
                        metrics.sync_series_fetches_total.inc();
                    }
                    report.fetched.push(details.id.clone());
                }
                Err(reason) => {
                    warn!(alpha_id = %details.id, scope = %scope, reason = %reason, "BaselineSynchronizer: skipping {}: {}", details.id, reason);
                    if let Some(metrics) = &self.metrics {
                        metrics.sync_failures_total.inc();
                    }
                    report.failed.push(SyncFailure {
                        alpha_id: details.id.clone(),
                        reason,
                    });
                }
            }
        }

        self.cache
            .mark_synced(scope, report.changed())
            .await
            .map_err(|source| cache_error(scope, source))?;
        if let Some(metrics) = &self.metrics {
            metrics.cached_alphas.set(self.cache.len().await as i64);
        }

        info!(
            scope = %scope,
            listed = report.listed,
            fetched = report.fetched.len(),
            reused = report.reused,
            removed = report.removed.len(),
            failed = report.failed.len(),
            "BaselineSynchronizer: {} synced, {} fetched, {} reused, {} removed, {} failed",
            scope,
            report.fetched.len(),
            report.reused,
            report.removed.len(),
            report.failed.len()
        );

        Ok(report)
    }

    /// Sync several scopes in order, stopping at the first error
    pub async fn sync_all(&self, scopes: &[SyncScope]) -> Result<Vec<SyncReport>, CheckError> {
        let mut reports = Vec::with_capacity(scopes.len());
        for scope in scopes {
            reports.push(self.sync(scope).await?);
        }
        Ok(reports)
    }

    /// Keep the cached entry when its stats are unchanged.
    ///
    /// Metadata drift (name, pool flags) is written through without refetching
    /// the series.
    async fn reuse_cached(&self, scope: &SyncScope, details: &AlphaDetails) -> Result<bool, CheckError> {
        let Some(existing) = self.cache.get(&details.id).await else {
            return Ok(false);
        };
        if existing.stats != details.stats {
            debug!(alpha_id = %details.id, "BaselineSynchronizer: stats changed for {}, refetching", details.id);
            return Ok(false);
        }

        let refreshed = CachedAlphaEntry::from_details(details, true, existing.series.clone());
        if refreshed != *existing {
            self.cache
                .update_metadata(refreshed)
                .await
                .map_err(|source| cache_error(scope, source))?;
        }
        Ok(true)
    }

    async fn fetch_roster(&self, scope: &SyncScope) -> Result<Vec<AlphaDetails>, ServiceError> {
        let limit = self.config.page_size.max(1);
        let mut offset = 0;
        let mut total = None;
        let mut rows = Vec::new();

        loop {
            let page = (|| self.registry.list_accepted(scope, offset, limit))
                .retry(
                    ExponentialBuilder::default()
                        .with_min_delay(self.config.roster_backoff)
                        .with_max_times(self.config.roster_retries),
                )
                .sleep(sleep)
                .when(ServiceError::is_transient)
                .notify(|err: &ServiceError, delay: Duration| {
                    warn!(scope = %scope, offset = offset, error = %err, "BaselineSynchronizer: roster page failed, retrying in {:?}", delay);
                })
                .await?;

            let received = page.alphas.len();
            total.get_or_insert(page.total);
            rows.extend(page.alphas);
            offset += limit;

            if received < limit || total.is_some_and(|t| rows.len() >= t) {
                break;
            }
        }

        if let Some(total) = total {
            rows.truncate(total);
        }

        Ok(rows
            .into_iter()
            .filter(|a| a.region == scope.region && in_pool(a, scope.pool_kind))
            .collect())
    }

    async fn fetch_series(&self, alpha_id: &AlphaId) -> Result<ReturnSeries, String> {
        let operation = format!("daily-pnl for {}", alpha_id);
        let polled = timeout(
            self.config.alpha_timeout,
            self.poller
                .run(&operation, || self.registry.poll_daily_returns(alpha_id)),
        )
        .await;

        match polled {
            Err(_) => Err(format!(
                "timed out after {}s",
                self.config.alpha_timeout.as_secs_f64()
            )),
            Ok(outcome) => outcome.into_result().map_err(|e| e.to_string()),
        }
    }
}

fn in_pool(details: &AlphaDetails, pool_kind: PoolKind) -> bool {
    match pool_kind {
        PoolKind::Prod => false,
        PoolKind::SelfPool => !details.is_power_pool,
        PoolKind::PowerPool => details.is_power_pool,
    }
}

fn cache_error(scope: &SyncScope, source: crate::error::CacheError) -> CheckError {
    CheckError::Cache {
        pool_kind: scope.pool_kind,
        source,
    }
}
