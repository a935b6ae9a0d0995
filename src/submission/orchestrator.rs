//! Submission check orchestration
//!
//! Resolves a candidate, obtains its correlation result from the requested
//! source, and hands that result unchanged to the gate.

use futures_util::future::join_all;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::baseline::BaselineSynchronizer;
use crate::cache::ReturnsCache;
use crate::core::poller::{PollError, Poller};
use crate::correlation::{
    Candidate, CorrelationEngine, CorrelationGate, CorrelationSource, LocalCorrelationSource,
    RemoteCorrelationSource, SourceKind,
};
use crate::error::{CheckError, Stage};
use crate::metrics::Metrics;
use crate::models::{
    AlphaDetails, AlphaId, CorrelationMatrix, PoolKind, ReadinessReport, ReturnSeries,
    SubmissionReport, SubmissionVerdict, SyncScope,
};
use crate::services::{AlphaRegistry, CorrelationService};

#[derive(Debug, Clone, Default)]
pub struct CheckerConfig {
    /// Run a baseline sync for the candidate's scope before each local check
    pub sync_before_local: bool,
}

/// Verdict or error for one candidate of a batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchEntry {
    pub alpha_id: AlphaId,
    pub verdict: Option<SubmissionVerdict>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub pool_kind: PoolKind,
    /// Each candidate against the baseline
    pub inter: Vec<BatchEntry>,
    /// Candidates against each other
    pub intra: CorrelationMatrix,
}

impl BatchReport {
    pub fn all_passed(&self) -> bool {
        self.inter
            .iter()
            .all(|e| e.verdict.as_ref().is_some_and(|v| v.passed))
    }
}

pub struct SubmissionChecker {
    registry: Arc<dyn AlphaRegistry>,
    service: Arc<dyn CorrelationService>,
    synchronizer: Arc<BaselineSynchronizer>,
    remote: RemoteCorrelationSource,
    local: LocalCorrelationSource,
    gate: CorrelationGate,
    poller: Poller,
    config: CheckerConfig,
    metrics: Option<Arc<Metrics>>,
}

impl SubmissionChecker {
    pub fn new(
        registry: Arc<dyn AlphaRegistry>,
        service: Arc<dyn CorrelationService>,
        synchronizer: Arc<BaselineSynchronizer>,
        engine: CorrelationEngine,
        gate: CorrelationGate,
        poller: Poller,
        config: CheckerConfig,
    ) -> Self {
        let cache = synchronizer.cache().clone();
        Self {
            remote: RemoteCorrelationSource::new(service.clone(), poller.clone()),
            local: LocalCorrelationSource::new(cache, engine),
            registry,
            service,
            synchronizer,
            gate,
            poller,
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn synchronizer(&self) -> &Arc<BaselineSynchronizer> {
        &self.synchronizer
    }

    fn cache(&self) -> &Arc<ReturnsCache> {
        self.synchronizer.cache()
    }

    fn source(&self, kind: SourceKind) -> &dyn CorrelationSource {
        match kind {
            SourceKind::Remote => &self.remote,
            SourceKind::Local => &self.local,
        }
    }

    /// Check one candidate against one pool
    pub async fn check(
        &self,
        alpha_id: &AlphaId,
        pool_kind: PoolKind,
        source: SourceKind,
    ) -> Result<SubmissionVerdict, CheckError> {
        self.ensure_supported(&[pool_kind], source).await?;
        let details = self.details(alpha_id, pool_kind).await?;
        let candidate = self.prepare(details, pool_kind, source, None).await?;
        self.evaluate(&candidate, pool_kind, source).await
    }

    /// Check one candidate against several pools, stopping at the first error
    pub async fn check_all(
        &self,
        alpha_id: &AlphaId,
        pools: &[PoolKind],
        source: SourceKind,
    ) -> Result<SubmissionReport, CheckError> {
        self.ensure_supported(pools, source).await?;
        let Some(&first) = pools.first() else {
            return Ok(SubmissionReport::new(alpha_id.clone(), Vec::new()));
        };

        let details = self.details(alpha_id, first).await?;
        let mut returns = None;
        let mut verdicts = Vec::with_capacity(pools.len());
        for &pool_kind in pools {
            // A sync for a later pool may refresh the candidate's own entry
            let reuse = if self.config.sync_before_local { None } else { returns.clone() };
            let candidate = self
                .prepare(details.clone(), pool_kind, source, reuse)
                .await?;
            returns = candidate.returns.clone();
            verdicts.push(self.evaluate(&candidate, pool_kind, source).await?);
        }

        let report = SubmissionReport::new(alpha_id.clone(), verdicts);
        info!(
            alpha_id = %alpha_id,
            pools = pools.len(),
            all_passed = report.all_passed,
            "SubmissionChecker: {} checked against {} pools",
            alpha_id,
            pools.len()
        );
        Ok(report)
    }

    /// Local checks for a batch plus the pairwise matrix between its members.
    ///
    /// Repeated ids are checked once. A candidate that cannot be loaded or
    /// evaluated gets an error entry; the rest of the batch still runs. Any
    /// requested sync finishes before a candidate series is read.
    pub async fn check_batch(
        &self,
        alpha_ids: &[AlphaId],
        pool_kind: PoolKind,
    ) -> Result<BatchReport, CheckError> {
        self.ensure_supported(&[pool_kind], SourceKind::Local).await?;

        let requested = alpha_ids.len();
        let mut seen = HashSet::new();
        let alpha_ids: Vec<AlphaId> = alpha_ids
            .iter()
            .filter(|id| seen.insert(*id))
            .cloned()
            .collect();
        if alpha_ids.len() < requested {
            debug!(
                pool_kind = %pool_kind,
                dropped = requested - alpha_ids.len(),
                "SubmissionChecker: {} duplicate batch ids dropped",
                requested - alpha_ids.len()
            );
        }

        let resolved = join_all(alpha_ids.iter().map(|id| self.details(id, pool_kind))).await;

        if self.config.sync_before_local {
            let scopes: BTreeSet<SyncScope> = resolved
                .iter()
                .filter_map(|r| r.as_ref().ok())
                .map(|d| SyncScope::new(d.region.clone(), pool_kind))
                .collect();
            for scope in &scopes {
                self.synchronizer.sync(scope).await?;
            }
        }

        let loaded = join_all(resolved.into_iter().map(|details| async move {
            let details = details?;
            let returns = self.fetch_returns(&details.id, pool_kind).await?;
            Ok::<_, CheckError>(Candidate::new(details).with_returns(returns))
        }))
        .await;

        let mut inter = Vec::with_capacity(alpha_ids.len());
        let mut series = Vec::new();
        for (alpha_id, candidate) in alpha_ids.iter().zip(loaded) {
            let outcome = match candidate {
                Ok(candidate) => {
                    if let Some(returns) = &candidate.returns {
                        series.push((alpha_id.clone(), ReturnSeries::clone(returns)));
                    }
                    self.evaluate(&candidate, pool_kind, SourceKind::Local).await
                }
                Err(e) => Err(e),
            };

            inter.push(match outcome {
                Ok(verdict) => BatchEntry {
                    alpha_id: alpha_id.clone(),
                    verdict: Some(verdict),
                    error: None,
                },
                Err(e) => {
                    warn!(alpha_id = %alpha_id, error = %e, "SubmissionChecker: batch candidate {} failed", alpha_id);
                    BatchEntry {
                        alpha_id: alpha_id.clone(),
                        verdict: None,
                        error: Some(e.to_string()),
                    }
                }
            });
        }

        let intra = self.local.engine().correlate_batch(&series);
        Ok(BatchReport {
            pool_kind,
            inter,
            intra,
        })
    }

    /// Platform pre-submission checks for one alpha
    pub async fn readiness(&self, alpha_id: &AlphaId) -> Result<ReadinessReport, PollError> {
        let operation = format!("submission checks for {}", alpha_id);
        self.poller
            .run(&operation, || self.service.poll_readiness(alpha_id))
            .await
            .into_result()
    }

    /// Fail fast on requests that can never be served, before any I/O
    async fn ensure_supported(&self, pools: &[PoolKind], source: SourceKind) -> Result<(), CheckError> {
        if source != SourceKind::Local {
            return Ok(());
        }
        if let Some(&pool_kind) = pools.iter().find(|p| !p.supports_local()) {
            return Err(CheckError::Precondition {
                pool_kind,
                detail: "local source cannot check prod; production correlation is only available remotely".to_string(),
            });
        }
        if self.config.sync_before_local {
            return Ok(());
        }

        let synced = self.cache().synced_scopes().await;
        for &pool_kind in pools {
            let suffix = format!("/{}", pool_kind);
            if !synced.iter().any(|key| key.ends_with(&suffix)) {
                return Err(CheckError::Precondition {
                    pool_kind,
                    detail: format!("no local {} baseline synced for any region", pool_kind),
                });
            }
        }
        Ok(())
    }

    async fn details(&self, alpha_id: &AlphaId, pool_kind: PoolKind) -> Result<AlphaDetails, CheckError> {
        self.registry
            .alpha_details(alpha_id)
            .await
            .map_err(|source| CheckError::Service {
                pool_kind,
                stage: Stage::Evaluate,
                source,
            })
    }

    async fn prepare(
        &self,
        details: AlphaDetails,
        pool_kind: PoolKind,
        source: SourceKind,
        returns: Option<Arc<ReturnSeries>>,
    ) -> Result<Candidate, CheckError> {
        let candidate = Candidate::new(details);
        if source == SourceKind::Remote {
            return Ok(candidate);
        }

        let scope = SyncScope::new(candidate.details.region.clone(), pool_kind);
        if self.config.sync_before_local {
            self.synchronizer.sync(&scope).await?;
        }
        if !self.cache().is_synced(&scope).await {
            return Err(CheckError::Precondition {
                pool_kind,
                detail: format!("no local {} baseline for region {}", pool_kind, scope.region),
            });
        }

        let returns = match returns {
            Some(returns) => returns,
            None => self.fetch_returns(&candidate.details.id, pool_kind).await?,
        };
        Ok(candidate.with_returns(returns))
    }

    /// Candidate returns, from the cache when the candidate is itself cached
    async fn fetch_returns(
        &self,
        alpha_id: &AlphaId,
        pool_kind: PoolKind,
    ) -> Result<Arc<ReturnSeries>, CheckError> {
        if let Some(entry) = self.cache().get(alpha_id).await {
            return Ok(Arc::new(entry.series.clone()));
        }
        let operation = format!("daily-pnl for {}", alpha_id);
        let series = self
            .poller
            .run(&operation, || self.registry.poll_daily_returns(alpha_id))
            .await
            .into_result()
            .map_err(|e| e.in_check(pool_kind, Stage::Poll))?;
        Ok(Arc::new(series))
    }

    async fn evaluate(
        &self,
        candidate: &Candidate,
        pool_kind: PoolKind,
        source: SourceKind,
    ) -> Result<SubmissionVerdict, CheckError> {
        let result = match self.source(source).correlation(candidate, pool_kind).await {
            Ok(result) => result,
            Err(e) => {
                self.record(pool_kind, "error");
                return Err(e);
            }
        };

        let verdict = self.gate.evaluate(pool_kind, &result, &candidate.stats());
        self.record(pool_kind, if verdict.passed { "pass" } else { "fail" });

        info!(
            alpha_id = %candidate.details.id,
            pool_kind = %pool_kind,
            source = %source,
            passed = verdict.passed,
            "SubmissionChecker: {} {} via {} source: {}",
            candidate.details.id,
            verdict.status(),
            source,
            verdict.reason
        );
        Ok(verdict)
    }

    fn record(&self, pool_kind: PoolKind, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_check(pool_kind.as_str(), outcome);
        }
    }
}
