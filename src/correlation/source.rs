//! Where a candidate's correlation result comes from
//!
//! Both variants produce the same [`CorrelationResult`] shape, so the gate
//! never needs to know which one answered.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::cache::ReturnsCache;
use crate::core::poller::Poller;
use crate::correlation::engine::CorrelationEngine;
use crate::error::{CheckError, Stage};
use crate::models::{AlphaDetails, CandidateStats, CorrelationResult, PoolKind, ReturnSeries, SyncScope};
use crate::services::CorrelationService;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Remote,
    Local,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourceKind::Remote => "remote",
            SourceKind::Local => "local",
        })
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "remote" => Ok(SourceKind::Remote),
            "local" => Ok(SourceKind::Local),
            other => Err(format!("unknown source '{}', expected remote or local", other)),
        }
    }
}

/// Alpha under evaluation. Local checks also carry its return series.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub details: AlphaDetails,
    pub returns: Option<Arc<ReturnSeries>>,
}

impl Candidate {
    pub fn new(details: AlphaDetails) -> Self {
        Self {
            details,
            returns: None,
        }
    }

    pub fn with_returns(mut self, returns: Arc<ReturnSeries>) -> Self {
        self.returns = Some(returns);
        self
    }

    pub fn stats(&self) -> CandidateStats {
        CandidateStats {
            alpha_id: self.details.id.clone(),
            sharpe: self.details.stats.sharpe,
        }
    }
}

#[async_trait]
pub trait CorrelationSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    async fn correlation(
        &self,
        candidate: &Candidate,
        pool_kind: PoolKind,
    ) -> Result<CorrelationResult, CheckError>;
}

/// Correlations computed by the platform and fetched through the poller
pub struct RemoteCorrelationSource {
    service: Arc<dyn CorrelationService>,
    poller: Poller,
}

impl RemoteCorrelationSource {
    pub fn new(service: Arc<dyn CorrelationService>, poller: Poller) -> Self {
        Self { service, poller }
    }
}

#[async_trait]
impl CorrelationSource for RemoteCorrelationSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Remote
    }

    async fn correlation(
        &self,
        candidate: &Candidate,
        pool_kind: PoolKind,
    ) -> Result<CorrelationResult, CheckError> {
        let alpha_id = &candidate.details.id;
        let operation = format!("{} correlation for {}", pool_kind, alpha_id);
        let mut result = self
            .poller
            .run(&operation, || self.service.poll_correlation(alpha_id, pool_kind))
            .await
            .into_result()
            .map_err(|e| e.in_check(pool_kind, Stage::Poll))?;

        // Production correlations never identify counterparts
        if pool_kind == PoolKind::Prod {
            result.records.clear();
        }
        result.pool_kind = pool_kind;
        Ok(result)
    }
}

/// Correlations computed here against the synced baseline
pub struct LocalCorrelationSource {
    cache: Arc<ReturnsCache>,
    engine: CorrelationEngine,
}

impl LocalCorrelationSource {
    pub fn new(cache: Arc<ReturnsCache>, engine: CorrelationEngine) -> Self {
        Self { cache, engine }
    }

    pub fn engine(&self) -> &CorrelationEngine {
        &self.engine
    }
}

#[async_trait]
impl CorrelationSource for LocalCorrelationSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Local
    }

    async fn correlation(
        &self,
        candidate: &Candidate,
        pool_kind: PoolKind,
    ) -> Result<CorrelationResult, CheckError> {
        if !pool_kind.supports_local() {
            return Err(CheckError::Precondition {
                pool_kind,
                detail: "production correlation is only available from the remote service"
                    .to_string(),
            });
        }

        let returns = candidate.returns.as_ref().ok_or_else(|| CheckError::Precondition {
            pool_kind,
            detail: format!("return series for {} was not loaded", candidate.details.id),
        })?;

        let scope = SyncScope::new(candidate.details.region.clone(), pool_kind);
        if !self.cache.is_synced(&scope).await {
            return Err(CheckError::Precondition {
                pool_kind,
                detail: format!(
                    "no local {} baseline for region {}",
                    pool_kind, scope.region
                ),
            });
        }

        let baseline = self.cache.snapshot(&scope).await;
        Ok(self
            .engine
            .correlate_against(&candidate.details.id, returns, pool_kind, &baseline))
    }
}
