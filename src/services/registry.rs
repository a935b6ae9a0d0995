//! Collaborator interfaces for the alpha registry and the correlation service.

use async_trait::async_trait;

use crate::core::poller::{OperationPayload, PollState};
use crate::error::ServiceError;
use crate::models::{
    AlphaDetails, AlphaId, CheckResult, CorrelationResult, PoolKind, ReadinessReport,
    ReturnSeries, SyncScope,
};

/// One page of the accepted-alpha roster
#[derive(Debug, Clone, Default)]
pub struct RosterPage {
    /// Total rows across all pages
    pub total: usize,
    pub alphas: Vec<AlphaDetails>,
}

#[async_trait]
pub trait AlphaRegistry: Send + Sync {
    /// Accepted alphas visible for `scope`, starting at `offset`.
    ///
    /// The listing may include alphas outside the scope; callers filter.
    async fn list_accepted(
        &self,
        scope: &SyncScope,
        offset: usize,
        limit: usize,
    ) -> Result<RosterPage, ServiceError>;

    async fn alpha_details(&self, alpha_id: &AlphaId) -> Result<AlphaDetails, ServiceError>;

    /// One poll of the daily returns of an alpha
    async fn poll_daily_returns(
        &self,
        alpha_id: &AlphaId,
    ) -> Result<PollState<ReturnSeries>, ServiceError>;
}

#[async_trait]
pub trait CorrelationService: Send + Sync {
    /// One poll of the platform correlation check for a pool
    async fn poll_correlation(
        &self,
        alpha_id: &AlphaId,
        pool_kind: PoolKind,
    ) -> Result<PollState<CorrelationResult>, ServiceError>;

    /// One poll of the platform pre-submission checks
    async fn poll_readiness(
        &self,
        alpha_id: &AlphaId,
    ) -> Result<PollState<ReadinessReport>, ServiceError>;
}

impl OperationPayload for ReturnSeries {}

impl OperationPayload for CorrelationResult {}

impl OperationPayload for ReadinessReport {
    /// A check that resolved to ERROR means the evaluation itself broke
    fn failure(&self) -> Option<String> {
        let errored: Vec<&str> = self
            .checks
            .iter()
            .filter(|c| c.result == CheckResult::Error)
            .map(|c| c.name.as_str())
            .collect();
        if errored.is_empty() {
            None
        } else {
            Some(format!(
                "checks for {} resolved to an error: {}",
                self.alpha_id,
                errored.join(", ")
            ))
        }
    }
}
