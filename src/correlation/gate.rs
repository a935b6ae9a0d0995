//! Pass/fail decision on a correlation result

use tracing::info;

use crate::correlation::pearson::round4;
use crate::models::{CandidateStats, CorrelationResult, PoolKind, SubmissionVerdict};

/// Records attached to a verdict for context
const TOP_RECORDS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct GateConfig {
    pub prod_threshold: f64,
    pub self_threshold: f64,
    pub power_pool_threshold: f64,
    /// Sharpe multiple over the top counterpart that lets a power-pool
    /// candidate pass despite exceeding the threshold
    pub override_ratio: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            prod_threshold: 0.7,
            self_threshold: 0.7,
            power_pool_threshold: 0.5,
            override_ratio: 1.1,
        }
    }
}

impl GateConfig {
    pub fn threshold(&self, pool_kind: PoolKind) -> f64 {
        match pool_kind {
            PoolKind::Prod => self.prod_threshold,
            PoolKind::SelfPool => self.self_threshold,
            PoolKind::PowerPool => self.power_pool_threshold,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CorrelationGate {
    config: GateConfig,
}

impl CorrelationGate {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn evaluate(
        &self,
        pool_kind: PoolKind,
        result: &CorrelationResult,
        candidate: &CandidateStats,
    ) -> SubmissionVerdict {
        let threshold = self.config.threshold(pool_kind);
        let mut verdict = SubmissionVerdict {
            alpha_id: candidate.alpha_id.clone(),
            pool_kind,
            passed: false,
            reason: String::new(),
            max_correlation: result.max,
            threshold,
            override_applied: false,
            counterpart: None,
            required_sharpe: None,
            count: result.records.len(),
            top_correlations: result.records.iter().take(TOP_RECORDS).cloned().collect(),
        };

        match result.max {
            None => {
                verdict.passed = true;
                verdict.reason = "no correlated alphas in pool".to_string();
            }
            Some(max) if max <= threshold => {
                verdict.passed = true;
                verdict.reason = format!("max correlation {} <= threshold {}", max, threshold);
            }
            Some(max) if pool_kind != PoolKind::PowerPool => {
                verdict.reason = format!("max correlation {} exceeds threshold {}", max, threshold);
            }
            Some(max) => self.apply_override(&mut verdict, max, result, candidate),
        }

        info!(
            alpha_id = %verdict.alpha_id,
            pool_kind = %pool_kind,
            passed = verdict.passed,
            override_applied = verdict.override_applied,
            "CorrelationGate: {} {} - {}",
            verdict.status(),
            pool_kind,
            verdict.reason
        );

        verdict
    }

    /// Power-pool override against the counterpart holding the maximum.
    /// Missing sharpe on either side fails closed.
    fn apply_override(
        &self,
        verdict: &mut SubmissionVerdict,
        max: f64,
        result: &CorrelationResult,
        candidate: &CandidateStats,
    ) {
        verdict.override_applied = true;
        let exceeded = format!(
            "max correlation {} exceeds threshold {}",
            max, verdict.threshold
        );

        let Some(counterpart) = result.top_counterpart() else {
            verdict.reason = format!("{}; no counterpart record to evaluate the sharpe override", exceeded);
            return;
        };
        verdict.counterpart = Some(counterpart.counterpart_id.clone());

        let Some(counterpart_sharpe) = counterpart.sharpe else {
            verdict.reason = format!(
                "{}; counterpart {} has no sharpe, override cannot apply",
                exceeded, counterpart.counterpart_id
            );
            return;
        };

        let required = round4(self.config.override_ratio * counterpart_sharpe);
        verdict.required_sharpe = Some(required);

        let Some(sharpe) = candidate.sharpe else {
            verdict.reason = format!(
                "{}; candidate sharpe unknown, override needs >= {}",
                exceeded, required
            );
            return;
        };

        verdict.passed = sharpe >= required;
        let comparison = if verdict.passed { ">=" } else { "<" };
        verdict.reason = format!(
            "{} but sharpe {} {} {} ({} x {} sharpe {})",
            exceeded,
            sharpe,
            comparison,
            required,
            self.config.override_ratio,
            counterpart.counterpart_id,
            counterpart_sharpe
        );
    }
}
