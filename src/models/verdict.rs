//! Pass/fail verdicts produced by the correlation gate

use serde::{Deserialize, Serialize};

use crate::models::alpha::AlphaId;
use crate::models::correlation::{CorrelationRecord, PoolKind};

/// Candidate performance used by the power-pool override
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateStats {
    pub alpha_id: AlphaId,
    pub sharpe: Option<f64>,
}

/// Decision for one candidate against one pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionVerdict {
    pub alpha_id: AlphaId,
    pub pool_kind: PoolKind,
    pub passed: bool,
    pub reason: String,
    pub max_correlation: Option<f64>,
    pub threshold: f64,
    pub override_applied: bool,
    /// Counterpart compared against when the override was evaluated
    pub counterpart: Option<AlphaId>,
    pub required_sharpe: Option<f64>,
    pub count: usize,
    pub top_correlations: Vec<CorrelationRecord>,
}

impl SubmissionVerdict {
    pub fn status(&self) -> &'static str {
        if self.passed {
            "PASS"
        } else {
            "FAIL"
        }
    }
}

/// Verdicts for one candidate across several pools
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionReport {
    pub alpha_id: AlphaId,
    pub verdicts: Vec<SubmissionVerdict>,
    pub all_passed: bool,
}

impl SubmissionReport {
    pub fn new(alpha_id: AlphaId, verdicts: Vec<SubmissionVerdict>) -> Self {
        let all_passed = verdicts.iter().all(|v| v.passed);
        Self {
            alpha_id,
            verdicts,
            all_passed,
        }
    }
}
