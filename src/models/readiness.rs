//! Platform submission checks reported for a single alpha

use serde::{Deserialize, Serialize};

use crate::models::alpha::AlphaId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckResult {
    Pass,
    Fail,
    Warning,
    Pending,
    Error,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessCheck {
    pub name: String,
    pub result: CheckResult,
    pub value: Option<f64>,
    pub limit: Option<f64>,
}

/// Outcome of the platform's own pre-submission checks.
///
/// `rejected` is set when the platform resolved the checks with failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessReport {
    pub alpha_id: AlphaId,
    pub checks: Vec<ReadinessCheck>,
    pub rejected: bool,
}

impl ReadinessReport {
    pub fn failing(&self) -> impl Iterator<Item = &ReadinessCheck> {
        self.checks.iter().filter(|c| c.result == CheckResult::Fail)
    }

    pub fn passed(&self) -> bool {
        !self.rejected
            && self
                .checks
                .iter()
                .all(|c| matches!(c.result, CheckResult::Pass | CheckResult::Warning))
    }
}
