//! Correlation results shared by the remote service and the local engine

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::alpha::AlphaId;

/// Comparison pool a candidate is checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PoolKind {
    #[serde(rename = "prod")]
    Prod,
    #[serde(rename = "self")]
    SelfPool,
    #[serde(rename = "power-pool")]
    PowerPool,
}

impl PoolKind {
    pub const ALL: [PoolKind; 3] = [PoolKind::Prod, PoolKind::SelfPool, PoolKind::PowerPool];

    /// Path segment used by the correlation endpoints
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolKind::Prod => "prod",
            PoolKind::SelfPool => "self",
            PoolKind::PowerPool => "power-pool",
        }
    }

    /// Whether a local baseline can serve this pool
    pub fn supports_local(&self) -> bool {
        !matches!(self, PoolKind::Prod)
    }

    /// Parse a pool selection: a single pool, `both` (prod + self) or `all`
    pub fn parse_selection(selection: &str) -> Result<Vec<PoolKind>, String> {
        match selection.trim() {
            "both" => Ok(vec![PoolKind::Prod, PoolKind::SelfPool]),
            "all" => Ok(PoolKind::ALL.to_vec()),
            other => other
                .split(',')
                .map(|s| s.trim().parse::<PoolKind>())
                .collect(),
        }
    }
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PoolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "prod" => Ok(PoolKind::Prod),
            "self" => Ok(PoolKind::SelfPool),
            "power-pool" | "power_pool" | "powerpool" => Ok(PoolKind::PowerPool),
            other => Err(format!(
                "unknown pool kind '{}', expected prod, self or power-pool",
                other
            )),
        }
    }
}

/// One counterpart alpha and its correlation with the candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationRecord {
    pub counterpart_id: AlphaId,
    pub counterpart_name: Option<String>,
    pub correlation: f64,
    pub sharpe: Option<f64>,
    pub returns: Option<f64>,
    pub turnover: Option<f64>,
    pub fitness: Option<f64>,
    pub margin: Option<f64>,
}

/// Correlation of one candidate against one pool.
///
/// `max`/`min` of `None` means the pool holds no comparable alphas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationResult {
    pub pool_kind: PoolKind,
    pub max: Option<f64>,
    pub min: Option<f64>,
    pub records: Vec<CorrelationRecord>,
}

impl CorrelationResult {
    pub fn empty(pool_kind: PoolKind) -> Self {
        Self {
            pool_kind,
            max: None,
            min: None,
            records: Vec::new(),
        }
    }

    /// Counterpart achieving the maximum correlation.
    ///
    /// Ties resolve to the first record in source order. When no record carries
    /// exactly `max` the highest-correlated record is used instead.
    pub fn top_counterpart(&self) -> Option<&CorrelationRecord> {
        let max = self.max?;
        self.records
            .iter()
            .find(|r| r.correlation == max)
            .or_else(|| {
                self.records.iter().fold(None, |best: Option<&CorrelationRecord>, r| match best {
                    Some(b) if b.correlation >= r.correlation => Some(b),
                    _ => Some(r),
                })
            })
    }
}

/// Symmetric pairwise correlation matrix between batch candidates.
///
/// Diagonal cells and undefined pairs are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub ids: Vec<AlphaId>,
    pub values: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    pub fn new(ids: Vec<AlphaId>) -> Self {
        let n = ids.len();
        Self {
            ids,
            values: vec![vec![None; n]; n],
        }
    }

    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        self.values.get(i).and_then(|row| row.get(j)).copied().flatten()
    }

    pub fn between(&self, a: &AlphaId, b: &AlphaId) -> Option<f64> {
        let i = self.ids.iter().position(|id| id == a)?;
        let j = self.ids.iter().position(|id| id == b)?;
        self.get(i, j)
    }

    /// Pairs whose correlation exceeds `threshold`, upper triangle only
    pub fn conflicts(&self, threshold: f64) -> Vec<(AlphaId, AlphaId, f64)> {
        let mut out = Vec::new();
        for i in 0..self.ids.len() {
            for j in (i + 1)..self.ids.len() {
                if let Some(c) = self.get(i, j) {
                    if c > threshold {
                        out.push((self.ids[i].clone(), self.ids[j].clone(), c));
                    }
                }
            }
        }
        out
    }
}
