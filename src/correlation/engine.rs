//! Local correlation of candidate returns against a cached baseline

use chrono::{Datelike, NaiveDate};
use std::sync::Arc;
use tracing::debug;

use crate::correlation::pearson::{align, pearson, round4};
use crate::models::{
    AlphaId, CachedAlphaEntry, CorrelationMatrix, CorrelationRecord, CorrelationResult, PoolKind,
    ReturnPoint, ReturnSeries,
};

/// Default minimum number of common trading days for a defined correlation
pub const DEFAULT_MIN_OVERLAP: usize = 30;
pub const DEFAULT_LOOKBACK_YEARS: u32 = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub min_overlap: usize,
    /// Trailing window, in calendar years, both series are trimmed to.
    /// `None` keeps the full history.
    pub lookback_years: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_overlap: DEFAULT_MIN_OVERLAP,
            lookback_years: Some(DEFAULT_LOOKBACK_YEARS),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CorrelationEngine {
    config: EngineConfig,
}

impl CorrelationEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start of the lookback window for a series ending on `last`.
    ///
    /// The window starts on January 1st. A series ending in the second half
    /// of a year counts that year as complete.
    pub fn lookback_cutoff(&self, last: NaiveDate) -> Option<NaiveDate> {
        let years = self.config.lookback_years? as i32;
        let anchor_year = if last.month() >= 7 {
            last.year() + 1
        } else {
            last.year()
        };
        NaiveDate::from_ymd_opt(anchor_year - years, 1, 1)
    }

    fn window<'a>(&self, series: &'a ReturnSeries, cutoff: Option<NaiveDate>) -> &'a [ReturnPoint] {
        match cutoff {
            Some(cutoff) => series.since(cutoff),
            None => series.points(),
        }
    }

    fn correlate_window(
        &self,
        a: &ReturnSeries,
        b: &ReturnSeries,
        cutoff: Option<NaiveDate>,
    ) -> Option<f64> {
        let (xs, ys) = align(self.window(a, cutoff), self.window(b, cutoff));
        if xs.len() < self.config.min_overlap.max(2) {
            return None;
        }
        pearson(&xs, &ys)
    }

    /// Correlation of two series over the candidate's lookback window.
    ///
    /// `None` when the overlap is too short or either side is constant.
    pub fn correlate(&self, candidate: &ReturnSeries, other: &ReturnSeries) -> Option<f64> {
        let cutoff = candidate.last_date().and_then(|d| self.lookback_cutoff(d));
        self.correlate_window(candidate, other, cutoff)
    }

    /// Correlate a candidate against every baseline entry of one pool.
    ///
    /// The candidate's own entry is skipped. Records are rounded to four
    /// decimals and ordered by descending correlation; equal correlations keep
    /// baseline order.
    pub fn correlate_against(
        &self,
        candidate_id: &AlphaId,
        candidate: &ReturnSeries,
        pool_kind: PoolKind,
        baseline: &[Arc<CachedAlphaEntry>],
    ) -> CorrelationResult {
        let cutoff = candidate.last_date().and_then(|d| self.lookback_cutoff(d));

        let mut records: Vec<CorrelationRecord> = baseline
            .iter()
            .filter(|entry| &entry.id != candidate_id)
            .filter_map(|entry| {
                let correlation = self.correlate_window(candidate, &entry.series, cutoff)?;
                Some(CorrelationRecord {
                    counterpart_id: entry.id.clone(),
                    counterpart_name: entry.name.clone(),
                    correlation: round4(correlation),
                    sharpe: entry.stats.sharpe,
                    returns: entry.stats.returns,
                    turnover: entry.stats.turnover,
                    fitness: entry.stats.fitness,
                    margin: entry.stats.margin,
                })
            })
            .collect();

        records.sort_by(|a, b| b.correlation.total_cmp(&a.correlation));

        debug!(
            alpha_id = %candidate_id,
            pool_kind = %pool_kind,
            baseline = baseline.len(),
            defined = records.len(),
            "CorrelationEngine: correlated {} against {} {} alphas",
            candidate_id,
            baseline.len(),
            pool_kind
        );

        CorrelationResult {
            pool_kind,
            max: records.first().map(|r| r.correlation),
            min: records.last().map(|r| r.correlation),
            records,
        }
    }

    /// Pairwise correlations between batch candidates.
    ///
    /// All pairs share one lookback window anchored on the latest date in
    /// the batch. Only the upper triangle is computed and then mirrored; a
    /// pair naming the same alpha twice stays empty.
    pub fn correlate_batch(&self, candidates: &[(AlphaId, ReturnSeries)]) -> CorrelationMatrix {
        let ids = candidates.iter().map(|(id, _)| id.clone()).collect();
        let mut matrix = CorrelationMatrix::new(ids);

        let cutoff = candidates
            .iter()
            .filter_map(|(_, s)| s.last_date())
            .max()
            .and_then(|d| self.lookback_cutoff(d));

        for i in 0..candidates.len() {
            for j in (i + 1)..candidates.len() {
                if candidates[i].0 == candidates[j].0 {
                    continue;
                }
                let value = self
                    .correlate_window(&candidates[i].1, &candidates[j].1, cutoff)
                    .map(round4);
                matrix.values[i][j] = value;
                matrix.values[j][i] = value;
            }
        }

        matrix
    }
}
