//! Alpha identity, return series and cached baseline entries

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SeriesError;
use crate::models::correlation::PoolKind;

/// Opaque identifier assigned to an alpha by the registry
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlphaId(String);

impl AlphaId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AlphaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AlphaId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for AlphaId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One trading day of returns
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReturnPoint {
    pub date: NaiveDate,
    pub value: f64,
}

impl ReturnPoint {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }
}

/// Daily return series with strictly increasing dates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ReturnPoint>", into = "Vec<ReturnPoint>")]
pub struct ReturnSeries {
    points: Vec<ReturnPoint>,
}

impl ReturnSeries {
    /// Build a series, sorting by date. Duplicate dates are rejected.
    pub fn new(mut points: Vec<ReturnPoint>) -> Result<Self, SeriesError> {
        points.sort_by_key(|p| p.date);
        if let Some(pair) = points.windows(2).find(|w| w[0].date == w[1].date) {
            return Err(SeriesError::DuplicateDate(pair[0].date));
        }
        Ok(Self { points })
    }

    pub fn from_pairs<I>(pairs: I) -> Result<Self, SeriesError>
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(date, value)| ReturnPoint::new(date, value))
                .collect(),
        )
    }

    pub fn points(&self) -> &[ReturnPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    /// Points on or after `cutoff`
    pub fn since(&self, cutoff: NaiveDate) -> &[ReturnPoint] {
        let start = self.points.partition_point(|p| p.date < cutoff);
        &self.points[start..]
    }
}

impl TryFrom<Vec<ReturnPoint>> for ReturnSeries {
    type Error = SeriesError;

    fn try_from(points: Vec<ReturnPoint>) -> Result<Self, Self::Error> {
        Self::new(points)
    }
}

impl From<ReturnSeries> for Vec<ReturnPoint> {
    fn from(series: ReturnSeries) -> Self {
        series.points
    }
}

/// In-sample performance statistics reported by the registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AlphaStats {
    pub sharpe: Option<f64>,
    pub fitness: Option<f64>,
    pub returns: Option<f64>,
    pub turnover: Option<f64>,
    pub margin: Option<f64>,
}

/// Registry view of an alpha (roster row or detail lookup)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlphaDetails {
    pub id: AlphaId,
    pub name: Option<String>,
    pub region: String,
    pub universe: Option<String>,
    pub instrument_type: Option<String>,
    pub is_power_pool: bool,
    pub stats: AlphaStats,
}

/// Baseline entry: registry metadata plus the full return series.
///
/// Entries are immutable once built; the cache replaces them wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedAlphaEntry {
    pub id: AlphaId,
    pub name: Option<String>,
    pub region: String,
    pub universe: Option<String>,
    pub instrument_type: Option<String>,
    pub is_power_pool: bool,
    pub is_self: bool,
    pub stats: AlphaStats,
    pub series: ReturnSeries,
}

impl CachedAlphaEntry {
    pub fn from_details(details: &AlphaDetails, is_self: bool, series: ReturnSeries) -> Self {
        Self {
            id: details.id.clone(),
            name: details.name.clone(),
            region: details.region.clone(),
            universe: details.universe.clone(),
            instrument_type: details.instrument_type.clone(),
            is_power_pool: details.is_power_pool,
            is_self,
            stats: details.stats,
            series,
        }
    }

    /// Whether this entry belongs to the baseline of `pool_kind`.
    ///
    /// Self baselines exclude power-pool alphas; production alphas are never cached.
    pub fn in_pool(&self, pool_kind: PoolKind) -> bool {
        match pool_kind {
            PoolKind::Prod => false,
            PoolKind::SelfPool => self.is_self && !self.is_power_pool,
            PoolKind::PowerPool => self.is_power_pool,
        }
    }

    pub fn in_scope(&self, scope: &SyncScope) -> bool {
        self.region == scope.region && self.in_pool(scope.pool_kind)
    }
}

/// Region and pool a baseline sync covers
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SyncScope {
    pub region: String,
    pub pool_kind: PoolKind,
}

impl SyncScope {
    pub fn new(region: impl Into<String>, pool_kind: PoolKind) -> Self {
        Self {
            region: region.into(),
            pool_kind,
        }
    }

    /// Key used in the persisted index, e.g. `USA/power-pool`
    pub fn key(&self) -> String {
        format!("{}/{}", self.region, self.pool_kind)
    }
}

impl fmt::Display for SyncScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.region, self.pool_kind)
    }
}
