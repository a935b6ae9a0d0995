//! Wire types for the BRAIN REST API

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ServiceError;
use crate::models::{
    AlphaDetails, AlphaId, AlphaStats, CheckResult, CorrelationRecord, CorrelationResult,
    PoolKind, ReadinessCheck, ReadinessReport, ReturnPoint, ReturnSeries,
};

/// Column layout of correlation records when the response carries no schema
const DEFAULT_CORRELATION_COLUMNS: [&str; 11] = [
    "id",
    "name",
    "instrumentType",
    "region",
    "universe",
    "correlation",
    "sharpe",
    "returns",
    "turnover",
    "fitness",
    "margin",
];

#[derive(Debug, Clone, Deserialize)]
pub struct SchemaProperty {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordSchema {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub properties: Vec<SchemaProperty>,
}

impl RecordSchema {
    fn column(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|p| p.name == name)
    }
}

/// Row lookup by column name
struct Columns<'a> {
    schema: Option<&'a RecordSchema>,
}

impl Columns<'_> {
    fn index(&self, name: &str) -> Option<usize> {
        match self.schema {
            Some(schema) => schema.column(name),
            None => DEFAULT_CORRELATION_COLUMNS.iter().position(|c| *c == name),
        }
    }

    fn get<'r>(&self, row: &'r [Value], name: &str) -> Option<&'r Value> {
        self.index(name).and_then(|i| row.get(i)).filter(|v| !v.is_null())
    }

    fn f64(&self, row: &[Value], name: &str) -> Option<f64> {
        self.get(row, name).and_then(Value::as_f64)
    }

    fn string(&self, row: &[Value], name: &str) -> Option<String> {
        self.get(row, name).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// Response of `/alphas/{id}/correlations/{pool}`
#[derive(Debug, Clone, Deserialize)]
pub struct CorrelationPayload {
    #[serde(default)]
    pub schema: Option<RecordSchema>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub records: Vec<Vec<Value>>,
}

impl CorrelationPayload {
    pub fn into_result(self, pool_kind: PoolKind) -> CorrelationResult {
        // Production rows are histogram buckets, not alphas
        let records = if pool_kind == PoolKind::Prod {
            Vec::new()
        } else {
            let columns = Columns {
                schema: self.schema.as_ref(),
            };
            self.records
                .iter()
                .filter_map(|row| {
                    Some(CorrelationRecord {
                        counterpart_id: AlphaId::new(
                            columns
                                .string(row, "id")
                                .or_else(|| columns.string(row, "alphaId"))?,
                        ),
                        counterpart_name: columns.string(row, "name"),
                        correlation: columns.f64(row, "correlation")?,
                        sharpe: columns.f64(row, "sharpe"),
                        returns: columns.f64(row, "returns"),
                        turnover: columns.f64(row, "turnover"),
                        fitness: columns.f64(row, "fitness"),
                        margin: columns.f64(row, "margin"),
                    })
                })
                .collect()
        };

        CorrelationResult {
            pool_kind,
            max: self.max,
            min: self.min,
            records,
        }
    }
}

/// Response of `/alphas/{id}/recordsets/daily-pnl`
#[derive(Debug, Clone, Deserialize)]
pub struct RecordSetPayload {
    pub schema: RecordSchema,
    #[serde(default)]
    pub records: Vec<Vec<Value>>,
}

impl RecordSetPayload {
    /// Decode `date`/`pnl` rows; rows without a value are skipped
    pub fn into_series(self, endpoint: &str) -> Result<ReturnSeries, ServiceError> {
        let invalid = |detail: String| ServiceError::InvalidResponse {
            endpoint: endpoint.to_string(),
            detail,
        };

        let date_col = self
            .schema
            .column("date")
            .ok_or_else(|| invalid("recordset has no date column".to_string()))?;
        let value_col = self
            .schema
            .column("pnl")
            .ok_or_else(|| invalid("recordset has no pnl column".to_string()))?;

        let mut points = Vec::with_capacity(self.records.len());
        for row in &self.records {
            let Some(value) = row.get(value_col).and_then(Value::as_f64) else {
                continue;
            };
            let raw_date = row
                .get(date_col)
                .and_then(Value::as_str)
                .ok_or_else(|| invalid(format!("row without date: {:?}", row)))?;
            let date = NaiveDate::parse_from_str(raw_date.get(..10).unwrap_or(raw_date), "%Y-%m-%d")
                .map_err(|e| invalid(format!("bad date '{}': {}", raw_date, e)))?;
            points.push(ReturnPoint::new(date, value));
        }

        ReturnSeries::new(points).map_err(|e| invalid(e.to_string()))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlphaSettings {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub universe: Option<String>,
    #[serde(default)]
    pub instrument_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckPayload {
    pub name: String,
    pub result: CheckResult,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub limit: Option<Value>,
}

impl CheckPayload {
    fn into_check(self) -> ReadinessCheck {
        ReadinessCheck {
            name: self.name,
            result: self.result,
            value: self.value.as_ref().and_then(Value::as_f64),
            limit: self.limit.as_ref().and_then(Value::as_f64),
        }
    }
}

/// In-sample block of an alpha
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InSample {
    #[serde(default)]
    pub sharpe: Option<f64>,
    #[serde(default)]
    pub fitness: Option<f64>,
    #[serde(default)]
    pub returns: Option<f64>,
    #[serde(default)]
    pub turnover: Option<f64>,
    #[serde(default)]
    pub margin: Option<f64>,
    #[serde(default)]
    pub checks: Vec<CheckPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Classification {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlphaPayload {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub settings: AlphaSettings,
    #[serde(rename = "is", default)]
    pub in_sample: Option<InSample>,
    #[serde(default)]
    pub classifications: Vec<Classification>,
}

impl AlphaPayload {
    pub fn is_power_pool(&self) -> bool {
        self.classifications
            .iter()
            .any(|c| c.id.to_ascii_uppercase().contains("POWER_POOL"))
    }

    pub fn into_details(self) -> AlphaDetails {
        let is_power_pool = self.is_power_pool();
        let stats = self
            .in_sample
            .map(|is| AlphaStats {
                sharpe: is.sharpe,
                fitness: is.fitness,
                returns: is.returns,
                turnover: is.turnover,
                margin: is.margin,
            })
            .unwrap_or_default();

        AlphaDetails {
            id: AlphaId::new(self.id),
            name: self.name,
            region: self.settings.region.unwrap_or_default(),
            universe: self.settings.universe,
            instrument_type: self.settings.instrument_type,
            is_power_pool,
            stats,
        }
    }
}

/// Response of `/users/self/alphas`
#[derive(Debug, Clone, Deserialize)]
pub struct AlphaPage {
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub results: Vec<AlphaPayload>,
}

/// Response of `/alphas/{id}/check`
#[derive(Debug, Clone, Deserialize)]
pub struct CheckResponse {
    #[serde(rename = "is", default)]
    pub in_sample: Option<InSample>,
}

impl CheckResponse {
    pub fn into_report(self, alpha_id: &AlphaId, rejected: bool) -> ReadinessReport {
        let checks = self
            .in_sample
            .map(|is| is.checks.into_iter().map(CheckPayload::into_check).collect())
            .unwrap_or_default();
        ReadinessReport {
            alpha_id: alpha_id.clone(),
            checks,
            rejected,
        }
    }
}
