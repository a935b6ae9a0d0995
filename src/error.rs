//! Error types for collaborators, the cache and submission checks

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::models::PoolKind;

/// Invalid return series
#[derive(Debug, Error, PartialEq)]
pub enum SeriesError {
    #[error("duplicate date {0} in return series")]
    DuplicateDate(NaiveDate),
}

/// Errors raised by remote collaborators (registry, correlation service)
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP {status} from {endpoint}: {body}")]
    Status {
        status: u16,
        endpoint: String,
        body: String,
    },

    #[error("{0} is permanently unavailable")]
    Gone(String),

    #[error("invalid response from {endpoint}: {detail}")]
    InvalidResponse { endpoint: String, detail: String },
}

impl ServiceError {
    /// Transport failures, throttling and server errors are worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Transport(_) => true,
            ServiceError::Status { status, .. } => *status == 429 || *status >= 500,
            ServiceError::Gone(_) | ServiceError::InvalidResponse { .. } => false,
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => ServiceError::Status {
                status: status.as_u16(),
                endpoint: e.url().map(|u| u.path().to_string()).unwrap_or_default(),
                body: e.to_string(),
            },
            None if e.is_decode() => ServiceError::InvalidResponse {
                endpoint: e.url().map(|u| u.path().to_string()).unwrap_or_default(),
                detail: e.to_string(),
            },
            None => ServiceError::Transport(e.to_string()),
        }
    }
}

/// Errors from the on-disk returns cache
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cache JSON error at {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Stage of a submission check at which an error surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Sync,
    Poll,
    Evaluate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Sync => "sync",
            Stage::Poll => "poll",
            Stage::Evaluate => "evaluate",
        })
    }
}

/// Errors surfaced to callers of the submission checker
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("{pool_kind} check precondition not met: {detail}")]
    Precondition { pool_kind: PoolKind, detail: String },

    #[error("{pool_kind} check failed during {stage}: {source}")]
    Service {
        pool_kind: PoolKind,
        stage: Stage,
        #[source]
        source: ServiceError,
    },

    #[error("{pool_kind} check rejected during {stage}: {detail}")]
    Rejected {
        pool_kind: PoolKind,
        stage: Stage,
        detail: String,
    },

    #[error("{pool_kind} check gave up during {stage} after {attempts} attempts, operation still pending; retry later")]
    BudgetExceeded {
        pool_kind: PoolKind,
        stage: Stage,
        attempts: u32,
    },

    #[error("{pool_kind} check could not use the local cache: {source}")]
    Cache {
        pool_kind: PoolKind,
        #[source]
        source: CacheError,
    },
}

impl CheckError {
    pub fn pool_kind(&self) -> PoolKind {
        match self {
            CheckError::Precondition { pool_kind, .. }
            | CheckError::Service { pool_kind, .. }
            | CheckError::Rejected { pool_kind, .. }
            | CheckError::BudgetExceeded { pool_kind, .. }
            | CheckError::Cache { pool_kind, .. } => *pool_kind,
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            CheckError::Precondition { .. } => Stage::Evaluate,
            CheckError::Service { stage, .. }
            | CheckError::Rejected { stage, .. }
            | CheckError::BudgetExceeded { stage, .. } => *stage,
            CheckError::Cache { .. } => Stage::Sync,
        }
    }

    /// Budget exhaustion means "try again later", not a rejection
    pub fn is_retryable(&self) -> bool {
        match self {
            CheckError::BudgetExceeded { .. } => true,
            CheckError::Service { source, .. } => source.is_transient(),
            _ => false,
        }
    }
}
