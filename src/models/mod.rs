//! Shared data models spanning the engine layers.

pub mod alpha;
pub mod correlation;
pub mod readiness;
pub mod verdict;

pub use alpha::{
    AlphaDetails, AlphaId, AlphaStats, CachedAlphaEntry, ReturnPoint, ReturnSeries, SyncScope,
};
pub use correlation::{CorrelationMatrix, CorrelationRecord, CorrelationResult, PoolKind};
pub use readiness::{CheckResult, ReadinessCheck, ReadinessReport};
pub use verdict::{CandidateStats, SubmissionReport, SubmissionVerdict};
