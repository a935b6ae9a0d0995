pub mod orchestrator;

pub use orchestrator::{BatchEntry, BatchReport, CheckerConfig, SubmissionChecker};
