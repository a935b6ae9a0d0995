//! Submission-readiness checks for alphas: correlation against production,
//! self and power-pool baselines, computed remotely or from a local cache.

pub mod baseline;
pub mod cache;
pub mod config;
pub mod core;
pub mod correlation;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod submission;
