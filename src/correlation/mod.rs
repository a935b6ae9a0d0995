//! Correlation computation and the submission gate

pub mod engine;
pub mod gate;
pub mod pearson;
pub mod source;

pub use engine::{CorrelationEngine, EngineConfig};
pub use gate::{CorrelationGate, GateConfig};
pub use source::{
    Candidate, CorrelationSource, LocalCorrelationSource, RemoteCorrelationSource, SourceKind,
};
