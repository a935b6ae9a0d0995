pub mod brain;
pub mod registry;

pub use brain::BrainClient;
pub use registry::{AlphaRegistry, CorrelationService, RosterPage};
