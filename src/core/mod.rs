//! Core application primitives (polling, HTTP surface, wiring)

pub mod bootstrap;
pub mod http;
pub mod poller;

pub use http::*;
pub use poller::{OperationPayload, PollError, PollOutcome, PollState, Poller, PollerConfig};
