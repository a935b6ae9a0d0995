//! BRAIN platform integration

pub mod client;
pub mod messages;

pub use client::{BrainClient, DEFAULT_BASE_URL};
