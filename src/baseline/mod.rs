pub mod sync;

pub use sync::{BaselineSynchronizer, SyncConfig, SyncFailure, SyncReport};
