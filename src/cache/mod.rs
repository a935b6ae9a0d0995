pub mod store;

pub use store::{ReturnsCache, INDEX_CHECKPOINT};
