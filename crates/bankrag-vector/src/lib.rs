//! LanceDB-backed vector index with atomic generation swaps.

pub mod manager;
pub mod reader;
pub mod schema;
pub mod search;
pub mod snapshot;
pub mod table;
pub mod writer;

pub use manager::{BuildReport, IndexManager, IndexStats, ValidityReport};
pub use snapshot::{ActivePointer, IndexSnapshot, ScoredRecord};
