mod analyzer;
mod error;
mod fetcher;
mod manager;
mod parser;
mod payload;
mod persistor;

pub use error::{RunError, SyncError};
pub use manager::SyncManager;

/// Settings the pipeline needs, passed in by the binary
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Heights fetched per run
    pub batch_size: u64,
    /// First height to index when the store is empty; genesis otherwise
    pub start_height: Option<u64>,
}
