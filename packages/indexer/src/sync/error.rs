use thiserror::Error;

use crate::rpc::RpcError;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Database error: {0:#}")]
    Database(#[from] anyhow::Error),

    /// Malformed chain data; never skipped silently
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Height {height} failed: {source}")]
    Height {
        height: u64,
        #[source]
        source: Box<SyncError>,
    },

    #[error("Worker failed: {0}")]
    Join(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl SyncError {
    pub fn at_height(height: u64, source: SyncError) -> Self {
        match source {
            // Keep the innermost height
            SyncError::Height { .. } => source,
            other => SyncError::Height {
                height,
                source: Box::new(other),
            },
        }
    }

    /// Height the failure is attributable to, if any
    pub fn height(&self) -> Option<u64> {
        match self {
            SyncError::Height { height, .. } => Some(*height),
            _ => None,
        }
    }
}

/// Failed run as seen by the caller
#[derive(Error, Debug)]
#[error("{error}")]
pub struct RunError {
    pub error: SyncError,
    /// Distance from the tip to the last committed block; `None` when the
    /// run failed before the tip was known
    pub lag: Option<u64>,
}

impl RunError {
    pub fn height(&self) -> Option<u64> {
        self.error.height()
    }
}
