//! Typed access to the node's JSON-RPC interface.

mod client;
mod error;
pub mod types;

pub use client::RpcClient;
pub use error::RpcError;
pub use types::{
    Block, ChunkDetails, ChunkHeader, GenesisConfig, Kickout, KickoutReason, TransactionDetails,
    Validator, ValidatorSet,
};

use async_trait::async_trait;

/// Chain data source consumed by the sync pipeline
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Latest final block
    async fn current_tip(&self) -> Result<Block, RpcError>;

    /// Block at `height`; `RpcError::Missing`/`RpcError::NotFound` when the
    /// node has no block there
    async fn block_by_height(&self, height: u64) -> Result<Block, RpcError>;

    async fn chunk(&self, hash: &str) -> Result<ChunkDetails, RpcError>;

    /// Transaction outcome; the node needs the signer to route the query
    async fn transaction(&self, hash: &str, sender: &str)
        -> Result<TransactionDetails, RpcError>;

    /// Validator set of the epoch containing `height`
    async fn validators_by_height(&self, height: u64) -> Result<ValidatorSet, RpcError>;

    async fn genesis_config(&self) -> Result<GenesisConfig, RpcError>;
}
