use thiserror::Error;

#[derive(Error, Debug)]
pub enum RpcError {
    /// The node knows the height but no longer (or never) stored its data
    #[error("Missing data: {0}")]
    Missing(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status} from {method}")]
    Status { method: String, status: u16 },

    #[error("JSON-RPC error in {method}: {name}/{cause}: {message}")]
    Rpc {
        method: String,
        name: String,
        cause: String,
        message: String,
    },

    #[error("Failed to decode {method} response: {source}")]
    Decode {
        method: String,
        #[source]
        source: serde_json::Error,
    },
}

impl RpcError {
    /// True when the height has no block and can be skipped
    pub fn is_missing(&self) -> bool {
        matches!(self, RpcError::Missing(_) | RpcError::NotFound(_))
    }
}
