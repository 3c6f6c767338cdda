use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, instrument};

use super::types::{Block, ChunkDetails, GenesisConfig, TransactionDetails, ValidatorSet};
use super::{ChainClient, RpcError};

/// JSON-RPC 2.0 client over HTTP
pub struct RpcClient {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

#[derive(Deserialize)]
struct Response {
    result: Option<Value>,
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    cause: Option<ErrorCause>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ErrorCause {
    name: String,
}

impl RpcClient {
    pub fn new(url: String, timeout: Duration) -> Result<Self, RpcError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self.client.post(&self.url).json(&payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::Status {
                method: method.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        let response: Response = serde_json::from_slice(&body).map_err(|source| RpcError::Decode {
            method: method.to_string(),
            source,
        })?;

        if let Some(error) = response.error {
            return Err(classify_error(method, error));
        }

        let result = response.result.unwrap_or(Value::Null);
        serde_json::from_value(result).map_err(|source| RpcError::Decode {
            method: method.to_string(),
            source,
        })
    }
}

/// Map the node's error payload onto the missing / not found / hard error split
fn classify_error(method: &str, error: ErrorBody) -> RpcError {
    let cause = error
        .cause
        .map(|c| c.name)
        .unwrap_or_else(|| "UNKNOWN".to_string());
    let data = match &error.data {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };

    match cause.as_str() {
        "UNKNOWN_BLOCK" | "UNKNOWN_CHUNK" | "UNKNOWN_TRANSACTION" => {
            RpcError::NotFound(format!("{}: {}", method, cause))
        }
        "GARBAGE_COLLECTED_BLOCK" => RpcError::Missing(format!("{}: {}", method, cause)),
        _ if data.contains("DB Not Found") || error.message.contains("DB Not Found") => {
            RpcError::Missing(format!("{}: {}", method, data))
        }
        _ => RpcError::Rpc {
            method: method.to_string(),
            name: error.name.unwrap_or_default(),
            cause,
            message: if data.is_empty() { error.message } else { data },
        },
    }
}

#[async_trait]
impl ChainClient for RpcClient {
    #[instrument(skip(self))]
    async fn current_tip(&self) -> Result<Block, RpcError> {
        self.call("block", json!({ "finality": "final" })).await
    }

    #[instrument(skip(self))]
    async fn block_by_height(&self, height: u64) -> Result<Block, RpcError> {
        debug!("Fetching block {}", height);
        self.call("block", json!({ "block_id": height })).await
    }

    #[instrument(skip(self))]
    async fn chunk(&self, hash: &str) -> Result<ChunkDetails, RpcError> {
        self.call("chunk", json!({ "chunk_id": hash })).await
    }

    #[instrument(skip(self))]
    async fn transaction(
        &self,
        hash: &str,
        sender: &str,
    ) -> Result<TransactionDetails, RpcError> {
        self.call("tx", json!([hash, sender])).await
    }

    #[instrument(skip(self))]
    async fn validators_by_height(&self, height: u64) -> Result<ValidatorSet, RpcError> {
        self.call("validators", json!([height])).await
    }

    async fn genesis_config(&self) -> Result<GenesisConfig, RpcError> {
        self.call("EXPERIMENTAL_genesis_config", json!({})).await
    }
}
