use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;

use crate::sync::SyncConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database_url: String,
    pub rpc_url: String,
    /// Client-side timeout for a single RPC call (ms)
    pub rpc_timeout: u64,
    pub start_height: Option<u64>,
    pub batch_size: u64,
    /// Delay between two sync runs (ms)
    pub sync_interval: u64,
    pub db_max_connections: u32,
    pub startup_retry_delay: u64,
    pub startup_max_retries: u32,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        let _ = dotenv::dotenv();

        let database_url = env::var("DATABASE_URL")
            .context("DATABASE_URL must be set")?;

        let rpc_url = env::var("RPC_URL")
            .context("RPC_URL must be set")?;

        let rpc_timeout = env::var("RPC_TIMEOUT")
            .unwrap_or_else(|_| "10000".to_string())
            .parse()
            .context("RPC_TIMEOUT must be a valid number")?;

        let start_height = match env::var("START_HEIGHT") {
            Ok(value) if !value.trim().is_empty() => Some(
                value
                    .trim()
                    .parse()
                    .context("START_HEIGHT must be a valid number")?,
            ),
            _ => None,
        };

        let batch_size: u64 = env::var("BATCH_SIZE")
            .unwrap_or_else(|_| "50".to_string())
            .parse()
            .context("BATCH_SIZE must be a valid number")?;
        if batch_size == 0 {
            anyhow::bail!("BATCH_SIZE must be greater than zero");
        }

        let sync_interval = env::var("SYNC_INTERVAL")
            .unwrap_or_else(|_| "1000".to_string())
            .parse()
            .context("SYNC_INTERVAL must be a valid number")?;

        let db_max_connections = env::var("DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "20".to_string())
            .parse()
            .context("DB_MAX_CONNECTIONS must be a valid number")?;

        let startup_retry_delay = env::var("STARTUP_RETRY_DELAY")
            .unwrap_or_else(|_| "1000".to_string())
            .parse()
            .context("STARTUP_RETRY_DELAY must be a valid number")?;

        let startup_max_retries = env::var("STARTUP_MAX_RETRIES")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .context("STARTUP_MAX_RETRIES must be a valid number")?;

        Ok(Config {
            database_url,
            rpc_url,
            rpc_timeout,
            start_height,
            batch_size,
            sync_interval,
            db_max_connections,
            startup_retry_delay,
            startup_max_retries,
        })
    }

    /// The subset of settings handed to the sync pipeline
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            batch_size: self.batch_size,
            start_height: self.start_height,
        }
    }
}
