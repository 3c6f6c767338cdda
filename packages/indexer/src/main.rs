use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod config;
mod db;
mod models;
mod rpc;
mod sync;
#[cfg(test)]
mod testing;
mod utils;

use config::Config;
use db::Database;
use rpc::RpcClient;
use sync::SyncManager;
use utils::retry::{with_retry, RetryPolicy};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    utils::logger::init_logger();
    info!("Starting NEAR indexer");

    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;
    utils::config_logger::log_config(&config);

    // Initialize database connection
    let policy = RetryPolicy::new(config.startup_retry_delay, config.startup_max_retries);
    let db = with_retry(
        || Database::new(&config.database_url, config.db_max_connections),
        policy,
        "connect to database",
    )
    .await?
    .migrate()
    .await?;
    info!("Database connection established and migrations applied");

    let client = RpcClient::new(
        config.rpc_url.clone(),
        Duration::from_millis(config.rpc_timeout),
    )
    .context("Failed to create RPC client")?;

    let sync_manager = SyncManager::new(Arc::new(client), Arc::new(db), config.sync_config())?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
        signal.cancel();
    });

    let mut ticker = interval(Duration::from_millis(config.sync_interval));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                // A failed run is replayed from its failing height on the next tick
                if let Err(e) = sync_manager.run_sync().await {
                    warn!("Sync run failed: {} (lag {:?})", e, e.lag);
                }
            }
        }
    }

    info!("Indexer shutdown gracefully");
    Ok(())
}
