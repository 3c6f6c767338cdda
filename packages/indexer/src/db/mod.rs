use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

use crate::models::{
    Account, Block, Epoch, Event, Height, RewardFee, Run, TimeBucket, Transaction, Validator,
    ValidatorAggregate, ValidatorEpoch,
};

mod accounts;
mod blocks;
mod epochs;
mod events;
mod migrations;
mod stats;
mod syncables;
mod transactions;
mod validators;

/// Persistence gateway used by the sync pipeline.
///
/// Lookups return `Ok(None)` when nothing matches. Every `import_*` call is
/// idempotent: replaying rows that are already stored never duplicates them.
/// Events are deduplicated on (scope, action, item, height, metadata).
#[async_trait]
pub trait Store: Send + Sync {
    async fn last_block(&self) -> Result<Option<Block>>;
    async fn last_block_in_epoch(&self, epoch: &str) -> Result<Option<Block>>;
    /// Highest stored block strictly below `height`
    async fn last_block_below(&self, height: u64) -> Result<Option<Block>>;
    /// Highest height whose indexing finished without error
    async fn last_indexed_height(&self) -> Result<Option<u64>>;
    /// Lowest height still marked as failed; the next run replays from it
    async fn lowest_failed_height(&self) -> Result<Option<u64>>;
    async fn reward_fees(&self) -> Result<HashMap<String, RewardFee>>;

    async fn import_blocks(&self, blocks: &[Block]) -> Result<()>;
    async fn import_epochs(&self, epochs: &[Epoch]) -> Result<()>;
    async fn import_transactions(&self, transactions: &[Transaction]) -> Result<()>;
    async fn import_validator_aggregates(&self, aggregates: &[ValidatorAggregate]) -> Result<()>;
    async fn import_validators(&self, validators: &[Validator]) -> Result<()>;
    async fn import_validator_epochs(&self, validator_epochs: &[ValidatorEpoch]) -> Result<()>;
    async fn import_accounts(&self, accounts: &[Account]) -> Result<()>;
    async fn create_event(&self, event: &Event) -> Result<()>;
    async fn import_events(&self, events: &[Event]) -> Result<()>;

    async fn refresh_block_stats(
        &self,
        bucket: TimeBucket,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<()>;
    async fn refresh_epoch_rollups(&self, epochs: &[String]) -> Result<()>;

    async fn create_run(&self) -> Result<Run>;
    async fn finish_run(&self, run: &Run) -> Result<()>;
    async fn record_heights(&self, heights: &[Height]) -> Result<()>;
}

pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(self) -> Result<Self> {
        info!("Running database migrations");
        migrations::run_migrations(&self.pool).await?;
        Ok(self)
    }
}

#[async_trait]
impl Store for Database {
    async fn last_block(&self) -> Result<Option<Block>> {
        blocks::last_block(&self.pool).await
    }

    async fn last_block_in_epoch(&self, epoch: &str) -> Result<Option<Block>> {
        blocks::last_block_in_epoch(&self.pool, epoch).await
    }

    async fn last_block_below(&self, height: u64) -> Result<Option<Block>> {
        blocks::last_block_below(&self.pool, height).await
    }

    async fn last_indexed_height(&self) -> Result<Option<u64>> {
        syncables::last_indexed_height(&self.pool).await
    }

    async fn lowest_failed_height(&self) -> Result<Option<u64>> {
        syncables::lowest_failed_height(&self.pool).await
    }

    async fn reward_fees(&self) -> Result<HashMap<String, RewardFee>> {
        validators::reward_fees(&self.pool).await
    }

    async fn import_blocks(&self, blocks: &[Block]) -> Result<()> {
        blocks::import_blocks(&self.pool, blocks).await
    }

    async fn import_epochs(&self, epochs: &[Epoch]) -> Result<()> {
        epochs::import_epochs(&self.pool, epochs).await
    }

    async fn import_transactions(&self, transactions: &[Transaction]) -> Result<()> {
        transactions::import_transactions(&self.pool, transactions).await
    }

    async fn import_validator_aggregates(&self, aggregates: &[ValidatorAggregate]) -> Result<()> {
        validators::import_aggregates(&self.pool, aggregates).await
    }

    async fn import_validators(&self, validators: &[Validator]) -> Result<()> {
        validators::import_validators(&self.pool, validators).await
    }

    async fn import_validator_epochs(&self, validator_epochs: &[ValidatorEpoch]) -> Result<()> {
        validators::import_validator_epochs(&self.pool, validator_epochs).await
    }

    async fn import_accounts(&self, accounts: &[Account]) -> Result<()> {
        accounts::import_accounts(&self.pool, accounts).await
    }

    async fn create_event(&self, event: &Event) -> Result<()> {
        events::create_event(&self.pool, event).await
    }

    async fn import_events(&self, events: &[Event]) -> Result<()> {
        events::import_events(&self.pool, events).await
    }

    async fn refresh_block_stats(
        &self,
        bucket: TimeBucket,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<()> {
        stats::refresh_block_stats(&self.pool, bucket, start, end).await
    }

    async fn refresh_epoch_rollups(&self, epochs: &[String]) -> Result<()> {
        epochs::refresh_rollups(&self.pool, epochs).await
    }

    async fn create_run(&self) -> Result<Run> {
        syncables::create_run(&self.pool).await
    }

    async fn finish_run(&self, run: &Run) -> Result<()> {
        syncables::finish_run(&self.pool, run).await
    }

    async fn record_heights(&self, heights: &[Height]) -> Result<()> {
        syncables::record_heights(&self.pool, heights).await
    }
}

/// Amounts are stored as NUMERIC and read back through `::text`
fn parse_amount(value: &str, field: &str) -> Result<u128> {
    value
        .parse()
        .with_context(|| format!("Failed to parse {} '{}'", field, value))
}

fn reward_fee_columns(fee: Option<RewardFee>) -> (Option<i32>, Option<i32>) {
    match fee {
        Some(fee) => (Some(fee.numerator as i32), Some(fee.denominator as i32)),
        None => (None, None),
    }
}
