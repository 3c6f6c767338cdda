use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error, instrument};

use super::parse_amount;
use crate::models::Block;

const SELECT_BLOCK: &str = r#"
    SELECT height, hash, prev_hash, producer, epoch, time,
           gas_price::text AS gas_price, total_supply::text AS total_supply,
           chunks_count, transactions_count, approvals_count
    FROM blocks
"#;

/// Insert blocks, leaving already stored heights untouched
#[instrument(skip(pool, blocks), fields(count = blocks.len()))]
pub async fn import_blocks(pool: &PgPool, blocks: &[Block]) -> Result<()> {
    if blocks.is_empty() {
        return Ok(());
    }

    let mut tx = pool
        .begin()
        .await
        .context("Failed to start transaction for block import")?;

    let mut inserted = 0;
    for block in blocks {
        let result = sqlx::query(
            r#"
            INSERT INTO blocks (
                height, hash, prev_hash, producer, epoch, time,
                gas_price, total_supply, chunks_count, transactions_count, approvals_count
            ) VALUES ($1, $2, $3, $4, $5, $6, $7::numeric, $8::numeric, $9, $10, $11)
            ON CONFLICT (height) DO NOTHING
            "#,
        )
        .bind(block.height as i64)
        .bind(&block.hash)
        .bind(&block.prev_hash)
        .bind(&block.producer)
        .bind(&block.epoch)
        .bind(block.time)
        .bind(block.gas_price.to_string())
        .bind(block.total_supply.to_string())
        .bind(block.chunks_count as i32)
        .bind(block.transactions_count as i32)
        .bind(block.approvals_count as i32)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to import block {}: {}", block.height, e);
            e
        })?;
        inserted += result.rows_affected();
    }

    tx.commit()
        .await
        .context("Failed to commit block import")?;

    debug!("Imported {} of {} blocks", inserted, blocks.len());
    Ok(())
}

#[instrument(skip(pool))]
pub async fn last_block(pool: &PgPool) -> Result<Option<Block>> {
    let query = format!("{} ORDER BY height DESC LIMIT 1", SELECT_BLOCK);

    let row = sqlx::query_as::<_, BlockRow>(&query)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch last block")?;

    let block = row.map(|r| r.into_block()).transpose()?;
    match &block {
        Some(b) => debug!("Last stored block: {}", b.height),
        None => debug!("No blocks found in database"),
    }
    Ok(block)
}

#[instrument(skip(pool))]
pub async fn last_block_in_epoch(pool: &PgPool, epoch: &str) -> Result<Option<Block>> {
    let query = format!("{} WHERE epoch = $1 ORDER BY height DESC LIMIT 1", SELECT_BLOCK);

    let row = sqlx::query_as::<_, BlockRow>(&query)
        .bind(epoch)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("Failed to fetch last block of epoch {}", epoch))?;

    row.map(|r| r.into_block()).transpose()
}

#[instrument(skip(pool))]
pub async fn last_block_below(pool: &PgPool, height: u64) -> Result<Option<Block>> {
    let query = format!("{} WHERE height < $1 ORDER BY height DESC LIMIT 1", SELECT_BLOCK);

    let row = sqlx::query_as::<_, BlockRow>(&query)
        .bind(height as i64)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("Failed to fetch block below height {}", height))?;

    row.map(|r| r.into_block()).transpose()
}

// Helper struct for database queries
#[derive(sqlx::FromRow)]
struct BlockRow {
    height: i64,
    hash: String,
    prev_hash: String,
    producer: String,
    epoch: String,
    time: DateTime<Utc>,
    gas_price: String,
    total_supply: String,
    chunks_count: i32,
    transactions_count: i32,
    approvals_count: i32,
}

impl BlockRow {
    fn into_block(self) -> Result<Block> {
        Ok(Block {
            height: self.height as u64,
            gas_price: parse_amount(&self.gas_price, "gas_price")?,
            total_supply: parse_amount(&self.total_supply, "total_supply")?,
            hash: self.hash,
            prev_hash: self.prev_hash,
            producer: self.producer,
            epoch: self.epoch,
            time: self.time,
            chunks_count: self.chunks_count as u32,
            transactions_count: self.transactions_count as u32,
            approvals_count: self.approvals_count as u32,
        })
    }
}
