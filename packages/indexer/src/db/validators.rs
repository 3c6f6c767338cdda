use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tracing::{debug, instrument};

use super::reward_fee_columns;
use crate::models::{RewardFee, Validator, ValidatorAggregate, ValidatorEpoch};

/// Registered commission per validator account
#[instrument(skip(pool))]
pub async fn reward_fees(pool: &PgPool) -> Result<HashMap<String, RewardFee>> {
    let rows = sqlx::query("SELECT account_id, numerator, denominator FROM reward_fees")
        .fetch_all(pool)
        .await
        .context("Failed to fetch reward fees")?;

    let mut fees = HashMap::with_capacity(rows.len());
    for row in rows {
        let account_id: String = row.try_get("account_id")?;
        let numerator: i32 = row.try_get("numerator")?;
        let denominator: i32 = row.try_get("denominator")?;
        fees.insert(
            account_id,
            RewardFee {
                numerator: numerator.max(0) as u32,
                denominator: denominator.max(0) as u32,
            },
        );
    }

    debug!("Loaded {} reward fees", fees.len());
    Ok(fees)
}

/// Per-height rows are immutable; replays are ignored
#[instrument(skip(pool, validators), fields(count = validators.len()))]
pub async fn import_validators(pool: &PgPool, validators: &[Validator]) -> Result<()> {
    if validators.is_empty() {
        return Ok(());
    }

    let mut tx = pool.begin().await?;

    for validator in validators {
        let (fee_numerator, fee_denominator) = reward_fee_columns(validator.reward_fee);
        sqlx::query(
            r#"
            INSERT INTO validators (
                height, time, account_id, epoch, expected_blocks, produced_blocks,
                expected_chunks, produced_chunks, slashed, stake, efficiency,
                reward_fee_numerator, reward_fee_denominator, reward
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10::numeric, $11, $12, $13, $14::numeric)
            ON CONFLICT (height, account_id) DO NOTHING
            "#,
        )
        .bind(validator.height as i64)
        .bind(validator.time)
        .bind(&validator.account_id)
        .bind(&validator.epoch)
        .bind(validator.expected_blocks as i64)
        .bind(validator.produced_blocks as i64)
        .bind(validator.expected_chunks as i64)
        .bind(validator.produced_chunks as i64)
        .bind(validator.slashed)
        .bind(validator.stake.to_string())
        .bind(validator.efficiency)
        .bind(fee_numerator)
        .bind(fee_denominator)
        .bind(validator.reward.to_string())
        .execute(&mut *tx)
        .await
        .with_context(|| {
            format!(
                "Failed to import validator {} at height {}",
                validator.account_id, validator.height
            )
        })?;
    }

    tx.commit()
        .await
        .context("Failed to commit validator import")?;
    Ok(())
}

/// Aggregates only move forward: a row older than (or as old as) the stored
/// one leaves it unchanged
#[instrument(skip(pool, aggregates), fields(count = aggregates.len()))]
pub async fn import_aggregates(pool: &PgPool, aggregates: &[ValidatorAggregate]) -> Result<()> {
    if aggregates.is_empty() {
        return Ok(());
    }

    let mut tx = pool.begin().await?;

    for aggregate in aggregates {
        let (fee_numerator, fee_denominator) = reward_fee_columns(aggregate.reward_fee);
        sqlx::query(
            r#"
            INSERT INTO validator_aggregates (
                account_id, start_height, start_time, last_height, last_time,
                expected_blocks, produced_blocks, expected_chunks, produced_chunks,
                slashed, stake, efficiency, reward_fee_numerator, reward_fee_denominator
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11::numeric, $12, $13, $14)
            ON CONFLICT (account_id) DO UPDATE SET
                last_height = EXCLUDED.last_height,
                last_time = EXCLUDED.last_time,
                expected_blocks = EXCLUDED.expected_blocks,
                produced_blocks = EXCLUDED.produced_blocks,
                expected_chunks = EXCLUDED.expected_chunks,
                produced_chunks = EXCLUDED.produced_chunks,
                slashed = EXCLUDED.slashed,
                stake = EXCLUDED.stake,
                efficiency = EXCLUDED.efficiency,
                reward_fee_numerator = COALESCE(EXCLUDED.reward_fee_numerator, validator_aggregates.reward_fee_numerator),
                reward_fee_denominator = COALESCE(EXCLUDED.reward_fee_denominator, validator_aggregates.reward_fee_denominator),
                updated_at = CURRENT_TIMESTAMP
            WHERE validator_aggregates.last_height < EXCLUDED.last_height
            "#,
        )
        .bind(&aggregate.account_id)
        .bind(aggregate.start_height as i64)
        .bind(aggregate.start_time)
        .bind(aggregate.last_height as i64)
        .bind(aggregate.last_time)
        .bind(aggregate.expected_blocks as i64)
        .bind(aggregate.produced_blocks as i64)
        .bind(aggregate.expected_chunks as i64)
        .bind(aggregate.produced_chunks as i64)
        .bind(aggregate.slashed)
        .bind(aggregate.stake.to_string())
        .bind(aggregate.efficiency)
        .bind(fee_numerator)
        .bind(fee_denominator)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to import aggregate for {}", aggregate.account_id))?;
    }

    tx.commit()
        .await
        .context("Failed to commit validator aggregate import")?;
    Ok(())
}

#[instrument(skip(pool, validator_epochs), fields(count = validator_epochs.len()))]
pub async fn import_validator_epochs(
    pool: &PgPool,
    validator_epochs: &[ValidatorEpoch],
) -> Result<()> {
    if validator_epochs.is_empty() {
        return Ok(());
    }

    let mut tx = pool.begin().await?;

    for row in validator_epochs {
        let (fee_numerator, fee_denominator) = reward_fee_columns(row.reward_fee);
        sqlx::query(
            r#"
            INSERT INTO validator_epochs (
                account_id, epoch, last_height, last_time, expected_blocks, produced_blocks,
                expected_chunks, produced_chunks, efficiency, staking_balance,
                reward_fee_numerator, reward_fee_denominator, reward
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10::numeric, $11, $12, $13::numeric)
            ON CONFLICT (account_id, epoch) DO UPDATE SET
                last_height = EXCLUDED.last_height,
                last_time = EXCLUDED.last_time,
                expected_blocks = EXCLUDED.expected_blocks,
                produced_blocks = EXCLUDED.produced_blocks,
                expected_chunks = EXCLUDED.expected_chunks,
                produced_chunks = EXCLUDED.produced_chunks,
                efficiency = EXCLUDED.efficiency,
                staking_balance = EXCLUDED.staking_balance,
                reward_fee_numerator = EXCLUDED.reward_fee_numerator,
                reward_fee_denominator = EXCLUDED.reward_fee_denominator,
                reward = EXCLUDED.reward
            WHERE validator_epochs.last_height <= EXCLUDED.last_height
            "#,
        )
        .bind(&row.account_id)
        .bind(&row.epoch)
        .bind(row.last_height as i64)
        .bind(row.last_time)
        .bind(row.expected_blocks as i64)
        .bind(row.produced_blocks as i64)
        .bind(row.expected_chunks as i64)
        .bind(row.produced_chunks as i64)
        .bind(row.efficiency)
        .bind(row.staking_balance.to_string())
        .bind(fee_numerator)
        .bind(fee_denominator)
        .bind(row.reward.to_string())
        .execute(&mut *tx)
        .await
        .with_context(|| {
            format!(
                "Failed to import validator epoch {}/{}",
                row.account_id, row.epoch
            )
        })?;
    }

    tx.commit()
        .await
        .context("Failed to commit validator epoch import")?;
    Ok(())
}
