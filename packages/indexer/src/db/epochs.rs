use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::{debug, instrument};

use crate::models::Epoch;

/// Upsert epochs; an existing row only has its bounds widened
#[instrument(skip(pool, epochs), fields(count = epochs.len()))]
pub async fn import_epochs(pool: &PgPool, epochs: &[Epoch]) -> Result<()> {
    if epochs.is_empty() {
        return Ok(());
    }

    let mut tx = pool.begin().await?;

    for epoch in epochs {
        sqlx::query(
            r#"
            INSERT INTO epochs (
                id, start_height, start_time, end_height, end_time,
                blocks_count, validators_count, average_efficiency
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                start_height = LEAST(epochs.start_height, EXCLUDED.start_height),
                start_time = LEAST(epochs.start_time, EXCLUDED.start_time),
                end_height = GREATEST(epochs.end_height, EXCLUDED.end_height),
                end_time = GREATEST(epochs.end_time, EXCLUDED.end_time),
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&epoch.id)
        .bind(epoch.start_height as i64)
        .bind(epoch.start_time)
        .bind(epoch.end_height as i64)
        .bind(epoch.end_time)
        .bind(epoch.blocks_count as i64)
        .bind(epoch.validators_count as i64)
        .bind(epoch.average_efficiency)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to import epoch {}", epoch.id))?;
    }

    tx.commit().await.context("Failed to commit epoch import")?;
    Ok(())
}

/// Recompute bounds and counters of the given epochs from stored rows
#[instrument(skip(pool))]
pub async fn refresh_rollups(pool: &PgPool, epochs: &[String]) -> Result<()> {
    if epochs.is_empty() {
        return Ok(());
    }

    let result = sqlx::query(
        r#"
        UPDATE epochs SET
            start_height = b.start_height,
            start_time = b.start_time,
            end_height = b.end_height,
            end_time = b.end_time,
            blocks_count = b.blocks_count,
            validators_count = COALESCE(v.validators_count, 0),
            average_efficiency = COALESCE(v.average_efficiency, 0),
            updated_at = CURRENT_TIMESTAMP
        FROM (
            SELECT epoch,
                   MIN(height) AS start_height, MIN(time) AS start_time,
                   MAX(height) AS end_height, MAX(time) AS end_time,
                   COUNT(*) AS blocks_count
            FROM blocks
            WHERE epoch = ANY($1)
            GROUP BY epoch
        ) b
        LEFT JOIN (
            SELECT epoch,
                   COUNT(DISTINCT account_id) AS validators_count,
                   AVG(efficiency) AS average_efficiency
            FROM validator_epochs
            WHERE epoch = ANY($1)
            GROUP BY epoch
        ) v ON v.epoch = b.epoch
        WHERE epochs.id = b.epoch
        "#,
    )
    .bind(epochs)
    .execute(pool)
    .await
    .context("Failed to refresh epoch rollups")?;

    debug!("Refreshed {} epoch rollups", result.rows_affected());
    Ok(())
}
