use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};

use crate::models::{Height, HeightStatus, Run};

#[instrument(skip(pool))]
pub async fn last_indexed_height(pool: &PgPool) -> Result<Option<u64>> {
    let row = sqlx::query("SELECT MAX(height) AS latest FROM heights WHERE status <> $1")
        .bind(HeightStatus::Error.as_str())
        .fetch_one(pool)
        .await
        .context("Failed to fetch last indexed height")?;

    let latest: Option<i64> = row.try_get("latest")?;
    Ok(latest.map(|h| h as u64))
}

#[instrument(skip(pool))]
pub async fn lowest_failed_height(pool: &PgPool) -> Result<Option<u64>> {
    let row = sqlx::query("SELECT MIN(height) AS earliest FROM heights WHERE status = $1")
        .bind(HeightStatus::Error.as_str())
        .fetch_one(pool)
        .await
        .context("Failed to fetch lowest failed height")?;

    let earliest: Option<i64> = row.try_get("earliest")?;
    Ok(earliest.map(|h| h as u64))
}

#[instrument(skip(pool, heights), fields(count = heights.len()))]
pub async fn record_heights(pool: &PgPool, heights: &[Height]) -> Result<()> {
    if heights.is_empty() {
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    for height in heights {
        sqlx::query(
            r#"
            INSERT INTO heights (height, status, error)
            VALUES ($1, $2, $3)
            ON CONFLICT (height) DO UPDATE SET
                status = EXCLUDED.status,
                error = EXCLUDED.error,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(height.height as i64)
        .bind(height.status.as_str())
        .bind(&height.error)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to record height {}", height.height))?;
    }
    tx.commit().await.context("Failed to commit height records")?;
    Ok(())
}

pub async fn create_run(pool: &PgPool) -> Result<Run> {
    let started_at = Utc::now();
    let row = sqlx::query("INSERT INTO runs (started_at) VALUES ($1) RETURNING id")
        .bind(started_at)
        .fetch_one(pool)
        .await
        .context("Failed to create run")?;

    let id: i64 = row.try_get("id")?;
    debug!("Created run {}", id);
    Ok(Run {
        id,
        started_at,
        finished_at: None,
        success: None,
        error: None,
        lag: None,
    })
}

#[instrument(skip(pool, run), fields(run_id = run.id))]
pub async fn finish_run(pool: &PgPool, run: &Run) -> Result<()> {
    let finished_at: DateTime<Utc> = run.finished_at.unwrap_or_else(Utc::now);
    sqlx::query(
        "UPDATE runs SET finished_at = $2, success = $3, error = $4, lag = $5 WHERE id = $1",
    )
    .bind(run.id)
    .bind(finished_at)
    .bind(run.success)
    .bind(&run.error)
    .bind(run.lag.map(|lag| lag as i64))
    .execute(pool)
    .await
    .with_context(|| format!("Failed to finish run {}", run.id))?;
    Ok(())
}
