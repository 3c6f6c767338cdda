use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, instrument};

use crate::models::TimeBucket;

/// Rebuild the block statistics of every bucket overlapping `[start, end]`
#[instrument(skip(pool), fields(bucket = bucket.as_str()))]
pub async fn refresh_block_stats(
    pool: &PgPool,
    bucket: TimeBucket,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<()> {
    let result = sqlx::query(
        r#"
        INSERT INTO block_stats (time, bucket, blocks_count, block_time_avg, transactions_count)
        SELECT
            date_trunc($1, time) AS bucket_time,
            $1,
            COUNT(*),
            COALESCE(
                EXTRACT(EPOCH FROM (MAX(time) - MIN(time)))::double precision
                    / NULLIF(COUNT(*) - 1, 0),
                0
            ),
            SUM(transactions_count)
        FROM blocks
        WHERE time >= date_trunc($1, $2::timestamptz)
          AND time < date_trunc($1, $3::timestamptz) + ('1 ' || $1)::interval
        GROUP BY bucket_time
        ON CONFLICT (time, bucket) DO UPDATE SET
            blocks_count = EXCLUDED.blocks_count,
            block_time_avg = EXCLUDED.block_time_avg,
            transactions_count = EXCLUDED.transactions_count
        "#,
    )
    .bind(bucket.as_str())
    .bind(start)
    .bind(end)
    .execute(pool)
    .await
    .with_context(|| format!("Failed to refresh {} block stats", bucket.as_str()))?;

    debug!("Refreshed {} {} buckets", result.rows_affected(), bucket.as_str());
    Ok(())
}
