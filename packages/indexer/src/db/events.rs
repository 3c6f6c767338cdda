use anyhow::{Context, Result};
use sqlx::{Executor, PgPool, Postgres};
use tracing::{debug, instrument};

use crate::models::Event;

async fn insert_event<'e, E>(executor: E, event: &Event) -> Result<()>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO events (scope, action, height, time, epoch, item_id, item_type, metadata)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (scope, action, item_type, item_id, height, metadata) DO NOTHING
        "#,
    )
    .bind(event.scope.as_str())
    .bind(event.action.as_str())
    .bind(event.height as i64)
    .bind(event.time)
    .bind(&event.epoch)
    .bind(&event.item_id)
    .bind(&event.item_type)
    .bind(&event.metadata)
    .execute(executor)
    .await
    .with_context(|| {
        format!(
            "Failed to insert {} event for {} at height {}",
            event.action, event.item_id, event.height
        )
    })?;
    Ok(())
}

#[instrument(skip(pool, event), fields(action = %event.action, item_id = %event.item_id))]
pub async fn create_event(pool: &PgPool, event: &Event) -> Result<()> {
    insert_event(pool, event).await
}

#[instrument(skip(pool, events), fields(count = events.len()))]
pub async fn import_events(pool: &PgPool, events: &[Event]) -> Result<()> {
    if events.is_empty() {
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    for event in events {
        insert_event(&mut *tx, event).await?;
    }
    tx.commit().await.context("Failed to commit event import")?;

    debug!("Imported {} events", events.len());
    Ok(())
}
