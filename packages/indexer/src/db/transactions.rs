use anyhow::{Context, Result};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::instrument;

use crate::models::Transaction;

#[instrument(skip(pool, transactions), fields(count = transactions.len()))]
pub async fn import_transactions(pool: &PgPool, transactions: &[Transaction]) -> Result<()> {
    if transactions.is_empty() {
        return Ok(());
    }

    let mut tx = pool.begin().await?;

    for transaction in transactions {
        sqlx::query(
            r#"
            INSERT INTO transactions (
                hash, block_hash, height, time, sender, receiver, amount, gas_burnt,
                fee, public_key, signature, success, actions, actions_count
            ) VALUES ($1, $2, $3, $4, $5, $6, $7::numeric, $8, $9::numeric, $10, $11, $12, $13, $14)
            ON CONFLICT (hash) DO NOTHING
            "#,
        )
        .bind(&transaction.hash)
        .bind(&transaction.block_hash)
        .bind(transaction.height as i64)
        .bind(transaction.time)
        .bind(&transaction.sender)
        .bind(&transaction.receiver)
        .bind(transaction.amount.to_string())
        .bind(transaction.gas_burnt as i64)
        .bind(transaction.fee.to_string())
        .bind(&transaction.public_key)
        .bind(&transaction.signature)
        .bind(transaction.success)
        .bind(Json(&transaction.actions))
        .bind(transaction.actions_count() as i32)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to import transaction {}", transaction.hash))?;
    }

    tx.commit()
        .await
        .context("Failed to commit transaction import")?;
    Ok(())
}
