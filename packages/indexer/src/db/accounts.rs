use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::instrument;

use crate::models::Account;

/// Upsert by name. Balances the new row does not know are kept, and an older
/// row never overwrites a newer one.
#[instrument(skip(pool, accounts), fields(count = accounts.len()))]
pub async fn import_accounts(pool: &PgPool, accounts: &[Account]) -> Result<()> {
    if accounts.is_empty() {
        return Ok(());
    }

    let mut tx = pool.begin().await?;

    for account in accounts {
        sqlx::query(
            r#"
            INSERT INTO accounts (
                name, start_height, start_time, last_height, last_time, balance, staking_balance
            ) VALUES ($1, $2, $3, $4, $5, $6::numeric, $7::numeric)
            ON CONFLICT (name) DO UPDATE SET
                last_height = EXCLUDED.last_height,
                last_time = EXCLUDED.last_time,
                balance = COALESCE(EXCLUDED.balance, accounts.balance),
                staking_balance = COALESCE(EXCLUDED.staking_balance, accounts.staking_balance),
                updated_at = CURRENT_TIMESTAMP
            WHERE accounts.last_height <= EXCLUDED.last_height
            "#,
        )
        .bind(&account.name)
        .bind(account.start_height as i64)
        .bind(account.start_time)
        .bind(account.last_height as i64)
        .bind(account.last_time)
        .bind(account.balance.map(|b| b.to_string()))
        .bind(account.staking_balance.map(|b| b.to_string()))
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to import account {}", account.name))?;
    }

    tx.commit()
        .await
        .context("Failed to commit account import")?;
    Ok(())
}
