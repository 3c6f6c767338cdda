use anyhow::Result;
use sqlx::PgPool;
use tracing::{error, info};

/// Idempotent schema statements, applied in order at every startup
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "blocks table",
        r#"
        CREATE TABLE IF NOT EXISTS blocks (
            height BIGINT PRIMARY KEY,
            hash TEXT NOT NULL UNIQUE,
            prev_hash TEXT NOT NULL,
            producer TEXT NOT NULL,
            epoch TEXT NOT NULL,
            time TIMESTAMP WITH TIME ZONE NOT NULL,
            gas_price NUMERIC NOT NULL,
            total_supply NUMERIC NOT NULL,
            chunks_count INTEGER NOT NULL,
            transactions_count INTEGER NOT NULL,
            approvals_count INTEGER NOT NULL,
            created_at TIMESTAMP WITH TIME ZONE DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    ),
    (
        "blocks epoch index",
        "CREATE INDEX IF NOT EXISTS idx_blocks_epoch_height ON blocks (epoch, height DESC)",
    ),
    (
        "blocks time index",
        "CREATE INDEX IF NOT EXISTS idx_blocks_time ON blocks (time)",
    ),
    (
        "epochs table",
        r#"
        CREATE TABLE IF NOT EXISTS epochs (
            id TEXT PRIMARY KEY,
            start_height BIGINT NOT NULL,
            start_time TIMESTAMP WITH TIME ZONE NOT NULL,
            end_height BIGINT NOT NULL,
            end_time TIMESTAMP WITH TIME ZONE NOT NULL,
            blocks_count BIGINT NOT NULL DEFAULT 0,
            validators_count BIGINT NOT NULL DEFAULT 0,
            average_efficiency DOUBLE PRECISION NOT NULL DEFAULT 0,
            created_at TIMESTAMP WITH TIME ZONE DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP WITH TIME ZONE DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    ),
    (
        "transactions table",
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            hash TEXT PRIMARY KEY,
            block_hash TEXT NOT NULL,
            height BIGINT NOT NULL,
            time TIMESTAMP WITH TIME ZONE NOT NULL,
            sender TEXT NOT NULL,
            receiver TEXT NOT NULL,
            amount NUMERIC NOT NULL,
            gas_burnt BIGINT NOT NULL,
            fee NUMERIC NOT NULL,
            public_key TEXT NOT NULL,
            signature TEXT NOT NULL,
            success BOOLEAN NOT NULL,
            actions JSONB NOT NULL,
            actions_count INTEGER NOT NULL
        )
        "#,
    ),
    (
        "transactions height index",
        "CREATE INDEX IF NOT EXISTS idx_transactions_height ON transactions (height)",
    ),
    (
        "validators table",
        r#"
        CREATE TABLE IF NOT EXISTS validators (
            height BIGINT NOT NULL,
            time TIMESTAMP WITH TIME ZONE NOT NULL,
            account_id TEXT NOT NULL,
            epoch TEXT NOT NULL,
            expected_blocks BIGINT NOT NULL,
            produced_blocks BIGINT NOT NULL,
            expected_chunks BIGINT NOT NULL,
            produced_chunks BIGINT NOT NULL,
            slashed BOOLEAN NOT NULL,
            stake NUMERIC NOT NULL,
            efficiency DOUBLE PRECISION NOT NULL,
            reward_fee_numerator INTEGER,
            reward_fee_denominator INTEGER,
            reward NUMERIC NOT NULL,
            PRIMARY KEY (height, account_id)
        )
        "#,
    ),
    (
        "validator aggregates table",
        r#"
        CREATE TABLE IF NOT EXISTS validator_aggregates (
            account_id TEXT PRIMARY KEY,
            start_height BIGINT NOT NULL,
            start_time TIMESTAMP WITH TIME ZONE NOT NULL,
            last_height BIGINT NOT NULL,
            last_time TIMESTAMP WITH TIME ZONE NOT NULL,
            expected_blocks BIGINT NOT NULL,
            produced_blocks BIGINT NOT NULL,
            expected_chunks BIGINT NOT NULL,
            produced_chunks BIGINT NOT NULL,
            slashed BOOLEAN NOT NULL,
            stake NUMERIC NOT NULL,
            efficiency DOUBLE PRECISION NOT NULL,
            reward_fee_numerator INTEGER,
            reward_fee_denominator INTEGER,
            updated_at TIMESTAMP WITH TIME ZONE DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    ),
    (
        "validator epochs table",
        r#"
        CREATE TABLE IF NOT EXISTS validator_epochs (
            account_id TEXT NOT NULL,
            epoch TEXT NOT NULL,
            last_height BIGINT NOT NULL,
            last_time TIMESTAMP WITH TIME ZONE NOT NULL,
            expected_blocks BIGINT NOT NULL,
            produced_blocks BIGINT NOT NULL,
            expected_chunks BIGINT NOT NULL,
            produced_chunks BIGINT NOT NULL,
            efficiency DOUBLE PRECISION NOT NULL,
            staking_balance NUMERIC NOT NULL,
            reward_fee_numerator INTEGER,
            reward_fee_denominator INTEGER,
            reward NUMERIC NOT NULL,
            PRIMARY KEY (account_id, epoch)
        )
        "#,
    ),
    (
        "accounts table",
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            name TEXT PRIMARY KEY,
            start_height BIGINT NOT NULL,
            start_time TIMESTAMP WITH TIME ZONE NOT NULL,
            last_height BIGINT NOT NULL,
            last_time TIMESTAMP WITH TIME ZONE NOT NULL,
            balance NUMERIC,
            staking_balance NUMERIC,
            updated_at TIMESTAMP WITH TIME ZONE DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    ),
    (
        "events table",
        r#"
        CREATE TABLE IF NOT EXISTS events (
            id BIGSERIAL PRIMARY KEY,
            scope TEXT NOT NULL,
            action TEXT NOT NULL,
            height BIGINT NOT NULL,
            time TIMESTAMP WITH TIME ZONE NOT NULL,
            epoch TEXT NOT NULL,
            item_id TEXT NOT NULL,
            item_type TEXT NOT NULL,
            metadata JSONB NOT NULL,
            created_at TIMESTAMP WITH TIME ZONE DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    ),
    (
        "events item index",
        "CREATE INDEX IF NOT EXISTS idx_events_item ON events (item_type, item_id, height)",
    ),
    (
        "events natural key",
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_events_natural_key
        ON events (scope, action, item_type, item_id, height, metadata)
        "#,
    ),
    (
        "reward fees table",
        r#"
        CREATE TABLE IF NOT EXISTS reward_fees (
            account_id TEXT PRIMARY KEY,
            numerator INTEGER NOT NULL,
            denominator INTEGER NOT NULL,
            updated_at TIMESTAMP WITH TIME ZONE DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    ),
    (
        "block stats table",
        r#"
        CREATE TABLE IF NOT EXISTS block_stats (
            time TIMESTAMP WITH TIME ZONE NOT NULL,
            bucket TEXT NOT NULL,
            blocks_count BIGINT NOT NULL,
            block_time_avg DOUBLE PRECISION NOT NULL,
            transactions_count BIGINT NOT NULL,
            PRIMARY KEY (time, bucket)
        )
        "#,
    ),
    (
        "heights table",
        r#"
        CREATE TABLE IF NOT EXISTS heights (
            height BIGINT PRIMARY KEY,
            status TEXT NOT NULL,
            error TEXT,
            created_at TIMESTAMP WITH TIME ZONE DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP WITH TIME ZONE DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    ),
    (
        "runs table",
        r#"
        CREATE TABLE IF NOT EXISTS runs (
            id BIGSERIAL PRIMARY KEY,
            started_at TIMESTAMP WITH TIME ZONE NOT NULL,
            finished_at TIMESTAMP WITH TIME ZONE,
            success BOOLEAN,
            error TEXT,
            lag BIGINT
        )
        "#,
    ),
];

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    info!("Running database migrations");

    // Run all statements individually instead of in a transaction for simpler error handling
    for (name, statement) in MIGRATIONS {
        info!("Creating {} if it doesn't exist", name);
        sqlx::query(statement).execute(pool).await.map_err(|e| {
            error!("Failed to create {}: {}", name, e);
            e
        })?;
    }

    info!("Database migrations completed successfully");
    Ok(())
}
