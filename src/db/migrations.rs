//! Schema migrations
//!
//! The schema ships inside the binary as an ordered list of DDL steps. A
//! tracking table records the high-water mark; [`migrate`] applies every
//! step above it, each in its own transaction, so a failing step leaves the
//! schema at a known version. Steps are append-only: a published version is
//! never edited, only superseded.

use anyhow::{Context, Result};
use deadpool_postgres::Object;
use tracing::info;

/// One schema step.
struct Migration {
    version: i32,
    name: &'static str,
    ddl: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "extensions",
        ddl: r#"
            CREATE EXTENSION IF NOT EXISTS "uuid-ossp";
        "#,
    },
    Migration {
        version: 2,
        name: "users",
        ddl: r#"
            CREATE TABLE IF NOT EXISTS users (
                id UUID PRIMARY KEY DEFAULT uuid_generate_v4(),
                email TEXT NOT NULL UNIQUE,
                username TEXT NOT NULL UNIQUE,
                password_digest TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'user'
                    CHECK (role IN ('user', 'admin')),
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            );

            CREATE INDEX IF NOT EXISTS idx_users_role ON users(role);
        "#,
    },
    Migration {
        version: 3,
        name: "wallets",
        ddl: r#"
            CREATE TABLE IF NOT EXISTS wallets (
                id UUID PRIMARY KEY DEFAULT uuid_generate_v4(),
                user_id UUID NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
                balance NUMERIC(30, 6) NOT NULL DEFAULT 0
                    CHECK (balance >= 0),
                frozen_balance NUMERIC(30, 6) NOT NULL DEFAULT 0
                    CHECK (frozen_balance >= 0),
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            );
        "#,
    },
    Migration {
        version: 4,
        name: "wallet_transactions",
        ddl: r#"
            CREATE TABLE IF NOT EXISTS wallet_transactions (
                id UUID PRIMARY KEY DEFAULT uuid_generate_v4(),
                seq BIGSERIAL,
                wallet_id UUID NOT NULL REFERENCES wallets(id) ON DELETE CASCADE,
                kind TEXT NOT NULL
                    CHECK (kind IN ('deposit', 'withdraw', 'trade', 'settlement', 'refund')),
                amount NUMERIC(30, 6) NOT NULL,
                balance_before NUMERIC(30, 6) NOT NULL,
                balance_after NUMERIC(30, 6) NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                reference_id UUID,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            );

            CREATE INDEX IF NOT EXISTS idx_wallet_transactions_wallet
                ON wallet_transactions(wallet_id, created_at, seq);
            CREATE INDEX IF NOT EXISTS idx_wallet_transactions_kind
                ON wallet_transactions(kind);
            CREATE INDEX IF NOT EXISTS idx_wallet_transactions_reference
                ON wallet_transactions(reference_id);
        "#,
    },
    Migration {
        version: 5,
        name: "markets",
        ddl: r#"
            CREATE TABLE IF NOT EXISTS markets (
                id UUID PRIMARY KEY DEFAULT uuid_generate_v4(),
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                category TEXT NOT NULL DEFAULT '',
                image_url TEXT,
                resolution_source TEXT,
                status TEXT NOT NULL DEFAULT 'draft'
                    CHECK (status IN ('draft', 'active', 'suspended', 'resolved', 'cancelled')),
                outcome TEXT
                    CHECK (outcome IN ('yes', 'no')),
                q_yes NUMERIC(30, 6) NOT NULL DEFAULT 0
                    CHECK (q_yes >= 0),
                q_no NUMERIC(30, 6) NOT NULL DEFAULT 0
                    CHECK (q_no >= 0),
                liquidity_b NUMERIC(30, 6) NOT NULL
                    CHECK (liquidity_b > 0),
                volume NUMERIC(30, 6) NOT NULL DEFAULT 0
                    CHECK (volume >= 0),
                start_time TIMESTAMP WITH TIME ZONE NOT NULL,
                end_time TIMESTAMP WITH TIME ZONE NOT NULL,
                resolved_at TIMESTAMP WITH TIME ZONE,
                creator_id UUID NOT NULL REFERENCES users(id),
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                CONSTRAINT check_market_window CHECK (start_time <= end_time)
            );

            CREATE INDEX IF NOT EXISTS idx_markets_status ON markets(status);
            CREATE INDEX IF NOT EXISTS idx_markets_category ON markets(category);
            CREATE INDEX IF NOT EXISTS idx_markets_created_at ON markets(created_at DESC);
        "#,
    },
    Migration {
        version: 6,
        name: "positions",
        ddl: r#"
            CREATE TABLE IF NOT EXISTS positions (
                id UUID PRIMARY KEY DEFAULT uuid_generate_v4(),
                user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                market_id UUID NOT NULL REFERENCES markets(id) ON DELETE CASCADE,
                yes_shares NUMERIC(30, 6) NOT NULL DEFAULT 0
                    CHECK (yes_shares >= 0),
                no_shares NUMERIC(30, 6) NOT NULL DEFAULT 0
                    CHECK (no_shares >= 0),
                avg_yes_price NUMERIC(30, 6) NOT NULL DEFAULT 0,
                avg_no_price NUMERIC(30, 6) NOT NULL DEFAULT 0,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                UNIQUE (user_id, market_id)
            );

            CREATE INDEX IF NOT EXISTS idx_positions_user ON positions(user_id);
            CREATE INDEX IF NOT EXISTS idx_positions_market ON positions(market_id);
        "#,
    },
    Migration {
        version: 7,
        name: "trades",
        ddl: r#"
            CREATE TABLE IF NOT EXISTS trades (
                id UUID PRIMARY KEY DEFAULT uuid_generate_v4(),
                seq BIGSERIAL,
                user_id UUID NOT NULL,
                market_id UUID NOT NULL REFERENCES markets(id) ON DELETE CASCADE,
                trade_type TEXT NOT NULL
                    CHECK (trade_type IN ('buy', 'sell')),
                side TEXT NOT NULL
                    CHECK (side IN ('yes', 'no')),
                shares NUMERIC(30, 6) NOT NULL
                    CHECK (shares > 0),
                price NUMERIC(30, 6) NOT NULL,
                cost NUMERIC(30, 6) NOT NULL,
                fee NUMERIC(30, 6) NOT NULL DEFAULT 0
                    CHECK (fee >= 0),
                q_yes_before NUMERIC(30, 6) NOT NULL,
                q_no_before NUMERIC(30, 6) NOT NULL,
                q_yes_after NUMERIC(30, 6) NOT NULL,
                q_no_after NUMERIC(30, 6) NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            );

            CREATE INDEX IF NOT EXISTS idx_trades_user ON trades(user_id, created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_trades_market
                ON trades(market_id, created_at, seq);
            CREATE INDEX IF NOT EXISTS idx_trades_created_at ON trades(created_at DESC);
        "#,
    },
    Migration {
        version: 8,
        name: "updated_at_triggers",
        ddl: r#"
            CREATE OR REPLACE FUNCTION update_updated_at_column()
            RETURNS TRIGGER AS $$
            BEGIN
                NEW.updated_at = CURRENT_TIMESTAMP;
                RETURN NEW;
            END;
            $$ language 'plpgsql';

            DROP TRIGGER IF EXISTS update_users_updated_at ON users;
            CREATE TRIGGER update_users_updated_at
                BEFORE UPDATE ON users
                FOR EACH ROW EXECUTE FUNCTION update_updated_at_column();

            DROP TRIGGER IF EXISTS update_wallets_updated_at ON wallets;
            CREATE TRIGGER update_wallets_updated_at
                BEFORE UPDATE ON wallets
                FOR EACH ROW EXECUTE FUNCTION update_updated_at_column();

            DROP TRIGGER IF EXISTS update_markets_updated_at ON markets;
            CREATE TRIGGER update_markets_updated_at
                BEFORE UPDATE ON markets
                FOR EACH ROW EXECUTE FUNCTION update_updated_at_column();

            DROP TRIGGER IF EXISTS update_positions_updated_at ON positions;
            CREATE TRIGGER update_positions_updated_at
                BEFORE UPDATE ON positions
                FOR EACH ROW EXECUTE FUNCTION update_updated_at_column();
        "#,
    },
];

/// Apply every migration above the recorded high-water mark.
pub async fn migrate(conn: &mut Object) -> Result<()> {
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
        )
        "#,
        &[],
    )
    .await
    .context("could not prepare the schema_migrations table")?;

    let row = conn
        .query_one(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            &[],
        )
        .await
        .context("could not read the applied schema version")?;
    let current: i32 = row.get(0);

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        apply(conn, migration).await?;
    }

    Ok(())
}

async fn apply(conn: &mut Object, migration: &Migration) -> Result<()> {
    let txn = conn
        .transaction()
        .await
        .context("could not open a migration transaction")?;

    txn.batch_execute(migration.ddl)
        .await
        .with_context(|| format!("migration {} ({}) failed", migration.version, migration.name))?;
    txn.execute(
        "INSERT INTO schema_migrations (version, name) VALUES ($1, $2)",
        &[&migration.version, &migration.name],
    )
    .await
    .with_context(|| format!("could not record migration {}", migration.version))?;
    txn.commit()
        .await
        .with_context(|| format!("could not commit migration {}", migration.version))?;

    info!(
        version = migration.version,
        name = migration.name,
        "schema migration applied"
    );
    Ok(())
}
