//! Database queries and operations
//!
//! Query functions are generic over `GenericClient` so the same statements run
//! against a pooled connection or inside an open transaction.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use deadpool_postgres::GenericClient;
use rust_decimal::Decimal;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::db::models::*;
use crate::types::{MarketStatus, Side, TradeType, TxKind, UserRole};

/// User queries
pub struct UserQueries;

impl UserQueries {
    /// Create a new user
    pub async fn create<C: GenericClient>(
        conn: &C,
        email: &str,
        username: &str,
        password_digest: &str,
        role: UserRole,
    ) -> Result<DbUser> {
        let row = conn
            .query_one(
                r#"
                INSERT INTO users (email, username, password_digest, role)
                VALUES ($1, $2, $3, $4)
                RETURNING *
                "#,
                &[&email, &username, &password_digest, &role],
            )
            .await
            .context("Failed to create user")?;

        Ok(DbUser::from(row))
    }

    /// Get user by id
    pub async fn get<C: GenericClient>(conn: &C, id: Uuid) -> Result<Option<DbUser>> {
        let row = conn
            .query_opt("SELECT * FROM users WHERE id = $1", &[&id])
            .await
            .context("Failed to get user")?;

        Ok(row.map(DbUser::from))
    }

    /// Get user by email
    pub async fn get_by_email<C: GenericClient>(conn: &C, email: &str) -> Result<Option<DbUser>> {
        let row = conn
            .query_opt("SELECT * FROM users WHERE email = $1", &[&email])
            .await
            .context("Failed to get user by email")?;

        Ok(row.map(DbUser::from))
    }
}

/// Wallet and ledger queries
pub struct WalletQueries;

impl WalletQueries {
    /// Create the wallet for a user
    pub async fn create<C: GenericClient>(conn: &C, user_id: Uuid) -> Result<DbWallet> {
        let row = conn
            .query_one(
                "INSERT INTO wallets (user_id) VALUES ($1) RETURNING *",
                &[&user_id],
            )
            .await
            .context("Failed to create wallet")?;

        Ok(DbWallet::from(row))
    }

    /// Get wallet by id
    pub async fn get<C: GenericClient>(conn: &C, id: Uuid) -> Result<Option<DbWallet>> {
        let row = conn
            .query_opt("SELECT * FROM wallets WHERE id = $1", &[&id])
            .await
            .context("Failed to get wallet")?;

        Ok(row.map(DbWallet::from))
    }

    /// Get wallet by owner
    pub async fn get_by_user<C: GenericClient>(conn: &C, user_id: Uuid) -> Result<Option<DbWallet>> {
        let row = conn
            .query_opt("SELECT * FROM wallets WHERE user_id = $1", &[&user_id])
            .await
            .context("Failed to get wallet by user")?;

        Ok(row.map(DbWallet::from))
    }

    /// Lock a wallet row for the duration of the surrounding transaction
    pub async fn lock<C: GenericClient>(conn: &C, id: Uuid) -> Result<Option<DbWallet>> {
        let row = conn
            .query_opt("SELECT * FROM wallets WHERE id = $1 FOR UPDATE", &[&id])
            .await
            .context("Failed to lock wallet")?;

        Ok(row.map(DbWallet::from))
    }

    /// Lock a wallet row by owner
    pub async fn lock_by_user<C: GenericClient>(
        conn: &C,
        user_id: Uuid,
    ) -> Result<Option<DbWallet>> {
        let row = conn
            .query_opt(
                "SELECT * FROM wallets WHERE user_id = $1 FOR UPDATE",
                &[&user_id],
            )
            .await
            .context("Failed to lock wallet by user")?;

        Ok(row.map(DbWallet::from))
    }

    /// Write a new balance
    pub async fn set_balance<C: GenericClient>(
        conn: &C,
        id: Uuid,
        balance: Decimal,
    ) -> Result<()> {
        conn.execute(
            "UPDATE wallets SET balance = $2 WHERE id = $1",
            &[&id, &balance],
        )
        .await
        .context("Failed to update wallet balance")?;

        Ok(())
    }

    /// Append a ledger entry
    #[allow(clippy::too_many_arguments)]
    pub async fn append_transaction<C: GenericClient>(
        conn: &C,
        wallet_id: Uuid,
        kind: TxKind,
        amount: Decimal,
        balance_before: Decimal,
        balance_after: Decimal,
        description: &str,
        reference_id: Option<Uuid>,
    ) -> Result<DbWalletTransaction> {
        let row = conn
            .query_one(
                r#"
                INSERT INTO wallet_transactions
                    (wallet_id, kind, amount, balance_before, balance_after, description, reference_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING *
                "#,
                &[
                    &wallet_id,
                    &kind,
                    &amount,
                    &balance_before,
                    &balance_after,
                    &description,
                    &reference_id,
                ],
            )
            .await
            .context("Failed to append wallet transaction")?;

        Ok(DbWalletTransaction::from(row))
    }

    /// Most recent ledger entries first
    pub async fn list_transactions<C: GenericClient>(
        conn: &C,
        wallet_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<DbWalletTransaction>> {
        let rows = conn
            .query(
                r#"
                SELECT * FROM wallet_transactions
                WHERE wallet_id = $1
                ORDER BY created_at DESC, seq DESC
                LIMIT $2 OFFSET $3
                "#,
                &[&wallet_id, &limit, &offset],
            )
            .await
            .context("Failed to list wallet transactions")?;

        Ok(rows.into_iter().map(DbWalletTransaction::from).collect())
    }

    /// Full ledger chain in append order, for auditing
    pub async fn chain<C: GenericClient>(
        conn: &C,
        wallet_id: Uuid,
    ) -> Result<Vec<DbWalletTransaction>> {
        let rows = conn
            .query(
                r#"
                SELECT * FROM wallet_transactions
                WHERE wallet_id = $1
                ORDER BY created_at, seq
                "#,
                &[&wallet_id],
            )
            .await
            .context("Failed to load wallet transaction chain")?;

        Ok(rows.into_iter().map(DbWalletTransaction::from).collect())
    }

    /// Whether a settlement entry for the market already exists on the wallet
    pub async fn has_settlement_for<C: GenericClient>(
        conn: &C,
        wallet_id: Uuid,
        market_id: Uuid,
    ) -> Result<bool> {
        let row = conn
            .query_one(
                r#"
                SELECT EXISTS(
                    SELECT 1 FROM wallet_transactions
                    WHERE wallet_id = $1 AND kind = 'settlement' AND reference_id = $2
                )
                "#,
                &[&wallet_id, &market_id],
            )
            .await
            .context("Failed to check for existing settlement")?;

        Ok(row.get(0))
    }

    /// All wallets, oldest first
    pub async fn list<C: GenericClient>(
        conn: &C,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<DbWallet>> {
        let rows = conn
            .query(
                "SELECT * FROM wallets ORDER BY created_at, id LIMIT $1 OFFSET $2",
                &[&limit, &offset],
            )
            .await
            .context("Failed to list wallets")?;

        Ok(rows.into_iter().map(DbWallet::from).collect())
    }
}

/// Market queries
pub struct MarketQueries;

impl MarketQueries {
    /// Create a market in draft status
    #[allow(clippy::too_many_arguments)]
    pub async fn create<C: GenericClient>(
        conn: &C,
        title: &str,
        description: &str,
        category: &str,
        image_url: Option<&str>,
        resolution_source: Option<&str>,
        liquidity_b: Decimal,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        creator_id: Uuid,
    ) -> Result<DbMarket> {
        let row = conn
            .query_one(
                r#"
                INSERT INTO markets
                    (title, description, category, image_url, resolution_source,
                     liquidity_b, start_time, end_time, creator_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING *
                "#,
                &[
                    &title,
                    &description,
                    &category,
                    &image_url,
                    &resolution_source,
                    &liquidity_b,
                    &start_time,
                    &end_time,
                    &creator_id,
                ],
            )
            .await
            .context("Failed to create market")?;

        Ok(DbMarket::from(row))
    }

    /// Get market by id
    pub async fn get<C: GenericClient>(conn: &C, id: Uuid) -> Result<Option<DbMarket>> {
        let row = conn
            .query_opt("SELECT * FROM markets WHERE id = $1", &[&id])
            .await
            .context("Failed to get market")?;

        Ok(row.map(DbMarket::from))
    }

    /// Lock a market row for the duration of the surrounding transaction
    pub async fn lock<C: GenericClient>(conn: &C, id: Uuid) -> Result<Option<DbMarket>> {
        let row = conn
            .query_opt("SELECT * FROM markets WHERE id = $1 FOR UPDATE", &[&id])
            .await
            .context("Failed to lock market")?;

        Ok(row.map(DbMarket::from))
    }

    /// List markets, optionally filtered by status and category
    pub async fn list<C: GenericClient>(
        conn: &C,
        status: Option<MarketStatus>,
        category: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<DbMarket>> {
        let status = status.map(|s| s.as_str());
        let rows = conn
            .query(
                r#"
                SELECT * FROM markets
                WHERE ($1::TEXT IS NULL OR status = $1)
                  AND ($2::TEXT IS NULL OR category = $2)
                ORDER BY created_at DESC
                LIMIT $3 OFFSET $4
                "#,
                &[&status, &category, &limit, &offset],
            )
            .await
            .context("Failed to list markets")?;

        Ok(rows.into_iter().map(DbMarket::from).collect())
    }

    /// Distinct non-empty categories
    pub async fn categories<C: GenericClient>(conn: &C) -> Result<Vec<String>> {
        let rows = conn
            .query(
                "SELECT DISTINCT category FROM markets WHERE category <> '' ORDER BY category",
                &[],
            )
            .await
            .context("Failed to list categories")?;

        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    /// Write a new lifecycle status
    pub async fn set_status<C: GenericClient>(
        conn: &C,
        id: Uuid,
        status: MarketStatus,
    ) -> Result<()> {
        conn.execute(
            "UPDATE markets SET status = $2 WHERE id = $1",
            &[&id, &status],
        )
        .await
        .context("Failed to update market status")?;

        Ok(())
    }

    /// Update editable fields of a draft market
    #[allow(clippy::too_many_arguments)]
    pub async fn update_details<C: GenericClient>(
        conn: &C,
        id: Uuid,
        title: &str,
        description: &str,
        category: &str,
        image_url: Option<&str>,
        resolution_source: Option<&str>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<DbMarket> {
        let row = conn
            .query_one(
                r#"
                UPDATE markets
                SET title = $2,
                    description = $3,
                    category = $4,
                    image_url = $5,
                    resolution_source = $6,
                    start_time = $7,
                    end_time = $8
                WHERE id = $1
                RETURNING *
                "#,
                &[
                    &id,
                    &title,
                    &description,
                    &category,
                    &image_url,
                    &resolution_source,
                    &start_time,
                    &end_time,
                ],
            )
            .await
            .context("Failed to update market details")?;

        Ok(DbMarket::from(row))
    }

    /// Mark a market resolved with its outcome
    pub async fn resolve<C: GenericClient>(
        conn: &C,
        id: Uuid,
        outcome: Side,
        resolved_at: DateTime<Utc>,
    ) -> Result<DbMarket> {
        let row = conn
            .query_one(
                r#"
                UPDATE markets
                SET status = 'resolved', outcome = $2, resolved_at = $3
                WHERE id = $1
                RETURNING *
                "#,
                &[&id, &outcome, &resolved_at],
            )
            .await
            .context("Failed to resolve market")?;

        Ok(DbMarket::from(row))
    }

    /// Apply a trade's AMM state change with a compare-and-set on the
    /// previously read quantities. Returns false on a CAS miss.
    #[allow(clippy::too_many_arguments)]
    pub async fn apply_trade<C: GenericClient>(
        conn: &C,
        id: Uuid,
        expected_q_yes: Decimal,
        expected_q_no: Decimal,
        new_q_yes: Decimal,
        new_q_no: Decimal,
        volume_delta: Decimal,
    ) -> Result<bool> {
        let updated = conn
            .execute(
                r#"
                UPDATE markets
                SET q_yes = $4, q_no = $5, volume = volume + $6
                WHERE id = $1 AND q_yes = $2 AND q_no = $3
                "#,
                &[
                    &id,
                    &expected_q_yes,
                    &expected_q_no,
                    &new_q_yes,
                    &new_q_no,
                    &volume_delta,
                ],
            )
            .await
            .context("Failed to apply trade to market")?;

        Ok(updated == 1)
    }
}

/// Position queries
pub struct PositionQueries;

impl PositionQueries {
    /// Get the (user, market) position if it exists
    pub async fn get<C: GenericClient>(
        conn: &C,
        user_id: Uuid,
        market_id: Uuid,
    ) -> Result<Option<DbPosition>> {
        let row = conn
            .query_opt(
                "SELECT * FROM positions WHERE user_id = $1 AND market_id = $2",
                &[&user_id, &market_id],
            )
            .await
            .context("Failed to get position")?;

        Ok(row.map(DbPosition::from))
    }

    /// Write the full position state, creating the row on first touch
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert<C: GenericClient>(
        conn: &C,
        user_id: Uuid,
        market_id: Uuid,
        yes_shares: Decimal,
        no_shares: Decimal,
        avg_yes_price: Decimal,
        avg_no_price: Decimal,
    ) -> Result<DbPosition> {
        let row = conn
            .query_one(
                r#"
                INSERT INTO positions
                    (user_id, market_id, yes_shares, no_shares, avg_yes_price, avg_no_price)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (user_id, market_id) DO UPDATE
                SET yes_shares = EXCLUDED.yes_shares,
                    no_shares = EXCLUDED.no_shares,
                    avg_yes_price = EXCLUDED.avg_yes_price,
                    avg_no_price = EXCLUDED.avg_no_price
                RETURNING *
                "#,
                &[
                    &user_id,
                    &market_id,
                    &yes_shares,
                    &no_shares,
                    &avg_yes_price,
                    &avg_no_price,
                ],
            )
            .await
            .context("Failed to upsert position")?;

        Ok(DbPosition::from(row))
    }

    /// A user's positions, most recently touched first
    pub async fn list_by_user<C: GenericClient>(
        conn: &C,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<DbPosition>> {
        let rows = conn
            .query(
                r#"
                SELECT * FROM positions
                WHERE user_id = $1
                ORDER BY updated_at DESC
                LIMIT $2 OFFSET $3
                "#,
                &[&user_id, &limit, &offset],
            )
            .await
            .context("Failed to list user positions")?;

        Ok(rows.into_iter().map(DbPosition::from).collect())
    }

    /// All positions on a market, in creation order
    pub async fn list_by_market<C: GenericClient>(
        conn: &C,
        market_id: Uuid,
    ) -> Result<Vec<DbPosition>> {
        let rows = conn
            .query(
                "SELECT * FROM positions WHERE market_id = $1 ORDER BY created_at, id",
                &[&market_id],
            )
            .await
            .context("Failed to list market positions")?;

        Ok(rows.into_iter().map(DbPosition::from).collect())
    }
}

/// Trade queries
pub struct TradeQueries;

impl TradeQueries {
    /// Append a trade record
    #[allow(clippy::too_many_arguments)]
    pub async fn insert<C: GenericClient>(
        conn: &C,
        user_id: Uuid,
        market_id: Uuid,
        trade_type: TradeType,
        side: Side,
        shares: Decimal,
        price: Decimal,
        cost: Decimal,
        fee: Decimal,
        q_yes_before: Decimal,
        q_no_before: Decimal,
        q_yes_after: Decimal,
        q_no_after: Decimal,
    ) -> Result<DbTrade> {
        let row = conn
            .query_one(
                r#"
                INSERT INTO trades
                    (user_id, market_id, trade_type, side, shares, price, cost, fee,
                     q_yes_before, q_no_before, q_yes_after, q_no_after)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                RETURNING *
                "#,
                &[
                    &user_id,
                    &market_id,
                    &trade_type,
                    &side,
                    &shares,
                    &price,
                    &cost,
                    &fee,
                    &q_yes_before,
                    &q_no_before,
                    &q_yes_after,
                    &q_no_after,
                ],
            )
            .await
            .context("Failed to insert trade")?;

        Ok(DbTrade::from(row))
    }

    /// A user's trades, newest first
    pub async fn list_by_user<C: GenericClient>(
        conn: &C,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<DbTrade>> {
        let rows = conn
            .query(
                r#"
                SELECT * FROM trades
                WHERE user_id = $1
                ORDER BY created_at DESC, seq DESC
                LIMIT $2 OFFSET $3
                "#,
                &[&user_id, &limit, &offset],
            )
            .await
            .context("Failed to list user trades")?;

        Ok(rows.into_iter().map(DbTrade::from).collect())
    }

    /// A market's trades in execution order, for audit
    pub async fn list_by_market<C: GenericClient>(
        conn: &C,
        market_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<DbTrade>> {
        let rows = conn
            .query(
                r#"
                SELECT * FROM trades
                WHERE market_id = $1
                ORDER BY created_at, seq
                LIMIT $2 OFFSET $3
                "#,
                &[&market_id, &limit, &offset],
            )
            .await
            .context("Failed to list market trades")?;

        Ok(rows.into_iter().map(DbTrade::from).collect())
    }

    /// All trades, newest first
    pub async fn list<C: GenericClient>(conn: &C, limit: i64, offset: i64) -> Result<Vec<DbTrade>> {
        let rows = conn
            .query(
                "SELECT * FROM trades ORDER BY created_at DESC, seq DESC LIMIT $1 OFFSET $2",
                &[&limit, &offset],
            )
            .await
            .context("Failed to list trades")?;

        Ok(rows.into_iter().map(DbTrade::from).collect())
    }
}

/// Cash flow aggregate for one market
#[derive(Debug, Clone)]
pub struct MarketFlowRow {
    pub market_id: Uuid,
    pub title: String,
    pub status: MarketStatus,
    pub outcome: Option<Side>,
    pub buy_volume: Decimal,
    pub sell_volume: Decimal,
}

impl From<Row> for MarketFlowRow {
    fn from(row: Row) -> Self {
        Self {
            market_id: row.get("market_id"),
            title: row.get("title"),
            status: row.get("status"),
            outcome: row.get("outcome"),
            buy_volume: row.get("buy_volume"),
            sell_volume: row.get("sell_volume"),
        }
    }
}

/// Worst-case payout aggregate for one unresolved market
#[derive(Debug, Clone)]
pub struct ExposureRow {
    pub market_id: Uuid,
    pub title: String,
    pub status: MarketStatus,
    pub exposure: Decimal,
}

impl From<Row> for ExposureRow {
    fn from(row: Row) -> Self {
        Self {
            market_id: row.get("market_id"),
            title: row.get("title"),
            status: row.get("status"),
            exposure: row.get("exposure"),
        }
    }
}

/// Per-user fee aggregate
#[derive(Debug, Clone)]
pub struct FeeContributorRow {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub total_fees: Decimal,
    pub total_cost: Decimal,
    pub trade_count: i64,
}

impl From<Row> for FeeContributorRow {
    fn from(row: Row) -> Self {
        Self {
            user_id: row.get("user_id"),
            username: row.get("username"),
            email: row.get("email"),
            total_fees: row.get("total_fees"),
            total_cost: row.get("total_cost"),
            trade_count: row.get("trade_count"),
        }
    }
}

/// Read-only aggregations over the append-only logs
pub struct AnalyticsQueries;

impl AnalyticsQueries {
    /// Total fees over all trades
    pub async fn total_fees<C: GenericClient>(conn: &C) -> Result<Decimal> {
        let row = conn
            .query_one("SELECT COALESCE(SUM(fee), 0) FROM trades", &[])
            .await
            .context("Failed to sum fees")?;

        Ok(row.get(0))
    }

    /// Fees on trades created at or after `since`
    pub async fn fees_since<C: GenericClient>(
        conn: &C,
        since: DateTime<Utc>,
    ) -> Result<Decimal> {
        let row = conn
            .query_one(
                "SELECT COALESCE(SUM(fee), 0) FROM trades WHERE created_at >= $1",
                &[&since],
            )
            .await
            .context("Failed to sum fees for window")?;

        Ok(row.get(0))
    }

    /// Cash the AMM received and paid out, per market
    pub async fn market_flows<C: GenericClient>(conn: &C) -> Result<Vec<MarketFlowRow>> {
        let rows = conn
            .query(
                r#"
                SELECT m.id AS market_id, m.title, m.status, m.outcome,
                       COALESCE(SUM(CASE WHEN t.trade_type = 'buy' THEN t.cost - t.fee END), 0)
                           AS buy_volume,
                       COALESCE(SUM(CASE WHEN t.trade_type = 'sell' THEN t.cost END), 0)
                           AS sell_volume
                FROM markets m
                LEFT JOIN trades t ON t.market_id = m.id
                GROUP BY m.id
                ORDER BY m.created_at
                "#,
                &[],
            )
            .await
            .context("Failed to aggregate market flows")?;

        Ok(rows.into_iter().map(MarketFlowRow::from).collect())
    }

    /// Settlement obligation realized by each resolved market
    pub async fn settlement_payouts<C: GenericClient>(
        conn: &C,
    ) -> Result<Vec<(Uuid, Decimal)>> {
        let rows = conn
            .query(
                r#"
                SELECT m.id,
                       COALESCE(SUM(CASE WHEN m.outcome = 'yes' THEN p.yes_shares
                                         ELSE p.no_shares END), 0) AS payout
                FROM markets m
                LEFT JOIN positions p ON p.market_id = m.id
                WHERE m.status = 'resolved'
                GROUP BY m.id
                "#,
                &[],
            )
            .await
            .context("Failed to aggregate settlement payouts")?;

        Ok(rows.iter().map(|row| (row.get(0), row.get(1))).collect())
    }

    /// Worst-case payout per unresolved market, largest first
    pub async fn exposures<C: GenericClient>(conn: &C) -> Result<Vec<ExposureRow>> {
        let rows = conn
            .query(
                r#"
                SELECT m.id AS market_id, m.title, m.status,
                       GREATEST(COALESCE(SUM(p.yes_shares), 0),
                                COALESCE(SUM(p.no_shares), 0)) AS exposure
                FROM markets m
                LEFT JOIN positions p ON p.market_id = m.id
                WHERE m.status IN ('draft', 'active', 'suspended')
                GROUP BY m.id
                ORDER BY exposure DESC
                "#,
                &[],
            )
            .await
            .context("Failed to aggregate exposure")?;

        Ok(rows.into_iter().map(ExposureRow::from).collect())
    }

    /// Heaviest fee payers, descending
    pub async fn top_fee_contributors<C: GenericClient>(
        conn: &C,
        limit: i64,
    ) -> Result<Vec<FeeContributorRow>> {
        let rows = conn
            .query(
                r#"
                SELECT t.user_id, u.username, u.email,
                       COALESCE(SUM(t.fee), 0) AS total_fees,
                       COALESCE(SUM(t.cost), 0) AS total_cost,
                       COUNT(*) AS trade_count
                FROM trades t
                JOIN users u ON u.id = t.user_id
                GROUP BY t.user_id, u.username, u.email
                ORDER BY total_fees DESC
                LIMIT $1
                "#,
                &[&limit],
            )
            .await
            .context("Failed to aggregate fee contributors")?;

        Ok(rows.into_iter().map(FeeContributorRow::from).collect())
    }

    /// Platform-wide counters for the admin dashboard
    pub async fn dashboard_counts<C: GenericClient>(conn: &C) -> Result<DashboardRow> {
        let row = conn
            .query_one(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM users) AS user_count,
                    (SELECT COUNT(*) FROM markets) AS market_count,
                    (SELECT COUNT(*) FROM markets WHERE status = 'active') AS active_market_count,
                    (SELECT COUNT(*) FROM markets WHERE status = 'resolved') AS resolved_market_count,
                    (SELECT COUNT(*) FROM trades) AS trade_count,
                    (SELECT COALESCE(SUM(volume), 0) FROM markets) AS total_volume,
                    (SELECT COALESCE(SUM(fee), 0) FROM trades) AS total_fees
                "#,
                &[],
            )
            .await
            .context("Failed to load dashboard counts")?;

        Ok(DashboardRow::from(row))
    }
}

/// Raw dashboard counters
#[derive(Debug, Clone)]
pub struct DashboardRow {
    pub user_count: i64,
    pub market_count: i64,
    pub active_market_count: i64,
    pub resolved_market_count: i64,
    pub trade_count: i64,
    pub total_volume: Decimal,
    pub total_fees: Decimal,
}

impl From<Row> for DashboardRow {
    fn from(row: Row) -> Self {
        Self {
            user_count: row.get("user_count"),
            market_count: row.get("market_count"),
            active_market_count: row.get("active_market_count"),
            resolved_market_count: row.get("resolved_market_count"),
            trade_count: row.get("trade_count"),
            total_volume: row.get("total_volume"),
            total_fees: row.get("total_fees"),
        }
    }
}
