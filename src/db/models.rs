//! Database models and entities

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio_postgres::Row;
use uuid::Uuid;

use crate::types::{MarketStatus, Side, TradeType, TxKind, UserRole};

/// User account stored in database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbUser {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_digest: String,
    pub role: UserRole,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Row> for DbUser {
    fn from(row: Row) -> Self {
        Self {
            id: row.get("id"),
            email: row.get("email"),
            username: row.get("username"),
            password_digest: row.get("password_digest"),
            role: row.get("role"),
            is_active: row.get("is_active"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

/// Wallet stored in database; exactly one per user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbWallet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub balance: Decimal,
    pub frozen_balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Row> for DbWallet {
    fn from(row: Row) -> Self {
        Self {
            id: row.get("id"),
            user_id: row.get("user_id"),
            balance: row.get("balance"),
            frozen_balance: row.get("frozen_balance"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

/// Append-only ledger entry on a wallet.
///
/// `amount` is signed: positive credits, negative debits. The
/// `balance_before`/`balance_after` pair chains across a wallet's entries
/// ordered by (created_at, seq).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbWalletTransaction {
    pub id: Uuid,
    pub seq: i64,
    pub wallet_id: Uuid,
    pub kind: TxKind,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub description: String,
    pub reference_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<Row> for DbWalletTransaction {
    fn from(row: Row) -> Self {
        Self {
            id: row.get("id"),
            seq: row.get("seq"),
            wallet_id: row.get("wallet_id"),
            kind: row.get("kind"),
            amount: row.get("amount"),
            balance_before: row.get("balance_before"),
            balance_after: row.get("balance_after"),
            description: row.get("description"),
            reference_id: row.get("reference_id"),
            created_at: row.get("created_at"),
        }
    }
}

/// Market stored in database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbMarket {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
    pub image_url: Option<String>,
    pub resolution_source: Option<String>,
    pub status: MarketStatus,
    pub outcome: Option<Side>,
    pub q_yes: Decimal,
    pub q_no: Decimal,
    pub liquidity_b: Decimal,
    pub volume: Decimal,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub creator_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Row> for DbMarket {
    fn from(row: Row) -> Self {
        Self {
            id: row.get("id"),
            title: row.get("title"),
            description: row.get("description"),
            category: row.get("category"),
            image_url: row.get("image_url"),
            resolution_source: row.get("resolution_source"),
            status: row.get("status"),
            outcome: row.get("outcome"),
            q_yes: row.get("q_yes"),
            q_no: row.get("q_no"),
            liquidity_b: row.get("liquidity_b"),
            volume: row.get("volume"),
            start_time: row.get("start_time"),
            end_time: row.get("end_time"),
            resolved_at: row.get("resolved_at"),
            creator_id: row.get("creator_id"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

/// Position stored in database; one row per (user, market)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbPosition {
    pub id: Uuid,
    pub user_id: Uuid,
    pub market_id: Uuid,
    pub yes_shares: Decimal,
    pub no_shares: Decimal,
    pub avg_yes_price: Decimal,
    pub avg_no_price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Row> for DbPosition {
    fn from(row: Row) -> Self {
        Self {
            id: row.get("id"),
            user_id: row.get("user_id"),
            market_id: row.get("market_id"),
            yes_shares: row.get("yes_shares"),
            no_shares: row.get("no_shares"),
            avg_yes_price: row.get("avg_yes_price"),
            avg_no_price: row.get("avg_no_price"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

/// Trade stored in database; append-only audit log of AMM state evolution.
///
/// `cost` is the money that changed hands: fee-inclusive on buys, net of fee
/// on sells. The before/after quantity columns chain across a market's trades.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbTrade {
    pub id: Uuid,
    pub seq: i64,
    pub user_id: Uuid,
    pub market_id: Uuid,
    pub trade_type: TradeType,
    pub side: Side,
    pub shares: Decimal,
    pub price: Decimal,
    pub cost: Decimal,
    pub fee: Decimal,
    pub q_yes_before: Decimal,
    pub q_no_before: Decimal,
    pub q_yes_after: Decimal,
    pub q_no_after: Decimal,
    pub created_at: DateTime<Utc>,
}

impl From<Row> for DbTrade {
    fn from(row: Row) -> Self {
        Self {
            id: row.get("id"),
            seq: row.get("seq"),
            user_id: row.get("user_id"),
            market_id: row.get("market_id"),
            trade_type: row.get("trade_type"),
            side: row.get("side"),
            shares: row.get("shares"),
            price: row.get("price"),
            cost: row.get("cost"),
            fee: row.get("fee"),
            q_yes_before: row.get("q_yes_before"),
            q_no_before: row.get("q_no_before"),
            q_yes_after: row.get("q_yes_after"),
            q_no_after: row.get("q_no_after"),
            created_at: row.get("created_at"),
        }
    }
}
