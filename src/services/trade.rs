//! Trade execution
//!
//! The executor makes a trade atomic: quote, wallet movement, AMM state
//! change, position update, and the trade record all commit in one database
//! transaction. Locks are taken in a fixed order (market row, then wallet
//! row) and the market update is compare-and-set against the quantities read
//! under the lock; a CAS miss retries the whole trade once before surfacing
//! a conflict.

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::models::{DbMarket, DbPosition, DbTrade, DbUser};
use crate::db::queries::{MarketQueries, PositionQueries, TradeQueries, WalletQueries};
use crate::db::Database;
use crate::error::{CoreError, CoreResult};
use crate::pricing::{AmmState, BuyQuote, LmsrPricing, SellQuote};
use crate::services::position::PositionState;
use crate::services::users::ensure_active;
use crate::services::wallet::Ledger;
use crate::types::{MarketStatus, Page, Side, TradeRequest, TradeType};

/// Result of an executed trade.
#[derive(Debug, Clone, Serialize)]
pub struct TradeReceipt {
    pub trade: DbTrade,
    pub position: DbPosition,
    pub balance_after: Decimal,
}

/// A priced quote for either direction.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum QuoteView {
    Buy(BuyQuote),
    Sell(SellQuote),
}

/// Everything the executor needs to apply a trade, computed before any write.
#[derive(Debug, Clone, PartialEq)]
struct TradePlan {
    trade_type: TradeType,
    side: Side,
    shares: Decimal,
    exec_price: Decimal,
    /// Money that changes hands: the fee-inclusive cost of a buy, the net
    /// proceeds of a sell. Recorded as the trade's `cost`.
    cash: Decimal,
    fee: Decimal,
    new_q_yes: Decimal,
    new_q_no: Decimal,
}

fn amm_state(market: &DbMarket) -> AmmState {
    AmmState::new(market.q_yes, market.q_no, market.liquidity_b)
}

/// Trading preconditions shared by quote and execute.
fn check_tradeable(market: &DbMarket, now: DateTime<Utc>) -> CoreResult<()> {
    if market.status != MarketStatus::Active {
        return Err(CoreError::MarketClosed(market.id));
    }
    if now < market.start_time || now > market.end_time {
        return Err(CoreError::OutOfWindow(market.id));
    }
    Ok(())
}

/// Price a buy and verify the wallet can cover it.
fn plan_buy(
    pricing: &LmsrPricing,
    amm: AmmState,
    balance: Decimal,
    side: Side,
    request: TradeRequest,
) -> CoreResult<TradePlan> {
    let quote = match request {
        TradeRequest::BuyByAmount { amount } => pricing.quote_buy_by_amount(amm, side, amount)?,
        TradeRequest::BuyByShares { shares } => pricing.quote_buy_by_shares(amm, side, shares)?,
        TradeRequest::SellByShares { .. } => {
            return Err(CoreError::InvalidTrade("sell request in buy path".into()))
        }
    };

    if balance < quote.total_cost {
        return Err(CoreError::InsufficientFunds {
            required: quote.total_cost,
            available: balance,
        });
    }

    Ok(TradePlan {
        trade_type: TradeType::Buy,
        side,
        shares: quote.shares,
        exec_price: quote.avg_price,
        cash: quote.total_cost,
        fee: quote.fee,
        new_q_yes: quote.new_q_yes,
        new_q_no: quote.new_q_no,
    })
}

/// Price a sell and verify the position holds enough shares.
fn plan_sell(
    pricing: &LmsrPricing,
    amm: AmmState,
    held: &PositionState,
    side: Side,
    shares: Decimal,
) -> CoreResult<TradePlan> {
    let held_shares = held.shares(side);
    if shares > held_shares {
        return Err(CoreError::InsufficientShares {
            requested: shares,
            held: held_shares,
        });
    }

    let quote = pricing.quote_sell_by_shares(amm, side, shares)?;

    Ok(TradePlan {
        trade_type: TradeType::Sell,
        side,
        shares: quote.shares,
        exec_price: quote.avg_price,
        cash: quote.net_return,
        fee: quote.fee,
        new_q_yes: quote.new_q_yes,
        new_q_no: quote.new_q_no,
    })
}

pub struct TradeService {
    db: Arc<Database>,
    pricing: LmsrPricing,
}

impl TradeService {
    pub fn new(db: Arc<Database>, pricing: LmsrPricing) -> Self {
        Self { db, pricing }
    }

    /// Price a request against current market state without executing it.
    pub async fn quote(
        &self,
        market_id: Uuid,
        side: Side,
        request: TradeRequest,
    ) -> CoreResult<QuoteView> {
        let conn = self.db.acquire().await?;
        let market = MarketQueries::get(&conn, market_id)
            .await?
            .ok_or_else(|| CoreError::not_found("market", market_id))?;
        check_tradeable(&market, Utc::now())?;

        let amm = amm_state(&market);
        match request {
            TradeRequest::BuyByAmount { amount } => Ok(QuoteView::Buy(
                self.pricing.quote_buy_by_amount(amm, side, amount)?,
            )),
            TradeRequest::BuyByShares { shares } => Ok(QuoteView::Buy(
                self.pricing.quote_buy_by_shares(amm, side, shares)?,
            )),
            TradeRequest::SellByShares { shares } => Ok(QuoteView::Sell(
                self.pricing.quote_sell_by_shares(amm, side, shares)?,
            )),
        }
    }

    /// Execute a trade atomically for the calling user.
    pub async fn execute(
        &self,
        actor: &DbUser,
        market_id: Uuid,
        side: Side,
        request: TradeRequest,
    ) -> CoreResult<TradeReceipt> {
        ensure_active(actor)?;

        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.try_execute(actor.id, market_id, side, request).await {
                Err(CoreError::Conflict(message)) if attempts == 1 => {
                    warn!(%market_id, %message, "retrying trade after concurrent update");
                }
                result => return result,
            }
        }
    }

    async fn try_execute(
        &self,
        user_id: Uuid,
        market_id: Uuid,
        side: Side,
        request: TradeRequest,
    ) -> CoreResult<TradeReceipt> {
        let mut conn = self.db.acquire().await?;
        let txn = conn
            .transaction()
            .await
            .context("open trade transaction")?;
        let client = &txn;

        // Fixed lock order: market row first, then the wallet row.
        let market = MarketQueries::lock(client, market_id)
            .await?
            .ok_or_else(|| CoreError::not_found("market", market_id))?;
        check_tradeable(&market, Utc::now())?;

        let wallet = WalletQueries::lock_by_user(client, user_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("wallet for user {user_id}")))?;

        let held = PositionQueries::get(client, user_id, market_id)
            .await?
            .as_ref()
            .map(PositionState::from_db)
            .unwrap_or_default();

        let amm = amm_state(&market);
        let plan = match request.trade_type() {
            TradeType::Buy => plan_buy(&self.pricing, amm, wallet.balance, side, request)?,
            TradeType::Sell => {
                let TradeRequest::SellByShares { shares } = request else {
                    return Err(CoreError::InvalidTrade("sell requires shares".into()));
                };
                plan_sell(&self.pricing, amm, &held, side, shares)?
            }
        };

        let wallet_tx = match plan.trade_type {
            TradeType::Buy => {
                Ledger::deduct_for_trade(client, &wallet, plan.cash, market.id).await?
            }
            TradeType::Sell => Ledger::add_from_trade(client, &wallet, plan.cash, market.id).await?,
        };

        let applied = MarketQueries::apply_trade(
            client,
            market.id,
            market.q_yes,
            market.q_no,
            plan.new_q_yes,
            plan.new_q_no,
            plan.cash,
        )
        .await?;
        if !applied {
            txn.rollback()
                .await
                .context("roll back conflicted trade")?;
            return Err(CoreError::Conflict(
                "market state changed during execution".into(),
            ));
        }

        let new_position = match plan.trade_type {
            TradeType::Buy => held.apply_buy(side, plan.shares, plan.exec_price),
            TradeType::Sell => held.apply_sell(side, plan.shares),
        };
        let position = PositionQueries::upsert(
            client,
            user_id,
            market.id,
            new_position.yes_shares,
            new_position.no_shares,
            new_position.avg_yes_price,
            new_position.avg_no_price,
        )
        .await?;

        let trade = TradeQueries::insert(
            client,
            user_id,
            market.id,
            plan.trade_type,
            plan.side,
            plan.shares,
            plan.exec_price,
            plan.cash,
            plan.fee,
            market.q_yes,
            market.q_no,
            plan.new_q_yes,
            plan.new_q_no,
        )
        .await?;

        txn.commit().await.context("commit trade")?;

        info!(
            trade_id = %trade.id,
            %market_id,
            user_id = %user_id,
            trade_type = %trade.trade_type,
            side = %trade.side,
            shares = %trade.shares,
            cost = %trade.cost,
            "trade executed"
        );

        Ok(TradeReceipt {
            trade,
            position,
            balance_after: wallet_tx.balance_after,
        })
    }

    /// The calling user's trades, newest first.
    pub async fn list_trades(&self, user_id: Uuid, page: Page) -> CoreResult<Vec<DbTrade>> {
        let conn = self.db.acquire().await?;
        Ok(TradeQueries::list_by_user(&conn, user_id, page.limit(), page.offset()).await?)
    }

    /// The calling user's positions, most recently touched first.
    pub async fn list_positions(&self, user_id: Uuid, page: Page) -> CoreResult<Vec<DbPosition>> {
        let conn = self.db.acquire().await?;
        Ok(PositionQueries::list_by_user(&conn, user_id, page.limit(), page.offset()).await?)
    }

    /// All trades, for the admin surface.
    pub async fn list_all(&self, actor: &DbUser, page: Page) -> CoreResult<Vec<DbTrade>> {
        crate::services::users::ensure_admin(actor)?;
        let conn = self.db.acquire().await?;
        Ok(TradeQueries::list(&conn, page.limit(), page.offset()).await?)
    }
}
