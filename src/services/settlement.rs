//! Settlement: credit winning shares at one unit each when a market resolves
//!
//! Runs inline within the resolving transaction, walking positions
//! sequentially. Each position is credited at most once: a wallet that
//! already carries a settlement entry referencing the market is skipped, so
//! re-settling a settled market credits nothing.

use std::sync::Arc;

use anyhow::Context;
use deadpool_postgres::GenericClient;
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::db::models::{DbMarket, DbUser};
use crate::db::queries::{MarketQueries, PositionQueries, WalletQueries};
use crate::db::Database;
use crate::error::{CoreError, CoreResult};
use crate::services::users::ensure_admin;
use crate::services::wallet::Ledger;
use crate::types::{MarketStatus, Side};

/// Shares on the winning side of a position. Zero for losing-side-only
/// positions, which receive nothing and get no ledger entry.
pub(crate) fn winning_shares(
    outcome: Side,
    yes_shares: Decimal,
    no_shares: Decimal,
) -> Decimal {
    match outcome {
        Side::Yes => yes_shares,
        Side::No => no_shares,
    }
}

/// Walk every position on a resolved market and credit the winners.
/// Returns the number of positions settled in this pass.
pub(crate) async fn settle_positions<C: GenericClient>(
    client: &C,
    market: &DbMarket,
) -> CoreResult<u64> {
    let outcome = market.outcome.ok_or_else(|| {
        CoreError::Internal(anyhow::anyhow!(
            "resolved market {} has no outcome",
            market.id
        ))
    })?;

    let positions = PositionQueries::list_by_market(client, market.id).await?;

    let mut settled = 0u64;
    for position in positions {
        let payout = winning_shares(outcome, position.yes_shares, position.no_shares);
        if payout <= Decimal::ZERO {
            continue;
        }

        let wallet = WalletQueries::lock_by_user(client, position.user_id)
            .await?
            .ok_or_else(|| {
                CoreError::Internal(anyhow::anyhow!(
                    "user {} holds a position but has no wallet",
                    position.user_id
                ))
            })?;

        if WalletQueries::has_settlement_for(client, wallet.id, market.id).await? {
            continue;
        }

        Ledger::settle_position(client, &wallet, payout, market.id).await?;
        settled += 1;
    }

    info!(market_id = %market.id, outcome = %outcome, settled, "market settled");
    Ok(settled)
}

pub struct SettlementService {
    db: Arc<Database>,
}

impl SettlementService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Settle a resolved market. Safe to re-run: positions already credited
    /// are skipped.
    pub async fn settle_market(&self, actor: &DbUser, market_id: Uuid) -> CoreResult<u64> {
        ensure_admin(actor)?;

        let mut conn = self.db.acquire().await?;
        let txn = conn
            .transaction()
            .await
            .context("open settlement transaction")?;

        let market = MarketQueries::lock(&txn, market_id)
            .await?
            .ok_or_else(|| CoreError::not_found("market", market_id))?;
        if market.status != MarketStatus::Resolved {
            return Err(CoreError::InvalidTransition {
                from: market.status,
                to: MarketStatus::Resolved,
            });
        }

        let settled = settle_positions(&txn, &market).await?;
        txn.commit().await.context("commit settlement")?;

        Ok(settled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn winning_side_pays_its_share_count() {
        assert_eq!(winning_shares(Side::Yes, dec!(50), dec!(20)), dec!(50));
        assert_eq!(winning_shares(Side::No, dec!(50), dec!(20)), dec!(20));
    }

    #[test]
    fn losing_only_position_pays_nothing() {
        assert_eq!(winning_shares(Side::Yes, dec!(0), dec!(75)), dec!(0));
    }
}
