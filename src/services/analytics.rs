//! Risk and P&L analytics derived from the append-only logs
//!
//! All derivations are read-only aggregations. Time windows are computed in
//! UTC; weeks start Sunday 00:00 UTC.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Days, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::db::models::DbUser;
use crate::db::queries::{AnalyticsQueries, ExposureRow, FeeContributorRow};
use crate::db::Database;
use crate::error::CoreResult;
use crate::services::users::ensure_admin;
use crate::types::MarketStatus;

/// Start of the UTC day containing `now`.
pub fn day_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time")
        .and_utc()
}

/// Start of the UTC week containing `now`; weeks start Sunday 00:00.
pub fn week_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let days_into_week = now.weekday().num_days_from_sunday();
    (now.date_naive() - Days::new(u64::from(days_into_week)))
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time")
        .and_utc()
}

/// Start of the UTC month containing `now`.
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .with_day(1)
        .expect("every month has a first day")
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time")
        .and_utc()
}

/// Fee totals partitioned by window.
#[derive(Debug, Clone, Serialize)]
pub struct FeeTotals {
    pub today: Decimal,
    pub this_week: Decimal,
    pub this_month: Decimal,
    pub all_time: Decimal,
}

/// AMM profit and loss for one market.
///
/// `buy_volume` is net cash the AMM received (cost minus fee on buys),
/// `sell_volume` is cash paid out on sells, `settlement_payout` is the
/// obligation realized at resolution.
#[derive(Debug, Clone, Serialize)]
pub struct MarketPnl {
    pub market_id: Uuid,
    pub title: String,
    pub status: MarketStatus,
    pub buy_volume: Decimal,
    pub sell_volume: Decimal,
    pub settlement_payout: Decimal,
    pub pnl: Decimal,
}

/// Platform-wide P&L reconciliation.
#[derive(Debug, Clone, Serialize)]
pub struct PnlReport {
    pub markets: Vec<MarketPnl>,
    /// Sum of pnl over resolved markets only
    pub resolved_pnl: Decimal,
    /// buy_volume - sell_volume across all markets, ignoring settlements
    pub total_cash_flow: Decimal,
}

/// Worst-case payout obligations across unresolved markets.
#[derive(Debug, Clone, Serialize)]
pub struct ExposureReport {
    pub total: Decimal,
    pub markets: Vec<MarketExposure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarketExposure {
    pub market_id: Uuid,
    pub title: String,
    pub status: MarketStatus,
    pub exposure: Decimal,
}

impl From<ExposureRow> for MarketExposure {
    fn from(row: ExposureRow) -> Self {
        Self {
            market_id: row.market_id,
            title: row.title,
            status: row.status,
            exposure: row.exposure,
        }
    }
}

/// One entry of the top-fee-contributors board.
#[derive(Debug, Clone, Serialize)]
pub struct FeeContributor {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub total_fees: Decimal,
    pub total_cost: Decimal,
    pub trade_count: i64,
}

impl From<FeeContributorRow> for FeeContributor {
    fn from(row: FeeContributorRow) -> Self {
        Self {
            user_id: row.user_id,
            username: row.username,
            email: row.email,
            total_fees: row.total_fees,
            total_cost: row.total_cost,
            trade_count: row.trade_count,
        }
    }
}

/// Platform profit: fees plus realized AMM P&L.
#[derive(Debug, Clone, Serialize)]
pub struct PlatformProfit {
    pub total_fees: Decimal,
    pub resolved_pnl: Decimal,
    pub total_profit: Decimal,
}

/// Admin dashboard overview.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub user_count: i64,
    pub market_count: i64,
    pub active_market_count: i64,
    pub resolved_market_count: i64,
    pub trade_count: i64,
    pub total_volume: Decimal,
    pub total_fees: Decimal,
    pub platform_profit: Decimal,
}

pub struct AnalyticsService {
    db: Arc<Database>,
}

impl AnalyticsService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Fee totals for today, this week, and this month, plus all time.
    pub async fn fee_totals(&self, actor: &DbUser) -> CoreResult<FeeTotals> {
        ensure_admin(actor)?;
        let conn = self.db.acquire().await?;
        let now = Utc::now();

        let today = AnalyticsQueries::fees_since(&conn, day_start(now)).await?;
        let this_week = AnalyticsQueries::fees_since(&conn, week_start(now)).await?;
        let this_month = AnalyticsQueries::fees_since(&conn, month_start(now)).await?;
        let all_time = AnalyticsQueries::total_fees(&conn).await?;

        Ok(FeeTotals {
            today,
            this_week,
            this_month,
            all_time,
        })
    }

    /// Per-market AMM P&L with resolved-only and total cash flow rollups.
    pub async fn amm_pnl(&self, actor: &DbUser) -> CoreResult<PnlReport> {
        ensure_admin(actor)?;
        let conn = self.db.acquire().await?;

        let flows = AnalyticsQueries::market_flows(&conn).await?;
        let payouts: HashMap<Uuid, Decimal> = AnalyticsQueries::settlement_payouts(&conn)
            .await?
            .into_iter()
            .collect();

        let mut markets = Vec::with_capacity(flows.len());
        let mut resolved_pnl = Decimal::ZERO;
        let mut total_cash_flow = Decimal::ZERO;
        for flow in flows {
            let settlement_payout = if flow.status == MarketStatus::Resolved {
                payouts.get(&flow.market_id).copied().unwrap_or(Decimal::ZERO)
            } else {
                Decimal::ZERO
            };
            let pnl = flow.buy_volume - flow.sell_volume - settlement_payout;
            if flow.status == MarketStatus::Resolved {
                resolved_pnl += pnl;
            }
            total_cash_flow += flow.buy_volume - flow.sell_volume;

            markets.push(MarketPnl {
                market_id: flow.market_id,
                title: flow.title,
                status: flow.status,
                buy_volume: flow.buy_volume,
                sell_volume: flow.sell_volume,
                settlement_payout,
                pnl,
            });
        }

        Ok(PnlReport {
            markets,
            resolved_pnl,
            total_cash_flow,
        })
    }

    /// Worst-case payout obligation across unresolved markets, with the
    /// top `limit` markets by exposure.
    pub async fn unsettled_exposure(
        &self,
        actor: &DbUser,
        limit: usize,
    ) -> CoreResult<ExposureReport> {
        ensure_admin(actor)?;
        let conn = self.db.acquire().await?;

        let rows = AnalyticsQueries::exposures(&conn).await?;
        let total = rows.iter().map(|row| row.exposure).sum();
        let markets = rows
            .into_iter()
            .take(limit)
            .map(MarketExposure::from)
            .collect();

        Ok(ExposureReport { total, markets })
    }

    /// Top `limit` users by fees paid.
    pub async fn top_fee_contributors(
        &self,
        actor: &DbUser,
        limit: i64,
    ) -> CoreResult<Vec<FeeContributor>> {
        ensure_admin(actor)?;
        let conn = self.db.acquire().await?;
        let rows = AnalyticsQueries::top_fee_contributors(&conn, limit).await?;
        Ok(rows.into_iter().map(FeeContributor::from).collect())
    }

    /// total_profit = total_fees + resolved AMM P&L.
    pub async fn platform_profit(&self, actor: &DbUser) -> CoreResult<PlatformProfit> {
        let pnl = self.amm_pnl(actor).await?;
        let conn = self.db.acquire().await?;
        let total_fees = AnalyticsQueries::total_fees(&conn).await?;

        Ok(PlatformProfit {
            total_fees,
            resolved_pnl: pnl.resolved_pnl,
            total_profit: total_fees + pnl.resolved_pnl,
        })
    }

    /// Admin dashboard counters.
    pub async fn dashboard(&self, actor: &DbUser) -> CoreResult<DashboardStats> {
        let profit = self.platform_profit(actor).await?;
        let conn = self.db.acquire().await?;
        let counts = AnalyticsQueries::dashboard_counts(&conn).await?;

        Ok(DashboardStats {
            user_count: counts.user_count,
            market_count: counts.market_count,
            active_market_count: counts.active_market_count,
            resolved_market_count: counts.resolved_market_count,
            trade_count: counts.trade_count,
            total_volume: counts.total_volume,
            total_fees: counts.total_fees,
            platform_profit: profit.total_profit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn day_start_is_utc_midnight() {
        let now = Utc.with_ymd_and_hms(2024, 7, 17, 15, 42, 9).unwrap();
        assert_eq!(
            day_start(now),
            Utc.with_ymd_and_hms(2024, 7, 17, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn week_starts_on_sunday() {
        // 2024-07-17 is a Wednesday; the preceding Sunday is 2024-07-14.
        let wednesday = Utc.with_ymd_and_hms(2024, 7, 17, 15, 42, 9).unwrap();
        assert_eq!(
            week_start(wednesday),
            Utc.with_ymd_and_hms(2024, 7, 14, 0, 0, 0).unwrap()
        );

        // A Sunday is its own week start.
        let sunday = Utc.with_ymd_and_hms(2024, 7, 14, 23, 59, 59).unwrap();
        assert_eq!(
            week_start(sunday),
            Utc.with_ymd_and_hms(2024, 7, 14, 0, 0, 0).unwrap()
        );

        // A Saturday reaches back six days.
        let saturday = Utc.with_ymd_and_hms(2024, 7, 20, 0, 0, 1).unwrap();
        assert_eq!(
            week_start(saturday),
            Utc.with_ymd_and_hms(2024, 7, 14, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn week_start_crosses_month_boundaries() {
        // 2024-08-01 is a Thursday; its week began Sunday 2024-07-28.
        let thursday = Utc.with_ymd_and_hms(2024, 8, 1, 12, 0, 0).unwrap();
        assert_eq!(
            week_start(thursday),
            Utc.with_ymd_and_hms(2024, 7, 28, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn month_start_is_the_first() {
        let now = Utc.with_ymd_and_hms(2024, 2, 29, 8, 30, 0).unwrap();
        assert_eq!(
            month_start(now),
            Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()
        );
    }
}
