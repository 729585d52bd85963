//! Market lifecycle and read surface
//!
//! Markets are created in draft, move through the validated transition table,
//! and resolve through a dedicated operation that fixes the outcome and
//! settles positions in the same transaction.

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::config::MarketConfig;
use crate::db::models::{DbMarket, DbUser};
use crate::db::queries::MarketQueries;
use crate::db::Database;
use crate::error::{CoreError, CoreResult};
use crate::pricing::{AmmState, LmsrPricing};
use crate::services::settlement::settle_positions;
use crate::services::users::ensure_admin;
use crate::types::{MarketStatus, Page, Side};

/// Parameters for creating a market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMarket {
    pub title: String,
    pub description: String,
    pub category: String,
    pub image_url: Option<String>,
    pub resolution_source: Option<String>,
    /// LMSR liquidity parameter; the configured default when omitted
    pub liquidity: Option<Decimal>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// Editable fields of a draft market; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub image_url: Option<String>,
    pub resolution_source: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// A market decorated with its live LMSR prices.
#[derive(Debug, Clone, Serialize)]
pub struct MarketView {
    #[serde(flatten)]
    pub market: DbMarket,
    pub price_yes: Decimal,
    pub price_no: Decimal,
}

pub struct MarketService {
    db: Arc<Database>,
    pricing: LmsrPricing,
    config: MarketConfig,
}

impl MarketService {
    pub fn new(db: Arc<Database>, pricing: LmsrPricing, config: MarketConfig) -> Self {
        Self {
            db,
            pricing,
            config,
        }
    }

    fn view(&self, market: DbMarket) -> MarketView {
        let amm = AmmState::new(market.q_yes, market.q_no, market.liquidity_b);
        let price_yes = self.pricing.price_yes(amm);
        let price_no = self.pricing.price_no(amm);
        MarketView {
            market,
            price_yes,
            price_no,
        }
    }

    /// Create a market in draft status with zeroed AMM state.
    pub async fn create(&self, actor: &DbUser, new: NewMarket) -> CoreResult<DbMarket> {
        ensure_admin(actor)?;

        let liquidity = new.liquidity.unwrap_or(self.config.liquidity_default);
        if liquidity < self.config.liquidity_min {
            return Err(CoreError::InvalidAmount(format!(
                "liquidity {} is below the minimum {}",
                liquidity, self.config.liquidity_min
            )));
        }
        if new.start_time > new.end_time {
            return Err(CoreError::InvalidAmount(
                "start_time must not be after end_time".into(),
            ));
        }

        let conn = self.db.acquire().await?;
        let market = MarketQueries::create(
            &conn,
            &new.title,
            &new.description,
            &new.category,
            new.image_url.as_deref(),
            new.resolution_source.as_deref(),
            liquidity,
            new.start_time,
            new.end_time,
            actor.id,
        )
        .await?;

        info!(market_id = %market.id, title = %market.title, "market created");
        Ok(market)
    }

    /// Get a market with live prices.
    pub async fn get(&self, market_id: Uuid) -> CoreResult<MarketView> {
        let conn = self.db.acquire().await?;
        let market = MarketQueries::get(&conn, market_id)
            .await?
            .ok_or_else(|| CoreError::not_found("market", market_id))?;
        Ok(self.view(market))
    }

    /// List markets with optional status and category filters.
    pub async fn list(
        &self,
        page: Page,
        status: Option<MarketStatus>,
        category: Option<&str>,
    ) -> CoreResult<Vec<MarketView>> {
        let conn = self.db.acquire().await?;
        let markets =
            MarketQueries::list(&conn, status, category, page.limit(), page.offset()).await?;
        Ok(markets.into_iter().map(|m| self.view(m)).collect())
    }

    pub async fn list_categories(&self) -> CoreResult<Vec<String>> {
        let conn = self.db.acquire().await?;
        Ok(MarketQueries::categories(&conn).await?)
    }

    /// Edit a draft market.
    pub async fn update(
        &self,
        actor: &DbUser,
        market_id: Uuid,
        patch: MarketUpdate,
    ) -> CoreResult<DbMarket> {
        ensure_admin(actor)?;

        let mut conn = self.db.acquire().await?;
        let txn = conn
            .transaction()
            .await
            .context("open market update transaction")?;
        let market = MarketQueries::lock(&txn, market_id)
            .await?
            .ok_or_else(|| CoreError::not_found("market", market_id))?;
        if market.status != MarketStatus::Draft {
            return Err(CoreError::Conflict(
                "only draft markets can be edited".into(),
            ));
        }

        let start_time = patch.start_time.unwrap_or(market.start_time);
        let end_time = patch.end_time.unwrap_or(market.end_time);
        if start_time > end_time {
            return Err(CoreError::InvalidAmount(
                "start_time must not be after end_time".into(),
            ));
        }

        let updated = MarketQueries::update_details(
            &txn,
            market_id,
            patch.title.as_deref().unwrap_or(&market.title),
            patch.description.as_deref().unwrap_or(&market.description),
            patch.category.as_deref().unwrap_or(&market.category),
            patch.image_url.as_deref().or(market.image_url.as_deref()),
            patch
                .resolution_source
                .as_deref()
                .or(market.resolution_source.as_deref()),
            start_time,
            end_time,
        )
        .await?;
        txn.commit().await.context("commit market update")?;

        Ok(updated)
    }

    /// Move a market through the lifecycle table. Resolution is excluded
    /// here: it needs an outcome and runs through [`MarketService::resolve`].
    pub async fn transition(
        &self,
        actor: &DbUser,
        market_id: Uuid,
        to: MarketStatus,
    ) -> CoreResult<DbMarket> {
        ensure_admin(actor)?;

        let mut conn = self.db.acquire().await?;
        let txn = conn
            .transaction()
            .await
            .context("open market transition transaction")?;
        let market = MarketQueries::lock(&txn, market_id)
            .await?
            .ok_or_else(|| CoreError::not_found("market", market_id))?;

        if to == MarketStatus::Resolved || !market.status.can_transition(to) {
            return Err(CoreError::InvalidTransition {
                from: market.status,
                to,
            });
        }

        MarketQueries::set_status(&txn, market_id, to).await?;
        txn.commit().await.context("commit market transition")?;

        info!(%market_id, from = %market.status, %to, "market transitioned");

        let conn = self.db.acquire().await?;
        MarketQueries::get(&conn, market_id)
            .await?
            .ok_or_else(|| CoreError::not_found("market", market_id))
    }

    /// Resolve a market to an outcome and settle every winning position, all
    /// in one transaction. Returns the market and the settled-position count.
    pub async fn resolve(
        &self,
        actor: &DbUser,
        market_id: Uuid,
        outcome: Side,
    ) -> CoreResult<(DbMarket, u64)> {
        ensure_admin(actor)?;

        let mut conn = self.db.acquire().await?;
        let txn = conn
            .transaction()
            .await
            .context("open market resolution transaction")?;
        let market = MarketQueries::lock(&txn, market_id)
            .await?
            .ok_or_else(|| CoreError::not_found("market", market_id))?;

        if !market.status.can_transition(MarketStatus::Resolved) {
            return Err(CoreError::InvalidTransition {
                from: market.status,
                to: MarketStatus::Resolved,
            });
        }

        let resolved = MarketQueries::resolve(&txn, market_id, outcome, Utc::now()).await?;
        let settled = settle_positions(&txn, &resolved).await?;
        txn.commit().await.context("commit market resolution")?;

        info!(%market_id, %outcome, settled, "market resolved");
        Ok((resolved, settled))
    }
}
