//! Platform facade wiring the services over one shared pool
//!
//! The request-handling layer constructs one `Platform` at startup and calls
//! its services; `bootstrap` applies migrations and seeds the configured
//! administrator.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::config::Config;
use crate::db::Database;
use crate::error::CoreResult;
use crate::pricing::LmsrPricing;
use crate::services::analytics::AnalyticsService;
use crate::services::market::MarketService;
use crate::services::settlement::SettlementService;
use crate::services::trade::TradeService;
use crate::services::users::UserService;
use crate::services::wallet::WalletService;

pub struct Platform {
    pub config: Config,
    pub db: Arc<Database>,
    pub users: UserService,
    pub wallets: WalletService,
    pub markets: MarketService,
    pub trades: TradeService,
    pub settlements: SettlementService,
    pub analytics: AnalyticsService,
}

impl Platform {
    /// Connect the pool and wire the services.
    pub async fn connect(config: Config) -> Result<Self> {
        let db = Arc::new(Database::connect(&config.database).await?);
        let pricing = LmsrPricing::new(config.trading.fee_rate);

        Ok(Self {
            users: UserService::new(db.clone()),
            wallets: WalletService::new(db.clone()),
            markets: MarketService::new(db.clone(), pricing, config.markets.clone()),
            trades: TradeService::new(db.clone(), pricing),
            settlements: SettlementService::new(db.clone()),
            analytics: AnalyticsService::new(db.clone()),
            db,
            config,
        })
    }

    /// Apply migrations and seed the configured admin account.
    pub async fn bootstrap(&self) -> CoreResult<()> {
        self.db.run_migrations().await?;
        info!("database migrations applied");

        if let Some(seed) = &self.config.admin_seed {
            let admin = self.users.bootstrap_admin(seed).await?;
            info!(admin_id = %admin.id, "admin bootstrap complete");
        }

        Ok(())
    }
}
