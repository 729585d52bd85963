//! Transactional core of a centralized binary prediction-market exchange
//!
//! Users deposit funds, trade YES/NO shares priced by an LMSR market maker,
//! hold positions with running average cost, and receive settlement payouts
//! when an administrator resolves a market. The crate owns pricing, the
//! wallet ledger, position accounting, market lifecycle, trade execution,
//! settlement, and the platform's risk and P&L analytics; transport and
//! authentication live in the surrounding service.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod platform;
pub mod pricing;
pub mod services;
pub mod types;

pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use platform::Platform;
pub use pricing::{AmmState, BuyQuote, LmsrPricing, SellQuote};
pub use types::{MarketStatus, Page, Side, TradeRequest, TradeType, TxKind, UserRole};
