//! Environment configuration with validation

use std::env;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::db::DatabaseConfig;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database configuration
    pub database: DatabaseConfig,

    /// Trading configuration
    pub trading: TradingConfig,

    /// Market creation configuration
    pub markets: MarketConfig,

    /// Optional bootstrap administrator
    pub admin_seed: Option<AdminSeedConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Platform fee rate applied to every trade (0.02 = 2%)
    pub fee_rate: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// LMSR liquidity parameter applied when a market omits one
    pub liquidity_default: Decimal,
    /// Lowest liquidity parameter a market may be created with
    pub liquidity_min: Decimal,
}

/// Initial administrator seeded at bootstrap. The digest is produced by the
/// authentication layer; the core never hashes passwords.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminSeedConfig {
    pub email: String,
    pub username: String,
    pub password_digest: String,
    /// Optional one-time wallet credit applied when the admin is first seeded
    pub bootstrap_credit: Option<Decimal>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
    #[error("missing required variable {0}")]
    Missing(String),
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            fee_rate: Decimal::new(2, 2), // 0.02
        }
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            liquidity_default: Decimal::from(1000),
            liquidity_min: Decimal::from(100),
        }
    }
}

impl Config {
    /// Load configuration from the environment, applying defaults.
    ///
    /// Reads a `.env` file first when present so local runs match the
    /// deployed environment shape.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let defaults = DatabaseConfig::default();
        let database = DatabaseConfig {
            url: env::var("DATABASE_URL").unwrap_or(defaults.url),
            max_connections: parse_env("DB_MAX_CONNECTIONS", defaults.max_connections)?,
            connect_timeout: std::time::Duration::from_secs(parse_env(
                "DB_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout.as_secs(),
            )?),
            idle_timeout: std::time::Duration::from_secs(parse_env(
                "DB_IDLE_TIMEOUT_SECS",
                defaults.idle_timeout.as_secs(),
            )?),
        };

        let trading = TradingConfig {
            fee_rate: parse_env("FEE_RATE", TradingConfig::default().fee_rate)?,
        };

        let markets = MarketConfig {
            liquidity_default: parse_env(
                "LIQUIDITY_DEFAULT",
                MarketConfig::default().liquidity_default,
            )?,
            liquidity_min: parse_env("LIQUIDITY_MIN", MarketConfig::default().liquidity_min)?,
        };

        let admin_seed = match env::var("ADMIN_EMAIL") {
            Ok(email) => Some(AdminSeedConfig {
                email,
                username: env::var("ADMIN_USERNAME")
                    .map_err(|_| ConfigError::Missing("ADMIN_USERNAME".into()))?,
                password_digest: env::var("ADMIN_PASSWORD_DIGEST")
                    .map_err(|_| ConfigError::Missing("ADMIN_PASSWORD_DIGEST".into()))?,
                bootstrap_credit: match env::var("ADMIN_BOOTSTRAP_CREDIT") {
                    Ok(raw) => Some(raw.parse().map_err(|_| ConfigError::Invalid {
                        key: "ADMIN_BOOTSTRAP_CREDIT".into(),
                        message: format!("not a decimal: {raw}"),
                    })?),
                    Err(_) => None,
                },
            }),
            Err(_) => None,
        };

        let config = Self {
            database,
            trading,
            markets,
            admin_seed,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trading.fee_rate < Decimal::ZERO || self.trading.fee_rate >= Decimal::ONE {
            return Err(ConfigError::Invalid {
                key: "FEE_RATE".into(),
                message: format!("must be in [0, 1), got {}", self.trading.fee_rate),
            });
        }
        if self.markets.liquidity_min <= Decimal::ZERO {
            return Err(ConfigError::Invalid {
                key: "LIQUIDITY_MIN".into(),
                message: "must be positive".into(),
            });
        }
        if self.markets.liquidity_default < self.markets.liquidity_min {
            return Err(ConfigError::Invalid {
                key: "LIQUIDITY_DEFAULT".into(),
                message: format!(
                    "must be at least the minimum liquidity {}",
                    self.markets.liquidity_min
                ),
            });
        }
        if let Some(seed) = &self.admin_seed {
            if let Some(credit) = seed.bootstrap_credit {
                if credit <= Decimal::ZERO {
                    return Err(ConfigError::Invalid {
                        key: "ADMIN_BOOTSTRAP_CREDIT".into(),
                        message: "must be positive".into(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            trading: TradingConfig::default(),
            markets: MarketConfig::default(),
            admin_seed: None,
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            message: format!("could not parse {raw:?}"),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.trading.fee_rate, dec!(0.02));
        assert_eq!(config.markets.liquidity_default, dec!(1000));
        assert_eq!(config.markets.liquidity_min, dec!(100));
    }

    #[test]
    fn rejects_fee_rate_out_of_range() {
        let mut config = Config::default();
        config.trading.fee_rate = dec!(1);
        assert!(config.validate().is_err());
        config.trading.fee_rate = dec!(-0.01);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_default_liquidity_below_minimum() {
        let mut config = Config::default();
        config.markets.liquidity_default = dec!(50);
        assert!(config.validate().is_err());
    }
}
