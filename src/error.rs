//! Typed error surface of the transactional core

use rust_decimal::Decimal;
use thiserror::Error;
use tokio_postgres::error::SqlState;
use uuid::Uuid;

use crate::types::MarketStatus;

/// Errors surfaced by core operations.
///
/// Every variant except `Internal` is client-visible with its message; the
/// executor aborts the whole operation (transaction rollback) on any of them.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        required: Decimal,
        available: Decimal,
    },

    #[error("insufficient shares: requested {requested}, held {held}")]
    InsufficientShares { requested: Decimal, held: Decimal },

    #[error("market {0} is not open for trading")]
    MarketClosed(Uuid),

    #[error("market {0} is outside its trading window")]
    OutOfWindow(Uuid),

    #[error("invalid trade: {0}")]
    InvalidTrade(String),

    #[error("invalid market transition: {from} -> {to}")]
    InvalidTransition {
        from: MarketStatus,
        to: MarketStatus,
    },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error")]
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        CoreError::Internal(err)
    }
}

impl CoreError {
    /// Stable machine-readable code for transports and logs.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::NotFound(_) => "NOT_FOUND",
            CoreError::Unauthorized(_) => "UNAUTHORIZED",
            CoreError::Forbidden(_) => "FORBIDDEN",
            CoreError::InvalidAmount(_) => "INVALID_AMOUNT",
            CoreError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            CoreError::InsufficientShares { .. } => "INSUFFICIENT_SHARES",
            CoreError::MarketClosed(_) => "MARKET_CLOSED",
            CoreError::OutOfWindow(_) => "OUT_OF_WINDOW",
            CoreError::InvalidTrade(_) => "INVALID_TRADE",
            CoreError::InvalidTransition { .. } => "INVALID_TRANSITION",
            CoreError::Conflict(_) => "CONFLICT",
            CoreError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the caller can act on the error message.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, CoreError::Internal(_))
    }

    pub fn not_found(entity: &str, id: Uuid) -> CoreError {
        CoreError::NotFound(format!("{entity} {id}"))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Map a persistence failure, converting unique-constraint violations into a
/// client-visible `Conflict` with the supplied message.
pub fn map_db_conflict(err: anyhow::Error, conflict_message: &str) -> CoreError {
    let is_unique_violation = err
        .downcast_ref::<tokio_postgres::Error>()
        .and_then(|e| e.code())
        .map(|code| *code == SqlState::UNIQUE_VIOLATION)
        .unwrap_or(false);

    if is_unique_violation {
        CoreError::Conflict(conflict_message.to_string())
    } else {
        CoreError::Internal(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            CoreError::NotFound("market".into()).code(),
            "NOT_FOUND"
        );
        assert_eq!(
            CoreError::InsufficientFunds {
                required: dec!(10),
                available: dec!(5)
            }
            .code(),
            "INSUFFICIENT_FUNDS"
        );
        assert_eq!(
            CoreError::InvalidTransition {
                from: MarketStatus::Resolved,
                to: MarketStatus::Active
            }
            .code(),
            "INVALID_TRANSITION"
        );
    }

    #[test]
    fn client_errors_keep_their_message() {
        let err = CoreError::InsufficientFunds {
            required: dec!(10),
            available: dec!(5),
        };
        assert!(err.is_client_error());
        let message = err.to_string();
        assert!(message.contains("10"));
        assert!(message.contains("5"));
    }

    #[test]
    fn internal_errors_hide_detail() {
        let err = CoreError::Internal(anyhow::anyhow!("connection refused"));
        assert!(!err.is_client_error());
        assert_eq!(err.to_string(), "internal error");
    }
}
