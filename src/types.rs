//! Shared domain types: lifecycle enums, trade request shapes, pagination

use std::fmt;
use std::str::FromStr;

use bytes::BytesMut;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio_postgres::types::{to_sql_checked, FromSql, IsNull, ToSql, Type};

use crate::error::CoreError;

/// Market lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketStatus {
    Draft,
    Active,
    Suspended,
    Resolved,
    Cancelled,
}

impl MarketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketStatus::Draft => "draft",
            MarketStatus::Active => "active",
            MarketStatus::Suspended => "suspended",
            MarketStatus::Resolved => "resolved",
            MarketStatus::Cancelled => "cancelled",
        }
    }

    /// Whether `self -> to` is an allowed lifecycle move.
    ///
    /// Resolved and cancelled are terminal. Resolution itself also requires an
    /// outcome and runs through the dedicated resolve operation, but it obeys
    /// the same table.
    pub fn can_transition(&self, to: MarketStatus) -> bool {
        use MarketStatus::*;
        matches!(
            (self, to),
            (Draft, Active)
                | (Draft, Cancelled)
                | (Active, Suspended)
                | (Active, Resolved)
                | (Active, Cancelled)
                | (Suspended, Active)
                | (Suspended, Resolved)
                | (Suspended, Cancelled)
        )
    }

    /// Statuses that still carry settlement exposure.
    pub fn is_unresolved(&self) -> bool {
        matches!(
            self,
            MarketStatus::Draft | MarketStatus::Active | MarketStatus::Suspended
        )
    }
}

/// Side of a binary market; doubles as the resolution outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Yes,
    No,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Yes => "yes",
            Side::No => "no",
        }
    }

    pub fn opposite(&self) -> Side {
        match self {
            Side::Yes => Side::No,
            Side::No => Side::Yes,
        }
    }
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeType {
    Buy,
    Sell,
}

impl TradeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeType::Buy => "buy",
            TradeType::Sell => "sell",
        }
    }
}

/// Ledger entry kind on a wallet transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    Deposit,
    Withdraw,
    Trade,
    Settlement,
    Refund,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::Deposit => "deposit",
            TxKind::Withdraw => "withdraw",
            TxKind::Trade => "trade",
            TxKind::Settlement => "settlement",
            TxKind::Refund => "refund",
        }
    }
}

/// User role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Admin => "admin",
        }
    }
}

macro_rules! text_enum_sql {
    ($ty:ident, $label:literal, $($text:literal => $variant:expr),+ $(,)?) => {
        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($variant),)+
                    other => Err(format!(concat!("unknown ", $label, ": {}"), other)),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl<'a> FromSql<'a> for $ty {
            fn from_sql(
                ty: &Type,
                raw: &'a [u8],
            ) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
                let s = <&str as FromSql>::from_sql(ty, raw)?;
                s.parse::<$ty>().map_err(Into::into)
            }

            fn accepts(ty: &Type) -> bool {
                <&str as FromSql>::accepts(ty)
            }
        }

        impl ToSql for $ty {
            fn to_sql(
                &self,
                ty: &Type,
                out: &mut BytesMut,
            ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
                <&str as ToSql>::to_sql(&self.as_str(), ty, out)
            }

            fn accepts(ty: &Type) -> bool {
                <&str as ToSql>::accepts(ty)
            }

            to_sql_checked!();
        }
    };
}

text_enum_sql!(MarketStatus, "market status",
    "draft" => MarketStatus::Draft,
    "active" => MarketStatus::Active,
    "suspended" => MarketStatus::Suspended,
    "resolved" => MarketStatus::Resolved,
    "cancelled" => MarketStatus::Cancelled,
);

text_enum_sql!(Side, "side",
    "yes" => Side::Yes,
    "no" => Side::No,
);

text_enum_sql!(TradeType, "trade type",
    "buy" => TradeType::Buy,
    "sell" => TradeType::Sell,
);

text_enum_sql!(TxKind, "transaction kind",
    "deposit" => TxKind::Deposit,
    "withdraw" => TxKind::Withdraw,
    "trade" => TxKind::Trade,
    "settlement" => TxKind::Settlement,
    "refund" => TxKind::Refund,
);

text_enum_sql!(UserRole, "user role",
    "user" => UserRole::User,
    "admin" => UserRole::Admin,
);

/// Validated trade request.
///
/// The wire shape is `{type, side, amount?, shares?}` with exactly-one-of
/// semantics for buys; [`TradeRequest::from_parts`] performs that validation
/// so the executor only ever sees a well-formed variant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TradeRequest {
    BuyByAmount { amount: Decimal },
    BuyByShares { shares: Decimal },
    SellByShares { shares: Decimal },
}

impl TradeRequest {
    pub fn from_parts(
        trade_type: TradeType,
        amount: Option<Decimal>,
        shares: Option<Decimal>,
    ) -> Result<TradeRequest, CoreError> {
        match trade_type {
            TradeType::Buy => match (amount, shares) {
                (Some(amount), None) => {
                    if amount <= Decimal::ZERO {
                        return Err(CoreError::InvalidTrade(
                            "buy amount must be positive".into(),
                        ));
                    }
                    Ok(TradeRequest::BuyByAmount { amount })
                }
                (None, Some(shares)) => {
                    if shares <= Decimal::ZERO {
                        return Err(CoreError::InvalidTrade(
                            "buy shares must be positive".into(),
                        ));
                    }
                    Ok(TradeRequest::BuyByShares { shares })
                }
                (Some(_), Some(_)) => Err(CoreError::InvalidTrade(
                    "supply either amount or shares, not both".into(),
                )),
                (None, None) => Err(CoreError::InvalidTrade(
                    "supply either amount or shares".into(),
                )),
            },
            // Sells are share-denominated; a stray amount field is ignored.
            TradeType::Sell => match shares {
                Some(shares) if shares > Decimal::ZERO => {
                    Ok(TradeRequest::SellByShares { shares })
                }
                Some(_) => Err(CoreError::InvalidTrade(
                    "sell shares must be positive".into(),
                )),
                None => Err(CoreError::InvalidTrade("sell requires shares".into())),
            },
        }
    }

    pub fn trade_type(&self) -> TradeType {
        match self {
            TradeRequest::BuyByAmount { .. } | TradeRequest::BuyByShares { .. } => TradeType::Buy,
            TradeRequest::SellByShares { .. } => TradeType::Sell,
        }
    }
}

/// Pagination window for list operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;

impl Page {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, MAX_PAGE_LIMIT),
        }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.limit)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.limit)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn transition_table_matches_lifecycle() {
        use MarketStatus::*;
        assert!(Draft.can_transition(Active));
        assert!(Draft.can_transition(Cancelled));
        assert!(!Draft.can_transition(Suspended));
        assert!(!Draft.can_transition(Resolved));
        assert!(Active.can_transition(Suspended));
        assert!(Active.can_transition(Resolved));
        assert!(Suspended.can_transition(Active));
        assert!(!Resolved.can_transition(Active));
        assert!(!Cancelled.can_transition(Active));
        assert!(!Resolved.can_transition(Cancelled));
    }

    #[test]
    fn enum_text_round_trips() {
        for status in [
            MarketStatus::Draft,
            MarketStatus::Active,
            MarketStatus::Suspended,
            MarketStatus::Resolved,
            MarketStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<MarketStatus>().unwrap(), status);
        }
        assert_eq!("yes".parse::<Side>().unwrap(), Side::Yes);
        assert_eq!("settlement".parse::<TxKind>().unwrap(), TxKind::Settlement);
        assert!("maybe".parse::<Side>().is_err());
    }

    #[test]
    fn buy_request_requires_exactly_one_of_amount_and_shares() {
        assert!(matches!(
            TradeRequest::from_parts(TradeType::Buy, Some(dec!(10)), None),
            Ok(TradeRequest::BuyByAmount { .. })
        ));
        assert!(matches!(
            TradeRequest::from_parts(TradeType::Buy, None, Some(dec!(5))),
            Ok(TradeRequest::BuyByShares { .. })
        ));
        assert!(TradeRequest::from_parts(TradeType::Buy, Some(dec!(10)), Some(dec!(5))).is_err());
        assert!(TradeRequest::from_parts(TradeType::Buy, None, None).is_err());
        assert!(TradeRequest::from_parts(TradeType::Buy, Some(dec!(0)), None).is_err());
        assert!(TradeRequest::from_parts(TradeType::Buy, Some(dec!(-1)), None).is_err());
    }

    #[test]
    fn sell_request_requires_positive_shares_and_ignores_amount() {
        assert!(matches!(
            TradeRequest::from_parts(TradeType::Sell, Some(dec!(99)), Some(dec!(5))),
            Ok(TradeRequest::SellByShares { .. })
        ));
        assert!(TradeRequest::from_parts(TradeType::Sell, None, None).is_err());
        assert!(TradeRequest::from_parts(TradeType::Sell, None, Some(dec!(0))).is_err());
    }

    #[test]
    fn page_clamps_inputs() {
        let page = Page::new(0, 0);
        assert_eq!(page.page, 1);
        assert_eq!(page.limit, 1);
        assert_eq!(page.offset(), 0);

        let page = Page::new(3, 500);
        assert_eq!(page.limit, MAX_PAGE_LIMIT);
        assert_eq!(page.offset(), 200);
    }
}
