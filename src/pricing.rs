//! LMSR pricing engine
//!
//! Hanson's Logarithmic Market Scoring Rule for binary markets:
//! C(q_yes, q_no) = b * ln(exp(q_yes/b) + exp(q_no/b)), with instantaneous
//! prices given by the softmax of the share quantities.
//!
//! The engine is a pure value type: all AMM state (q_yes, q_no, b) is passed
//! per call from the owning market. Math runs in f64 through a max-shifted
//! log-sum-exp so nearly-equal quantities do not cancel; every observable
//! output is restored to `Decimal` and rounded to 6 fractional digits.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::CoreError;
use crate::types::Side;

/// Fractional digits on every observable output.
pub const OUTPUT_DP: u32 = 6;

const BISECT_TOLERANCE: f64 = 1e-4;
const BISECT_MAX_ITERS: u32 = 100;
/// Upper bracket for the amount inversion: no fill can need more shares than
/// `amount * 10` at any price the bracket check accepts.
const BRACKET_FACTOR: f64 = 10.0;

/// AMM state snapshot for one market.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmmState {
    pub q_yes: Decimal,
    pub q_no: Decimal,
    pub b: Decimal,
}

impl AmmState {
    pub fn new(q_yes: Decimal, q_no: Decimal, b: Decimal) -> Self {
        Self { q_yes, q_no, b }
    }

    fn to_f64(self) -> (f64, f64, f64) {
        (
            self.q_yes.to_f64().unwrap_or(0.0),
            self.q_no.to_f64().unwrap_or(0.0),
            self.b.to_f64().unwrap_or(0.0),
        )
    }
}

/// Priced buy, before any wallet or position mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuyQuote {
    pub shares: Decimal,
    pub raw_cost: Decimal,
    pub fee: Decimal,
    pub total_cost: Decimal,
    pub avg_price: Decimal,
    pub new_q_yes: Decimal,
    pub new_q_no: Decimal,
    pub price_impact: Decimal,
}

/// Priced sell, before any wallet or position mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SellQuote {
    pub shares: Decimal,
    pub raw_return: Decimal,
    pub fee: Decimal,
    pub net_return: Decimal,
    pub avg_price: Decimal,
    pub new_q_yes: Decimal,
    pub new_q_no: Decimal,
    pub price_impact: Decimal,
}

/// LMSR quote engine. Holds only the platform fee rate.
#[derive(Debug, Clone, Copy)]
pub struct LmsrPricing {
    fee_rate: Decimal,
}

impl LmsrPricing {
    pub fn new(fee_rate: Decimal) -> Self {
        Self { fee_rate }
    }

    pub fn fee_rate(&self) -> Decimal {
        self.fee_rate
    }

    fn fee_rate_f64(&self) -> f64 {
        self.fee_rate.to_f64().unwrap_or(0.0)
    }

    /// Cost function C(q_yes, q_no) = b * ln(e^(q_yes/b) + e^(q_no/b)).
    fn cost_f64(q_yes: f64, q_no: f64, b: f64) -> f64 {
        let a = q_yes / b;
        let c = q_no / b;
        // max-shifted log-sum-exp
        let m = a.max(c);
        b * (m + ((a - m).exp() + (c - m).exp()).ln())
    }

    fn price_f64(side: Side, q_yes: f64, q_no: f64, b: f64) -> f64 {
        // sigmoid of the quantity gap; equals the softmax share of `side`
        let gap = match side {
            Side::Yes => (q_no - q_yes) / b,
            Side::No => (q_yes - q_no) / b,
        };
        1.0 / (1.0 + gap.exp())
    }

    /// Instantaneous YES price, rounded to 6 dp.
    pub fn price_yes(&self, state: AmmState) -> Decimal {
        let (q_yes, q_no, b) = state.to_f64();
        round_output(Self::price_f64(Side::Yes, q_yes, q_no, b))
    }

    /// Instantaneous NO price, rounded to 6 dp.
    pub fn price_no(&self, state: AmmState) -> Decimal {
        let (q_yes, q_no, b) = state.to_f64();
        round_output(Self::price_f64(Side::No, q_yes, q_no, b))
    }

    /// Quote the purchase of `shares` on `side`.
    ///
    /// raw_cost = ΔC, fee = raw_cost * fee_rate, total = raw_cost + fee.
    pub fn quote_buy_by_shares(
        &self,
        state: AmmState,
        side: Side,
        shares: Decimal,
    ) -> Result<BuyQuote, CoreError> {
        if shares <= Decimal::ZERO {
            return Err(CoreError::InvalidTrade(
                "share quantity must be positive".into(),
            ));
        }
        let (q_yes, q_no, b) = state.to_f64();
        if b <= 0.0 {
            return Err(CoreError::InvalidTrade(
                "liquidity parameter must be positive".into(),
            ));
        }
        let delta = shares.to_f64().unwrap_or(0.0);
        let (new_q_yes, new_q_no) = match side {
            Side::Yes => (q_yes + delta, q_no),
            Side::No => (q_yes, q_no + delta),
        };

        let raw_cost = Self::cost_f64(new_q_yes, new_q_no, b) - Self::cost_f64(q_yes, q_no, b);
        let fee = raw_cost * self.fee_rate_f64();
        let total_cost = raw_cost + fee;

        let old_price = Self::price_f64(side, q_yes, q_no, b);
        let new_price = Self::price_f64(side, new_q_yes, new_q_no, b);

        Ok(BuyQuote {
            shares: shares.round_dp(OUTPUT_DP),
            raw_cost: round_output(raw_cost),
            fee: round_output(fee),
            total_cost: round_output(total_cost),
            avg_price: round_output(total_cost / delta),
            new_q_yes: round_output(new_q_yes),
            new_q_no: round_output(new_q_no),
            price_impact: round_output(price_impact(old_price, new_price)),
        })
    }

    /// Quote the sale of `shares` on `side`.
    ///
    /// raw_return = ΔC and must be strictly positive; the fee comes out of it.
    /// Selling more than the outstanding quantity on the side would drive the
    /// AMM negative and is rejected.
    pub fn quote_sell_by_shares(
        &self,
        state: AmmState,
        side: Side,
        shares: Decimal,
    ) -> Result<SellQuote, CoreError> {
        if shares <= Decimal::ZERO {
            return Err(CoreError::InvalidTrade(
                "share quantity must be positive".into(),
            ));
        }
        let outstanding = match side {
            Side::Yes => state.q_yes,
            Side::No => state.q_no,
        };
        if shares > outstanding {
            return Err(CoreError::InvalidTrade(format!(
                "cannot sell {shares} shares against {outstanding} outstanding on the {side} side"
            )));
        }

        let (q_yes, q_no, b) = state.to_f64();
        if b <= 0.0 {
            return Err(CoreError::InvalidTrade(
                "liquidity parameter must be positive".into(),
            ));
        }
        let delta = shares.to_f64().unwrap_or(0.0);
        let (new_q_yes, new_q_no) = match side {
            Side::Yes => (q_yes - delta, q_no),
            Side::No => (q_yes, q_no - delta),
        };

        let raw_return = Self::cost_f64(q_yes, q_no, b) - Self::cost_f64(new_q_yes, new_q_no, b);
        if raw_return <= 0.0 {
            return Err(CoreError::InvalidTrade(
                "sell would return nothing at current prices".into(),
            ));
        }
        let fee = raw_return * self.fee_rate_f64();
        let net_return = raw_return - fee;

        let old_price = Self::price_f64(side, q_yes, q_no, b);
        let new_price = Self::price_f64(side, new_q_yes, new_q_no, b);

        Ok(SellQuote {
            shares: shares.round_dp(OUTPUT_DP),
            raw_return: round_output(raw_return),
            fee: round_output(fee),
            net_return: round_output(net_return),
            avg_price: round_output(net_return / delta),
            new_q_yes: round_output(new_q_yes),
            new_q_no: round_output(new_q_no),
            price_impact: round_output(price_impact(old_price, new_price)),
        })
    }

    /// Invert the buy quote: find the share quantity whose fee-inclusive cost
    /// is `amount`.
    ///
    /// Bisection over [0, amount * 10] on raw_cost against the fee-stripped
    /// target, terminating when within 1e-4 or after 100 iterations. A bracket
    /// that cannot cover the target, or running out of iterations, surfaces
    /// `InvalidTrade` rather than returning the midpoint.
    pub fn quote_buy_by_amount(
        &self,
        state: AmmState,
        side: Side,
        amount: Decimal,
    ) -> Result<BuyQuote, CoreError> {
        if amount <= Decimal::ZERO {
            return Err(CoreError::InvalidTrade("amount must be positive".into()));
        }
        let (q_yes, q_no, b) = state.to_f64();
        if b <= 0.0 {
            return Err(CoreError::InvalidTrade(
                "liquidity parameter must be positive".into(),
            ));
        }

        let amount_f = amount.to_f64().unwrap_or(0.0);
        let target_raw = amount_f / (1.0 + self.fee_rate_f64());
        let base_cost = Self::cost_f64(q_yes, q_no, b);
        let raw_at = |delta: f64| {
            let (nqy, nqn) = match side {
                Side::Yes => (q_yes + delta, q_no),
                Side::No => (q_yes, q_no + delta),
            };
            Self::cost_f64(nqy, nqn, b) - base_cost
        };

        let mut lo = 0.0_f64;
        let mut hi = amount_f * BRACKET_FACTOR;
        if raw_at(hi) < target_raw {
            return Err(CoreError::InvalidTrade(
                "amount inversion did not converge within the share bracket".into(),
            ));
        }

        let mut solved = None;
        for _ in 0..BISECT_MAX_ITERS {
            let mid = 0.5 * (lo + hi);
            let raw = raw_at(mid);
            if (raw - target_raw).abs() < BISECT_TOLERANCE {
                solved = Some(mid);
                break;
            }
            if raw < target_raw {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        let shares = solved.ok_or_else(|| {
            CoreError::InvalidTrade("amount inversion did not converge".into())
        })?;

        let shares = round_output(shares);
        if shares <= Decimal::ZERO {
            return Err(CoreError::InvalidTrade(
                "amount is too small to buy any shares".into(),
            ));
        }
        self.quote_buy_by_shares(state, side, shares)
    }
}

fn price_impact(old_price: f64, new_price: f64) -> f64 {
    if old_price > 0.0 {
        (new_price - old_price).abs() / old_price
    } else {
        0.0
    }
}

fn round_output(value: f64) -> Decimal {
    Decimal::from_f64(value)
        .unwrap_or(Decimal::ZERO)
        .round_dp(OUTPUT_DP)
}
