//! Position accounting: running share counts with volume-weighted average cost

use rust_decimal::Decimal;

use crate::db::models::DbPosition;
use crate::pricing::OUTPUT_DP;
use crate::types::Side;

/// The mutable state of one (user, market) position.
///
/// Invariants: shares never go negative; the average price of a side is reset
/// to zero the moment its shares reach zero, and is otherwise untouched by
/// sells. Buys re-weight it by executed volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PositionState {
    pub yes_shares: Decimal,
    pub no_shares: Decimal,
    pub avg_yes_price: Decimal,
    pub avg_no_price: Decimal,
}

impl PositionState {
    pub fn from_db(position: &DbPosition) -> Self {
        Self {
            yes_shares: position.yes_shares,
            no_shares: position.no_shares,
            avg_yes_price: position.avg_yes_price,
            avg_no_price: position.avg_no_price,
        }
    }

    pub fn shares(&self, side: Side) -> Decimal {
        match side {
            Side::Yes => self.yes_shares,
            Side::No => self.no_shares,
        }
    }

    pub fn avg_price(&self, side: Side) -> Decimal {
        match side {
            Side::Yes => self.avg_yes_price,
            Side::No => self.avg_no_price,
        }
    }

    /// Add `delta` shares bought at `exec_price`, re-weighting the average.
    /// The opposite side is untouched.
    pub fn apply_buy(self, side: Side, delta: Decimal, exec_price: Decimal) -> Self {
        let old_shares = self.shares(side);
        let old_avg = self.avg_price(side);

        let new_shares = (old_shares + delta).round_dp(OUTPUT_DP);
        let new_avg = if new_shares > Decimal::ZERO {
            ((old_shares * old_avg + delta * exec_price) / new_shares).round_dp(OUTPUT_DP)
        } else {
            Decimal::ZERO
        };

        self.with_side(side, new_shares, new_avg)
    }

    /// Remove up to `delta` shares. The average survives a partial sale and is
    /// cleared when the side empties.
    pub fn apply_sell(self, side: Side, delta: Decimal) -> Self {
        let old_shares = self.shares(side);
        let remaining = (old_shares - delta).max(Decimal::ZERO).round_dp(OUTPUT_DP);
        let new_avg = if remaining > Decimal::ZERO {
            self.avg_price(side)
        } else {
            Decimal::ZERO
        };

        self.with_side(side, remaining, new_avg)
    }

    fn with_side(mut self, side: Side, shares: Decimal, avg_price: Decimal) -> Self {
        match side {
            Side::Yes => {
                self.yes_shares = shares;
                self.avg_yes_price = avg_price;
            }
            Side::No => {
                self.no_shares = shares;
                self.avg_no_price = avg_price;
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn first_buy_sets_average_to_execution_price() {
        let position = PositionState::default().apply_buy(Side::Yes, dec!(50), dec!(0.40));
        assert_eq!(position.yes_shares, dec!(50));
        assert_eq!(position.avg_yes_price, dec!(0.40));
        assert_eq!(position.no_shares, Decimal::ZERO);
        assert_eq!(position.avg_no_price, Decimal::ZERO);
    }

    #[test]
    fn buys_volume_weight_the_average() {
        let position = PositionState::default()
            .apply_buy(Side::Yes, dec!(50), dec!(0.40))
            .apply_buy(Side::Yes, dec!(150), dec!(0.60));
        assert_eq!(position.yes_shares, dec!(200));
        // (50 * 0.40 + 150 * 0.60) / 200
        assert_eq!(position.avg_yes_price, dec!(0.55));
    }

    #[test]
    fn partial_sell_preserves_the_average() {
        let position = PositionState::default()
            .apply_buy(Side::No, dec!(80), dec!(0.25))
            .apply_sell(Side::No, dec!(30));
        assert_eq!(position.no_shares, dec!(50));
        assert_eq!(position.avg_no_price, dec!(0.25));
    }

    #[test]
    fn full_sell_clears_the_average() {
        let position = PositionState::default()
            .apply_buy(Side::Yes, dec!(80), dec!(0.25))
            .apply_sell(Side::Yes, dec!(80));
        assert_eq!(position.yes_shares, Decimal::ZERO);
        assert_eq!(position.avg_yes_price, Decimal::ZERO);
    }

    #[test]
    fn oversell_clamps_at_zero() {
        let position = PositionState::default()
            .apply_buy(Side::Yes, dec!(10), dec!(0.50))
            .apply_sell(Side::Yes, dec!(15));
        assert_eq!(position.yes_shares, Decimal::ZERO);
        assert_eq!(position.avg_yes_price, Decimal::ZERO);
    }

    #[test]
    fn sides_are_independent() {
        let position = PositionState::default()
            .apply_buy(Side::Yes, dec!(10), dec!(0.70))
            .apply_buy(Side::No, dec!(20), dec!(0.30));
        assert_eq!(position.yes_shares, dec!(10));
        assert_eq!(position.avg_yes_price, dec!(0.70));
        assert_eq!(position.no_shares, dec!(20));
        assert_eq!(position.avg_no_price, dec!(0.30));

        let position = position.apply_sell(Side::No, dec!(20));
        assert_eq!(position.yes_shares, dec!(10));
        assert_eq!(position.avg_yes_price, dec!(0.70));
        assert_eq!(position.avg_no_price, Decimal::ZERO);
    }

    #[test]
    fn weighted_average_rounds_to_six_digits() {
        let position = PositionState::default()
            .apply_buy(Side::Yes, dec!(3), dec!(0.1))
            .apply_buy(Side::Yes, dec!(7), dec!(0.2));
        // (3 * 0.1 + 7 * 0.2) / 10 = 0.17
        assert_eq!(position.avg_yes_price, dec!(0.17));

        let position = PositionState::default()
            .apply_buy(Side::Yes, dec!(1), dec!(0.1))
            .apply_buy(Side::Yes, dec!(2), dec!(0.2));
        // (0.1 + 0.4) / 3 = 0.166666...
        assert_eq!(position.avg_yes_price, dec!(0.166667));
    }
}
