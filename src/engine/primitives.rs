//! Primitive metric formulas: pure, side-effect-free scalar math.
//!
//! Degenerate denominators (zero entry price, zero combined size) yield a
//! safe zero instead of an error; these figures feed displays, not
//! control flow.

use rust_decimal::Decimal;

use crate::models::{Direction, EntryKind, Pnl};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Blend an original slice with a delta slice into one average price.
///
/// Opening deltas produce the size-weighted average. Closing deltas keep
/// the original price while any volume remains and take the closing price
/// on a full close. This two-slice form backs the one-shot calculator
/// path only; chains with history go through the FIFO aggregator.
pub fn blend_average_price(
    original_size: Decimal,
    original_price: Decimal,
    delta_size: Decimal,
    delta_price: Decimal,
    kind: EntryKind,
) -> Decimal {
    if kind.is_opening() {
        let combined = original_size + delta_size;
        if combined.is_zero() {
            return Decimal::ZERO;
        }
        (original_size * original_price + delta_size * delta_price) / combined
    } else if delta_size < original_size {
        original_price
    } else {
        delta_price
    }
}

/// USD loss if the stop-loss is hit, as a magnitude.
///
/// Direction never flips the sign here: the distance to the stop is
/// taken absolute and scaled by the leveraged notional.
pub fn risk_amount(
    entry_price: Decimal,
    stop_loss: Option<Decimal>,
    margin_size: Decimal,
    leverage: Decimal,
) -> Decimal {
    let Some(stop_loss) = stop_loss else {
        return Decimal::ZERO;
    };
    if entry_price.is_zero() {
        return Decimal::ZERO;
    }

    let notional = margin_size * leverage;
    let risk_pct = (entry_price - stop_loss).abs() / entry_price;
    notional * risk_pct
}

/// USD gain if the take-profit is hit.
///
/// A target on the wrong side of the entry price (at or below entry for
/// Long, at or above for Short) yields 0 rather than a negative reward.
pub fn reward_amount(
    entry_price: Decimal,
    take_profit: Option<Decimal>,
    margin_size: Decimal,
    leverage: Decimal,
    direction: Direction,
) -> Decimal {
    let Some(target) = take_profit else {
        return Decimal::ZERO;
    };
    if target <= Decimal::ZERO || entry_price.is_zero() || target == entry_price {
        return Decimal::ZERO;
    }

    let valid_side = match direction {
        Direction::Long => target > entry_price,
        Direction::Short => target < entry_price,
    };
    if !valid_side {
        return Decimal::ZERO;
    }

    let notional = margin_size * leverage;
    let reward_pct = (target - entry_price).abs() / entry_price;
    notional * reward_pct
}

/// reward / risk, or 0 when either side is 0.
pub fn risk_reward_ratio(risk: Decimal, reward: Decimal) -> Decimal {
    if risk.is_zero() || reward.is_zero() {
        return Decimal::ZERO;
    }
    reward / risk
}

/// Leverage-scaled P&L of an open slice against the current price.
///
/// Both figures are return on margin, not on notional.
pub fn unrealized_pnl(
    entry_price: Decimal,
    current_price: Decimal,
    margin_size: Decimal,
    leverage: Decimal,
    direction: Direction,
) -> Pnl {
    if entry_price.is_zero() {
        return Pnl {
            amount: Decimal::ZERO,
            percent: Decimal::ZERO,
        };
    }

    let ratio = (current_price - entry_price) / entry_price * direction.multiplier() * leverage;
    Pnl {
        amount: margin_size * ratio,
        percent: ratio * HUNDRED,
    }
}

/// Simplified linear liquidation price.
///
/// At 1x there is no liquidation concept and the result is 0.
/// Maintenance margin and funding are ignored.
pub fn liquidation_price(entry_price: Decimal, leverage: Decimal, direction: Direction) -> Decimal {
    if leverage <= Decimal::ONE {
        return Decimal::ZERO;
    }

    let mult = Decimal::ONE / leverage;
    match direction {
        Direction::Long => entry_price * (Decimal::ONE - mult),
        Direction::Short => entry_price * (Decimal::ONE + mult),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_blend_opening_weighted_average() {
        let avg = blend_average_price(
            dec!(1500),
            dec!(102500),
            dec!(1500),
            dec!(96000),
            EntryKind::Add,
        );
        assert_eq!(avg, dec!(99250));
    }

    #[test]
    fn test_blend_closing_keeps_price_while_open() {
        let avg = blend_average_price(
            dec!(1500),
            dec!(102500),
            dec!(500),
            dec!(101000),
            EntryKind::Subtract,
        );
        assert_eq!(avg, dec!(102500));
    }

    #[test]
    fn test_blend_full_close_takes_closing_price() {
        let avg = blend_average_price(
            dec!(1500),
            dec!(102500),
            dec!(1500),
            dec!(101000),
            EntryKind::Subtract,
        );
        assert_eq!(avg, dec!(101000));
    }

    #[test]
    fn test_blend_zero_combined_size() {
        let avg = blend_average_price(
            Decimal::ZERO,
            dec!(100),
            Decimal::ZERO,
            dec!(110),
            EntryKind::Add,
        );
        assert_eq!(avg, Decimal::ZERO);
    }

    #[test]
    fn test_risk_short_scenario() {
        let risk = risk_amount(dec!(102500), Some(dec!(104500)), dec!(1500), dec!(7));
        assert_eq!(risk.round_dp(2), dec!(204.88));
    }

    #[test]
    fn test_risk_without_stop_loss() {
        assert_eq!(risk_amount(dec!(102500), None, dec!(1500), dec!(7)), Decimal::ZERO);
    }

    #[test]
    fn test_reward_short_scenario() {
        let reward = reward_amount(
            dec!(102500),
            Some(dec!(90415)),
            dec!(1500),
            dec!(7),
            Direction::Short,
        );
        assert_eq!(reward.round_dp(2), dec!(1237.98));

        let risk = risk_amount(dec!(102500), Some(dec!(104500)), dec!(1500), dec!(7));
        assert_eq!(risk_reward_ratio(risk, reward).round_dp(2), dec!(6.04));
    }

    #[test]
    fn test_reward_wrong_side_is_zero() {
        // A long target below entry and a short target above entry have
        // no profit side to reach.
        let long = reward_amount(dec!(100), Some(dec!(90)), dec!(1000), dec!(2), Direction::Long);
        assert_eq!(long, Decimal::ZERO);

        let short =
            reward_amount(dec!(100), Some(dec!(110)), dec!(1000), dec!(2), Direction::Short);
        assert_eq!(short, Decimal::ZERO);
    }

    #[test]
    fn test_reward_at_entry_is_zero() {
        let reward =
            reward_amount(dec!(100), Some(dec!(100)), dec!(1000), dec!(2), Direction::Long);
        assert_eq!(reward, Decimal::ZERO);
    }

    #[test]
    fn test_ratio_zero_operands() {
        assert_eq!(risk_reward_ratio(Decimal::ZERO, dec!(50)), Decimal::ZERO);
        assert_eq!(risk_reward_ratio(dec!(50), Decimal::ZERO), Decimal::ZERO);
        assert_eq!(risk_reward_ratio(dec!(100), dec!(250)), dec!(2.5));
    }

    #[test]
    fn test_pnl_long_unleveraged() {
        let pnl = unrealized_pnl(dec!(100), dec!(110), dec!(2000), Decimal::ONE, Direction::Long);
        assert_eq!(pnl.amount, dec!(200));
        assert_eq!(pnl.percent, dec!(10));
    }

    #[test]
    fn test_pnl_short_sign() {
        // Price falling is profit for a short, scaled by leverage.
        let pnl = unrealized_pnl(dec!(100), dec!(90), dec!(1000), dec!(5), Direction::Short);
        assert_eq!(pnl.amount, dec!(500));
        assert_eq!(pnl.percent, dec!(50));

        let pnl = unrealized_pnl(dec!(100), dec!(110), dec!(1000), dec!(5), Direction::Short);
        assert_eq!(pnl.amount, dec!(-500));
    }

    #[test]
    fn test_liquidation_at_one_x() {
        assert_eq!(
            liquidation_price(dec!(102500), Decimal::ONE, Direction::Long),
            Decimal::ZERO
        );
        assert_eq!(
            liquidation_price(dec!(102500), Decimal::ONE, Direction::Short),
            Decimal::ZERO
        );
    }

    #[test]
    fn test_liquidation_sides() {
        let entry = dec!(102500);
        let long = liquidation_price(entry, dec!(7), Direction::Long);
        let short = liquidation_price(entry, dec!(7), Direction::Short);

        assert!(long < entry);
        assert!(short > entry);

        // 4x long liquidates 25% below entry.
        assert_eq!(liquidation_price(dec!(100), dec!(4), Direction::Long), dec!(75));
        assert_eq!(liquidation_price(dec!(100), dec!(4), Direction::Short), dec!(125));
    }
}
