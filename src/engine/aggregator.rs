//! Chain aggregator: reduces an ordered entry chain to its open exposure.
//!
//! Closing volume is matched FIFO against the oldest opening lots, so a
//! partial close shifts the weighted-average price of what remains. A
//! plain weighted average over all entries diverges as soon as a close
//! consumes part of a lot.

use rust_decimal::Decimal;

use crate::models::{ChainState, Direction, Entry};

/// Reduce an entry chain to its aggregated state.
///
/// Pure over the slice: historical chains always evaluate, with closes
/// beyond the opened volume clamping remaining size to zero.
pub fn aggregate(entries: &[Entry], direction: Direction) -> ChainState {
    if entries.is_empty() {
        return ChainState::empty();
    }

    let mut open_size = Decimal::ZERO;
    let mut open_weighted_price = Decimal::ZERO;
    let mut closed_size = Decimal::ZERO;
    let mut realized_pnl = Decimal::ZERO;

    for entry in entries {
        if entry.kind.is_opening() {
            open_size += entry.size;
            open_weighted_price += entry.size * entry.price;
        } else {
            // Realize against the weighted average of every opening entry
            // before this close, not the post-close remaining average.
            if !open_size.is_zero() {
                let pre_close_avg = open_weighted_price / open_size;
                if !pre_close_avg.is_zero() {
                    let ratio = (entry.price - pre_close_avg) / pre_close_avg
                        * direction.multiplier()
                        * entry.leverage;
                    realized_pnl += entry.size * ratio;
                }
            }
            closed_size += entry.size;
        }
    }

    let remaining_size = (open_size - closed_size).max(Decimal::ZERO);

    // FIFO pass: attribute the closed volume to the oldest lots and
    // accumulate what the surviving volume is worth.
    let mut closed_remaining = closed_size;
    let mut remaining_weighted_price = Decimal::ZERO;
    let mut remaining_leveraged_capital = Decimal::ZERO;

    for entry in entries.iter().filter(|e| e.kind.is_opening()) {
        if closed_remaining <= Decimal::ZERO {
            remaining_weighted_price += entry.size * entry.price;
            remaining_leveraged_capital += entry.size * entry.leverage;
        } else if closed_remaining < entry.size {
            let surviving = entry.size - closed_remaining;
            remaining_weighted_price += surviving * entry.price;
            remaining_leveraged_capital += surviving * entry.leverage;
            closed_remaining = Decimal::ZERO;
        } else {
            closed_remaining -= entry.size;
        }
    }

    let (average_entry_price, average_leverage) = if remaining_size.is_zero() {
        (Decimal::ZERO, Decimal::ONE)
    } else {
        (
            remaining_weighted_price / remaining_size,
            (remaining_leveraged_capital / remaining_size).abs(),
        )
    };

    ChainState {
        open_size,
        closed_size,
        remaining_size,
        average_entry_price,
        average_leverage,
        realized_pnl,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntryKind;
    use rust_decimal_macros::dec;

    fn entry(kind: EntryKind, price: Decimal, size: Decimal, leverage: Decimal) -> Entry {
        Entry::new(kind, price, size, leverage)
    }

    #[test]
    fn test_empty_chain() {
        assert_eq!(aggregate(&[], Direction::Long), ChainState::empty());
    }

    #[test]
    fn test_single_initial_entry() {
        let chain = vec![entry(EntryKind::Initial, dec!(102500), dec!(1500), dec!(7))];
        let state = aggregate(&chain, Direction::Short);

        assert_eq!(state.remaining_size, dec!(1500));
        assert_eq!(state.average_entry_price, dec!(102500));
        assert_eq!(state.average_leverage, dec!(7));
        assert_eq!(state.realized_pnl, Decimal::ZERO);
    }

    #[test]
    fn test_add_blends_weighted_average() {
        let chain = vec![
            entry(EntryKind::Initial, dec!(102500), dec!(1500), dec!(7)),
            entry(EntryKind::Add, dec!(96000), dec!(1500), dec!(7)),
        ];
        let state = aggregate(&chain, Direction::Short);

        assert_eq!(state.remaining_size, dec!(3000));
        assert_eq!(state.average_entry_price, dec!(99250));
        assert_eq!(state.average_leverage, dec!(7));
    }

    #[test]
    fn test_fifo_full_lot_consumed() {
        // Closing 1000 eats the whole oldest lot: only the 110 lot remains.
        let chain = vec![
            entry(EntryKind::Initial, dec!(100), dec!(1000), Decimal::ONE),
            entry(EntryKind::Add, dec!(110), dec!(1000), Decimal::ONE),
            entry(EntryKind::Subtract, dec!(120), dec!(1000), Decimal::ONE),
        ];
        let state = aggregate(&chain, Direction::Long);

        assert_eq!(state.remaining_size, dec!(1000));
        assert_eq!(state.average_entry_price, dec!(110));
    }

    #[test]
    fn test_fifo_partial_lot_consumed() {
        let chain = vec![
            entry(EntryKind::Initial, dec!(100), dec!(1000), Decimal::ONE),
            entry(EntryKind::Add, dec!(110), dec!(1000), Decimal::ONE),
            entry(EntryKind::Subtract, dec!(120), dec!(500), Decimal::ONE),
        ];
        let state = aggregate(&chain, Direction::Long);

        // 500 of the 100-lot survives: (500*100 + 1000*110) / 1500
        assert_eq!(state.remaining_size, dec!(1500));
        assert_eq!(
            state.average_entry_price.round_dp(4),
            dec!(106.6667)
        );
    }

    #[test]
    fn test_fifo_close_spanning_lots() {
        let chain = vec![
            entry(EntryKind::Initial, dec!(100), dec!(1000), Decimal::ONE),
            entry(EntryKind::Add, dec!(110), dec!(1000), Decimal::ONE),
            entry(EntryKind::Subtract, dec!(120), dec!(1500), Decimal::ONE),
        ];
        let state = aggregate(&chain, Direction::Long);

        // The whole 100-lot and half the 110-lot are gone.
        assert_eq!(state.remaining_size, dec!(500));
        assert_eq!(state.average_entry_price, dec!(110));
    }

    #[test]
    fn test_over_close_clamps_to_zero() {
        let chain = vec![
            entry(EntryKind::Initial, dec!(100), dec!(1000), dec!(5)),
            entry(EntryKind::Subtract, dec!(120), dec!(3000), dec!(5)),
        ];
        let state = aggregate(&chain, Direction::Long);

        assert_eq!(state.remaining_size, Decimal::ZERO);
        assert_eq!(state.average_entry_price, Decimal::ZERO);
        assert_eq!(state.average_leverage, Decimal::ONE);
    }

    #[test]
    fn test_average_leverage_follows_surviving_lots() {
        let chain = vec![
            entry(EntryKind::Initial, dec!(100), dec!(1000), dec!(10)),
            entry(EntryKind::Add, dec!(110), dec!(1000), dec!(2)),
        ];
        let state = aggregate(&chain, Direction::Long);
        assert_eq!(state.average_leverage, dec!(6));

        // After the 10x lot is consumed, only the 2x lot remains.
        let mut chain = chain;
        chain.push(entry(EntryKind::Subtract, dec!(120), dec!(1000), dec!(6)));
        let state = aggregate(&chain, Direction::Long);
        assert_eq!(state.average_leverage, dec!(2));
    }

    #[test]
    fn test_realized_pnl_uses_pre_close_average() {
        let chain = vec![
            entry(EntryKind::Initial, dec!(100), dec!(1000), Decimal::ONE),
            entry(EntryKind::Add, dec!(110), dec!(1000), Decimal::ONE),
            entry(EntryKind::Subtract, dec!(120), dec!(1000), Decimal::ONE),
        ];
        let state = aggregate(&chain, Direction::Long);

        // Pre-close average is 105; 1000 closed at 120 realizes
        // 1000 * 15/105.
        assert_eq!(state.realized_pnl.round_dp(2), dec!(142.86));
    }

    #[test]
    fn test_realized_pnl_short_direction() {
        let chain = vec![
            entry(EntryKind::Initial, dec!(100), dec!(1000), dec!(2)),
            entry(EntryKind::Subtract, dec!(90), dec!(500), dec!(2)),
        ];
        let state = aggregate(&chain, Direction::Short);

        // Short closed lower: 500 * (90-100)/100 * -1 * 2 = +100
        assert_eq!(state.realized_pnl, dec!(100));

        let state = aggregate(&chain, Direction::Long);
        assert_eq!(state.realized_pnl, dec!(-100));
    }

    #[test]
    fn test_realized_pnl_accumulates_across_closes() {
        let chain = vec![
            entry(EntryKind::Initial, dec!(100), dec!(1000), Decimal::ONE),
            entry(EntryKind::Subtract, dec!(110), dec!(500), Decimal::ONE),
            entry(EntryKind::Add, dec!(120), dec!(1000), Decimal::ONE),
            entry(EntryKind::Subtract, dec!(130), dec!(500), Decimal::ONE),
        ];
        let state = aggregate(&chain, Direction::Long);

        // First close: 500 * 10/100 = 50.
        // Second close realizes against (1000*100 + 1000*120)/2000 = 110:
        // 500 * 20/110 = 90.909...
        assert_eq!(state.realized_pnl.round_dp(2), dec!(140.91));
    }
}
