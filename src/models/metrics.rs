//! Derived position metrics: aggregated chain state and risk/reward figures.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Aggregated state of an entry chain, recomputed on every read.
///
/// `average_entry_price` and `average_leverage` describe the volume still
/// open after FIFO-matching closes against the oldest opening lots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainState {
    /// Total margin opened across Initial/Add entries
    pub open_size: Decimal,

    /// Total margin closed across Subtract entries
    pub closed_size: Decimal,

    /// Margin still open (never negative)
    pub remaining_size: Decimal,

    /// Size-weighted average price of the remaining volume (0 when flat)
    pub average_entry_price: Decimal,

    /// Size-weighted average leverage of the remaining volume (1 when flat)
    pub average_leverage: Decimal,

    /// P&L locked in by Subtract entries, summed over the chain
    pub realized_pnl: Decimal,
}

impl ChainState {
    /// State of a chain with no entries.
    pub fn empty() -> Self {
        Self {
            open_size: Decimal::ZERO,
            closed_size: Decimal::ZERO,
            remaining_size: Decimal::ZERO,
            average_entry_price: Decimal::ZERO,
            average_leverage: Decimal::ONE,
            realized_pnl: Decimal::ZERO,
        }
    }

    /// True when no open volume remains.
    pub fn is_flat(&self) -> bool {
        self.remaining_size.is_zero()
    }
}

/// Unrealized P&L of an open slice, in USD and as return on margin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pnl {
    /// P&L in USD
    pub amount: Decimal,

    /// P&L as a leverage-scaled percentage of margin
    pub percent: Decimal,
}

/// Risk, reward, and price-dependent figures for an aggregated position.
///
/// Price-dependent fields are `None` when no market price is available;
/// a missing price is a display condition, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculatedMetrics {
    /// USD loss if the stop-loss is hit (0 when no stop-loss set)
    pub risk_amount: Decimal,

    /// USD gain if the take-profit is hit (0 when unset or wrong-side)
    pub reward_amount: Decimal,

    /// reward / risk, 0 when either side is 0
    pub risk_reward_ratio: Decimal,

    /// Estimated liquidation price of the remaining volume
    pub liquidation_price: Option<Decimal>,

    /// Unrealized P&L in USD at the current market price
    pub pnl: Option<Decimal>,

    /// Unrealized P&L as a percentage of margin
    pub pnl_percent: Option<Decimal>,
}

impl CalculatedMetrics {
    /// Metrics with nothing computable (flat chain, no price).
    pub fn empty() -> Self {
        Self {
            risk_amount: Decimal::ZERO,
            reward_amount: Decimal::ZERO,
            risk_reward_ratio: Decimal::ZERO,
            liquidation_price: None,
            pnl: None,
            pnl_percent: None,
        }
    }
}
