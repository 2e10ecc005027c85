//! Projection evaluator: what the position would look like after a
//! proposed adjustment, without touching the real chain.

use anyhow::{bail, Result};
use rust_decimal::Decimal;

use crate::models::{
    check_protection_sides, CalculatedMetrics, ChainState, Direction, Entry, EntryKind, Position,
};

use super::aggregator::aggregate;
use super::primitives::{
    liquidation_price, reward_amount, risk_amount, risk_reward_ratio, unrealized_pnl,
};

/// A proposed adjustment that has not been appended yet.
#[derive(Debug, Clone)]
pub struct Adjustment {
    /// Add or Subtract; a chain never gains a second Initial
    pub kind: EntryKind,
    pub price: Decimal,
    pub size: Decimal,
    /// Required for an Add. A Subtract closes existing leveraged exposure
    /// and inherits the chain's current average leverage instead.
    pub leverage: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
}

/// Result of evaluating an adjustment against a position.
#[derive(Debug, Clone)]
pub struct Projection {
    /// The entry that would be appended on commit
    pub entry: Entry,
    /// Aggregated chain state after the adjustment
    pub state: ChainState,
    /// Metrics of the post-adjustment position
    pub metrics: CalculatedMetrics,
}

/// Evaluate a proposed adjustment without mutating the position.
///
/// Committing afterwards is just appending the returned entry to the real
/// chain; preview and commit run the same aggregation, so the two can
/// never drift apart.
pub fn project(
    position: &Position,
    adjustment: &Adjustment,
    current_price: Option<Decimal>,
) -> Result<Projection> {
    if adjustment.price <= Decimal::ZERO {
        bail!("Adjustment price must be positive, got {}", adjustment.price);
    }
    if adjustment.size <= Decimal::ZERO {
        bail!("Adjustment size must be positive, got {}", adjustment.size);
    }

    let current = aggregate(&position.entries, position.direction);

    let leverage = match adjustment.kind {
        EntryKind::Initial => bail!("A chain has exactly one Initial entry"),
        EntryKind::Add => match adjustment.leverage {
            Some(leverage) if leverage >= Decimal::ONE => leverage,
            Some(leverage) => bail!("Leverage must be at least 1, got {}", leverage),
            None => bail!("An Add requires an explicit leverage"),
        },
        EntryKind::Subtract => {
            if current.is_flat() {
                bail!("Nothing remains open to reduce");
            }
            if adjustment.size > current.remaining_size {
                bail!(
                    "Cannot close {} with only {} remaining open",
                    adjustment.size,
                    current.remaining_size
                );
            }
            current.average_leverage
        }
    };

    let mut entry = Entry::new(adjustment.kind, adjustment.price, adjustment.size, leverage);
    entry.stop_loss = adjustment.stop_loss;
    entry.take_profit = adjustment.take_profit;

    let mut hypothetical = position.entries.clone();
    hypothetical.push(entry.clone());
    let state = aggregate(&hypothetical, position.direction);

    let stop_loss = adjustment.stop_loss.or(position.stop_loss);
    let take_profit = adjustment.take_profit.or(position.take_profit);
    if !state.is_flat() {
        check_protection_sides(
            position.direction,
            state.average_entry_price,
            stop_loss,
            take_profit,
        )?;
    }

    let metrics = evaluate_metrics(
        &state,
        position.direction,
        stop_loss,
        take_profit,
        current_price,
    );

    Ok(Projection {
        entry,
        state,
        metrics,
    })
}

/// Assemble risk/reward/liquidation/P&L figures for an aggregated state.
pub fn evaluate_metrics(
    state: &ChainState,
    direction: Direction,
    stop_loss: Option<Decimal>,
    take_profit: Option<Decimal>,
    current_price: Option<Decimal>,
) -> CalculatedMetrics {
    if state.is_flat() {
        return CalculatedMetrics::empty();
    }

    let risk = risk_amount(
        state.average_entry_price,
        stop_loss,
        state.remaining_size,
        state.average_leverage,
    );
    let reward = reward_amount(
        state.average_entry_price,
        take_profit,
        state.remaining_size,
        state.average_leverage,
        direction,
    );

    let liquidation = liquidation_price(
        state.average_entry_price,
        state.average_leverage,
        direction,
    );

    let pnl = current_price.map(|price| {
        unrealized_pnl(
            state.average_entry_price,
            price,
            state.remaining_size,
            state.average_leverage,
            direction,
        )
    });

    CalculatedMetrics {
        risk_amount: risk,
        reward_amount: reward,
        risk_reward_ratio: risk_reward_ratio(risk, reward),
        liquidation_price: Some(liquidation),
        pnl: pnl.map(|p| p.amount),
        pnl_percent: pnl.map(|p| p.percent),
    }
}
