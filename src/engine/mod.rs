//! Position-chain valuation engine: pure numeric reductions over an
//! entry chain. No I/O, no shared state, deterministic per call.

mod aggregator;
mod primitives;
mod projector;

pub use aggregator::aggregate;
pub use primitives::{
    blend_average_price, liquidation_price, reward_amount, risk_amount, risk_reward_ratio,
    unrealized_pnl,
};
pub use projector::{evaluate_metrics, project, Adjustment, Projection};
