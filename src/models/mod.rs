//! Data models for entries, positions, and derived metrics.

mod entry;
mod position;
mod metrics;

pub use entry::{Entry, EntryKind};
pub use metrics::{CalculatedMetrics, ChainState, Pnl};
pub use position::{check_protection_sides, Direction, EntryPatch, Position};
