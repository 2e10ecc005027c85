//! Entry model representing one economic event in a position's life.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of volume an entry contributes to the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryKind {
    /// The opening slice a position is created with. Exactly one per chain.
    Initial,
    /// Additional opening volume.
    Add,
    /// Closing volume, matched FIFO against previously opened volume.
    Subtract,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Initial => "INITIAL",
            EntryKind::Add => "ADD",
            EntryKind::Subtract => "SUBTRACT",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "INITIAL" => Some(EntryKind::Initial),
            "ADD" => Some(EntryKind::Add),
            "SUBTRACT" => Some(EntryKind::Subtract),
            _ => None,
        }
    }

    /// Initial and Add both open volume; Subtract closes it.
    pub fn is_opening(&self) -> bool {
        matches!(self, EntryKind::Initial | EntryKind::Add)
    }
}

/// One slice of a position's entry chain.
///
/// `size` is USD margin committed to the slice, before leverage; the
/// effective market exposure is `size * leverage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    /// Unique entry identifier
    pub id: Uuid,

    /// Kind of volume this entry contributes
    pub kind: EntryKind,

    /// Price at which this slice was opened or closed
    pub price: Decimal,

    /// USD margin notional of this slice (not leveraged)
    pub size: Decimal,

    /// Leverage applied to this slice
    pub leverage: Decimal,

    /// Per-entry stop-loss override
    #[serde(default)]
    pub stop_loss: Option<Decimal>,

    /// Per-entry take-profit override
    #[serde(default)]
    pub take_profit: Option<Decimal>,

    /// Creation time; informational only, chain order drives computation
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Entry {
    /// Create a new entry slice.
    pub fn new(kind: EntryKind, price: Decimal, size: Decimal, leverage: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            price,
            size,
            leverage,
            stop_loss: None,
            take_profit: None,
            created_at: Utc::now(),
        }
    }

    /// Leveraged market exposure of this slice.
    pub fn notional(&self) -> Decimal {
        self.size * self.leverage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_kind_roundtrip() {
        for kind in [EntryKind::Initial, EntryKind::Add, EntryKind::Subtract] {
            assert_eq!(EntryKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(EntryKind::from_str("bogus"), None);
    }

    #[test]
    fn test_opening_kinds() {
        assert!(EntryKind::Initial.is_opening());
        assert!(EntryKind::Add.is_opening());
        assert!(!EntryKind::Subtract.is_opening());
    }

    #[test]
    fn test_notional() {
        let entry = Entry::new(EntryKind::Initial, dec!(102500), dec!(1500), dec!(7));
        assert_eq!(entry.notional(), dec!(10500));
    }
}
