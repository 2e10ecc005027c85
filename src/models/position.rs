//! Position model: an ordered chain of entries plus shared attributes.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Entry, EntryKind};

/// Side of a position, fixed for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "LONG" => Some(Direction::Long),
            "SHORT" => Some(Direction::Short),
            _ => None,
        }
    }

    /// Sign applied to every price-difference calculation.
    pub fn multiplier(&self) -> Decimal {
        match self {
            Direction::Long => Decimal::ONE,
            Direction::Short => Decimal::NEGATIVE_ONE,
        }
    }
}

/// Check that protective prices sit on the correct side of a reference price.
///
/// A stop-loss belongs on the loss side (below entry for Long, above for
/// Short) and a take-profit on the profit side. Wrong-side values are
/// rejected, never silently corrected.
pub fn check_protection_sides(
    direction: Direction,
    reference_price: Decimal,
    stop_loss: Option<Decimal>,
    take_profit: Option<Decimal>,
) -> Result<()> {
    if let Some(sl) = stop_loss {
        let valid = match direction {
            Direction::Long => sl < reference_price,
            Direction::Short => sl > reference_price,
        };
        if !valid {
            bail!(
                "Stop-loss {} must be on the loss side of entry price {} for a {} position",
                sl,
                reference_price,
                direction.as_str()
            );
        }
    }

    if let Some(tp) = take_profit {
        let valid = match direction {
            Direction::Long => tp > reference_price,
            Direction::Short => tp < reference_price,
        };
        if !valid {
            bail!(
                "Take-profit {} must be on the profit side of entry price {} for a {} position",
                tp,
                reference_price,
                direction.as_str()
            );
        }
    }

    Ok(())
}

/// Editable numeric fields of an existing entry.
#[derive(Debug, Clone, Default)]
pub struct EntryPatch {
    pub price: Option<Decimal>,
    pub size: Option<Decimal>,
    pub leverage: Option<Decimal>,
    pub stop_loss: Option<Option<Decimal>>,
    pub take_profit: Option<Option<Decimal>>,
}

/// A position: ordered entry chain, side, and protective defaults.
///
/// The chain is an owned appendable log. Aggregated figures are derived
/// from it on demand and never stored back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Database id, absent until persisted
    #[serde(default)]
    pub id: Option<i64>,

    /// Asset identifier (e.g. "BTC")
    pub symbol: String,

    /// Long or Short, fixed for the lifetime of the position
    pub direction: Direction,

    /// Entry chain; insertion order is chronological and significant
    pub entries: Vec<Entry>,

    /// Position-level stop-loss default, overridable per entry
    #[serde(default)]
    pub stop_loss: Option<Decimal>,

    /// Position-level take-profit default, overridable per entry
    #[serde(default)]
    pub take_profit: Option<Decimal>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// Create a position with its Initial entry.
    pub fn new(
        symbol: impl Into<String>,
        direction: Direction,
        price: Decimal,
        size: Decimal,
        leverage: Decimal,
    ) -> Result<Self> {
        validate_slice(price, size, leverage)?;

        Ok(Self {
            id: None,
            symbol: symbol.into(),
            direction,
            entries: vec![Entry::new(EntryKind::Initial, price, size, leverage)],
            stop_loss: None,
            take_profit: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
    }

    /// Set position-level protective defaults, validated against the
    /// Initial entry price.
    pub fn set_protections(
        &mut self,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Result<()> {
        let reference = self
            .entries
            .first()
            .map(|e| e.price)
            .unwrap_or(Decimal::ZERO);
        check_protection_sides(self.direction, reference, stop_loss, take_profit)?;

        self.stop_loss = stop_loss;
        self.take_profit = take_profit;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Total margin opened across Initial/Add entries.
    pub fn open_margin(&self) -> Decimal {
        self.entries
            .iter()
            .filter(|e| e.kind.is_opening())
            .map(|e| e.size)
            .sum()
    }

    /// Total margin closed across Subtract entries.
    pub fn closed_margin(&self) -> Decimal {
        self.entries
            .iter()
            .filter(|e| !e.kind.is_opening())
            .map(|e| e.size)
            .sum()
    }

    /// Margin still open.
    pub fn remaining_margin(&self) -> Decimal {
        (self.open_margin() - self.closed_margin()).max(Decimal::ZERO)
    }

    /// Effective stop-loss: the latest entry's override, else the
    /// position default.
    pub fn effective_stop_loss(&self) -> Option<Decimal> {
        self.entries
            .last()
            .and_then(|e| e.stop_loss)
            .or(self.stop_loss)
    }

    /// Effective take-profit: the latest entry's override, else the
    /// position default.
    pub fn effective_take_profit(&self) -> Option<Decimal> {
        self.entries
            .last()
            .and_then(|e| e.take_profit)
            .or(self.take_profit)
    }

    /// Append an Add or Subtract entry to the chain.
    ///
    /// A Subtract may not exceed the remaining open margin; evaluation of
    /// historical chains clamps instead, but new closes are validated.
    pub fn append(&mut self, entry: Entry) -> Result<()> {
        match entry.kind {
            EntryKind::Initial => bail!("A chain has exactly one Initial entry"),
            EntryKind::Add => validate_slice(entry.price, entry.size, entry.leverage)?,
            EntryKind::Subtract => {
                validate_slice(entry.price, entry.size, entry.leverage)?;
                let remaining = self.remaining_margin();
                if entry.size > remaining {
                    bail!(
                        "Cannot close {} with only {} remaining open",
                        entry.size,
                        remaining
                    );
                }
            }
        }

        self.entries.push(entry);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Edit numeric fields of an existing entry in place.
    pub fn edit_entry(&mut self, index: usize, patch: EntryPatch) -> Result<()> {
        let Some(current) = self.entries.get(index) else {
            bail!("No entry at index {}", index);
        };

        let mut edited = current.clone();
        if let Some(price) = patch.price {
            edited.price = price;
        }
        if let Some(size) = patch.size {
            edited.size = size;
        }
        if let Some(leverage) = patch.leverage {
            edited.leverage = leverage;
        }
        if let Some(sl) = patch.stop_loss {
            edited.stop_loss = sl;
        }
        if let Some(tp) = patch.take_profit {
            edited.take_profit = tp;
        }

        validate_slice(edited.price, edited.size, edited.leverage)?;
        check_protection_sides(
            self.direction,
            edited.price,
            edited.stop_loss,
            edited.take_profit,
        )?;

        let previous = std::mem::replace(&mut self.entries[index], edited);
        if self.closed_margin() > self.open_margin() {
            self.entries[index] = previous;
            bail!("Edit would close more volume than the chain has opened");
        }

        self.updated_at = Utc::now();
        Ok(())
    }

    /// Remove a non-Initial entry from the chain.
    pub fn remove_entry(&mut self, index: usize) -> Result<Entry> {
        let Some(entry) = self.entries.get(index) else {
            bail!("No entry at index {}", index);
        };
        if entry.kind == EntryKind::Initial {
            bail!("The Initial entry cannot be removed");
        }

        let removed = self.entries.remove(index);
        if self.closed_margin() > self.open_margin() {
            self.entries.insert(index, removed);
            bail!("Removal would close more volume than the chain has opened");
        }

        self.updated_at = Utc::now();
        Ok(removed)
    }
}

fn validate_slice(price: Decimal, size: Decimal, leverage: Decimal) -> Result<()> {
    if price <= Decimal::ZERO {
        bail!("Entry price must be positive, got {}", price);
    }
    if size <= Decimal::ZERO {
        bail!("Entry size must be positive, got {}", size);
    }
    if leverage < Decimal::ONE {
        bail!("Leverage must be at least 1, got {}", leverage);
    }
    Ok(())
}
