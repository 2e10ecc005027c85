//! API response types for the futures market-data endpoints.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 24h ticker statistics from /fapi/v1/ticker/24hr.
///
/// Prices arrive as JSON strings and are decoded straight into decimals.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerResponse {
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub last_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub price_change_percent: Decimal,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub high_price: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub low_price: Option<Decimal>,
}

/// Latest market quote for a symbol, as handed to the calculator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    /// Asset symbol as the user knows it (e.g. "BTC")
    pub symbol: String,

    /// Last traded price
    pub price: Decimal,

    /// Price change over the trailing 24 hours, in percent
    pub change_24h: Decimal,

    /// When this quote was fetched
    pub fetched_at: DateTime<Utc>,
}
