//! Read-only market price client for the futures 24h ticker endpoint.

use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::types::{Quote, TickerResponse};

const PRICE_API_BASE: &str = "https://fapi.binance.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for fetching current prices and 24h change per symbol.
pub struct PriceClient {
    client: Client,
    base_url: String,
}

impl PriceClient {
    /// Create a new price client with default settings.
    ///
    /// The base URL can be overridden via `PERPCALC_PRICE_API`.
    pub fn new() -> Result<Self> {
        let base_url =
            std::env::var("PERPCALC_PRICE_API").unwrap_or_else(|_| PRICE_API_BASE.to_string());
        Self::with_base_url(base_url)
    }

    /// Create with custom base URL (for testing).
    pub fn with_base_url(base_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, base_url })
    }

    /// Fetch the latest quote for an asset symbol.
    pub async fn get_ticker(&self, symbol: &str) -> Result<Quote> {
        let pair = Self::to_pair(symbol);
        let url = format!("{}/fapi/v1/ticker/24hr?symbol={}", self.base_url, pair);

        debug!(url = %url, "Fetching ticker");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch ticker")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Ticker request failed: {} - {}", status, body);
        }

        let ticker: TickerResponse = response
            .json()
            .await
            .context("Failed to parse ticker response")?;

        Ok(Quote {
            symbol: symbol.to_uppercase(),
            price: ticker.last_price,
            change_24h: ticker.price_change_percent,
            fetched_at: Utc::now(),
        })
    }

    /// Map an asset symbol to its USDT-margined pair ("BTC" -> "BTCUSDT").
    fn to_pair(symbol: &str) -> String {
        let upper = symbol.to_uppercase();
        if upper.ends_with("USDT") {
            upper
        } else {
            format!("{}USDT", upper)
        }
    }
}
