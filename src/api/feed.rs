//! Background price feed: polls the ticker on a fixed cadence and holds
//! the latest quote per symbol for calculators to read.
//!
//! The core only ever consumes whatever the latest numeric price is; a
//! failed poll flips the feed to Disconnected and the previous quote
//! stays readable.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use backoff::ExponentialBackoffBuilder;
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{debug, warn};

use super::price_client::PriceClient;
use super::types::Quote;

/// Default polling cadence.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Connection status of the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedStatus {
    Connected,
    Disconnected { last_error: String },
}

#[derive(Debug)]
struct FeedState {
    quotes: HashMap<String, Quote>,
    status: FeedStatus,
}

/// Shared handle to the polling loop and its latest quotes.
#[derive(Clone)]
pub struct PriceFeed {
    client: Arc<PriceClient>,
    symbols: Vec<String>,
    poll_interval: Duration,
    state: Arc<RwLock<FeedState>>,
    shutdown: Arc<AtomicBool>,
}

impl PriceFeed {
    /// Create a feed for the given symbols at the default cadence.
    pub fn new(client: PriceClient, symbols: Vec<String>) -> Self {
        Self {
            client: Arc::new(client),
            symbols,
            poll_interval: DEFAULT_POLL_INTERVAL,
            state: Arc::new(RwLock::new(FeedState {
                quotes: HashMap::new(),
                status: FeedStatus::Disconnected {
                    last_error: "not yet polled".to_string(),
                },
            })),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Override the polling cadence.
    pub fn with_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Spawn the polling loop onto the runtime.
    pub fn spawn(&self) -> tokio::task::JoinHandle<()> {
        let feed = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(feed.poll_interval);
            loop {
                ticker.tick().await;
                if feed.shutdown.load(Ordering::Relaxed) {
                    debug!("Price feed stopping");
                    break;
                }
                feed.poll_once().await;
            }
        })
    }

    /// Latest quote for a symbol, if any poll has succeeded for it.
    pub async fn latest(&self, symbol: &str) -> Option<Quote> {
        let state = self.state.read().await;
        state.quotes.get(&symbol.to_uppercase()).cloned()
    }

    /// Current connection status.
    pub async fn status(&self) -> FeedStatus {
        self.state.read().await.status.clone()
    }

    /// Poll immediately, outside the fixed cadence.
    pub async fn refresh(&self) -> FeedStatus {
        self.poll_once().await;
        self.status().await
    }

    /// Signal the polling loop to stop after its current tick.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    async fn poll_once(&self) {
        for symbol in &self.symbols {
            match self.fetch_with_retry(symbol).await {
                Ok(quote) => {
                    let mut state = self.state.write().await;
                    state.quotes.insert(quote.symbol.clone(), quote);
                    state.status = FeedStatus::Connected;
                }
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "Price poll failed");
                    let mut state = self.state.write().await;
                    state.status = FeedStatus::Disconnected {
                        last_error: e.to_string(),
                    };
                }
            }
        }
    }

    async fn fetch_with_retry(&self, symbol: &str) -> Result<Quote> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(250))
            .with_max_elapsed_time(Some(Duration::from_secs(2)))
            .build();

        let quote = backoff::future::retry(policy, || async {
            self.client
                .get_ticker(symbol)
                .await
                .map_err(backoff::Error::transient)
        })
        .await?;

        Ok(quote)
    }
}
