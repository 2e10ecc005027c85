//! Market-data boundary: price client and background feed.

mod feed;
mod price_client;
mod types;

pub use feed::{FeedStatus, PriceFeed, DEFAULT_POLL_INTERVAL};
pub use price_client::PriceClient;
pub use types::{Quote, TickerResponse};
