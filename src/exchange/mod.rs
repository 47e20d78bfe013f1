//! Exchange market data module
//!
//! Read-only market data queries used by the collection workers

mod kucoin;
mod types;

pub use kucoin::{KucoinClient, KucoinConfig};
pub use types::{
    BookEntry, Candle, CandleInterval, Endpoint, FetchError, OrderBookSnapshot, Trade,
};

use async_trait::async_trait;

/// Source of market data for one symbol at a time
///
/// Each call performs exactly one request. Any failure is returned as a
/// [`FetchError`] and is otherwise opaque to the collector.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Candlestick series, most recent first
    async fn candles(
        &self,
        symbol: &str,
        interval: CandleInterval,
    ) -> Result<Vec<Candle>, FetchError>;

    /// Recent public trades
    async fn trade_history(&self, symbol: &str) -> Result<Vec<Trade>, FetchError>;

    /// Full-depth order book
    async fn order_book(&self, symbol: &str) -> Result<OrderBookSnapshot, FetchError>;
}
