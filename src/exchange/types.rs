//! Market data payload types

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Candlestick interval labels accepted by the candles endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CandleInterval {
    #[default]
    #[serde(rename = "1min")]
    OneMinute,
    #[serde(rename = "3min")]
    ThreeMinutes,
    #[serde(rename = "5min")]
    FiveMinutes,
    #[serde(rename = "15min")]
    FifteenMinutes,
    #[serde(rename = "30min")]
    ThirtyMinutes,
    #[serde(rename = "1hour")]
    OneHour,
    #[serde(rename = "2hour")]
    TwoHours,
    #[serde(rename = "4hour")]
    FourHours,
    #[serde(rename = "6hour")]
    SixHours,
    #[serde(rename = "8hour")]
    EightHours,
    #[serde(rename = "12hour")]
    TwelveHours,
    #[serde(rename = "1day")]
    OneDay,
    #[serde(rename = "1week")]
    OneWeek,
}

impl CandleInterval {
    /// Exchange label (e.g. "1min")
    pub fn as_str(&self) -> &'static str {
        match self {
            CandleInterval::OneMinute => "1min",
            CandleInterval::ThreeMinutes => "3min",
            CandleInterval::FiveMinutes => "5min",
            CandleInterval::FifteenMinutes => "15min",
            CandleInterval::ThirtyMinutes => "30min",
            CandleInterval::OneHour => "1hour",
            CandleInterval::TwoHours => "2hour",
            CandleInterval::FourHours => "4hour",
            CandleInterval::SixHours => "6hour",
            CandleInterval::EightHours => "8hour",
            CandleInterval::TwelveHours => "12hour",
            CandleInterval::OneDay => "1day",
            CandleInterval::OneWeek => "1week",
        }
    }
}

impl std::fmt::Display for CandleInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CandleInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| format!("unknown candle interval: {}", s))
    }
}

/// The three calls made per collection cycle, in call order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Candles,
    TradeHistory,
    OrderBook,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Candles => "candles",
            Endpoint::TradeHistory => "trade_history",
            Endpoint::OrderBook => "order_book",
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-call failure; the collector treats every variant the same way
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("API error {code}: {msg}")]
    Api { code: String, msg: String },

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Response carried no data")]
    MissingData,

    #[error("Candle response was empty")]
    EmptyCandles,
}

/// One candlestick: open time, open, close, high, low, volume, turnover
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCandle")]
pub struct Candle {
    /// Candle open time
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub close: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    /// Base asset volume
    pub volume: Decimal,
    /// Quote asset turnover
    pub turnover: Decimal,
}

/// Wire layout: `["1545904980", "0.058", "0.049", "0.058", "0.049", "0.018", "0.000945"]`
#[derive(Debug, Deserialize)]
struct RawCandle(
    String,
    Decimal,
    Decimal,
    Decimal,
    Decimal,
    Decimal,
    Decimal,
);

impl TryFrom<RawCandle> for Candle {
    type Error = String;

    fn try_from(raw: RawCandle) -> Result<Self, Self::Error> {
        let secs: i64 = raw
            .0
            .parse()
            .map_err(|e| format!("invalid candle time {:?}: {}", raw.0, e))?;
        let open_time = Utc
            .timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| format!("candle time out of range: {}", secs))?;

        Ok(Candle {
            open_time,
            open: raw.1,
            close: raw.2,
            high: raw.3,
            low: raw.4,
            volume: raw.5,
            turnover: raw.6,
        })
    }
}

/// A public trade from the trade history endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    /// Exchange sequence number
    #[serde(deserialize_with = "string_or_number")]
    pub sequence: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trade_id: Option<String>,
    pub price: Decimal,
    pub size: Decimal,
    /// "buy" or "sell" (taker side)
    pub side: String,
    /// Trade time in nanoseconds since the epoch
    pub time: i64,
}

/// One resting order in the book
#[derive(Debug, Clone, PartialEq)]
pub struct BookEntry {
    pub price: Decimal,
    pub size: Decimal,
    pub order_id: Option<String>,
}

impl Serialize for BookEntry {
    /// Written back in the wire row layout so stored snapshots decode unchanged
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeSeq;

        let len = if self.order_id.is_some() { 3 } else { 2 };
        let mut seq = serializer.serialize_seq(Some(len))?;
        if let Some(id) = &self.order_id {
            seq.serialize_element(id)?;
        }
        seq.serialize_element(&self.price.to_string())?;
        seq.serialize_element(&self.size.to_string())?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for BookEntry {
    /// Accepts level-3 rows `[orderId, price, size, ...]` and level-2 rows `[price, size]`
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;

        let row: Vec<serde_json::Value> = Vec::deserialize(deserializer)?;
        let cells: Vec<String> = row.iter().map(value_to_string).collect();

        let (order_id, price, size) = match cells.as_slice() {
            [price, size] => (None, price, size),
            [id, price, size, ..] => (Some(id.clone()), price, size),
            _ => {
                return Err(D::Error::custom(format!(
                    "order book row has {} cells",
                    cells.len()
                )))
            }
        };

        Ok(BookEntry {
            price: Decimal::from_str(price).map_err(D::Error::custom)?,
            size: Decimal::from_str(size).map_err(D::Error::custom)?,
            order_id,
        })
    }
}

/// Full-depth order book snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    #[serde(default, deserialize_with = "string_or_number")]
    pub sequence: String,
    /// Snapshot time in milliseconds since the epoch
    #[serde(default)]
    pub time: i64,
    /// Bids, best first
    #[serde(default)]
    pub bids: Vec<BookEntry>,
    /// Asks, best first
    #[serde(default)]
    pub asks: Vec<BookEntry>,
}

impl OrderBookSnapshot {
    /// Best bid price
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|e| e.price)
    }

    /// Best ask price
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|e| e.price)
    }
}

fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Null => String::new(),
        other => value_to_string(&other),
    })
}
