//! KuCoin REST client for public market data
//!
//! Every response is wrapped in an envelope of the form
//! `{"code": "200000", "data": ...}`; any other code is an API error.

use super::{Candle, CandleInterval, FetchError, MarketDataSource, OrderBookSnapshot, Trade};
use crate::config::{ExchangeConfig, DEFAULT_BASE_URL};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

/// Envelope code signalling success
const SUCCESS_CODE: &str = "200000";

const CANDLES_PATH: &str = "/api/v1/market/candles";
const TRADE_HISTORY_PATH: &str = "/api/v1/market/histories";
const ORDER_BOOK_PATH: &str = "/api/v1/market/orderbook/level3";

/// Configuration for the KuCoin client
#[derive(Debug, Clone)]
pub struct KucoinConfig {
    /// Base URL for the REST API
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for KucoinConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl From<&ExchangeConfig> for KucoinConfig {
    fn from(config: &ExchangeConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.request_timeout(),
        }
    }
}

/// Client for KuCoin's public market endpoints
pub struct KucoinClient {
    config: KucoinConfig,
    client: Client,
}

impl KucoinClient {
    /// Create a client with default configuration
    pub fn new() -> Result<Self, FetchError> {
        Self::with_config(KucoinConfig::default())
    }

    /// Create a client with custom configuration
    pub fn with_config(config: KucoinConfig) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    /// Base URL in use
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// Issue a GET and unwrap the response envelope
    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, FetchError> {
        let url = self.url(path);
        tracing::trace!(url = %url, ?query, "GET");

        let response = self.client.get(&url).query(query).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        decode_envelope(&body)
    }
}

/// Response envelope shared by all endpoints
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: String,
    data: Option<T>,
    #[serde(default)]
    msg: Option<String>,
}

fn decode_envelope<T: DeserializeOwned>(body: &str) -> Result<T, FetchError> {
    let envelope: Envelope<T> = serde_json::from_str(body)?;

    if envelope.code != SUCCESS_CODE {
        return Err(FetchError::Api {
            code: envelope.code,
            msg: envelope.msg.unwrap_or_default(),
        });
    }

    envelope.data.ok_or(FetchError::MissingData)
}

#[async_trait]
impl MarketDataSource for KucoinClient {
    async fn candles(
        &self,
        symbol: &str,
        interval: CandleInterval,
    ) -> Result<Vec<Candle>, FetchError> {
        self.get(
            CANDLES_PATH,
            &[("type", interval.as_str()), ("symbol", symbol)],
        )
        .await
    }

    async fn trade_history(&self, symbol: &str) -> Result<Vec<Trade>, FetchError> {
        self.get(TRADE_HISTORY_PATH, &[("symbol", symbol)]).await
    }

    async fn order_book(&self, symbol: &str) -> Result<OrderBookSnapshot, FetchError> {
        self.get(ORDER_BOOK_PATH, &[("symbol", symbol)]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_client_creation() {
        let client = KucoinClient::new().unwrap();
        assert_eq!(client.base_url(), DEFAULT_BASE_URL);
        assert_eq!(client.config.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_config_from_exchange_config() {
        let exchange = ExchangeConfig {
            base_url: "https://test.example.com/".to_string(),
            request_timeout_secs: 3,
        };
        let config = KucoinConfig::from(&exchange);
        assert_eq!(config.base_url, "https://test.example.com");
        assert_eq!(config.timeout, Duration::from_secs(3));

        let client = KucoinClient::with_config(config).unwrap();
        assert_eq!(
            client.url(CANDLES_PATH),
            "https://test.example.com/api/v1/market/candles"
        );
    }

    #[test]
    fn test_decode_candles_envelope() {
        let body = r#"{
            "code": "200000",
            "data": [
                ["1545904980", "0.058", "0.049", "0.058", "0.049", "0.018", "0.000945"],
                ["1545904920", "0.058", "0.072", "0.072", "0.058", "0.103", "0.006986"]
            ]
        }"#;
        let candles: Vec<Candle> = decode_envelope(body).unwrap();

        assert_eq!(candles.len(), 2);
        // Newest first
        assert!(candles[0].open_time > candles[1].open_time);
        assert_eq!(candles[1].close, dec!(0.072));
    }

    #[test]
    fn test_decode_api_error() {
        let body = r#"{"code": "400100", "msg": "Unsupported trading pair."}"#;
        let result: Result<Vec<Trade>, _> = decode_envelope(body);

        match result {
            Err(FetchError::Api { code, msg }) => {
                assert_eq!(code, "400100");
                assert_eq!(msg, "Unsupported trading pair.");
            }
            other => panic!("expected API error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_missing_data() {
        let body = r#"{"code": "200000"}"#;
        let result: Result<OrderBookSnapshot, _> = decode_envelope(body);
        assert!(matches!(result, Err(FetchError::MissingData)));
    }

    #[test]
    fn test_decode_invalid_json() {
        let result: Result<Vec<Trade>, _> = decode_envelope("<html>Bad Gateway</html>");
        assert!(matches!(result, Err(FetchError::Decode(_))));
    }

    #[test]
    fn test_decode_trades_envelope() {
        let body = r#"{
            "code": "200000",
            "data": [
                {"sequence": "1545896668571", "price": "0.07", "size": "0.004", "side": "buy", "time": 1545904567062140823},
                {"sequence": "1545896668578", "price": "0.054", "size": "0.066", "side": "sell", "time": 1545904581619888405}
            ]
        }"#;
        let trades: Vec<Trade> = decode_envelope(body).unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[1].side, "sell");
    }
}
