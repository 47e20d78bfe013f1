//! market-scraper: rate-limited market data collection for KuCoin
//!
//! This library provides the core components for:
//! - Sliding-window rate limiting shared across workers, per API tier
//! - KuCoin REST market data (candles, trade history, order book)
//! - Per-symbol polling workers with batching and cooperative shutdown
//! - Batch persistence to Parquet
//! - Structured logging and Prometheus metrics

pub mod cli;
pub mod collector;
pub mod config;
pub mod data;
pub mod exchange;
pub mod ratelimit;
pub mod telemetry;
