//! Collection runs against a simulated exchange

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use market_scraper::collector::{Collector, DataPoint};
use market_scraper::config::Config;
use market_scraper::data::{
    BatchKey, BatchStore, KeyMode, ParquetReader, ParquetStore, PersistError,
};
use market_scraper::exchange::{
    BookEntry, Candle, CandleInterval, FetchError, MarketDataSource, OrderBookSnapshot, Trade,
};
use parking_lot::Mutex;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// Zero-latency exchange that records the instant of every call
#[derive(Default)]
struct SimulatedExchange {
    calls: Mutex<Vec<Instant>>,
    candle_calls: Mutex<HashMap<String, i64>>,
    failing_symbol: Option<String>,
}

impl SimulatedExchange {
    fn record(&self) {
        self.calls.lock().push(Instant::now());
    }

    fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl MarketDataSource for SimulatedExchange {
    async fn candles(
        &self,
        symbol: &str,
        _interval: CandleInterval,
    ) -> Result<Vec<Candle>, FetchError> {
        self.record();
        let n = {
            let mut counts = self.candle_calls.lock();
            let n = counts.entry(symbol.to_string()).or_insert(0);
            *n += 1;
            *n
        };
        let open_time = Utc.timestamp_opt(1_736_000_000 + n * 60, 0).unwrap();
        Ok(vec![Candle {
            open_time,
            open: dec!(97000.1),
            close: dec!(97010.5),
            high: dec!(97020),
            low: dec!(96990),
            volume: dec!(1.25),
            turnover: dec!(121263.125),
        }])
    }

    async fn trade_history(&self, symbol: &str) -> Result<Vec<Trade>, FetchError> {
        self.record();
        if self.failing_symbol.as_deref() == Some(symbol) {
            return Err(FetchError::Api {
                code: "429000".to_string(),
                msg: "Too many requests".to_string(),
            });
        }
        Ok(vec![Trade {
            sequence: "1545896669145".to_string(),
            trade_id: Some("5c24c5da03aa673885cd67aa".to_string()),
            price: dec!(97010.5),
            size: dec!(0.01),
            side: "buy".to_string(),
            time: 1_736_000_000_000_000_000,
        }])
    }

    async fn order_book(&self, _symbol: &str) -> Result<OrderBookSnapshot, FetchError> {
        self.record();
        Ok(OrderBookSnapshot {
            sequence: "3262786978".to_string(),
            time: 1_736_000_000_000,
            bids: vec![BookEntry {
                price: dec!(97010),
                size: dec!(0.5),
                order_id: Some("bid-1".to_string()),
            }],
            asks: vec![BookEntry {
                price: dec!(97011),
                size: dec!(0.3),
                order_id: Some("ask-1".to_string()),
            }],
        })
    }
}

#[derive(Default)]
struct CountingStore {
    flushes: Mutex<Vec<(String, usize)>>,
}

#[async_trait]
impl BatchStore for CountingStore {
    async fn persist(&self, key: &BatchKey, batch: &[DataPoint]) -> Result<(), PersistError> {
        self.flushes.lock().push((key.symbol.clone(), batch.len()));
        Ok(())
    }
}

const SYMBOLS: [&str; 5] = ["BTC-USDT", "ETH-USDT", "LTC-USDT", "XRP-USDT", "ADA-USDT"];

fn five_symbol_config() -> Config {
    let mut config = Config::default();
    config.collector.symbols = SYMBOLS.iter().map(|s| s.to_string()).collect();
    config
}

/// Largest number of calls inside any trailing window
fn max_in_window(times: &[Instant], window: Duration) -> usize {
    let mut sorted = times.to_vec();
    sorted.sort();
    let mut start = 0;
    let mut max = 0;
    for end in 0..sorted.len() {
        while sorted[end].duration_since(sorted[start]) >= window {
            start += 1;
        }
        max = max.max(end - start + 1);
    }
    max
}

#[tokio::test(start_paused = true)]
async fn test_shared_budget_never_exceeded() {
    let exchange = Arc::new(SimulatedExchange::default());
    let store = Arc::new(CountingStore::default());
    let config = five_symbol_config();
    let collector = Collector::new(&config, exchange.clone(), store.clone()).unwrap();
    assert_eq!(collector.cycle_delay(), Duration::from_millis(100));

    let (tx, _rx) = broadcast::channel(1);
    let sender = tx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(60)).await;
        let _ = sender.send(());
    });
    let report = collector.run(&tx).await;

    let calls = exchange.call_times();
    assert!(max_in_window(&calls, Duration::from_secs(10)) <= 500);
    // Roughly six full windows of budget over the minute
    assert!(calls.len() >= 2500, "only {} calls", calls.len());

    assert_eq!(report.workers.len(), 5);
    for worker in &report.workers {
        assert!(worker.cancelled);
        assert!(worker.final_flush_ok);
        assert!(worker.iterations > 0);
    }
    assert_eq!(report.failures.total(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_bounded_run_flush_counts() {
    let exchange = Arc::new(SimulatedExchange::default());
    let store = Arc::new(CountingStore::default());
    let mut config = five_symbol_config();
    // Room for three calls per iteration at a 100ms cadence
    config.limits.public.capacity = 1600;
    config.collector.cycle_delay_ms = Some(100);
    config.collector.max_iterations = Some(600);
    config.collector.flush_interval = 10;
    let collector = Collector::new(&config, exchange.clone(), store.clone()).unwrap();

    let (tx, _rx) = broadcast::channel(1);
    let started = Instant::now();
    let report = collector.run(&tx).await;

    assert!(started.elapsed() <= Duration::from_secs(60));
    assert_eq!(exchange.call_times().len(), 5 * 600 * 3);
    assert!(max_in_window(&exchange.call_times(), Duration::from_secs(10)) <= 1500);

    for symbol in SYMBOLS {
        let worker = report.worker(symbol).unwrap();
        assert_eq!(worker.iterations, 600);
        assert_eq!(worker.points_collected, 600);
        // 60 scheduled flushes plus the final one
        assert_eq!(worker.flushes_ok, 61);
    }
    assert_eq!(report.total_flush_attempts(), 305);

    let flushes = store.flushes.lock().clone();
    assert_eq!(flushes.iter().filter(|(_, n)| *n == 10).count(), 300);
    assert_eq!(flushes.iter().filter(|(_, n)| *n == 0).count(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_failing_symbol_does_not_stop_others() {
    let exchange = Arc::new(SimulatedExchange {
        failing_symbol: Some("XRP-USDT".to_string()),
        ..Default::default()
    });
    let store = Arc::new(CountingStore::default());
    let mut config = five_symbol_config();
    config.collector.max_iterations = Some(20);
    let collector = Collector::new(&config, exchange, store).unwrap();

    let (tx, _rx) = broadcast::channel(1);
    let report = collector.run(&tx).await;

    let failing = report.worker("XRP-USDT").unwrap();
    assert_eq!(failing.iterations, 20);
    assert_eq!(failing.points_collected, 0);
    assert_eq!(failing.fetch_failures, 20);
    assert!(failing.final_flush_ok);

    for symbol in SYMBOLS.iter().filter(|s| **s != "XRP-USDT") {
        assert_eq!(report.worker(symbol).unwrap().points_collected, 20);
    }
    assert_eq!(report.failures.fetch, 20);
    assert_eq!(report.total_points(), 80);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_writes_final_parquet_files() {
    let dir = tempfile::tempdir().unwrap();
    let exchange = Arc::new(SimulatedExchange::default());
    let store = Arc::new(ParquetStore::new(dir.path()));

    let mut config = Config::default();
    config.collector.symbols = vec!["BTC-USDT".to_string(), "ETH-USDT".to_string()];
    config.collector.flush_interval = 1000;
    config.data.key_mode = KeyMode::Daily;
    let collector = Collector::new(&config, exchange, store).unwrap();

    let (tx, _rx) = broadcast::channel(1);
    let sender = tx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        let _ = sender.send(());
    });
    let report = collector.run(&tx).await;

    let mut files: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    files.sort();
    assert_eq!(files.len(), 2);

    for (path, symbol) in files.iter().zip(["BTC-USDT", "ETH-USDT"]) {
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with(&format!("{}_1min_", symbol)), "{name}");

        let points = ParquetReader::new(path).read_points().unwrap();
        let worker = report.worker(symbol).unwrap();
        assert!(worker.cancelled);
        assert_eq!(points.len() as u64, worker.points_collected);
        assert!(points.windows(2).all(|w| w[0].time < w[1].time));
        assert_eq!(points[0].order_book.best_bid(), Some(dec!(97010)));
    }
}
