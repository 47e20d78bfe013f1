//! Batch persistence to Parquet files

use chrono::{DateTime, TimeZone, Utc};
use market_scraper::collector::DataPoint;
use market_scraper::data::{BatchPersistor, KeyMode, ParquetReader, ParquetStore};
use market_scraper::exchange::{BookEntry, Candle, CandleInterval, OrderBookSnapshot, Trade};
use rust_decimal_macros::dec;
use std::path::Path;
use std::sync::Arc;

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn point(secs: i64) -> DataPoint {
    DataPoint {
        time: at(secs),
        candlestick: Candle {
            open_time: at(secs),
            open: dec!(2.3456),
            close: dec!(2.3501),
            high: dec!(2.36),
            low: dec!(2.3399),
            volume: dec!(15230.5),
            turnover: dec!(35795.9112),
        },
        trades: vec![Trade {
            sequence: "11067996711960577".to_string(),
            trade_id: None,
            price: dec!(2.3501),
            size: dec!(120),
            side: "sell".to_string(),
            time: secs * 1_000_000_000,
        }],
        order_book: OrderBookSnapshot {
            sequence: "11067996711960578".to_string(),
            time: secs * 1000,
            bids: vec![BookEntry {
                price: dec!(2.35),
                size: dec!(800),
                order_id: Some("6779ab95c4a0ef0007c26e9c".to_string()),
            }],
            asks: vec![],
        },
        captured_at: at(secs + 1),
    }
}

fn parquet_files(dir: &Path) -> Vec<std::path::PathBuf> {
    let mut files: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().is_some_and(|e| e == "parquet"))
        .collect();
    files.sort();
    files
}

#[tokio::test]
async fn test_per_flush_keys_keep_every_batch() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(ParquetStore::new(dir.path()));
    let mut persistor = BatchPersistor::new(
        store,
        "XRP-USDT",
        CandleInterval::OneMinute,
        KeyMode::PerFlush,
    );

    persistor.flush(&[point(60), point(120)]).await.unwrap();
    persistor.flush(&[point(180)]).await.unwrap();
    persistor.flush(&[]).await.unwrap();

    let files = parquet_files(dir.path());
    assert_eq!(files.len(), 3);

    let counts: Vec<usize> = files
        .iter()
        .map(|f| ParquetReader::new(f).row_count().unwrap())
        .collect();
    assert_eq!(counts, vec![2, 1, 0]);
}

#[tokio::test]
async fn test_daily_key_keeps_only_last_flush() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(ParquetStore::new(dir.path()));
    let mut persistor =
        BatchPersistor::new(store, "XRP-USDT", CandleInterval::OneHour, KeyMode::Daily);

    persistor.flush(&[point(60), point(120)]).await.unwrap();
    let key = persistor.flush(&[point(180)]).await.unwrap();

    let files = parquet_files(dir.path());
    assert_eq!(files.len(), 1);
    assert_eq!(
        files[0].file_name().unwrap().to_string_lossy(),
        format!("{}.parquet", key)
    );

    let points = ParquetReader::new(&files[0]).read_points().unwrap();
    assert_eq!(points, vec![point(180)]);
}

#[tokio::test]
async fn test_stored_points_read_back_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(ParquetStore::new(dir.path().join("nested")));
    let mut persistor = BatchPersistor::new(
        store,
        "LTC-USDT",
        CandleInterval::FifteenMinutes,
        KeyMode::PerFlush,
    );

    let batch = vec![point(900), point(1800), point(2700)];
    persistor.flush(&batch).await.unwrap();

    let files = parquet_files(&dir.path().join("nested"));
    assert_eq!(files.len(), 1);
    let points = ParquetReader::new(&files[0]).read_points().unwrap();
    assert_eq!(points, batch);
    assert_eq!(points[0].order_book.best_bid(), Some(dec!(2.35)));
    assert_eq!(points[0].order_book.best_ask(), None);
}

#[tokio::test]
async fn test_unwritable_directory_fails_flush() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"occupied").unwrap();

    let store = Arc::new(ParquetStore::new(&blocker));
    let mut persistor = BatchPersistor::new(
        store,
        "ADA-USDT",
        CandleInterval::OneMinute,
        KeyMode::PerFlush,
    );

    let err = persistor.flush(&[point(60)]).await.unwrap_err();
    assert_eq!(err.key.symbol, "ADA-USDT");
    assert_eq!(persistor.attempts(), 1);
}
