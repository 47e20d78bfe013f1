//! Configuration loading

use market_scraper::config::{Config, ConfigError};
use market_scraper::data::KeyMode;
use market_scraper::exchange::CandleInterval;
use market_scraper::ratelimit::{Tier, TierLimiters};
use market_scraper::telemetry::LogFormat;
use std::io::Write;
use std::time::Duration;

#[test]
fn test_example_config_is_valid() {
    let config = Config::from_toml(include_str!("../../config.toml.example")).unwrap();
    config.validate().unwrap();

    assert_eq!(config.collector.symbols.len(), 5);
    assert_eq!(config.collector.interval, CandleInterval::OneMinute);
    assert_eq!(config.collector.flush_interval, 10);
    assert_eq!(config.data.key_mode, KeyMode::PerFlush);
    assert_eq!(config.telemetry.log_format, LogFormat::Pretty);
    assert_eq!(config.cycle_delay(), Duration::from_millis(100));
}

#[test]
fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
        [collector]
        symbols = ["SOL-USDT", "DOT-USDT"]
        interval = "5min"
        max_iterations = 30

        [limits.public]
        capacity = 100
        window_secs = 2.5
        backoff_ms = 25

        [data]
        key_mode = "daily"
        "#
    )
    .unwrap();

    let config = Config::load(file.path()).unwrap();
    config.validate().unwrap();
    assert_eq!(config.collector.interval, CandleInterval::FiveMinutes);
    assert_eq!(config.collector.max_iterations, Some(30));
    assert_eq!(config.data.key_mode, KeyMode::Daily);
    // 2.5s * 2 workers / 100
    assert_eq!(config.cycle_delay(), Duration::from_millis(50));

    let limiters = TierLimiters::from_config(&config.limits);
    let public = limiters.get(Tier::Public);
    assert_eq!(public.capacity(), 100);
    assert_eq!(public.window(), Duration::from_millis(2500));
    assert_eq!(public.backoff(), Duration::from_millis(25));
    // Untouched tiers keep their defaults
    assert_eq!(limiters.get(Tier::HighFrequency).capacity(), 1000);
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = Config::load(dir.path().join("absent.toml"));
    match result {
        Err(ConfigError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
        other => panic!("expected I/O error, got {other:?}"),
    }
}

#[test]
fn test_invalid_values_fail_validation() {
    let config = Config::from_toml(
        r#"
        [limits.private]
        capacity = 0
        window_secs = 10
        "#,
    )
    .unwrap();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::NonPositiveCapacity {
            tier: Tier::Private
        })
    ));

    let config = Config::from_toml(
        r#"
        [collector]
        symbols = []
        "#,
    )
    .unwrap();
    assert!(matches!(config.validate(), Err(ConfigError::EmptySymbols)));
}

#[test]
fn test_malformed_file_is_parse_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[collector\nsymbols = 3").unwrap();
    assert!(matches!(Config::load(file.path()), Err(ConfigError::Parse(_))));
}
