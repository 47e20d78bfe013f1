//! Configuration types for market-scraper

use crate::data::KeyMode;
use crate::exchange::CandleInterval;
use crate::ratelimit::Tier;
use crate::telemetry::LogFormat;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// KuCoin REST base URL
pub const DEFAULT_BASE_URL: &str = "https://api.kucoin.com";

/// Configuration errors; all are fatal at startup
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Symbol list is empty")]
    EmptySymbols,

    #[error("Symbol list contains a blank entry")]
    BlankSymbol,

    #[error("Duplicate symbol: {0}")]
    DuplicateSymbol(String),

    #[error("Capacity for {tier} tier must be positive")]
    NonPositiveCapacity { tier: Tier },

    #[error("Window for {tier} tier must be positive, got {window_secs}s")]
    NonPositiveWindow { tier: Tier, window_secs: f64 },

    #[error("Flush interval must be at least 1 iteration")]
    ZeroFlushInterval,

    #[error("Buffer cap must be at least 1 data point")]
    ZeroBufferCap,
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Exchange REST client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    /// REST base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_request_timeout_secs() -> u64 {
    10
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ExchangeConfig {
    /// Request timeout as a duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Collection loop configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    /// Symbols to poll, one worker each
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    /// Candlestick interval label
    #[serde(default)]
    pub interval: CandleInterval,

    /// Iterations between scheduled flushes
    #[serde(default = "default_flush_interval")]
    pub flush_interval: u64,

    /// Stop after this many iterations (absent = run until shutdown)
    #[serde(default)]
    pub max_iterations: Option<u64>,

    /// Fixed sleep between iterations; derived from the public budget when absent
    #[serde(default)]
    pub cycle_delay_ms: Option<u64>,

    /// Upper bound on points retained while flushes keep failing
    #[serde(default = "default_max_buffered_points")]
    pub max_buffered_points: usize,

    /// How long to wait for final flushes after a shutdown signal (seconds)
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_symbols() -> Vec<String> {
    ["BTC-USDT", "ETH-USDT", "LTC-USDT", "XRP-USDT", "ADA-USDT"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_flush_interval() -> u64 {
    10
}
fn default_max_buffered_points() -> usize {
    10_000
}
fn default_shutdown_grace_secs() -> u64 {
    10
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            interval: CandleInterval::default(),
            flush_interval: default_flush_interval(),
            max_iterations: None,
            cycle_delay_ms: None,
            max_buffered_points: default_max_buffered_points(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

/// Request budget for one tier
#[derive(Debug, Clone, Deserialize)]
pub struct TierLimit {
    /// Maximum admissions per window
    pub capacity: u32,
    /// Rolling window length (seconds)
    pub window_secs: f64,
    /// Polling backoff while waiting for admission (milliseconds)
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_backoff_ms() -> u64 {
    100
}

impl TierLimit {
    fn new(capacity: u32, window_secs: f64) -> Self {
        Self {
            capacity,
            window_secs,
            backoff_ms: default_backoff_ms(),
        }
    }

    /// Window as a duration (zero when the configured value is unusable)
    pub fn window(&self) -> Duration {
        Duration::try_from_secs_f64(self.window_secs).unwrap_or(Duration::ZERO)
    }

    /// Backoff as a duration
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// Rate limits for all tiers
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_public_limit")]
    pub public: TierLimit,
    #[serde(default = "default_private_limit")]
    pub private: TierLimit,
    #[serde(default = "default_high_frequency_limit")]
    pub high_frequency: TierLimit,
}

fn default_public_limit() -> TierLimit {
    TierLimit::new(500, 10.0)
}
fn default_private_limit() -> TierLimit {
    TierLimit::new(40, 10.0)
}
fn default_high_frequency_limit() -> TierLimit {
    TierLimit::new(1000, 10.0)
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            public: default_public_limit(),
            private: default_private_limit(),
            high_frequency: default_high_frequency_limit(),
        }
    }
}

impl LimitsConfig {
    /// Limit for a given tier
    pub fn tier(&self, tier: Tier) -> &TierLimit {
        match tier {
            Tier::Public => &self.public,
            Tier::Private => &self.private,
            Tier::HighFrequency => &self.high_frequency,
        }
    }
}

/// Batch persistence configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    /// Directory receiving Parquet batch files
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// How storage keys are derived for each flush
    #[serde(default)]
    pub key_mode: KeyMode,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            key_mode: KeyMode::default(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Serve Prometheus metrics on this port when set
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Reject configurations that cannot produce a correct run
    pub fn validate(&self) -> Result<(), ConfigError> {
        let symbols = &self.collector.symbols;
        if symbols.is_empty() {
            return Err(ConfigError::EmptySymbols);
        }

        let mut seen = HashSet::with_capacity(symbols.len());
        for symbol in symbols {
            if symbol.trim().is_empty() {
                return Err(ConfigError::BlankSymbol);
            }
            if !seen.insert(symbol.as_str()) {
                return Err(ConfigError::DuplicateSymbol(symbol.clone()));
            }
        }

        for tier in Tier::ALL {
            let limit = self.limits.tier(tier);
            if limit.capacity == 0 {
                return Err(ConfigError::NonPositiveCapacity { tier });
            }
            if !(limit.window_secs > 0.0) || limit.window().is_zero() {
                return Err(ConfigError::NonPositiveWindow {
                    tier,
                    window_secs: limit.window_secs,
                });
            }
        }

        if self.collector.flush_interval == 0 {
            return Err(ConfigError::ZeroFlushInterval);
        }
        if self.collector.max_buffered_points == 0 {
            return Err(ConfigError::ZeroBufferCap);
        }

        Ok(())
    }

    /// Sleep between worker iterations
    ///
    /// Without an explicit override this is the public budget split evenly
    /// across all workers: `window / (capacity / workers)`. It only shapes
    /// pacing; admission is always decided by the limiter.
    pub fn cycle_delay(&self) -> Duration {
        if let Some(ms) = self.collector.cycle_delay_ms {
            return Duration::from_millis(ms);
        }

        let limit = &self.limits.public;
        if limit.capacity == 0 {
            return limit.window();
        }
        let workers = self.collector.symbols.len().max(1) as u128;
        let nanos = limit.window().as_nanos() * workers / u128::from(limit.capacity);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}
