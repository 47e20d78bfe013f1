//! Batch flushing and storage keys

use crate::collector::DataPoint;
use crate::exchange::CandleInterval;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while writing a batch
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Invalid stored data: {0}")]
    Invalid(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// How a flush is mapped to a storage key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyMode {
    /// One key per flush: `{symbol}_{interval}_{date}_{time}_{seq}`
    #[default]
    PerFlush,
    /// One key per calendar day: `{symbol}_{interval}_{date}`
    ///
    /// Later flushes overwrite earlier ones, and a flush only carries the
    /// points buffered since the previous one. The final flush of a run that
    /// stops right after a scheduled flush is empty, so it replaces that
    /// day's data with nothing.
    Daily,
}

impl KeyMode {
    /// Whether a flush can replace data written by an earlier one
    pub fn overwrites(&self) -> bool {
        matches!(self, KeyMode::Daily)
    }
}

/// Storage key for one flushed batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchKey {
    pub symbol: String,
    pub interval: CandleInterval,
    pub flushed_at: DateTime<Utc>,
    /// Per-worker flush counter
    pub sequence: u64,
    pub mode: KeyMode,
}

impl std::fmt::Display for BatchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.mode {
            KeyMode::Daily => write!(
                f,
                "{}_{}_{}",
                self.symbol,
                self.interval,
                self.flushed_at.format("%Y%m%d")
            ),
            KeyMode::PerFlush => write!(
                f,
                "{}_{}_{}_{:06}",
                self.symbol,
                self.interval,
                self.flushed_at.format("%Y%m%d_%H%M%S%3f"),
                self.sequence
            ),
        }
    }
}

/// Durable key-value write surface for batches
#[async_trait]
pub trait BatchStore: Send + Sync {
    /// Write `batch` under `key`, replacing anything already stored there
    async fn persist(&self, key: &BatchKey, batch: &[DataPoint]) -> Result<(), PersistError>;
}

/// A failed flush and the key it targeted
#[derive(Debug, Error)]
#[error("Failed to flush {key}: {source}")]
pub struct FlushError {
    pub key: BatchKey,
    #[source]
    pub source: PersistError,
}

/// Flushes one worker's batches to a [`BatchStore`]
///
/// The caller owns the buffer: it clears it after `Ok` and keeps it after
/// `Err`, so a failed flush is retried with the grown batch at the next
/// flush point.
pub struct BatchPersistor {
    store: Arc<dyn BatchStore>,
    symbol: String,
    interval: CandleInterval,
    mode: KeyMode,
    sequence: u64,
}

impl BatchPersistor {
    /// Create a persistor for one symbol
    pub fn new(
        store: Arc<dyn BatchStore>,
        symbol: impl Into<String>,
        interval: CandleInterval,
        mode: KeyMode,
    ) -> Self {
        Self {
            store,
            symbol: symbol.into(),
            interval,
            mode,
            sequence: 0,
        }
    }

    /// Flush attempts made so far
    pub fn attempts(&self) -> u64 {
        self.sequence
    }

    /// Key for the next flush at `now`
    pub fn key_at(&self, now: DateTime<Utc>) -> BatchKey {
        BatchKey {
            symbol: self.symbol.clone(),
            interval: self.interval,
            flushed_at: now,
            sequence: self.sequence,
            mode: self.mode,
        }
    }

    /// Write the current batch, including an empty one
    pub async fn flush(&mut self, batch: &[DataPoint]) -> Result<BatchKey, FlushError> {
        let key = self.key_at(Utc::now());
        self.sequence += 1;

        match self.store.persist(&key, batch).await {
            Ok(()) => {
                tracing::debug!(key = %key, records = batch.len(), "Flushed batch");
                Ok(key)
            }
            Err(source) => {
                tracing::error!(key = %key, records = batch.len(), error = %source, "Failed to flush batch");
                Err(FlushError { key, source })
            }
        }
    }
}
