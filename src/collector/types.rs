//! Collector types

use crate::exchange::{Candle, CandleInterval, Endpoint, OrderBookSnapshot, Trade};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// One collection cycle's snapshot for a symbol
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataPoint {
    /// Exchange time of the selected candlestick
    pub time: DateTime<Utc>,
    /// First entry of the candle response (the API lists newest first)
    pub candlestick: Candle,
    /// Recent trades
    pub trades: Vec<Trade>,
    /// Order book snapshot
    pub order_book: OrderBookSnapshot,
    /// Local time the cycle completed
    pub captured_at: DateTime<Utc>,
}

impl DataPoint {
    /// Build a point from the first candle of a newest-first series
    ///
    /// Returns `None` when the series is empty.
    pub fn from_responses(
        candles: Vec<Candle>,
        trades: Vec<Trade>,
        order_book: OrderBookSnapshot,
        captured_at: DateTime<Utc>,
    ) -> Option<Self> {
        let candlestick = candles.into_iter().next()?;
        Some(Self {
            time: candlestick.open_time,
            candlestick,
            trades,
            order_book,
            captured_at,
        })
    }
}

/// Static settings and counters for one worker
#[derive(Debug, Clone)]
pub struct WorkerState {
    /// Symbol polled by this worker, unique across workers
    pub symbol: String,
    /// Candlestick interval requested each cycle
    pub interval: CandleInterval,
    /// Completed iterations
    pub iteration_count: u64,
    /// Iterations between scheduled flushes
    pub flush_interval: u64,
    /// Sleep between iterations
    pub cycle_delay: Duration,
    /// Optional iteration bound; `None` runs until shutdown
    pub max_iterations: Option<u64>,
    /// Points retained before the oldest are dropped
    pub max_buffered_points: usize,
}

impl WorkerState {
    /// New worker state with the given pacing
    pub fn new(symbol: impl Into<String>, flush_interval: u64, cycle_delay: Duration) -> Self {
        Self {
            symbol: symbol.into(),
            interval: CandleInterval::default(),
            iteration_count: 0,
            flush_interval: flush_interval.max(1),
            cycle_delay,
            max_iterations: None,
            max_buffered_points: usize::MAX,
        }
    }

    /// Bound the loop to `n` iterations
    pub fn max_iterations(mut self, n: Option<u64>) -> Self {
        self.max_iterations = n;
        self
    }

    /// Set the candlestick interval
    pub fn interval(mut self, interval: CandleInterval) -> Self {
        self.interval = interval;
        self
    }

    /// Cap the in-memory batch
    pub fn max_buffered_points(mut self, cap: usize) -> Self {
        self.max_buffered_points = cap.max(1);
        self
    }

    /// Whether the iteration bound has been reached
    pub fn is_exhausted(&self) -> bool {
        self.max_iterations
            .is_some_and(|max| self.iteration_count >= max)
    }

    /// Whether the iteration now finishing is a scheduled flush point
    pub fn is_flush_point(&self) -> bool {
        (self.iteration_count + 1) % self.flush_interval == 0
    }
}

/// A failure surfaced by a worker to the orchestrator
#[derive(Debug, Clone)]
pub enum WorkerFailure {
    /// An endpoint call failed; the iteration produced no point
    Fetch {
        symbol: String,
        /// 1-based iteration number
        iteration: u64,
        endpoint: Endpoint,
        error: String,
    },
    /// A flush failed; the batch was retained for the next flush point
    Persist {
        symbol: String,
        key: String,
        retained: usize,
        error: String,
    },
    /// The retained batch exceeded its cap and the oldest points were dropped
    BufferOverflow { symbol: String, dropped: usize },
    /// The final flush failed; its points are lost
    FinalFlushLost {
        symbol: String,
        lost: usize,
        error: String,
    },
}

impl WorkerFailure {
    /// Symbol of the reporting worker
    pub fn symbol(&self) -> &str {
        match self {
            WorkerFailure::Fetch { symbol, .. }
            | WorkerFailure::Persist { symbol, .. }
            | WorkerFailure::BufferOverflow { symbol, .. }
            | WorkerFailure::FinalFlushLost { symbol, .. } => symbol,
        }
    }
}

impl std::fmt::Display for WorkerFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerFailure::Fetch {
                symbol,
                iteration,
                endpoint,
                error,
            } => write!(
                f,
                "{}: {} call failed on iteration {}: {}",
                symbol, endpoint, iteration, error
            ),
            WorkerFailure::Persist {
                symbol,
                key,
                retained,
                error,
            } => write!(
                f,
                "{}: flush to {} failed, retaining {} points: {}",
                symbol, key, retained, error
            ),
            WorkerFailure::BufferOverflow { symbol, dropped } => {
                write!(f, "{}: buffer full, dropped {} oldest points", symbol, dropped)
            }
            WorkerFailure::FinalFlushLost {
                symbol,
                lost,
                error,
            } => write!(f, "{}: final flush failed, lost {} points: {}", symbol, lost, error),
        }
    }
}

/// Per-worker outcome of a collection run
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkerReport {
    pub symbol: String,
    pub iterations: u64,
    pub points_collected: u64,
    pub fetch_failures: u64,
    pub flushes_ok: u64,
    pub flush_failures: u64,
    pub points_dropped: u64,
    /// Whether the final flush succeeded
    pub final_flush_ok: bool,
    /// Whether the loop ended because of a shutdown signal
    pub cancelled: bool,
}

/// Failure counts drained from the failure channel
#[derive(Debug, Clone, Default, Serialize)]
pub struct FailureTally {
    pub fetch: u64,
    pub persist: u64,
    pub overflow: u64,
    pub final_flush_lost: u64,
}

impl FailureTally {
    /// Count one failure
    pub fn record(&mut self, failure: &WorkerFailure) {
        match failure {
            WorkerFailure::Fetch { .. } => self.fetch += 1,
            WorkerFailure::Persist { .. } => self.persist += 1,
            WorkerFailure::BufferOverflow { .. } => self.overflow += 1,
            WorkerFailure::FinalFlushLost { .. } => self.final_flush_lost += 1,
        }
    }

    /// Total failures of any kind
    pub fn total(&self) -> u64 {
        self.fetch + self.persist + self.overflow + self.final_flush_lost
    }
}

/// Outcome of a full collection run
#[derive(Debug, Clone, Serialize)]
pub struct CollectionReport {
    pub run_id: Uuid,
    pub workers: Vec<WorkerReport>,
    pub failures: FailureTally,
}

impl CollectionReport {
    /// Total flushes (successful or not) across workers, including final flushes
    pub fn total_flush_attempts(&self) -> u64 {
        self.workers
            .iter()
            .map(|w| w.flushes_ok + w.flush_failures)
            .sum()
    }

    /// Total points collected across workers
    pub fn total_points(&self) -> u64 {
        self.workers.iter().map(|w| w.points_collected).sum()
    }

    /// Report for one symbol
    pub fn worker(&self, symbol: &str) -> Option<&WorkerReport> {
        self.workers.iter().find(|w| w.symbol == symbol)
    }
}
