//! Spawns and joins one worker per symbol

use super::shutdown::ShutdownSignal;
use super::types::{CollectionReport, FailureTally, WorkerFailure, WorkerReport, WorkerState};
use super::worker::MarketWorker;
use crate::config::{Config, ConfigError};
use crate::data::{BatchPersistor, BatchStore, KeyMode};
use crate::exchange::{CandleInterval, MarketDataSource};
use crate::ratelimit::{Tier, TierLimiters};
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

/// Runs the collection workers against shared tier limiters
///
/// Workers share nothing but the public-tier limiter and the failure
/// channel drained here.
pub struct Collector {
    symbols: Vec<String>,
    interval: CandleInterval,
    flush_interval: u64,
    max_iterations: Option<u64>,
    cycle_delay: Duration,
    max_buffered_points: usize,
    key_mode: KeyMode,
    source: Arc<dyn MarketDataSource>,
    store: Arc<dyn BatchStore>,
    limiters: TierLimiters,
}

impl Collector {
    /// Validate `config` and build the tier limiters
    pub fn new(
        config: &Config,
        source: Arc<dyn MarketDataSource>,
        store: Arc<dyn BatchStore>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if config.data.key_mode.overwrites() {
            tracing::warn!(
                key_mode = ?config.data.key_mode,
                "Each flush replaces the day's file; a final flush right after a scheduled one leaves it empty"
            );
        }

        Ok(Self {
            symbols: config.collector.symbols.clone(),
            interval: config.collector.interval,
            flush_interval: config.collector.flush_interval,
            max_iterations: config.collector.max_iterations,
            cycle_delay: config.cycle_delay(),
            max_buffered_points: config.collector.max_buffered_points,
            key_mode: config.data.key_mode,
            source,
            store,
            limiters: TierLimiters::from_config(&config.limits),
        })
    }

    pub fn limiters(&self) -> &TierLimiters {
        &self.limiters
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn cycle_delay(&self) -> Duration {
        self.cycle_delay
    }

    /// Run every worker until it finishes or `shutdown` fires
    pub async fn run(self, shutdown: &broadcast::Sender<()>) -> CollectionReport {
        self.start(shutdown).join().await
    }

    /// Spawn every worker without waiting for them
    ///
    /// Each worker is subscribed to `shutdown` before this returns, so any
    /// message sent afterwards reaches all of them.
    pub fn start(self, shutdown: &broadcast::Sender<()>) -> RunningCollection {
        let run_id = Uuid::new_v4();
        let limiter = self.limiters.get(Tier::Public).clone();
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();

        tracing::info!(
            %run_id,
            workers = self.symbols.len(),
            tier = limiter.name(),
            capacity = limiter.capacity(),
            window_secs = limiter.window().as_secs_f64(),
            cycle_delay_ms = self.cycle_delay.as_millis() as u64,
            "Starting collection"
        );

        let handles: Vec<_> = self
            .symbols
            .iter()
            .map(|symbol| {
                let state = WorkerState::new(symbol.clone(), self.flush_interval, self.cycle_delay)
                    .interval(self.interval)
                    .max_iterations(self.max_iterations)
                    .max_buffered_points(self.max_buffered_points);
                let persistor = BatchPersistor::new(
                    self.store.clone(),
                    symbol.clone(),
                    self.interval,
                    self.key_mode,
                );
                let worker = MarketWorker::new(
                    state,
                    self.source.clone(),
                    limiter.clone(),
                    persistor,
                    failures_tx.clone(),
                );
                let span = tracing::info_span!("worker", symbol = %symbol, %run_id);
                tokio::spawn(
                    worker
                        .run(ShutdownSignal::new(shutdown.subscribe()))
                        .instrument(span),
                )
            })
            .collect();
        drop(failures_tx);

        RunningCollection {
            run_id,
            symbols: self.symbols,
            handles,
            failures_rx,
        }
    }
}

/// Workers spawned by [`Collector::start`]
pub struct RunningCollection {
    run_id: Uuid,
    symbols: Vec<String>,
    handles: Vec<JoinHandle<WorkerReport>>,
    failures_rx: mpsc::UnboundedReceiver<WorkerFailure>,
}

impl RunningCollection {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Wait for every worker and aggregate their reports
    pub async fn join(self) -> CollectionReport {
        let Self {
            run_id,
            symbols,
            handles,
            mut failures_rx,
        } = self;

        // Ends once every worker has dropped its sender
        let drain = async move {
            let mut tally = FailureTally::default();
            while let Some(failure) = failures_rx.recv().await {
                tracing::warn!(symbol = failure.symbol(), %failure, "Worker failure");
                tally.record(&failure);
            }
            tally
        };

        let (results, failures) = tokio::join!(join_all(handles), drain);

        let workers: Vec<WorkerReport> = results
            .into_iter()
            .zip(&symbols)
            .map(|(result, symbol)| match result {
                Ok(report) => report,
                Err(e) => {
                    tracing::error!(symbol = %symbol, error = %e, "Worker task aborted");
                    WorkerReport {
                        symbol: symbol.clone(),
                        ..Default::default()
                    }
                }
            })
            .collect();

        let report = CollectionReport {
            run_id,
            workers,
            failures,
        };
        tracing::info!(
            %run_id,
            points = report.total_points(),
            flushes = report.total_flush_attempts(),
            failures = report.failures.total(),
            "Collection finished"
        );
        report
    }
}
