//! Per-symbol polling loop

use super::shutdown::ShutdownSignal;
use super::types::{DataPoint, WorkerFailure, WorkerReport, WorkerState};
use crate::data::BatchPersistor;
use crate::exchange::{Endpoint, FetchError, MarketDataSource};
use crate::ratelimit::RateLimiter;
use crate::telemetry::{self, CounterMetric, FlushOutcome};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Polls one symbol until its iteration bound or a shutdown signal
///
/// Each iteration makes three sequential calls (candles, trade history, order
/// book), each gated by the shared limiter. A failed call drops the whole
/// iteration. The batch is flushed every `flush_interval` iterations and once
/// more when the loop ends.
pub struct MarketWorker {
    state: WorkerState,
    source: Arc<dyn MarketDataSource>,
    limiter: Arc<RateLimiter>,
    persistor: BatchPersistor,
    batch: Vec<DataPoint>,
    failures: mpsc::UnboundedSender<WorkerFailure>,
    report: WorkerReport,
}

impl MarketWorker {
    pub fn new(
        state: WorkerState,
        source: Arc<dyn MarketDataSource>,
        limiter: Arc<RateLimiter>,
        persistor: BatchPersistor,
        failures: mpsc::UnboundedSender<WorkerFailure>,
    ) -> Self {
        let report = WorkerReport {
            symbol: state.symbol.clone(),
            ..Default::default()
        };
        Self {
            state,
            source,
            limiter,
            persistor,
            batch: Vec::new(),
            failures,
            report,
        }
    }

    pub fn state(&self) -> &WorkerState {
        &self.state
    }

    /// Points buffered since the last successful flush
    pub fn batch(&self) -> &[DataPoint] {
        &self.batch
    }

    /// Run the loop to completion and return the worker's report
    pub async fn run(mut self, mut shutdown: ShutdownSignal) -> WorkerReport {
        tracing::info!(
            symbol = %self.state.symbol,
            interval = %self.state.interval,
            flush_interval = self.state.flush_interval,
            cycle_delay_ms = self.state.cycle_delay.as_millis() as u64,
            max_iterations = ?self.state.max_iterations,
            "Worker started"
        );

        loop {
            if self.state.is_exhausted() {
                break;
            }
            if shutdown.is_triggered() {
                self.report.cancelled = true;
                break;
            }

            // An interrupted fetch produces no point
            let fetched = tokio::select! {
                biased;
                _ = shutdown.triggered() => {
                    self.report.cancelled = true;
                    break;
                }
                result = self.collect_point() => result,
            };

            match fetched {
                Ok(point) => self.push(point),
                Err((endpoint, error)) => self.fetch_failed(endpoint, error),
            }

            if self.state.is_flush_point() {
                self.flush().await;
            }

            self.state.iteration_count += 1;
            if self.state.is_exhausted() {
                break;
            }

            tokio::select! {
                biased;
                _ = shutdown.triggered() => {
                    self.report.cancelled = true;
                    break;
                }
                _ = tokio::time::sleep(self.state.cycle_delay) => {}
            }
        }

        self.final_flush().await;
        self.report.iterations = self.state.iteration_count;

        tracing::info!(
            symbol = %self.state.symbol,
            iterations = self.report.iterations,
            points = self.report.points_collected,
            fetch_failures = self.report.fetch_failures,
            cancelled = self.report.cancelled,
            "Worker stopped"
        );
        self.report
    }

    /// Fetch all three endpoints and assemble a point
    async fn collect_point(&self) -> Result<DataPoint, (Endpoint, FetchError)> {
        let symbol = self.state.symbol.as_str();

        self.admit().await;
        let candles = self
            .source
            .candles(symbol, self.state.interval)
            .await
            .map_err(|e| (Endpoint::Candles, e))?;
        if candles.is_empty() {
            return Err((Endpoint::Candles, FetchError::EmptyCandles));
        }

        self.admit().await;
        let trades = self
            .source
            .trade_history(symbol)
            .await
            .map_err(|e| (Endpoint::TradeHistory, e))?;

        self.admit().await;
        let order_book = self
            .source
            .order_book(symbol)
            .await
            .map_err(|e| (Endpoint::OrderBook, e))?;

        DataPoint::from_responses(candles, trades, order_book, Utc::now())
            .ok_or((Endpoint::Candles, FetchError::EmptyCandles))
    }

    async fn admit(&self) {
        let waited = self.limiter.acquire().await;
        telemetry::record_admission(self.limiter.name(), waited);
    }

    fn push(&mut self, point: DataPoint) {
        self.batch.push(point);
        self.report.points_collected += 1;
        telemetry::increment(CounterMetric::PointsCollected, &self.state.symbol, 1);

        let excess = self
            .batch
            .len()
            .saturating_sub(self.state.max_buffered_points);
        if excess > 0 {
            self.batch.drain(..excess);
            self.report.points_dropped += excess as u64;
            telemetry::increment(CounterMetric::PointsDropped, &self.state.symbol, excess as u64);
            tracing::warn!(
                symbol = %self.state.symbol,
                dropped = excess,
                cap = self.state.max_buffered_points,
                "Batch cap reached, dropping oldest points"
            );
            self.report_failure(WorkerFailure::BufferOverflow {
                symbol: self.state.symbol.clone(),
                dropped: excess,
            });
        }

        telemetry::set_batch_len(&self.state.symbol, self.batch.len());
    }

    fn fetch_failed(&mut self, endpoint: Endpoint, error: FetchError) {
        let iteration = self.state.iteration_count + 1;
        self.report.fetch_failures += 1;
        telemetry::record_fetch_failure(&self.state.symbol, endpoint);
        tracing::debug!(
            symbol = %self.state.symbol,
            iteration,
            %endpoint,
            error = %error,
            "Iteration skipped"
        );
        self.report_failure(WorkerFailure::Fetch {
            symbol: self.state.symbol.clone(),
            iteration,
            endpoint,
            error: error.to_string(),
        });
    }

    /// Scheduled flush; the batch is kept on failure
    async fn flush(&mut self) {
        match self.persistor.flush(&self.batch).await {
            Ok(_) => {
                self.batch.clear();
                self.report.flushes_ok += 1;
                telemetry::record_flush(&self.state.symbol, FlushOutcome::Ok);
            }
            Err(err) => {
                self.report.flush_failures += 1;
                telemetry::record_flush(&self.state.symbol, FlushOutcome::Failed);
                self.report_failure(WorkerFailure::Persist {
                    symbol: self.state.symbol.clone(),
                    key: err.key.to_string(),
                    retained: self.batch.len(),
                    error: err.source.to_string(),
                });
            }
        }
        telemetry::set_batch_len(&self.state.symbol, self.batch.len());
    }

    /// Last flush, run even for an empty batch
    async fn final_flush(&mut self) {
        match self.persistor.flush(&self.batch).await {
            Ok(key) => {
                tracing::debug!(
                    symbol = %self.state.symbol,
                    key = %key,
                    records = self.batch.len(),
                    "Final flush complete"
                );
                self.batch.clear();
                self.report.flushes_ok += 1;
                self.report.final_flush_ok = true;
                telemetry::record_flush(&self.state.symbol, FlushOutcome::Ok);
            }
            Err(err) => {
                self.report.flush_failures += 1;
                telemetry::record_flush(&self.state.symbol, FlushOutcome::Lost);
                self.report_failure(WorkerFailure::FinalFlushLost {
                    symbol: self.state.symbol.clone(),
                    lost: self.batch.len(),
                    error: err.source.to_string(),
                });
                self.batch.clear();
            }
        }
        telemetry::set_batch_len(&self.state.symbol, self.batch.len());
    }

    fn report_failure(&self, failure: WorkerFailure) {
        // The orchestrator may already be gone during teardown
        let _ = self.failures.send(failure);
    }
}
