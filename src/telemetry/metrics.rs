//! Prometheus metrics

use crate::exchange::Endpoint;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// A point was appended to a worker's batch
    PointsCollected,
    /// Buffered points dropped because the batch hit its cap
    PointsDropped,
}

/// Result of a flush, used as the `outcome` label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    Ok,
    Failed,
    /// The final flush failed and its points are gone
    Lost,
}

impl FlushOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushOutcome::Ok => "ok",
            FlushOutcome::Failed => "failed",
            FlushOutcome::Lost => "lost",
        }
    }
}

/// Start the Prometheus HTTP exporter on all interfaces
pub fn init_metrics(port: u16) -> anyhow::Result<SocketAddr> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to start metrics exporter: {}", e))?;
    Ok(addr)
}

/// Record one limiter admission and how long it waited
pub fn record_admission(tier: &str, waited: Duration) {
    counter!("scraper_limiter_admissions_total", "tier" => tier.to_string()).increment(1);
    histogram!("scraper_limiter_wait_ms", "tier" => tier.to_string())
        .record(waited.as_secs_f64() * 1000.0);
}

/// Record a failed endpoint call
pub fn record_fetch_failure(symbol: &str, endpoint: Endpoint) {
    counter!(
        "scraper_fetch_failures_total",
        "symbol" => symbol.to_string(),
        "endpoint" => endpoint.as_str()
    )
    .increment(1);
}

/// Increment a per-symbol counter
pub fn increment(metric: CounterMetric, symbol: &str, value: u64) {
    let metric_name = match metric {
        CounterMetric::PointsCollected => "scraper_points_collected_total",
        CounterMetric::PointsDropped => "scraper_points_dropped_total",
    };
    counter!(metric_name, "symbol" => symbol.to_string()).increment(value);
}

/// Record a flush attempt
pub fn record_flush(symbol: &str, outcome: FlushOutcome) {
    counter!(
        "scraper_flushes_total",
        "symbol" => symbol.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Set the current batch length gauge
pub fn set_batch_len(symbol: &str, len: usize) {
    gauge!("scraper_batch_len", "symbol" => symbol.to_string()).set(len as f64);
}
