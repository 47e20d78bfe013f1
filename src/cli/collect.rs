//! Collect command implementation

use crate::collector::{CollectionReport, Collector};
use crate::config::Config;
use crate::data::ParquetStore;
use crate::exchange::{KucoinClient, KucoinConfig};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

#[derive(Args, Debug)]
pub struct CollectArgs {
    /// Comma-separated symbols, overriding the configured list
    #[arg(long, value_delimiter = ',')]
    pub symbols: Vec<String>,

    /// Stop each worker after this many iterations
    #[arg(long)]
    pub max_iterations: Option<u64>,

    /// Output directory for batch files
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl CollectArgs {
    /// Apply command-line overrides on top of the loaded configuration
    pub fn apply(&self, config: &mut Config) {
        if !self.symbols.is_empty() {
            config.collector.symbols = self.symbols.clone();
        }
        if self.max_iterations.is_some() {
            config.collector.max_iterations = self.max_iterations;
        }
        if let Some(ref output) = self.output {
            config.data.output_dir = output.clone();
        }
    }

    pub async fn execute(&self, mut config: Config) -> anyhow::Result<()> {
        self.apply(&mut config);

        let client = KucoinClient::with_config(KucoinConfig::from(&config.exchange))?;
        let store = ParquetStore::new(&config.data.output_dir);
        store.ensure_dir()?;

        let collector = Collector::new(&config, Arc::new(client), Arc::new(store))?;
        info!(
            symbols = ?collector.symbols(),
            output = %config.data.output_dir.display(),
            "Starting data collection"
        );

        // Workers subscribe here, before a signal can arrive
        let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);
        let running = collector.start(&shutdown_tx);
        info!(run_id = %running.run_id(), "Workers spawned");
        let mut run = tokio::spawn(running.join());

        let report = tokio::select! {
            result = &mut run => result?,
            signal = wait_for_signal() => {
                signal?;
                info!("Initiating graceful shutdown...");
                if shutdown_tx.send(()).is_err() {
                    warn!("No worker is listening for shutdown");
                }

                let grace = Duration::from_secs(config.collector.shutdown_grace_secs);
                match tokio::time::timeout(grace, &mut run).await {
                    Ok(result) => result?,
                    Err(_) => {
                        warn!(grace_secs = grace.as_secs(), "Shutdown timeout exceeded, forcing exit");
                        anyhow::bail!("workers did not finish their final flush in time");
                    }
                }
            }
        };

        print_report(&report);
        Ok(())
    }
}

async fn wait_for_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}

fn print_report(report: &CollectionReport) {
    println!("Collection run {}", report.run_id);
    println!(
        "  {:<12} {:>10} {:>8} {:>8} {:>8} {:>8}  final",
        "symbol", "iterations", "points", "fetch!", "flushes", "dropped"
    );
    for w in &report.workers {
        println!(
            "  {:<12} {:>10} {:>8} {:>8} {:>8} {:>8}  {}",
            w.symbol,
            w.iterations,
            w.points_collected,
            w.fetch_failures,
            w.flushes_ok,
            w.points_dropped,
            if w.final_flush_ok { "ok" } else { "LOST" }
        );
    }
    println!(
        "  failures: fetch={} persist={} overflow={} final_flush_lost={}",
        report.failures.fetch,
        report.failures.persist,
        report.failures.overflow,
        report.failures.final_flush_lost
    );
}
