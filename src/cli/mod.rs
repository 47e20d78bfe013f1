//! CLI interface for market-scraper
//!
//! Provides subcommands for:
//! - `collect`: Poll the exchange and persist batches
//! - `inspect`: Summarize a stored batch file
//! - `config`: Show the effective configuration

mod collect;
mod inspect;

pub use collect::CollectArgs;
pub use inspect::InspectArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "market-scraper")]
#[command(about = "Rate-limited multi-symbol market data collector")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Collect market data until done or interrupted
    Collect(CollectArgs),
    /// Summarize a stored batch file
    Inspect(InspectArgs),
    /// Show the effective configuration
    Config,
}
