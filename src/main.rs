use clap::Parser;
use market_scraper::cli::{Cli, Commands};
use market_scraper::config::{Config, ConfigError};
use market_scraper::ratelimit::Tier;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration; only a missing file falls back to defaults
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
            eprintln!("Using default configuration");
            Config::default()
        }
        Err(e) => return Err(anyhow::anyhow!("Invalid config {}: {}", cli.config, e)),
    };

    // Initialize telemetry
    let _telemetry = market_scraper::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Collect(args) => {
            args.execute(config).await?;
        }
        Commands::Inspect(args) => {
            args.execute().await?;
        }
        Commands::Config => {
            config.validate()?;
            println!("Current configuration:");
            println!(
                "  Exchange: {} (timeout {}s)",
                config.exchange.base_url, config.exchange.request_timeout_secs
            );
            println!("  Symbols: {}", config.collector.symbols.join(", "));
            println!(
                "  Interval: {}, flush every {} iterations, cycle delay {:?}",
                config.collector.interval,
                config.collector.flush_interval,
                config.cycle_delay()
            );
            match config.collector.max_iterations {
                Some(n) => println!("  Iterations: {}", n),
                None => println!("  Iterations: unbounded"),
            }
            for tier in Tier::ALL {
                let limit = config.limits.tier(tier);
                println!(
                    "  Limit {}: {} per {}s (backoff {}ms)",
                    tier, limit.capacity, limit.window_secs, limit.backoff_ms
                );
            }
            println!(
                "  Data: {} ({:?} keys, cap {} points)",
                config.data.output_dir.display(),
                config.data.key_mode,
                config.collector.max_buffered_points
            );
        }
    }

    Ok(())
}
