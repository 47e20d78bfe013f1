//! Inspect command implementation

use crate::data::ParquetReader;
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Batch file to read
    pub file: PathBuf,
}

impl InspectArgs {
    pub async fn execute(&self) -> anyhow::Result<()> {
        let reader = ParquetReader::new(&self.file);
        let points = reader.read_points()?;

        println!("{}", reader.path().display());
        println!("  records: {}", points.len());

        let times = points.iter().map(|p| p.time);
        if let (Some(first), Some(last)) = (times.clone().min(), times.max()) {
            println!("  time range: {} .. {}", first, last);
        }
        let trades: usize = points.iter().map(|p| p.trades.len()).sum();
        println!("  trades: {}", trades);

        if let Some(latest) = points.last() {
            let book = &latest.order_book;
            println!(
                "  latest close: {} (bid {:?} / ask {:?})",
                latest.candlestick.close,
                book.best_bid(),
                book.best_ask()
            );
        }

        Ok(())
    }
}
