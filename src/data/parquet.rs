//! Parquet batch store

use super::persistor::{BatchKey, BatchStore, PersistError};
use crate::collector::DataPoint;
use crate::exchange::{Candle, OrderBookSnapshot, Trade};
use arrow::array::{ArrayRef, StringArray, TimestampMicrosecondArray, UInt32Array};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use rust_decimal::Decimal;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

const CANDLE_COLUMNS: [&str; 6] = ["open", "close", "high", "low", "volume", "turnover"];

fn timestamp_field(name: &str) -> Field {
    Field::new(
        name,
        DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
        false,
    )
}

/// Data point schema
///
/// Decimals are stored as strings to keep full precision; trades and the
/// order book are stored as JSON alongside their row counts.
pub fn data_point_schema() -> Schema {
    let mut fields = vec![timestamp_field("captured_at"), timestamp_field("time")];
    for name in CANDLE_COLUMNS {
        fields.push(Field::new(name, DataType::Utf8, false));
    }
    fields.push(Field::new("trade_count", DataType::UInt32, false));
    fields.push(Field::new("bid_count", DataType::UInt32, false));
    fields.push(Field::new("ask_count", DataType::UInt32, false));
    fields.push(Field::new("trades", DataType::Utf8, false));
    fields.push(Field::new("order_book", DataType::Utf8, false));
    Schema::new(fields)
}

/// Writes each batch to `{output_dir}/{key}.parquet`
pub struct ParquetStore {
    output_dir: PathBuf,
}

impl ParquetStore {
    /// Create a store rooted at `output_dir`
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Output directory
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Ensure output directory exists
    pub fn ensure_dir(&self) -> Result<(), PersistError> {
        fs::create_dir_all(&self.output_dir)?;
        Ok(())
    }

    /// File path for a key
    pub fn path_for(&self, key: &BatchKey) -> PathBuf {
        self.output_dir.join(format!("{}.parquet", key))
    }

    /// Write a batch to `path`, replacing any existing file
    ///
    /// The file is written next to its destination and renamed into place,
    /// so readers never observe a partial file. An empty batch produces a
    /// valid file with zero rows.
    pub fn write_batch(&self, path: &Path, batch: &[DataPoint]) -> Result<(), PersistError> {
        self.ensure_dir()?;

        let schema = Arc::new(data_point_schema());
        let tmp_path = path.with_extension("parquet.tmp");
        let file = File::create(&tmp_path)?;

        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();

        let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props))?;
        if !batch.is_empty() {
            let record_batch = build_record_batch(schema, batch)?;
            writer.write(&record_batch)?;
        }
        writer.close()?;

        fs::rename(&tmp_path, path)?;

        tracing::debug!(path = ?path, count = batch.len(), "Wrote batch to Parquet");

        Ok(())
    }
}

fn build_record_batch(
    schema: Arc<Schema>,
    batch: &[DataPoint],
) -> Result<RecordBatch, PersistError> {
    let captured: Vec<i64> = batch
        .iter()
        .map(|p| p.captured_at.timestamp_micros())
        .collect();
    let times: Vec<i64> = batch.iter().map(|p| p.time.timestamp_micros()).collect();

    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(TimestampMicrosecondArray::from(captured).with_timezone("UTC")),
        Arc::new(TimestampMicrosecondArray::from(times).with_timezone("UTC")),
    ];

    let candle_values: [fn(&Candle) -> Decimal; 6] = [
        |c: &Candle| c.open,
        |c: &Candle| c.close,
        |c: &Candle| c.high,
        |c: &Candle| c.low,
        |c: &Candle| c.volume,
        |c: &Candle| c.turnover,
    ];
    for value in candle_values {
        let column: Vec<String> = batch
            .iter()
            .map(|p| value(&p.candlestick).to_string())
            .collect();
        columns.push(Arc::new(StringArray::from(column)));
    }

    let count = |n: usize| u32::try_from(n).unwrap_or(u32::MAX);
    let trade_counts: Vec<u32> = batch.iter().map(|p| count(p.trades.len())).collect();
    let bid_counts: Vec<u32> = batch
        .iter()
        .map(|p| count(p.order_book.bids.len()))
        .collect();
    let ask_counts: Vec<u32> = batch
        .iter()
        .map(|p| count(p.order_book.asks.len()))
        .collect();
    columns.push(Arc::new(UInt32Array::from(trade_counts)));
    columns.push(Arc::new(UInt32Array::from(bid_counts)));
    columns.push(Arc::new(UInt32Array::from(ask_counts)));

    let trades = batch
        .iter()
        .map(|p| serde_json::to_string(&p.trades))
        .collect::<Result<Vec<_>, _>>()?;
    let books = batch
        .iter()
        .map(|p| serde_json::to_string(&p.order_book))
        .collect::<Result<Vec<_>, _>>()?;
    columns.push(Arc::new(StringArray::from(trades)));
    columns.push(Arc::new(StringArray::from(books)));

    Ok(RecordBatch::try_new(schema, columns)?)
}

#[async_trait]
impl BatchStore for ParquetStore {
    async fn persist(&self, key: &BatchKey, batch: &[DataPoint]) -> Result<(), PersistError> {
        let path = self.path_for(key);
        self.write_batch(&path, batch)
    }
}

/// Reader for stored batch files
pub struct ParquetReader {
    path: PathBuf,
}

impl ParquetReader {
    /// Create a new reader for a Parquet file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of rows, from file metadata only
    pub fn row_count(&self) -> Result<usize, PersistError> {
        let file = File::open(&self.path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
        let rows = builder.metadata().file_metadata().num_rows();
        Ok(usize::try_from(rows).unwrap_or(0))
    }

    /// Read every data point in the file
    pub fn read_points(&self) -> Result<Vec<DataPoint>, PersistError> {
        let file = File::open(&self.path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let mut points = Vec::new();
        for batch_result in reader {
            let batch = batch_result?;

            let captured = timestamp_column(&batch, "captured_at")?;
            let times = timestamp_column(&batch, "time")?;
            let candle_columns = CANDLE_COLUMNS
                .iter()
                .map(|name| string_column(&batch, name))
                .collect::<Result<Vec<_>, _>>()?;
            let trades = string_column(&batch, "trades")?;
            let books = string_column(&batch, "order_book")?;

            for i in 0..batch.num_rows() {
                let decimal = |col: usize| -> Result<Decimal, PersistError> {
                    let raw = candle_columns[col].value(i);
                    Decimal::from_str(raw).map_err(|e| {
                        PersistError::Invalid(format!("{} = {:?}: {}", CANDLE_COLUMNS[col], raw, e))
                    })
                };

                let time = micros_to_datetime(times.value(i))?;
                let candlestick = Candle {
                    open_time: time,
                    open: decimal(0)?,
                    close: decimal(1)?,
                    high: decimal(2)?,
                    low: decimal(3)?,
                    volume: decimal(4)?,
                    turnover: decimal(5)?,
                };

                let trades: Vec<Trade> = serde_json::from_str(trades.value(i))?;
                let order_book: OrderBookSnapshot = serde_json::from_str(books.value(i))?;

                points.push(DataPoint {
                    time,
                    candlestick,
                    trades,
                    order_book,
                    captured_at: micros_to_datetime(captured.value(i))?,
                });
            }
        }

        Ok(points)
    }
}

fn timestamp_column<'a>(
    batch: &'a RecordBatch,
    name: &str,
) -> Result<&'a TimestampMicrosecondArray, PersistError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<TimestampMicrosecondArray>())
        .ok_or_else(|| PersistError::Invalid(format!("Invalid {} column", name)))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, PersistError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| PersistError::Invalid(format!("Invalid {} column", name)))
}

fn micros_to_datetime(micros: i64) -> Result<DateTime<Utc>, PersistError> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| PersistError::Invalid(format!("Invalid timestamp: {}", micros)))
}
