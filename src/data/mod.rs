//! Batch persistence module
//!
//! Flushes worker batches to Parquet files keyed by symbol, interval and date

mod parquet;
mod persistor;

pub use self::parquet::{data_point_schema, ParquetReader, ParquetStore};
pub use persistor::{BatchKey, BatchPersistor, BatchStore, FlushError, KeyMode, PersistError};
