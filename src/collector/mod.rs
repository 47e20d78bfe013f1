//! Rate-limited collection core
//!
//! One [`MarketWorker`] per symbol polls the exchange through a shared
//! limiter, buffers points, and flushes them through a [`crate::data::BatchPersistor`].
//! The [`Collector`] spawns the workers and joins them into a [`CollectionReport`].

mod orchestrator;
mod shutdown;
mod types;
mod worker;

pub use orchestrator::{Collector, RunningCollection};
pub use shutdown::ShutdownSignal;
pub use types::{
    CollectionReport, DataPoint, FailureTally, WorkerFailure, WorkerReport, WorkerState,
};
pub use worker::MarketWorker;
