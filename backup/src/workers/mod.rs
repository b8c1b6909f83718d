//! Extraction workers and the pool that runs them.

pub mod extraction;
pub mod pool;

pub use extraction::{ExtractionSettings, ExtractionSummary, ExtractionWorker};
pub use pool::{ExtractionWorkerPool, PoolOutcome};
