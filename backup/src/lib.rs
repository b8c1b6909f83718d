//! Concurrent backup of MySQL tables into per-table archives.
//!
//! Every table of every configured source is paged through by its own
//! [`workers::ExtractionWorker`]. Workers hand their pages to a single [`writer::FileWriter`],
//! the only component touching output files. Once every worker has signalled completion the
//! writer drains its inbox and archives each `<source>/<table>.csv` into a `.tar.gz`.
//! [`pipeline::BackupPipeline`] wires a run together.

pub mod codec;
pub mod error;
mod macros;
pub mod pipeline;
pub mod source;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
pub mod workers;
pub mod writer;
