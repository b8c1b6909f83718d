//! In-memory doubles for exercising workers, the writer and the pipeline without a database.

pub mod config;
pub mod source;
pub mod writer;
