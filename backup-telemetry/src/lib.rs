//! Logging setup shared by the dumper binary and tests.

pub mod tracing;
