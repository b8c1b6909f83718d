use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The writer inbox must be able to hold at least one command.
    #[error("`writer_inbox_capacity` cannot be zero")]
    WriterInboxCapacityZero,
    /// Source names identify output directories and must be set.
    #[error("source names cannot be empty")]
    EmptySourceName,
    /// Two sources would write into the same output directory.
    #[error("source `{0}` is configured more than once")]
    DuplicateSource(String),
    /// Source names are used as a single directory below the archive root.
    #[error("source name `{0}` must be a single path segment")]
    InvalidSourceName(String),
    /// Two workers would write the same output file.
    #[error("table `{table}` is listed more than once for source `{source_name}`")]
    DuplicateTable { source_name: String, table: String },
    /// A source must back up at least one table.
    #[error("source `{0}` has no tables configured")]
    NoTables(String),
    /// A numeric field has a value outside its allowed range.
    #[error("invalid value for `{field}` of source `{source_name}`: {constraint}")]
    InvalidFieldValue {
        source_name: String,
        field: &'static str,
        constraint: &'static str,
    },
}
