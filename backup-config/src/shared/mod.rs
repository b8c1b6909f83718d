//! Shared configuration types for backup runs.

mod backup;
mod base;
mod connection;
mod source;

pub use backup::BackupConfig;
pub use base::ValidationError;
pub use connection::MySqlConnectionConfig;
pub use source::SourceConfig;
