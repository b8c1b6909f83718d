use std::collections::HashSet;
use std::path::PathBuf;

use serde::Deserialize;

use crate::Config;
use crate::shared::{SourceConfig, ValidationError};

/// Top-level configuration of a backup run.
///
/// This intentionally does not implement [`serde::Serialize`] because sources carry secrets.
#[derive(Debug, Clone, Deserialize)]
pub struct BackupConfig {
    /// Directory under which `<source>/<table>.csv` files and their archives are created.
    #[serde(default = "default_archive_root")]
    pub archive_root: PathBuf,
    /// Number of commands the writer inbox buffers before workers have to wait.
    #[serde(default = "default_writer_inbox_capacity")]
    pub writer_inbox_capacity: usize,
    /// Sources to back up. An empty list is a valid, if idle, run.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl BackupConfig {
    pub const DEFAULT_ARCHIVE_ROOT: &'static str = "archive";
    pub const DEFAULT_WRITER_INBOX_CAPACITY: usize = 10_000;

    /// Validates the run settings and every source.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.writer_inbox_capacity == 0 {
            return Err(ValidationError::WriterInboxCapacityZero);
        }

        let mut names = HashSet::with_capacity(self.sources.len());
        for source in &self.sources {
            source.validate()?;

            if !names.insert(source.name.as_str()) {
                return Err(ValidationError::DuplicateSource(source.name.clone()));
            }
        }

        Ok(())
    }

    /// Total number of extraction workers if every source connects.
    pub fn total_tables(&self) -> usize {
        self.sources.iter().map(|source| source.tables.len()).sum()
    }
}

impl Config for BackupConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}

fn default_archive_root() -> PathBuf {
    PathBuf::from(BackupConfig::DEFAULT_ARCHIVE_ROOT)
}

fn default_writer_inbox_capacity() -> usize {
    BackupConfig::DEFAULT_WRITER_INBOX_CAPACITY
}
