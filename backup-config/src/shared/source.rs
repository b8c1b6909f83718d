use std::collections::HashSet;
use std::path::{Component, Path};
use std::time::Duration;

use serde::Deserialize;

use crate::shared::{MySqlConnectionConfig, ValidationError};

/// Configuration of one source database to back up.
///
/// Each table listed in [`SourceConfig::tables`] gets its own extraction worker. Retry settings
/// apply to every worker of the source independently.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Name of the source, used as the output directory under the archive root.
    pub name: String,
    /// How to connect to the source database.
    pub connection: MySqlConnectionConfig,
    /// Tables to extract, in the order workers are started.
    pub tables: Vec<String>,
    /// Number of rows requested per page.
    #[serde(default = "default_select_limit")]
    pub select_limit: u64,
    /// Number of consecutive transient failures after which a worker gives up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay in milliseconds between two attempts.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Maximum jitter in milliseconds applied in both directions around the base delay.
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
    /// Maximum number of pooled connections to the source.
    #[serde(default = "default_connection_pool_size")]
    pub connection_pool_size: u32,
}

impl SourceConfig {
    pub const DEFAULT_SELECT_LIMIT: u64 = 100;
    pub const DEFAULT_MAX_RETRIES: u32 = 3;
    pub const DEFAULT_RETRY_DELAY_MS: u64 = 500;
    pub const DEFAULT_MAX_JITTER_MS: u64 = 5;
    pub const DEFAULT_CONNECTION_POOL_SIZE: u32 = 10;

    /// Base delay between two attempts.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Maximum jitter around [`SourceConfig::retry_delay`].
    pub fn max_jitter(&self) -> Duration {
        Duration::from_millis(self.max_jitter_ms)
    }

    /// Validates the source settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptySourceName);
        }

        if !is_single_path_segment(&self.name) {
            return Err(ValidationError::InvalidSourceName(self.name.clone()));
        }

        if self.tables.is_empty() {
            return Err(ValidationError::NoTables(self.name.clone()));
        }

        let mut seen = HashSet::with_capacity(self.tables.len());
        for table in &self.tables {
            if !seen.insert(table.as_str()) {
                return Err(ValidationError::DuplicateTable {
                    source_name: self.name.clone(),
                    table: table.clone(),
                });
            }
        }

        let invalid = |field: &'static str, constraint: &'static str| {
            ValidationError::InvalidFieldValue {
                source_name: self.name.clone(),
                field,
                constraint,
            }
        };

        if self.select_limit == 0 {
            return Err(invalid("select_limit", "must be greater than zero"));
        }

        if self.max_retries == 0 {
            return Err(invalid("max_retries", "must be greater than zero"));
        }

        if self.connection_pool_size == 0 {
            return Err(invalid("connection_pool_size", "must be greater than zero"));
        }

        if self.max_jitter_ms > self.retry_delay_ms {
            return Err(invalid("max_jitter_ms", "must be <= retry_delay_ms"));
        }

        Ok(())
    }
}

/// Returns whether `name` resolves to exactly one normal directory component.
fn is_single_path_segment(name: &str) -> bool {
    if name.contains(['/', '\\']) {
        return false;
    }

    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn default_select_limit() -> u64 {
    SourceConfig::DEFAULT_SELECT_LIMIT
}

fn default_max_retries() -> u32 {
    SourceConfig::DEFAULT_MAX_RETRIES
}

fn default_retry_delay_ms() -> u64 {
    SourceConfig::DEFAULT_RETRY_DELAY_MS
}

fn default_max_jitter_ms() -> u64 {
    SourceConfig::DEFAULT_MAX_JITTER_MS
}

fn default_connection_pool_size() -> u32 {
    SourceConfig::DEFAULT_CONNECTION_POOL_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(name: &str) -> SourceConfig {
        SourceConfig {
            name: name.to_string(),
            connection: MySqlConnectionConfig {
                host: "localhost".to_string(),
                port: 3307,
                name: "db_for_backup".to_string(),
                username: "root".to_string(),
                password: None,
            },
            tables: vec!["users".to_string()],
            select_limit: SourceConfig::DEFAULT_SELECT_LIMIT,
            max_retries: SourceConfig::DEFAULT_MAX_RETRIES,
            retry_delay_ms: SourceConfig::DEFAULT_RETRY_DELAY_MS,
            max_jitter_ms: SourceConfig::DEFAULT_MAX_JITTER_MS,
            connection_pool_size: SourceConfig::DEFAULT_CONNECTION_POOL_SIZE,
        }
    }

    #[test]
    fn accepts_defaults() {
        assert!(source("laos").validate().is_ok());
    }

    #[test]
    fn rejects_zero_select_limit() {
        let config = SourceConfig {
            select_limit: 0,
            ..source("laos")
        };

        assert_eq!(
            config.validate(),
            Err(ValidationError::InvalidFieldValue {
                source_name: "laos".to_string(),
                field: "select_limit",
                constraint: "must be greater than zero",
            })
        );
    }

    #[test]
    fn rejects_jitter_larger_than_delay() {
        let config = SourceConfig {
            retry_delay_ms: 10,
            max_jitter_ms: 11,
            ..source("laos")
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_source_without_tables() {
        let config = SourceConfig {
            tables: vec![],
            ..source("laos")
        };

        assert_eq!(
            config.validate(),
            Err(ValidationError::NoTables("laos".to_string()))
        );
    }

    #[test]
    fn rejects_duplicate_tables() {
        let config = SourceConfig {
            tables: vec![
                "users".to_string(),
                "sales".to_string(),
                "users".to_string(),
            ],
            ..source("laos")
        };

        assert_eq!(
            config.validate(),
            Err(ValidationError::DuplicateTable {
                source_name: "laos".to_string(),
                table: "users".to_string(),
            })
        );
    }

    #[test]
    fn rejects_names_escaping_the_archive_root() {
        for name in ["..", ".", "../../etc", "a/b", "a\\b", "/abs"] {
            assert_eq!(
                source(name).validate(),
                Err(ValidationError::InvalidSourceName(name.to_string())),
                "{name}"
            );
        }
    }

    #[test]
    fn accepts_dotted_names() {
        assert!(source("thailand.v2").validate().is_ok());
    }

    #[test]
    fn rejects_blank_name() {
        assert_eq!(
            source("  ").validate(),
            Err(ValidationError::EmptySourceName)
        );
    }
}
