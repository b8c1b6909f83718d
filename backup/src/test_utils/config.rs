use std::path::Path;

use backup_config::shared::{BackupConfig, MySqlConnectionConfig, SourceConfig};

/// Source configuration with short retry delays, suitable for tests.
pub fn test_source_config(name: &str, tables: &[&str], select_limit: u64) -> SourceConfig {
    SourceConfig {
        name: name.to_string(),
        connection: MySqlConnectionConfig {
            host: "localhost".to_string(),
            port: MySqlConnectionConfig::DEFAULT_PORT,
            name: "db_for_backup".to_string(),
            username: "root".to_string(),
            password: None,
        },
        tables: tables.iter().map(|table| table.to_string()).collect(),
        select_limit,
        max_retries: SourceConfig::DEFAULT_MAX_RETRIES,
        retry_delay_ms: 10,
        max_jitter_ms: 2,
        connection_pool_size: 1,
    }
}

/// Backup configuration writing below `archive_root`.
pub fn test_backup_config(archive_root: &Path, sources: Vec<SourceConfig>) -> BackupConfig {
    BackupConfig {
        archive_root: archive_root.to_path_buf(),
        writer_inbox_capacity: 64,
        sources,
    }
}
