use backup_config::load_config;
use backup_config::shared::BackupConfig;

use crate::error::{DumperError, DumperResult};

/// Loads and validates the backup configuration.
pub fn load_dumper_config() -> DumperResult<BackupConfig> {
    let config = load_config::<BackupConfig>().map_err(DumperError::config)?;
    config.validate().map_err(DumperError::config)?;

    Ok(config)
}
