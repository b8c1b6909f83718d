//! Backup dumper binary.
//!
//! Loads the configuration, initializes tracing and runs a backup of every configured MySQL
//! source into the archive root. Exits with a non-zero status if any part of the backup failed.

use std::process::ExitCode;

use backup_config::Environment;
use backup_config::shared::BackupConfig;
use backup_telemetry::tracing::{LogFormat, init_tracing};
use tracing::error;

use crate::config::load_dumper_config;
use crate::core::start_dumper;
use crate::error::{DumperError, DumperResult};

mod config;
mod core;
mod error;

/// Log filter used when `RUST_LOG` is not set.
const DEFAULT_LOG_DIRECTIVE: &str = "info";

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprint!("{}", err.render_report());
            ExitCode::FAILURE
        }
    }
}

fn run() -> DumperResult<()> {
    let environment = Environment::load().map_err(DumperError::config)?;
    let config = load_dumper_config()?;

    let format = if environment.is_prod() {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    init_tracing(env!("CARGO_BIN_NAME"), DEFAULT_LOG_DIRECTIVE, format)
        .map_err(DumperError::config)?;

    // We start the runtime.
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(config))
}

async fn async_main(config: BackupConfig) -> DumperResult<()> {
    if let Err(err) = start_dumper(config).await {
        error!("{err}");
        return Err(err);
    }

    Ok(())
}
