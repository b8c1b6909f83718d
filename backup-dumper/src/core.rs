use backup::pipeline::{BackupPipeline, BackupReport};
use backup::source::mysql::MySqlConnector;
use backup::writer::ArtifactOutcome;
use backup_config::shared::{BackupConfig, SourceConfig};
use tracing::{debug, error, info, warn};

use crate::error::{DumperError, DumperResult};

/// Runs a full backup of every configured source.
///
/// Returns the report of the run, or [`DumperError::Incomplete`] if any source, worker or
/// artifact failed.
pub async fn start_dumper(config: BackupConfig) -> DumperResult<BackupReport> {
    info!("starting backup dumper");

    log_config(&config);

    let pipeline = BackupPipeline::new(config, MySqlConnector);
    let report = pipeline.run().await?;

    log_report(&report);

    if !report.is_success() {
        return Err(DumperError::incomplete(&report));
    }

    info!("backup dumper completed");

    Ok(report)
}

fn log_config(config: &BackupConfig) {
    debug!(
        archive_root = %config.archive_root.display(),
        writer_inbox_capacity = config.writer_inbox_capacity,
        sources = config.sources.len(),
        tables = config.total_tables(),
        "using backup config"
    );

    for source in &config.sources {
        log_source_config(source);
    }
}

fn log_source_config(config: &SourceConfig) {
    debug!(
        source = %config.name,
        host = %config.connection.host,
        port = config.connection.port,
        database = %config.connection.name,
        tables = ?config.tables,
        select_limit = config.select_limit,
        max_retries = config.max_retries,
        retry_delay_ms = config.retry_delay_ms,
        max_jitter_ms = config.max_jitter_ms,
        connection_pool_size = config.connection_pool_size,
        "using source config"
    );
}

fn log_report(report: &BackupReport) {
    for summary in &report.extracted {
        info!(
            output = %summary.key,
            pages = summary.pages,
            rows = summary.rows,
            "table backed up"
        );
    }

    for failed in &report.failed_sources {
        error!(source = %failed.name, error = %failed.error, "source was not backed up");
    }

    for err in &report.worker_errors {
        error!(error = %err, "table was not backed up completely");
    }

    for artifact in &report.finalize.artifacts {
        if let ArtifactOutcome::Failed { error } = &artifact.outcome {
            warn!(
                output = %artifact.key,
                path = %artifact.path.display(),
                error = %error,
                "output file left unarchived"
            );
        }
    }
}
