//! Orchestration of a backup run across every configured source.

use backup_config::shared::BackupConfig;
use tracing::{error, info, warn};

use crate::backup_error;
use crate::error::{BackupError, BackupResult, ErrorKind};
use crate::source::SourceConnector;
use crate::workers::{ExtractionSettings, ExtractionSummary, ExtractionWorker, ExtractionWorkerPool};
use crate::writer::{FileWriter, FinalizeReport};

/// A source that could not be connected and was skipped.
#[derive(Debug, Clone)]
pub struct FailedSource {
    pub name: String,
    pub error: BackupError,
}

/// Outcome of a [`BackupPipeline`] run.
#[derive(Debug, Clone, Default)]
pub struct BackupReport {
    pub failed_sources: Vec<FailedSource>,
    /// Workers that reached the end of their table.
    pub extracted: Vec<ExtractionSummary>,
    /// Workers that stopped permanently.
    pub worker_errors: Vec<BackupError>,
    pub finalize: FinalizeReport,
}

impl BackupReport {
    /// Returns `true` if every source connected, every worker completed and every file was
    /// finalized.
    pub fn is_success(&self) -> bool {
        self.failed_sources.is_empty() && self.worker_errors.is_empty() && self.finalize.is_success()
    }

    /// Total number of rows written across all completed workers.
    pub fn total_rows(&self) -> u64 {
        self.extracted.iter().map(|summary| summary.rows).sum()
    }
}

/// Backs up every table of every configured source into the archive root.
///
/// One extraction worker is started per table of each source that could be connected. All workers
/// share a single [`FileWriter`], which is run on a blocking thread until every worker has
/// signalled completion and its files have been archived.
#[derive(Debug)]
pub struct BackupPipeline<C> {
    config: BackupConfig,
    connector: C,
}

impl<C> BackupPipeline<C>
where
    C: SourceConnector,
{
    pub fn new(config: BackupConfig, connector: C) -> Self {
        Self { config, connector }
    }

    /// Runs the backup to completion.
    ///
    /// Failing sources, workers and archives are recorded in the returned [`BackupReport`]. Only
    /// an invalid configuration or a crashed writer make the run itself fail.
    pub async fn run(self) -> BackupResult<BackupReport> {
        self.config.validate()?;

        if self.config.sources.is_empty() {
            info!("no sources configured, nothing to back up");
            return Ok(BackupReport::default());
        }

        let (mut writer, writer_handle) =
            FileWriter::new(&self.config.archive_root, self.config.writer_inbox_capacity);
        let mut pool = ExtractionWorkerPool::new(writer_handle.clone());
        let mut failed_sources = Vec::new();

        for source_config in &self.config.sources {
            let source = match self.connector.connect(source_config).await {
                Ok(source) => source,
                Err(err) => {
                    // We skip the source so that the remaining ones are still backed up.
                    error!(
                        source = %source_config.name,
                        error = %err,
                        "failed to connect to source, skipping it"
                    );
                    failed_sources.push(FailedSource {
                        name: source_config.name.clone(),
                        error: err,
                    });
                    continue;
                }
            };

            let settings = ExtractionSettings::from(source_config);
            for table in &source_config.tables {
                pool.spawn(ExtractionWorker::new(
                    source.clone(),
                    table,
                    settings,
                    writer_handle.clone(),
                ));
            }
        }

        if pool.is_empty() {
            warn!("no source could be connected, no table will be extracted");
        }

        // We set the count before the writer starts, workers already running only fill the inbox.
        writer.set_workers(pool.len());
        drop(writer_handle);

        info!(
            workers = pool.len(),
            failed_sources = failed_sources.len(),
            "extraction started"
        );

        let writer_task = tokio::task::spawn_blocking(move || writer.run());
        let (pool_outcome, finalize) = tokio::join!(pool.wait_all(), writer_task);

        let finalize = finalize.map_err(|err| {
            backup_error!(ErrorKind::WriterPanic, "Writer actor panicked", err)
        })?;

        let report = BackupReport {
            failed_sources,
            extracted: pool_outcome.completed,
            worker_errors: pool_outcome.errors,
            finalize,
        };

        info!(
            extracted = report.extracted.len(),
            rows = report.total_rows(),
            worker_errors = report.worker_errors.len(),
            archived = report.finalize.archived(),
            failed_artifacts = report.finalize.failed(),
            "backup finished"
        );

        Ok(report)
    }
}
