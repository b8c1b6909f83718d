use tokio::task::{JoinError, JoinSet};
use tracing::{Instrument, debug, error};

use crate::backup_error;
use crate::error::{BackupError, BackupResult, ErrorKind};
use crate::source::TableSource;
use crate::types::OutputKey;
use crate::workers::extraction::{ExtractionSummary, ExtractionWorker};
use crate::writer::WriterHandle;

/// Results collected by [`ExtractionWorkerPool::wait_all`].
#[derive(Debug, Default)]
pub struct PoolOutcome {
    /// Summaries of workers that extracted their table completely.
    pub completed: Vec<ExtractionSummary>,
    /// Errors of workers that stopped permanently, including panics.
    pub errors: Vec<BackupError>,
}

/// Runs extraction workers concurrently and collects their results.
///
/// The pool keeps a [`WriterHandle`] so that it can send the completion sentinel on behalf of a
/// worker that panicked, otherwise the writer would wait for it forever.
#[derive(Debug)]
pub struct ExtractionWorkerPool {
    join_set: JoinSet<(OutputKey, Result<BackupResult<ExtractionSummary>, JoinError>)>,
    writer: WriterHandle,
}

impl ExtractionWorkerPool {
    pub fn new(writer: WriterHandle) -> Self {
        Self {
            join_set: JoinSet::new(),
            writer,
        }
    }

    /// Spawns a worker onto the runtime.
    pub fn spawn<S>(&mut self, worker: ExtractionWorker<S>)
    where
        S: TableSource,
    {
        let key = worker.key().clone();
        let span = tracing::info_span!(
            "extraction_worker",
            source = %key.source,
            table = %key.table
        );

        debug!(output = %key, "spawning extraction worker");

        // The worker runs in its own task so that a panic is reported with its key.
        let handle = tokio::spawn(worker.run().instrument(span));
        self.join_set.spawn(async move { (key, handle.await) });
    }

    /// Number of workers spawned and not yet collected.
    pub fn len(&self) -> usize {
        self.join_set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.join_set.is_empty()
    }

    /// Waits for every worker to finish.
    pub async fn wait_all(mut self) -> PoolOutcome {
        let mut outcome = PoolOutcome::default();

        while let Some(joined) = self.join_set.join_next().await {
            let (key, result) = match joined {
                Ok(joined) => joined,
                Err(join_err) => {
                    outcome.errors.push(backup_error!(
                        ErrorKind::ExtractionWorkerPanic,
                        "Extraction worker task failed",
                        join_err
                    ));
                    continue;
                }
            };

            match result {
                Ok(Ok(summary)) => outcome.completed.push(summary),
                Ok(Err(err)) => outcome.errors.push(err),
                Err(join_err) => {
                    error!(output = %key, error = %join_err, "extraction worker panicked");

                    // The worker never reached its own completion signal.
                    if let Err(err) = self.writer.worker_done(&key).await {
                        error!(output = %key, error = %err, "could not signal completion of panicked worker");
                    }

                    outcome.errors.push(backup_error!(
                        ErrorKind::ExtractionWorkerPanic,
                        "Extraction worker panicked",
                        format!("{key}: {join_err}")
                    ));
                }
            }
        }

        outcome
    }
}
