use std::time::Duration;

use backup_config::shared::SourceConfig;
use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::backup_error;
use crate::codec::{TableKind, TableRecord};
use crate::error::{BackupError, BackupResult, ErrorKind};
use crate::source::TableSource;
use crate::types::OutputKey;
use crate::writer::WriterHandle;

/// Paging and retry settings of an [`ExtractionWorker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionSettings {
    /// Rows requested per page.
    pub select_limit: u64,
    /// Consecutive transient failures after which the worker gives up.
    pub max_retries: u32,
    /// Base delay between attempts.
    pub retry_delay: Duration,
    /// Bound of the random offset applied around `retry_delay`, in both directions.
    pub max_jitter: Duration,
}

impl From<&SourceConfig> for ExtractionSettings {
    fn from(config: &SourceConfig) -> Self {
        Self {
            select_limit: config.select_limit,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
            max_jitter: config.max_jitter(),
        }
    }
}

/// What a worker extracted before reaching the end of its table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub key: OutputKey,
    /// Pages acknowledged by the writer.
    pub pages: u64,
    /// Rows contained in those pages.
    pub rows: u64,
}

/// Pages through one table of one source and forwards every page to the writer.
///
/// A worker has at most one batch in flight: it waits for the writer's reply before fetching the
/// next page. Health-check, query, decode and write failures are retried at the same offset after
/// a jittered delay until `max_retries` consecutive failures. Whatever the outcome, the worker
/// sends exactly one completion sentinel before [`ExtractionWorker::run`] returns.
#[derive(Debug)]
pub struct ExtractionWorker<S> {
    key: OutputKey,
    table: BackupResult<TableKind>,
    source: S,
    writer: WriterHandle,
    settings: ExtractionSettings,
    offset: u64,
    consecutive_failures: u32,
}

impl<S> ExtractionWorker<S>
where
    S: TableSource,
{
    /// Creates a worker for `table`. An unknown table is reported when the worker runs.
    pub fn new(source: S, table: &str, settings: ExtractionSettings, writer: WriterHandle) -> Self {
        Self {
            key: OutputKey::new(source.name(), table),
            table: TableKind::from_name(table),
            source,
            writer,
            settings,
            offset: 0,
            consecutive_failures: 0,
        }
    }

    pub fn key(&self) -> &OutputKey {
        &self.key
    }

    /// Extracts the whole table, then signals completion to the writer.
    pub async fn run(mut self) -> BackupResult<ExtractionSummary> {
        info!("starting extraction worker");

        let result = self.extract().await;
        match &result {
            Ok(summary) => info!(
                pages = summary.pages,
                rows = summary.rows,
                "table extraction completed"
            ),
            Err(err) => error!(offset = self.offset, error = %err, "table extraction failed"),
        }

        if let Err(err) = self.writer.worker_done(&self.key).await {
            warn!(error = %err, "could not signal completion to the writer");
        }

        result
    }

    async fn extract(&mut self) -> BackupResult<ExtractionSummary> {
        let table = self.table.clone()?;

        let mut summary = ExtractionSummary {
            key: self.key.clone(),
            pages: 0,
            rows: 0,
        };

        loop {
            let lines = match self.fetch_lines(table).await {
                Ok(lines) => lines,
                Err(err) => {
                    self.retry_after_failure(err).await?;
                    continue;
                }
            };

            if lines.is_empty() {
                return Ok(summary);
            }

            let rows = lines.len() as u64;
            if let Err(err) = self.writer.write_batch(&self.key, lines).await {
                if !err.kind().is_transient() {
                    return Err(err);
                }

                // The same page is fetched and sent again, rows appended before the failure
                // end up in the file twice.
                self.retry_after_failure(err).await?;
                continue;
            }

            debug!(offset = self.offset, rows, "page written");

            self.consecutive_failures = 0;
            self.offset += self.settings.select_limit;
            summary.pages += 1;
            summary.rows += rows;
        }
    }

    async fn fetch_lines(&self, table: TableKind) -> BackupResult<Vec<String>> {
        self.source.health_check().await?;

        let records = self
            .source
            .fetch_page(table, self.settings.select_limit, self.offset)
            .await?;

        Ok(records.iter().map(TableRecord::to_line).collect())
    }

    /// Counts a transient failure and sleeps before the next attempt.
    ///
    /// Returns [`ErrorKind::RetriesExhausted`] without sleeping once the failure budget is used.
    async fn retry_after_failure(&mut self, err: BackupError) -> BackupResult<()> {
        self.consecutive_failures += 1;

        if self.consecutive_failures >= self.settings.max_retries {
            return Err(backup_error!(
                ErrorKind::RetriesExhausted,
                "Extraction retries exhausted",
                format!(
                    "{} failed {} consecutive times at offset {}: {err}",
                    self.key, self.consecutive_failures, self.offset
                ),
                source: err
            ));
        }

        let delay = calculate_backoff(self.settings.retry_delay, self.settings.max_jitter);
        warn!(
            attempt = self.consecutive_failures,
            max_retries = self.settings.max_retries,
            offset = self.offset,
            delay = ?delay,
            error = %err,
            "transient extraction failure, retrying"
        );

        sleep(delay).await;

        Ok(())
    }
}

/// Picks a delay uniformly within `retry_delay ± max_jitter`, never below zero.
fn calculate_backoff(retry_delay: Duration, max_jitter: Duration) -> Duration {
    let jitter_range = i64::try_from(max_jitter.as_nanos()).unwrap_or(i64::MAX);
    if jitter_range == 0 {
        return retry_delay;
    }

    let mut rng = rand::rng();
    let jitter = rng.random_range(-jitter_range..=jitter_range);

    if jitter >= 0 {
        retry_delay.saturating_add(Duration::from_nanos(jitter.unsigned_abs()))
    } else {
        retry_delay.saturating_sub(Duration::from_nanos(jitter.unsigned_abs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_stays_within_jitter_bounds() {
        let delay = Duration::from_millis(500);
        let jitter = Duration::from_millis(5);

        for _ in 0..1_000 {
            let backoff = calculate_backoff(delay, jitter);
            assert!(backoff >= delay - jitter, "{backoff:?} below lower bound");
            assert!(backoff <= delay + jitter, "{backoff:?} above upper bound");
        }
    }

    #[test]
    fn backoff_without_jitter_is_the_base_delay() {
        let delay = Duration::from_millis(20);

        assert_eq!(calculate_backoff(delay, Duration::ZERO), delay);
    }

    #[test]
    fn backoff_never_goes_negative() {
        let backoff = calculate_backoff(Duration::ZERO, Duration::from_millis(3));

        assert!(backoff <= Duration::from_millis(3));
    }
}
