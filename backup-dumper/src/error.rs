use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;

use backup::error::BackupError;
use backup::pipeline::BackupReport;

/// Returns whether terminal output should include backtraces.
fn should_render_backtrace() -> bool {
    matches!(
        std::env::var("RUST_BACKTRACE").as_deref(),
        Ok("1") | Ok("full")
    )
}

/// Result type for dumper operations.
pub type DumperResult<T> = Result<T, DumperError>;

/// Captured backtrace wrapper for variants without one of their own.
pub struct CapturedBacktrace(Backtrace);

impl CapturedBacktrace {
    fn capture() -> Self {
        Self(Backtrace::capture())
    }
}

impl fmt::Debug for CapturedBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Counts of what went wrong in a run that finished but did not back up everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncompleteRun {
    pub failed_sources: usize,
    pub failed_workers: usize,
    pub failed_artifacts: usize,
}

/// Error type for the dumper binary.
#[derive(Debug)]
pub enum DumperError {
    /// The backup itself could not run.
    Backup(BackupError),
    /// Configuration could not be loaded or is invalid.
    Config(Box<dyn Error + Send + Sync>, CapturedBacktrace),
    /// I/O error, e.g. while building the runtime.
    Io(std::io::Error, CapturedBacktrace),
    /// The backup ran to the end but some data is missing from the archive.
    Incomplete(IncompleteRun),
}

impl DumperError {
    /// Returns a short category label for this error.
    pub fn category(&self) -> &'static str {
        match self {
            DumperError::Backup(_) => "backup error",
            DumperError::Config(_, _) => "configuration error",
            DumperError::Io(_, _) => "i/o error",
            DumperError::Incomplete(_) => "incomplete backup",
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            DumperError::Backup(err) => err.backtrace(),
            DumperError::Config(_, cb) => Some(&cb.0),
            DumperError::Io(_, cb) => Some(&cb.0),
            DumperError::Incomplete(_) => None,
        }
    }

    /// Creates a configuration error from any source.
    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        DumperError::Config(Box::new(err), CapturedBacktrace::capture())
    }

    /// Summarizes the failures recorded in `report`.
    pub fn incomplete(report: &BackupReport) -> Self {
        DumperError::Incomplete(IncompleteRun {
            failed_sources: report.failed_sources.len(),
            failed_workers: report.worker_errors.len(),
            failed_artifacts: report.finalize.failed(),
        })
    }

    /// Returns a user-oriented report for terminal output.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        out.push_str("backup dumper failed\n");
        out.push_str(&format!("category: {}\n", self.category()));
        out.push_str(&format!("error: {}\n", self));

        if !matches!(self, DumperError::Backup(err) if err.errors().is_some()) {
            let mut source = Error::source(self);
            let mut idx = 1usize;
            while let Some(err) = source {
                out.push_str(&format!("cause {idx}: {err}\n"));
                source = err.source();
                idx += 1;
            }
        }

        if should_render_backtrace()
            && let Some(backtrace) = self.backtrace()
        {
            out.push_str("backtrace:\n");
            out.push_str(&backtrace.to_string());
            if !out.ends_with('\n') {
                out.push('\n');
            }
        }

        out
    }
}

impl fmt::Display for DumperError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DumperError::Backup(err) => write!(f, "{err}"),
            DumperError::Config(source, _) => write!(f, "configuration error: {source}"),
            DumperError::Io(source, _) => write!(f, "i/o error: {source}"),
            DumperError::Incomplete(run) => write!(
                f,
                "backup incomplete: {} source(s) unreachable, {} table(s) not fully extracted, {} file(s) not archived",
                run.failed_sources, run.failed_workers, run.failed_artifacts
            ),
        }
    }
}

impl Error for DumperError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DumperError::Backup(err) => err.source(),
            DumperError::Config(source, _) => Some(source.as_ref()),
            DumperError::Io(source, _) => Some(source),
            DumperError::Incomplete(_) => None,
        }
    }
}

impl From<std::io::Error> for DumperError {
    fn from(err: std::io::Error) -> Self {
        DumperError::Io(err, CapturedBacktrace::capture())
    }
}

impl From<BackupError> for DumperError {
    fn from(err: BackupError) -> Self {
        DumperError::Backup(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_run_report_lists_counts() {
        let err = DumperError::Incomplete(IncompleteRun {
            failed_sources: 1,
            failed_workers: 2,
            failed_artifacts: 0,
        });

        let report = err.render_report();

        assert!(report.starts_with("backup dumper failed\ncategory: incomplete backup\n"));
        assert!(report.contains(
            "1 source(s) unreachable, 2 table(s) not fully extracted, 0 file(s) not archived"
        ));
        assert!(!report.contains("cause 1"));
    }

    #[test]
    fn config_errors_render_their_cause_chain() {
        let err = DumperError::config(std::io::Error::other("missing base.yaml"));

        let report = err.render_report();

        assert!(report.contains("category: configuration error"));
        assert!(report.contains("error: configuration error: missing base.yaml"));
        assert!(report.contains("cause 1: missing base.yaml"));
    }

    #[test]
    fn empty_report_counts_nothing() {
        let err = DumperError::incomplete(&BackupReport::default());

        assert!(matches!(
            err,
            DumperError::Incomplete(IncompleteRun {
                failed_sources: 0,
                failed_workers: 0,
                failed_artifacts: 0,
            })
        ));
    }
}
