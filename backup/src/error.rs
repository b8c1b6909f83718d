//! Error types and result definitions for backup operations.
//!
//! [`BackupError`] carries a classification ([`ErrorKind`]), a static description, optional
//! dynamic detail, an optional source error, the callsite location and a captured backtrace.
//! Several errors can be aggregated into one, which is how worker pool failures are reported.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use backup_config::shared::ValidationError;

/// Result type for backup operations.
pub type BackupResult<T> = Result<T, BackupError>;

/// Payload stored for single [`BackupError`] instances.
#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type for backup operations.
///
/// Errors are cheap to clone, which lets the writer hand the same failure back to a worker
/// through its reply channel while also logging it.
#[derive(Debug, Clone)]
pub struct BackupError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    /// Multiple aggregated errors, mainly used to report several worker failures at once.
    Many {
        errors: Vec<BackupError>,
        location: &'static Location<'static>,
    },
}

/// Categories of errors that can occur during a backup run.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Source Errors
    SourceConnectionFailed,
    SourceQueryFailed,

    // Data & Transformation Errors
    ConversionError,

    // Configuration Errors
    ConfigError,
    UnknownTable,

    // Output & Archive Errors
    IoError,
    OutputIoError,
    ArchiveFailed,

    // Worker & Writer Errors
    WriterUnavailable,
    RetriesExhausted,
    ExtractionWorkerPanic,
    WriterPanic,

    // Unknown / Uncategorized
    Unknown,
}

impl ErrorKind {
    /// Returns `true` for kinds an extraction worker retries with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::SourceConnectionFailed
                | ErrorKind::SourceQueryFailed
                | ErrorKind::ConversionError
                | ErrorKind::OutputIoError
                | ErrorKind::IoError
        )
    }
}

impl BackupError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For aggregated errors, returns the kind of the first error or [`ErrorKind::Unknown`]
    /// if there is none.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns every [`ErrorKind`] contained in this error, flattening aggregates.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => {
                errors.iter().flat_map(|err| err.kinds()).collect()
            }
        }
    }

    /// Returns the static description of a single error.
    pub fn description(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.description.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Returns the dynamic detail, for aggregates the first one available.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    /// Returns the aggregated errors, or `None` for a single error.
    pub fn errors(&self) -> Option<&[BackupError]> {
        match self.repr {
            ErrorRepr::Single(_) => None,
            ErrorRepr::Many { ref errors, .. } => Some(errors),
        }
    }

    /// Returns the captured backtrace of a single error.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Returns the callsite at which this error was created.
    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches an originating error, exposed through [`error::Error::source`].
    ///
    /// Has no effect on aggregated errors, which forward their first error as source.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        BackupError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }
}

impl PartialEq for BackupError {
    fn eq(&self, other: &BackupError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (ErrorRepr::Many { errors: a, .. }, ErrorRepr::Many { errors: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for BackupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                if let Some(detail) = payload.detail.as_deref() {
                    write_indented(f, "Detail", detail)?;
                }

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                let count = errors.len();
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}:{}",
                    count,
                    if count == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                for (index, error) in errors.iter().enumerate() {
                    let rendered = error.to_string();
                    let mut lines = rendered.lines();
                    write!(f, "\n  {}. {}", index + 1, lines.next().unwrap_or_default())?;
                    for line in lines {
                        write!(f, "\n     {line}")?;
                    }
                }

                Ok(())
            }
        }
    }
}

impl error::Error for BackupError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source.as_ref() as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

/// Writes a labelled, indented block below the first line of an error.
fn write_indented(f: &mut fmt::Formatter<'_>, label: &str, text: &str) -> fmt::Result {
    if text.trim().is_empty() {
        return write!(f, "\n  {label}: <empty>");
    }

    write!(f, "\n  {label}:")?;
    for line in text.lines() {
        write!(f, "\n    {line}")?;
    }

    Ok(())
}

impl From<(ErrorKind, &'static str)> for BackupError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> BackupError {
        BackupError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

impl<D> From<(ErrorKind, &'static str, D)> for BackupError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> BackupError {
        BackupError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Aggregates errors; a single error is returned as is instead of being wrapped.
impl<E> From<Vec<E>> for BackupError
where
    E: Into<BackupError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> BackupError {
        let location = Location::caller();
        let mut errors: Vec<BackupError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1
            && let Some(error) = errors.pop()
        {
            return error;
        }

        BackupError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

impl From<std::io::Error> for BackupError {
    #[track_caller]
    fn from(err: std::io::Error) -> BackupError {
        let detail = err.to_string();
        BackupError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Maps connection-level failures to [`ErrorKind::SourceConnectionFailed`], decoding failures
/// to [`ErrorKind::ConversionError`] and everything else to [`ErrorKind::SourceQueryFailed`].
impl From<sqlx::Error> for BackupError {
    #[track_caller]
    fn from(err: sqlx::Error) -> BackupError {
        let kind = match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolClosed
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::WorkerCrashed => ErrorKind::SourceConnectionFailed,
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::ColumnIndexOutOfBounds { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::Decode(_) => ErrorKind::ConversionError,
            _ => ErrorKind::SourceQueryFailed,
        };

        let detail = err.to_string();
        BackupError::from_components(
            kind,
            Cow::Borrowed("Database operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<ValidationError> for BackupError {
    #[track_caller]
    fn from(err: ValidationError) -> BackupError {
        let detail = err.to_string();
        BackupError::from_components(
            ErrorKind::ConfigError,
            Cow::Borrowed("Invalid configuration"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;
    use crate::backup_error;

    #[test]
    fn single_error_renders_kind_description_and_detail() {
        let err = backup_error!(ErrorKind::UnknownTable, "Unknown table shape", "orders");

        let rendered = err.to_string();
        assert!(rendered.starts_with("[UnknownTable] Unknown table shape @ "));
        assert!(rendered.contains("Detail:\n    orders"));
        assert_eq!(err.detail(), Some("orders"));
        assert!(err.errors().is_none());
    }

    #[test]
    fn aggregating_one_error_returns_it_unchanged() {
        let err: BackupError = vec![BackupError::from((
            ErrorKind::RetriesExhausted,
            "Retries exhausted",
        ))]
        .into();

        assert_eq!(err.kind(), ErrorKind::RetriesExhausted);
        assert!(err.errors().is_none());
    }

    #[test]
    fn aggregated_errors_expose_all_kinds() {
        let err: BackupError = vec![
            BackupError::from((ErrorKind::RetriesExhausted, "Retries exhausted")),
            BackupError::from((ErrorKind::UnknownTable, "Unknown table shape")),
        ]
        .into();

        assert_eq!(err.kind(), ErrorKind::RetriesExhausted);
        assert_eq!(
            err.kinds(),
            vec![ErrorKind::RetriesExhausted, ErrorKind::UnknownTable]
        );
        assert_eq!(err.errors().map(<[_]>::len), Some(2));
        assert!(err.to_string().starts_with("[Many] 2 errors aggregated"));
        assert!(err.source().is_some());
    }

    #[test]
    fn io_errors_keep_their_source() {
        let err = BackupError::from(std::io::Error::other("disk full"));

        assert_eq!(err.kind(), ErrorKind::IoError);
        assert_eq!(err.detail(), Some("disk full"));
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("disk full"));
    }

    #[test]
    fn sqlx_pool_timeouts_are_connection_failures() {
        let err = BackupError::from(sqlx::Error::PoolTimedOut);

        assert_eq!(err.kind(), ErrorKind::SourceConnectionFailed);
        assert!(err.kind().is_transient());
    }

    #[test]
    fn permanent_kinds_are_not_transient() {
        assert!(!ErrorKind::UnknownTable.is_transient());
        assert!(!ErrorKind::RetriesExhausted.is_transient());
        assert!(!ErrorKind::WriterUnavailable.is_transient());
    }
}
