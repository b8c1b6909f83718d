use std::future::Future;

use backup_config::shared::SourceConfig;

use crate::codec::{TableKind, TableRecord};
use crate::error::BackupResult;

/// A connected source database that extraction workers page through.
///
/// Implementations are shared by all workers of one source, so they must be cheap to clone and
/// safe to use concurrently. Failures of either operation are treated as transient by workers.
pub trait TableSource: Clone + Send + Sync + 'static {
    /// Returns the name of the source.
    fn name(&self) -> &str;

    /// Checks that the source is reachable before a page is requested.
    fn health_check(&self) -> impl Future<Output = BackupResult<()>> + Send;

    /// Fetches at most `limit` records of `table`, skipping the first `offset` rows.
    ///
    /// An empty page means the table has been read completely.
    fn fetch_page(
        &self,
        table: TableKind,
        limit: u64,
        offset: u64,
    ) -> impl Future<Output = BackupResult<Vec<TableRecord>>> + Send;
}

/// Opens [`TableSource`]s from configuration.
pub trait SourceConnector {
    type Source: TableSource;

    /// Connects to the source described by `config`.
    fn connect(
        &self,
        config: &SourceConfig,
    ) -> impl Future<Output = BackupResult<Self::Source>> + Send;
}
