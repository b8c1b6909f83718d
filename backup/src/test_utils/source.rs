use std::collections::HashMap;
use std::sync::Arc;

use backup_config::shared::SourceConfig;
use tokio::sync::Mutex;

use crate::backup_error;
use crate::codec::{SaleRecord, TableKind, TableRecord, UserRecord};
use crate::error::{BackupResult, ErrorKind};
use crate::source::{SourceConnector, TableSource};

/// Builds a `users` record.
pub fn user(user_id: i64, name: &str) -> TableRecord {
    TableRecord::User(UserRecord {
        user_id,
        name: name.to_string(),
    })
}

/// Builds a `sales` record.
pub fn sale(order_id: i64, user_id: i64, order_amount: f64) -> TableRecord {
    TableRecord::Sale(SaleRecord {
        order_id,
        user_id,
        order_amount,
    })
}

/// A page request observed by a [`MemorySource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageQuery {
    pub table: TableKind,
    pub limit: u64,
    pub offset: u64,
}

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<TableKind, Vec<TableRecord>>,
    health_failures: u32,
    health_always_fails: bool,
    query_failures: HashMap<(TableKind, u64), u32>,
    decode_failures: HashMap<TableKind, u32>,
    panic_on_query: Option<TableKind>,
    health_checks: usize,
    queries: Vec<PageQuery>,
}

/// Scripted [`TableSource`] serving rows from memory.
///
/// Failures are injected per operation and consumed one call at a time, which lets tests drive a
/// worker through its retry paths deterministically.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    inner: Arc<Mutex<Inner>>,
}

impl MemorySource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Replaces the rows of `table`.
    pub async fn insert_rows(&self, table: TableKind, rows: Vec<TableRecord>) {
        self.inner.lock().await.tables.insert(table, rows);
    }

    /// Makes the next `count` health checks fail.
    pub async fn fail_health_checks(&self, count: u32) {
        self.inner.lock().await.health_failures = count;
    }

    /// Makes every health check fail.
    pub async fn fail_health_checks_forever(&self) {
        self.inner.lock().await.health_always_fails = true;
    }

    /// Makes the next `count` queries of the page of `table` starting at `offset` fail.
    pub async fn fail_queries(&self, table: TableKind, offset: u64, count: u32) {
        self.inner
            .lock()
            .await
            .query_failures
            .insert((table, offset), count);
    }

    /// Makes the next `count` pages of `table` fail to decode.
    pub async fn fail_decodes(&self, table: TableKind, count: u32) {
        self.inner.lock().await.decode_failures.insert(table, count);
    }

    /// Makes any page query of `table` panic.
    pub async fn panic_on_query(&self, table: TableKind) {
        self.inner.lock().await.panic_on_query = Some(table);
    }

    /// Number of health checks performed so far.
    pub async fn health_checks(&self) -> usize {
        self.inner.lock().await.health_checks
    }

    /// Page queries received so far, including failed ones.
    pub async fn queries(&self) -> Vec<PageQuery> {
        self.inner.lock().await.queries.clone()
    }
}

/// Consumes one injected failure, returning whether the call should fail.
fn take_failure(remaining: Option<&mut u32>) -> bool {
    match remaining {
        Some(remaining) if *remaining > 0 => {
            *remaining -= 1;
            true
        }
        _ => false,
    }
}

impl TableSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn health_check(&self) -> BackupResult<()> {
        let mut inner = self.inner.lock().await;
        inner.health_checks += 1;

        if inner.health_always_fails || take_failure(Some(&mut inner.health_failures)) {
            return Err(backup_error!(
                ErrorKind::SourceConnectionFailed,
                "Health check failed",
                &self.name
            ));
        }

        Ok(())
    }

    async fn fetch_page(
        &self,
        table: TableKind,
        limit: u64,
        offset: u64,
    ) -> BackupResult<Vec<TableRecord>> {
        let mut inner = self.inner.lock().await;
        inner.queries.push(PageQuery {
            table,
            limit,
            offset,
        });

        if inner.panic_on_query == Some(table) {
            panic!("query of `{table}` panicked");
        }

        if take_failure(inner.query_failures.get_mut(&(table, offset))) {
            return Err(backup_error!(
                ErrorKind::SourceQueryFailed,
                "Page query failed",
                format!("{}.{table} at offset {offset}", self.name)
            ));
        }

        if take_failure(inner.decode_failures.get_mut(&table)) {
            return Err(backup_error!(
                ErrorKind::ConversionError,
                "Failed to decode row",
                format!("{}.{table} at offset {offset}", self.name)
            ));
        }

        let rows = inner
            .tables
            .get(&table)
            .map(|rows| {
                rows.iter()
                    .skip(offset as usize)
                    .take(limit as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        Ok(rows)
    }
}

/// [`SourceConnector`] handing out registered [`MemorySource`]s by name.
///
/// Connecting to a name that was not registered fails like an unreachable database.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    sources: HashMap<String, MemorySource>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: MemorySource) -> Self {
        self.sources.insert(source.name.clone(), source);
        self
    }
}

impl SourceConnector for MemoryConnector {
    type Source = MemorySource;

    async fn connect(&self, config: &SourceConfig) -> BackupResult<MemorySource> {
        match self.sources.get(&config.name) {
            Some(source) => Ok(source.clone()),
            None => Err(backup_error!(
                ErrorKind::SourceConnectionFailed,
                "Failed to connect to source",
                format!("{} is unreachable", config.name)
            )),
        }
    }
}
