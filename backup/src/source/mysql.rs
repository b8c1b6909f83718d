use backup_config::shared::SourceConfig;
use sqlx::Connection;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use tracing::{debug, info};

use crate::codec::{TableKind, TableRecord};
use crate::error::BackupResult;
use crate::source::{SourceConnector, TableSource};

/// [`TableSource`] backed by a pooled MySQL connection.
#[derive(Debug, Clone)]
pub struct MySqlSource {
    name: String,
    pool: MySqlPool,
}

impl MySqlSource {
    pub fn new(name: impl Into<String>, pool: MySqlPool) -> Self {
        Self {
            name: name.into(),
            pool,
        }
    }
}

impl TableSource for MySqlSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn health_check(&self) -> BackupResult<()> {
        let mut connection = self.pool.acquire().await?;
        connection.ping().await?;

        Ok(())
    }

    async fn fetch_page(
        &self,
        table: TableKind,
        limit: u64,
        offset: u64,
    ) -> BackupResult<Vec<TableRecord>> {
        let rows = sqlx::query(table.select_page_sql())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        debug!(
            source = %self.name,
            table = %table,
            offset,
            rows = rows.len(),
            "fetched page"
        );

        rows.iter().map(|row| table.decode_row(row)).collect()
    }
}

/// Connects sources to MySQL with one pool per source.
///
/// The first connection is opened eagerly so that an unreachable source is reported before any
/// worker starts.
#[derive(Debug, Clone, Default)]
pub struct MySqlConnector;

impl SourceConnector for MySqlConnector {
    type Source = MySqlSource;

    async fn connect(&self, config: &SourceConfig) -> BackupResult<MySqlSource> {
        let options = config.connection.with_db();

        let pool = MySqlPoolOptions::new()
            .max_connections(config.connection_pool_size)
            .connect_with(options)
            .await?;

        info!(
            source = %config.name,
            host = %config.connection.host,
            port = config.connection.port,
            pool_size = config.connection_pool_size,
            "connected to source"
        );

        Ok(MySqlSource::new(config.name.clone(), pool))
    }
}
