//! ClickHouse write path.

use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use futures::future::try_join_all;
use tracing::{debug, error, info, warn};
use tundra_common::{ConnectionOptions, Error, Result, Settings, SinkOptions};

use crate::client::{ClickHouseClient, ClientFactory};
use crate::connector::Datasink;
use crate::ddl::{
    create_table_sql, drop_table_sql, parse_order_by, show_create_table_sql, table_exists_sql,
    TableSettings,
};

/// How the sink treats an existing destination table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteMode {
    /// Create the table; fail if it already exists.
    #[default]
    Create,
    /// Reuse the table if present, otherwise create it.
    Append,
    /// Drop any existing table and create it again.
    Overwrite,
}

pub struct ClickHouseDatasink {
    table: String,
    mode: WriteMode,
    options: Arc<ConnectionOptions>,
    factory: Arc<dyn ClientFactory>,
    table_settings: TableSettings,
    sink_options: SinkOptions,
}

impl ClickHouseDatasink {
    pub fn new(
        table: impl Into<String>,
        options: ConnectionOptions,
        factory: Arc<dyn ClientFactory>,
    ) -> Self {
        Self {
            table: table.into(),
            mode: WriteMode::default(),
            options: Arc::new(options),
            factory,
            table_settings: TableSettings::default(),
            sink_options: SinkOptions::default(),
        }
    }

    pub fn from_settings(
        table: impl Into<String>,
        settings: &Settings,
        factory: Arc<dyn ClientFactory>,
    ) -> Self {
        Self::new(table, settings.connection.clone(), factory)
            .with_sink_options(settings.sink.clone())
    }

    pub fn with_mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_table_settings(mut self, table_settings: TableSettings) -> Self {
        self.table_settings = table_settings;
        self
    }

    pub fn with_sink_options(mut self, sink_options: SinkOptions) -> Self {
        self.sink_options = sink_options;
        self
    }

    pub fn table_settings(&self) -> &TableSettings {
        &self.table_settings
    }

    /// Existence check failures count as "absent".
    async fn table_exists(&self, client: &dyn ClickHouseClient) -> bool {
        match client.query(&table_exists_sql(&self.table)).await {
            Ok(rows) => !rows.is_empty(),
            Err(e) => {
                warn!(table = %self.table, error = %e, "could not verify whether table exists");
                false
            }
        }
    }

    async fn existing_order_by(&self, client: &dyn ClickHouseClient) -> Option<String> {
        match client.command(&show_create_table_sql(&self.table)).await {
            Ok(ddl) => parse_order_by(&ddl),
            Err(e) => {
                warn!(table = %self.table, error = %e, "could not read SHOW CREATE TABLE");
                None
            }
        }
    }

    async fn adopt_existing_order_by(&mut self, client: &dyn ClickHouseClient) {
        if self.table_settings.order_by.is_some() {
            return;
        }
        if let Some(order_by) = self.existing_order_by(client).await {
            info!(table = %self.table, order_by = %order_by, "reusing existing ORDER BY");
            self.table_settings.order_by = Some(order_by);
        }
    }

    pub async fn on_write_start(&mut self) -> Result<()> {
        let client = self.factory.connect(&self.options).await?;
        let exists = self.table_exists(client.as_ref()).await;

        match self.mode {
            WriteMode::Overwrite => {
                if exists {
                    self.adopt_existing_order_by(client.as_ref()).await;
                }
                let drop_sql = drop_table_sql(&self.table);
                info!(sql = %drop_sql, "overwrite mode: dropping table");
                client.command(&drop_sql).await?;
            }
            WriteMode::Create => {
                if exists {
                    error!(table = %self.table, "table already exists in create mode; use append or overwrite");
                    return Err(Error::TableExists(self.table.clone()));
                }
            }
            WriteMode::Append => {
                if exists {
                    self.adopt_existing_order_by(client.as_ref()).await;
                }
            }
        }
        Ok(())
    }

    async fn write_block(&self, block: RecordBatch) -> Result<u64> {
        let client = self.factory.connect(&self.options).await?;

        let create_needed = match self.mode {
            WriteMode::Create | WriteMode::Overwrite => true,
            WriteMode::Append => !self.table_exists(client.as_ref()).await,
        };
        if create_needed {
            let sql = create_table_sql(&self.table, &block.schema(), &self.table_settings);
            client.command(&sql).await?;
        }

        let row_count = block.num_rows();
        match self.sink_options.max_insert_block_rows {
            Some(max_rows) if max_rows > 0 && row_count > max_rows => {
                let mut offset = 0;
                while offset < row_count {
                    let len = max_rows.min(row_count - offset);
                    client.insert_arrow(&self.table, block.slice(offset, len)).await?;
                    offset += len;
                }
                debug!(table = %self.table, rows = row_count, chunk_rows = max_rows, "inserted block in chunks");
            }
            _ => {
                client.insert_arrow(&self.table, block).await?;
            }
        }
        Ok(row_count as u64)
    }

    /// Writes each block on its own connection, concurrently.
    pub async fn write(&self, blocks: Vec<RecordBatch>) -> Result<Vec<u64>> {
        let results = try_join_all(blocks.into_iter().map(|block| async move {
            self.write_block(block).await.inspect_err(|e| {
                warn!(table = %self.table, error = %e, "failed to write block");
            })
        }))
        .await?;
        Ok(results)
    }

    pub async fn on_write_complete(&self, results: &[u64]) -> Result<()> {
        if results.is_empty() {
            return Ok(());
        }
        let total: u64 = results.iter().sum();
        info!(table = %self.table, rows = total, "write complete");
        Ok(())
    }
}

#[async_trait::async_trait]
impl Datasink for ClickHouseDatasink {
    async fn on_write_start(&mut self) -> Result<()> {
        ClickHouseDatasink::on_write_start(self).await
    }

    async fn write(&self, blocks: Vec<RecordBatch>) -> Result<Vec<u64>> {
        ClickHouseDatasink::write(self, blocks).await
    }

    async fn on_write_complete(&self, results: &[u64]) -> Result<()> {
        ClickHouseDatasink::on_write_complete(self, results).await
    }
}
