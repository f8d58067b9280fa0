//! ClickHouse read path: estimates and read-task construction.

use std::sync::Arc;

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use tundra_common::{ConnectionOptions, Error, ReadOptions, Result, Settings, TaskMode};

use crate::client::{ClickHouseClient, ClientFactory, Rows};
use crate::connector::Datasource;
use crate::partition::{plan_row_counts, Partitioner, TaskSlice};
use crate::query::{QuerySpec, Scalar};
use crate::read_task::{ReadTask, ReadTaskMetadata, TaskSource};

/// First rows of the result, used to fix the schema and row width.
#[derive(Debug, Clone)]
struct SampleBlock {
    schema: SchemaRef,
    num_rows: usize,
    size_bytes: usize,
}

impl SampleBlock {
    fn bytes_per_row(&self) -> u64 {
        if self.num_rows == 0 {
            return 0;
        }
        self.size_bytes.div_ceil(self.num_rows) as u64
    }
}

pub struct ClickHouseDatasource {
    spec: QuerySpec,
    query: String,
    options: Arc<ConnectionOptions>,
    read_options: ReadOptions,
    factory: Arc<dyn ClientFactory>,
    client: OnceCell<Arc<dyn ClickHouseClient>>,
}

impl ClickHouseDatasource {
    /// Compiles `spec` eagerly; no connection is made until first use.
    pub fn try_new(
        spec: QuerySpec,
        options: ConnectionOptions,
        factory: Arc<dyn ClientFactory>,
    ) -> Result<Self> {
        let query = spec.compile()?;
        Ok(Self {
            spec,
            query,
            options: Arc::new(options),
            read_options: ReadOptions::default(),
            factory,
            client: OnceCell::new(),
        })
    }

    pub fn from_settings(
        spec: QuerySpec,
        settings: &Settings,
        factory: Arc<dyn ClientFactory>,
    ) -> Result<Self> {
        Ok(Self::try_new(spec, settings.connection.clone(), factory)?
            .with_read_options(settings.read.clone()))
    }

    pub fn with_read_options(mut self, read_options: ReadOptions) -> Self {
        self.read_options = read_options;
        self
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    pub fn read_options(&self) -> &ReadOptions {
        &self.read_options
    }

    async fn client(&self) -> Result<Arc<dyn ClickHouseClient>> {
        let client = self
            .client
            .get_or_try_init(|| async move {
                debug!(dsn = %self.options.dsn, "connecting ClickHouse client");
                self.factory.connect(&self.options).await
            })
            .await?;
        Ok(client.clone())
    }

    async fn scalar_estimate(&self, aggregate: &str) -> Result<u64> {
        let sql = format!("SELECT {} AS estimate FROM ({})", aggregate, self.query);
        let rows = self.client().await?.query(&sql).await?;
        read_estimate(&rows)
    }

    /// `SUM(byteSize(*))` over the query result; 0 for an empty result.
    pub async fn estimate_inmemory_data_size(&self) -> Result<u64> {
        let size = self.scalar_estimate("SUM(byteSize(*))").await?;
        debug!(size_bytes = size, "estimated in-memory data size");
        Ok(size)
    }

    pub async fn estimate_row_count(&self) -> Result<u64> {
        let count = self.scalar_estimate("COUNT(*)").await?;
        debug!(num_rows = count, "estimated row count");
        Ok(count)
    }

    async fn sample_block(&self) -> Result<SampleBlock> {
        let sql = format!("{} LIMIT 1", self.query);
        let mut stream = self.client().await?.query_arrow_stream(&sql).await?;
        let schema = stream.schema();
        let first: Option<RecordBatch> = stream.try_next().await?;
        Ok(match first {
            Some(batch) => SampleBlock {
                schema: batch.schema(),
                num_rows: batch.num_rows(),
                size_bytes: batch.get_array_memory_size(),
            },
            None => SampleBlock { schema, num_rows: 0, size_bytes: 0 },
        })
    }

    /// Splits the query result into balanced read tasks.
    ///
    /// Row targets come from a `COUNT(*)` estimate; the result is then
    /// streamed once to assign rows. Fails as a whole if the stream fails.
    /// An unordered query split into several tasks always keeps its rows,
    /// whatever the task mode.
    pub async fn get_read_tasks(&self, parallelism: usize) -> Result<Vec<ReadTask>> {
        if parallelism == 0 {
            return Err(Error::InvalidArgument("parallelism must be at least 1".to_string()));
        }

        let total_rows = usize::try_from(self.estimate_row_count().await?).map_err(|_| {
            Error::UnexpectedResult("row count estimate does not fit in memory".to_string())
        })?;
        let targets =
            plan_row_counts(total_rows, parallelism, self.read_options.min_rows_per_read_task);
        if targets.is_empty() {
            debug!(query = %self.query, "query returned no rows; no read tasks created");
            return Ok(Vec::new());
        }

        // LIMIT/OFFSET windows are only reproducible over an ordered query.
        let retain_batches = match self.read_options.task_mode {
            TaskMode::Materialized => true,
            TaskMode::Deferred => targets.len() > 1 && !self.spec.is_ordered(),
        };
        if retain_batches && self.read_options.task_mode == TaskMode::Deferred {
            warn!(
                query = %self.query,
                "query has no ORDER BY; read tasks keep their rows instead of re-querying \
                 LIMIT/OFFSET windows"
            );
        }

        let sample = self.sample_block().await?;
        let bytes_per_row = self.bytes_per_row(total_rows, &sample).await?;
        let planned_tasks = targets.len();

        let slices = {
            let stream = self.client().await?.query_arrow_stream(&self.query).await?;
            Partitioner::new(targets, retain_batches).consume(stream).await?
        };

        let tasks: Vec<ReadTask> = slices
            .into_iter()
            .map(|slice| self.build_task(slice, &sample.schema, bytes_per_row, retain_batches))
            .collect();

        info!(
            requested = parallelism,
            planned = planned_tasks,
            created = tasks.len(),
            total_rows,
            "created read tasks"
        );
        Ok(tasks)
    }

    /// Server-side `byteSize` per row, falling back to the sample when the
    /// server reports nothing.
    async fn bytes_per_row(&self, total_rows: usize, sample: &SampleBlock) -> Result<u64> {
        let size = self.estimate_inmemory_data_size().await?;
        if size == 0 {
            return Ok(sample.bytes_per_row());
        }
        Ok(size.div_ceil(total_rows as u64))
    }

    fn build_task(
        &self,
        slice: TaskSlice,
        schema: &SchemaRef,
        bytes_per_row: u64,
        retained: bool,
    ) -> ReadTask {
        let metadata = ReadTaskMetadata {
            num_rows: slice.num_rows,
            size_bytes: bytes_per_row * slice.num_rows as u64,
            schema: schema.clone(),
            input_offset: slice.offset,
        };
        let source = if retained {
            TaskSource::Blocks(slice.batches)
        } else {
            TaskSource::Query {
                sql: format!("{} LIMIT {} OFFSET {}", self.query, slice.num_rows, slice.offset),
                factory: self.factory.clone(),
                options: self.options.clone(),
            }
        };
        ReadTask::new(metadata, source)
    }
}

#[async_trait::async_trait]
impl Datasource for ClickHouseDatasource {
    async fn estimate_inmemory_data_size(&self) -> Result<u64> {
        ClickHouseDatasource::estimate_inmemory_data_size(self).await
    }

    async fn get_read_tasks(&self, parallelism: usize) -> Result<Vec<ReadTask>> {
        ClickHouseDatasource::get_read_tasks(self, parallelism).await
    }
}

/// Reads the single scalar of an aggregate query. Null or missing is 0.
fn read_estimate(rows: &Rows) -> Result<u64> {
    match rows.first().and_then(|row| row.first()) {
        None | Some(Scalar::Null) => Ok(0),
        Some(Scalar::UInt(v)) => Ok(*v),
        Some(Scalar::Int(v)) => Ok((*v).max(0) as u64),
        Some(Scalar::Float(v)) => Ok(v.max(0.0) as u64),
        Some(other) => Err(Error::UnexpectedResult(format!(
            "expected a numeric estimate, got {:?}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_estimate() {
        assert_eq!(read_estimate(&vec![vec![Scalar::UInt(12345)]]).unwrap(), 12345);
        assert_eq!(read_estimate(&vec![vec![Scalar::Int(42)]]).unwrap(), 42);
        assert_eq!(read_estimate(&vec![vec![Scalar::Float(7.9)]]).unwrap(), 7);
        assert_eq!(read_estimate(&vec![vec![Scalar::Null]]).unwrap(), 0);
        assert_eq!(read_estimate(&vec![]).unwrap(), 0);
        assert_eq!(read_estimate(&vec![vec![]]).unwrap(), 0);
    }

    #[test]
    fn test_read_estimate_rejects_text() {
        let err = read_estimate(&vec![vec![Scalar::String("many".to_string())]]).unwrap_err();
        assert!(matches!(err, Error::UnexpectedResult(_)));
    }

    #[test]
    fn test_sample_bytes_per_row_rounds_up() {
        let schema = Arc::new(arrow::datatypes::Schema::empty());
        let sample = SampleBlock { schema: schema.clone(), num_rows: 4, size_bytes: 10 };
        assert_eq!(sample.bytes_per_row(), 3);
        let empty = SampleBlock { schema, num_rows: 0, size_bytes: 0 };
        assert_eq!(empty.bytes_per_row(), 0);
    }
}
