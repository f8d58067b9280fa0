use std::fmt;
use std::sync::Arc;

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use tracing::debug;
use tundra_common::{ConnectionOptions, Result};

use crate::client::ClientFactory;
use crate::stream::{memory_stream, SendableRecordBatchStream};

/// Facts about a read task, fixed when the task is created.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadTaskMetadata {
    pub num_rows: usize,
    /// Estimated in-memory size of the task's rows.
    pub size_bytes: u64,
    pub schema: SchemaRef,
    /// Row position of the task's first row within the source result.
    pub input_offset: usize,
}

/// Where a task's rows come from when it runs.
#[derive(Clone)]
pub enum TaskSource {
    /// Re-run a windowed query on a fresh client.
    Query {
        sql: String,
        factory: Arc<dyn ClientFactory>,
        options: Arc<ConnectionOptions>,
    },
    /// Replay batches captured while partitioning.
    Blocks(Vec<RecordBatch>),
}

impl fmt::Debug for TaskSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskSource::Query { sql, .. } => f.debug_struct("Query").field("sql", sql).finish(),
            TaskSource::Blocks(batches) => {
                f.debug_tuple("Blocks").field(&batches.len()).finish()
            }
        }
    }
}

/// An independently executable slice of a query result.
///
/// Tasks share nothing mutable; any subset may run in any order, any number
/// of times.
#[derive(Debug, Clone)]
pub struct ReadTask {
    metadata: ReadTaskMetadata,
    source: TaskSource,
}

impl ReadTask {
    pub fn new(metadata: ReadTaskMetadata, source: TaskSource) -> Self {
        Self { metadata, source }
    }

    pub fn metadata(&self) -> &ReadTaskMetadata {
        &self.metadata
    }

    pub fn source(&self) -> &TaskSource {
        &self.source
    }

    /// The windowed query this task runs, if it is query-backed.
    pub fn sql(&self) -> Option<&str> {
        match &self.source {
            TaskSource::Query { sql, .. } => Some(sql),
            TaskSource::Blocks(_) => None,
        }
    }

    pub async fn execute(&self) -> Result<SendableRecordBatchStream> {
        match &self.source {
            TaskSource::Query { sql, factory, options } => {
                debug!(sql = %sql, num_rows = self.metadata.num_rows, "executing read task");
                let client = factory.connect(options).await?;
                client.query_arrow_stream(sql).await
            }
            TaskSource::Blocks(batches) => {
                Ok(memory_stream(self.metadata.schema.clone(), batches.clone()))
            }
        }
    }
}
