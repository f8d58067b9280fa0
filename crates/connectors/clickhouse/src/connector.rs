use arrow::record_batch::RecordBatch;
use tundra_common::Result;

use crate::read_task::ReadTask;

/// The read side of a connector, as seen by an execution engine.
#[async_trait::async_trait]
pub trait Datasource: Send + Sync {
    /// Estimated in-memory size of the full result, in bytes. Advisory only.
    async fn estimate_inmemory_data_size(&self) -> Result<u64>;

    /// Splits the result into at most `parallelism` read tasks.
    async fn get_read_tasks(&self, parallelism: usize) -> Result<Vec<ReadTask>>;
}

/// The write side of a connector.
#[async_trait::async_trait]
pub trait Datasink: Send + Sync {
    /// Prepares the destination once, before any block is written.
    async fn on_write_start(&mut self) -> Result<()>;

    /// Writes blocks and returns the number of rows written for each.
    async fn write(&self, blocks: Vec<RecordBatch>) -> Result<Vec<u64>>;

    async fn on_write_complete(&self, results: &[u64]) -> Result<()>;
}
