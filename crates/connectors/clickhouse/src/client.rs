//! Boundary to the ClickHouse client library.
//!
//! The connector never talks to the network itself. Transport, auth and
//! connection settings belong to whatever implements these traits.

use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use tundra_common::{ConnectionOptions, Result};

use crate::query::Scalar;
use crate::stream::SendableRecordBatchStream;

/// Rows returned by a scalar query, one `Vec` per row.
pub type Rows = Vec<Vec<Scalar>>;

#[async_trait]
pub trait ClickHouseClient: Send + Sync {
    /// Runs a query and returns its rows as typed values.
    async fn query(&self, sql: &str) -> Result<Rows>;

    /// Opens a streaming cursor over the query's result as Arrow batches.
    async fn query_arrow_stream(&self, sql: &str) -> Result<SendableRecordBatchStream>;

    /// Runs a statement that returns no rows (DDL) and returns its text output.
    async fn command(&self, sql: &str) -> Result<String>;

    async fn insert_arrow(&self, table: &str, batch: RecordBatch) -> Result<()>;
}

/// Creates client handles from opaque connection options.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn connect(&self, options: &ConnectionOptions) -> Result<Arc<dyn ClickHouseClient>>;
}
