//! ClickHouse connector
//!
//! Reads a table as a set of balanced, independently executable read tasks
//! and writes Arrow record batches back into ClickHouse tables.
//!
//! # Example
//! ```rust
//! use tundra_connector_clickhouse::{compile, OrderSpec, Operator, QuerySpec};
//!
//! let spec = QuerySpec::new("default.events")
//!     .with_columns(["id", "ts"])
//!     .with_filter("id", Operator::Gt, 10)
//!     .with_order(OrderSpec::desc(["ts"]));
//! assert_eq!(
//!     compile(&spec).unwrap(),
//!     "SELECT id, ts FROM default.events WHERE (id > 10) ORDER BY ts DESC"
//! );
//! ```

pub mod client;
pub mod connector;
pub mod datasource;
pub mod ddl;
pub mod partition;
pub mod query;
pub mod read_task;
pub mod sink;
pub mod stream;

pub use client::{ClickHouseClient, ClientFactory, Rows};
pub use connector::{Datasink, Datasource};
pub use datasource::ClickHouseDatasource;
pub use ddl::TableSettings;
pub use partition::{plan_row_counts, Partitioner, TaskSlice};
pub use query::{compile, ColumnFilter, Filters, Operator, OrderSpec, QuerySpec, Scalar};
pub use read_task::{ReadTask, ReadTaskMetadata, TaskSource};
pub use sink::{ClickHouseDatasink, WriteMode};
pub use stream::{memory_stream, RecordBatchStream, SendableRecordBatchStream, StreamAdapter};
pub use tundra_common::{
    ConnectionOptions, Error, ReadOptions, Result, Settings, SinkOptions, TaskMode,
};
