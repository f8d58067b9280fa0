#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use arrow::array::{Array, Int64Array};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use tundra_connector_clickhouse::{
    ClickHouseClient, ClientFactory, ConnectionOptions, Error, ReadTask, Result, Rows, Scalar,
    SendableRecordBatchStream, StreamAdapter,
};

pub fn int_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![Field::new("field1", DataType::Int64, false)]))
}

pub fn int_batch(values: impl IntoIterator<Item = i64>) -> RecordBatch {
    RecordBatch::try_new(int_schema(), vec![Arc::new(Int64Array::from_iter_values(values))])
        .unwrap()
}

pub fn int_values(batches: &[RecordBatch]) -> Vec<i64> {
    batches
        .iter()
        .flat_map(|b| {
            let col = b.column(0).as_any().downcast_ref::<Int64Array>().unwrap();
            (0..col.len()).map(|i| col.value(i)).collect::<Vec<_>>()
        })
        .collect()
}

/// Runs a task and returns the `field1` values it produced.
pub async fn run_task(task: &ReadTask) -> Vec<i64> {
    let batches: Vec<RecordBatch> = task.execute().await.unwrap().try_collect().await.unwrap();
    int_values(&batches)
}

/// Slices `[offset, offset + len)` out of a sequence of batches.
fn window(batches: &[RecordBatch], offset: usize, len: usize) -> Vec<RecordBatch> {
    let mut out = Vec::new();
    let mut skip = offset;
    let mut want = len;
    for batch in batches {
        if want == 0 {
            break;
        }
        let rows = batch.num_rows();
        if skip >= rows {
            skip -= rows;
            continue;
        }
        let take = want.min(rows - skip);
        out.push(batch.slice(skip, take));
        want -= take;
        skip = 0;
    }
    out
}

/// Parses a trailing `LIMIT n [OFFSET o]`.
fn parse_limit(sql: &str) -> Option<(usize, usize)> {
    let (_, tail) = sql.rsplit_once(" LIMIT ")?;
    let mut parts = tail.split_whitespace();
    let limit = parts.next()?.parse().ok()?;
    let offset = match (parts.next(), parts.next()) {
        (Some("OFFSET"), Some(o)) => o.parse().ok()?,
        _ => 0,
    };
    Some((limit, offset))
}

/// In-memory stand-in for a ClickHouse server holding one result set.
pub struct MockClient {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
    scalar_results: HashMap<String, Rows>,
    fail_stream_after: Option<usize>,
    fail_queries: bool,
    unstable_order: bool,
    existing_table_ddl: Option<String>,
    pub queries: Mutex<Vec<String>>,
    pub streams: Mutex<Vec<String>>,
    pub commands: Mutex<Vec<String>>,
    pub inserts: Mutex<Vec<(String, usize)>>,
}

impl MockClient {
    pub fn new(batches: Vec<RecordBatch>) -> Self {
        Self {
            schema: int_schema(),
            batches,
            scalar_results: HashMap::new(),
            fail_stream_after: None,
            fail_queries: false,
            unstable_order: false,
            existing_table_ddl: None,
            queries: Mutex::new(Vec::new()),
            streams: Mutex::new(Vec::new()),
            commands: Mutex::new(Vec::new()),
            inserts: Mutex::new(Vec::new()),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn with_scalar(mut self, sql: impl Into<String>, rows: Rows) -> Self {
        self.scalar_results.insert(sql.into(), rows);
        self
    }

    /// The full-result cursor errors after yielding `n` batches.
    pub fn fail_stream_after(mut self, n: usize) -> Self {
        self.fail_stream_after = Some(n);
        self
    }

    /// Windowed queries see the batches rotated by half, as an unordered
    /// query may on re-execution.
    pub fn with_unstable_order(mut self) -> Self {
        self.unstable_order = true;
        self
    }

    pub fn fail_queries(mut self) -> Self {
        self.fail_queries = true;
        self
    }

    /// Pretends the destination table exists with this `SHOW CREATE TABLE` output.
    pub fn with_existing_table(mut self, ddl: impl Into<String>) -> Self {
        self.existing_table_ddl = Some(ddl.into());
        self
    }

    pub fn total_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    pub fn streams(&self) -> Vec<String> {
        self.streams.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn inserts(&self) -> Vec<(String, usize)> {
        self.inserts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClickHouseClient for MockClient {
    async fn query(&self, sql: &str) -> Result<Rows> {
        self.queries.lock().unwrap().push(sql.to_string());
        if self.fail_queries {
            return Err(Error::client("authentication failed"));
        }
        if let Some(rows) = self.scalar_results.get(sql) {
            return Ok(rows.clone());
        }
        if sql.starts_with("SELECT COUNT(*) AS estimate") {
            return Ok(vec![vec![Scalar::UInt(self.total_rows() as u64)]]);
        }
        if sql.starts_with("SELECT 1 FROM system.tables") && self.existing_table_ddl.is_some() {
            return Ok(vec![vec![Scalar::UInt(1)]]);
        }
        Ok(Vec::new())
    }

    async fn query_arrow_stream(&self, sql: &str) -> Result<SendableRecordBatchStream> {
        self.streams.lock().unwrap().push(sql.to_string());
        let items: Vec<Result<RecordBatch>> = match parse_limit(sql) {
            Some((limit, offset)) => {
                let mut batches = self.batches.clone();
                if self.unstable_order {
                    let half = batches.len() / 2;
                    batches.rotate_left(half);
                }
                window(&batches, offset, limit).into_iter().map(Ok).collect()
            }
            None => {
                let mut items: Vec<Result<RecordBatch>> =
                    self.batches.iter().cloned().map(Ok).collect();
                if let Some(n) = self.fail_stream_after {
                    items.truncate(n);
                    items.push(Err(Error::client("connection reset by peer")));
                }
                items
            }
        };
        Ok(Box::pin(StreamAdapter::new(self.schema.clone(), futures::stream::iter(items))))
    }

    async fn command(&self, sql: &str) -> Result<String> {
        self.commands.lock().unwrap().push(sql.to_string());
        if sql.starts_with("SHOW CREATE TABLE") {
            return self
                .existing_table_ddl
                .clone()
                .ok_or_else(|| Error::client("table does not exist"));
        }
        Ok(String::new())
    }

    async fn insert_arrow(&self, table: &str, batch: RecordBatch) -> Result<()> {
        self.inserts.lock().unwrap().push((table.to_string(), batch.num_rows()));
        Ok(())
    }
}

/// Hands out the same client on every connect and counts connections.
pub struct MockFactory {
    pub client: Arc<MockClient>,
    connects: AtomicUsize,
}

impl MockFactory {
    pub fn new(client: MockClient) -> Arc<Self> {
        Arc::new(Self { client: Arc::new(client), connects: AtomicUsize::new(0) })
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClientFactory for MockFactory {
    async fn connect(&self, _options: &ConnectionOptions) -> Result<Arc<dyn ClickHouseClient>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.client.clone())
    }
}
