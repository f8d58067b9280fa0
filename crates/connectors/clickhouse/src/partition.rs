//! Single-pass partitioning of a batch stream into balanced row slices.
//!
//! Row targets are planned up front from a row-count estimate. The stream is
//! then consumed once: batches are cut at slice boundaries and small batches
//! are coalesced, so source batch sizes never leak into the slice layout.

use arrow::record_batch::RecordBatch;
use futures::{Stream, TryStreamExt};
use tracing::{debug, warn};
use tundra_common::Result;

/// Row counts for each read task.
///
/// The effective task count is `min(parallelism, ceil(total_rows /
/// min_rows_per_task))`. Counts differ by at most one, larger counts first.
pub fn plan_row_counts(total_rows: usize, parallelism: usize, min_rows_per_task: usize) -> Vec<usize> {
    if total_rows == 0 {
        return Vec::new();
    }
    let min_rows_per_task = min_rows_per_task.max(1);
    let num_tasks = parallelism.max(1).min(total_rows.div_ceil(min_rows_per_task));

    let rows_per_task = total_rows / num_tasks;
    let tasks_with_extra_row = total_rows % num_tasks;
    (0..num_tasks)
        .map(|i| rows_per_task + usize::from(i < tasks_with_extra_row))
        .collect()
}

/// A contiguous run of source rows assigned to one task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSlice {
    pub offset: usize,
    pub num_rows: usize,
    /// Empty unless batches are retained.
    pub batches: Vec<RecordBatch>,
}

#[derive(Debug)]
struct Accumulator {
    offset: usize,
    target: usize,
    num_rows: usize,
    batches: Vec<RecordBatch>,
}

impl Accumulator {
    fn new(offset: usize, target: usize) -> Self {
        Self { offset, target, num_rows: 0, batches: Vec::new() }
    }

    fn remaining(&self) -> usize {
        self.target.saturating_sub(self.num_rows)
    }

    fn seal(self) -> TaskSlice {
        TaskSlice { offset: self.offset, num_rows: self.num_rows, batches: self.batches }
    }
}

/// Streams rows into slices matching a planned list of row targets.
///
/// Rows beyond the planned total go to the last slice. A stream shorter than
/// planned yields fewer slices; no slice is ever empty.
#[derive(Debug)]
pub struct Partitioner {
    targets: Vec<usize>,
    retain_batches: bool,
    sealed: Vec<TaskSlice>,
    current: Accumulator,
    consumed: usize,
}

impl Partitioner {
    pub fn new(targets: Vec<usize>, retain_batches: bool) -> Self {
        let first = targets.first().copied().unwrap_or(0);
        Self {
            targets,
            retain_batches,
            sealed: Vec::new(),
            current: Accumulator::new(0, first),
            consumed: 0,
        }
    }

    fn current_index(&self) -> usize {
        self.sealed.len()
    }

    fn has_next_target(&self) -> bool {
        self.current_index() + 1 < self.targets.len()
    }

    fn open_next(&mut self) {
        let next_target = self.targets[self.current_index() + 1];
        let next = Accumulator::new(self.consumed, next_target);
        let full = std::mem::replace(&mut self.current, next);
        debug!(task = self.sealed.len(), rows = full.num_rows, "sealed read task");
        self.sealed.push(full.seal());
    }

    pub fn push_batch(&mut self, batch: &RecordBatch) {
        let len = batch.num_rows();
        let mut start = 0;
        while start < len {
            if self.current.remaining() == 0 && self.has_next_target() {
                self.open_next();
            }
            let available = len - start;
            let take = if self.has_next_target() {
                self.current.remaining().min(available)
            } else {
                available
            };
            if self.retain_batches {
                self.current.batches.push(batch.slice(start, take));
            }
            self.current.num_rows += take;
            self.consumed += take;
            start += take;
        }
    }

    pub fn finish(mut self) -> Vec<TaskSlice> {
        let planned: usize = self.targets.iter().sum();
        if self.consumed > planned {
            warn!(
                planned,
                consumed = self.consumed,
                "stream returned more rows than estimated; surplus assigned to the last read task"
            );
        } else if self.consumed < planned {
            debug!(planned, consumed = self.consumed, "stream ended before the estimated row count");
        }
        if self.current.num_rows > 0 {
            self.sealed.push(self.current.seal());
        }
        self.sealed
    }

    /// Drains `stream` and returns the resulting slices. Any stream error
    /// aborts the whole partitioning.
    pub async fn consume<S>(mut self, mut stream: S) -> Result<Vec<TaskSlice>>
    where
        S: Stream<Item = Result<RecordBatch>> + Unpin,
    {
        while let Some(batch) = stream.try_next().await? {
            self.push_batch(&batch);
        }
        Ok(self.finish())
    }
}
