//! Observation storage.
//!
//! [`ObservationStore`] is the query surface the statistics and outlier
//! components read through. [`DataFusionStore`] serves it from an in-memory
//! Arrow table; [`InMemoryStore`] evaluates the same queries row by row.

mod datafusion_store;
mod in_memory;

pub use datafusion_store::{DataFusionStore, SnapshotInfo};
pub use in_memory::InMemoryStore;

use crate::error::{Result, WqError};
use crate::filter::{Pagination, Predicate};
use crate::logging::LogConfig;
use crate::model::{NumericField, Observation, DATE_COLUMN, TIME_COLUMN};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// One row of an aggregate over a numeric field.
///
/// Only groups with at least one reading are reported.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRow {
    /// Group key, `None` for an ungrouped aggregate
    pub group: Option<String>,
    pub count: u64,
    pub avg: f64,
    /// Population standard deviation (divides by N)
    pub stddev_pop: f64,
    pub min: f64,
    pub max: f64,
}

/// Read and replace operations over stored observations.
///
/// Implementations must allow concurrent reads while `replace_all` runs:
/// each call observes either the old or the new dataset in full. Work that
/// spans several calls reads through one [`ObservationStore::snapshot`].
#[async_trait]
pub trait ObservationStore: Send + Sync {
    /// Sorted distinct non-empty values of a text column (`date` or `time`).
    async fn distinct_values(&self, column: &str) -> Result<Vec<String>>;

    /// Number of rows matching `predicate`.
    async fn count(&self, predicate: &Predicate) -> Result<u64>;

    /// Matching rows in insertion order, optionally paged.
    async fn find(
        &self,
        predicate: &Predicate,
        page: Option<Pagination>,
    ) -> Result<Vec<Observation>>;

    /// Non-null readings of `field` on rows matching `predicate`, in insertion order.
    async fn field_values(&self, field: NumericField, predicate: &Predicate) -> Result<Vec<f64>>;

    /// Count, mean, population stddev, min and max of `field` over matching rows
    /// with a reading, optionally grouped by a text column.
    async fn aggregate(
        &self,
        field: NumericField,
        predicate: &Predicate,
        group_by: Option<&str>,
    ) -> Result<Vec<AggregateRow>>;

    /// A read-only view pinned to the dataset current at this call.
    ///
    /// Every read on the view sees that dataset, whatever `replace_all` does
    /// afterwards; `replace_all` on the view itself fails.
    async fn snapshot(&self) -> Result<Arc<dyn ObservationStore>>;

    /// Atomically replaces the whole dataset. Returns the number of rows stored.
    async fn replace_all(&self, batches: Vec<RecordBatch>) -> Result<u64>;
}

/// Configuration for [`DataFusionStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Name the table is registered under
    pub table_name: String,
    /// Batch size for query execution
    pub batch_size: usize,
    /// Number of target partitions for parallel execution
    pub target_partitions: usize,
    /// Memory pool size in bytes
    pub max_memory: usize,
    /// Upper bound on a single store call
    pub query_timeout: Duration,
    /// Query and reload logging
    pub log: LogConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            table_name: "observations".to_string(),
            batch_size: 8192,
            target_partitions: num_cpus::get(),
            max_memory: 1024 * 1024 * 1024,
            query_timeout: Duration::from_secs(30),
            log: LogConfig::default(),
        }
    }
}

impl StoreConfig {
    pub fn with_table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = name.into();
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn with_target_partitions(mut self, partitions: usize) -> Self {
        self.target_partitions = partitions;
        self
    }

    pub fn with_log(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }
}

pub(crate) fn check_text_column(column: &str) -> Result<()> {
    if column == DATE_COLUMN || column == TIME_COLUMN {
        Ok(())
    } else {
        Err(WqError::invalid_argument(format!(
            "column must be one of ['{DATE_COLUMN}', '{TIME_COLUMN}']"
        )))
    }
}
