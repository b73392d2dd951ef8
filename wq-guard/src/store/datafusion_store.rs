//! DataFusion-backed observation store.
//!
//! The dataset lives in a [`MemTable`] snapshot. Every query registers a
//! snapshot into a fresh [`SessionContext`] sharing one runtime, so a reload
//! only has to swap the snapshot pointer. Reads go through a
//! [`PinnedSnapshot`]; callers that need several queries over one dataset
//! hold the view returned by [`ObservationStore::snapshot`].

use super::{check_text_column, AggregateRow, ObservationStore, StoreConfig};
use crate::error::{Result, WqError};
use crate::filter::{Pagination, Predicate};
use crate::logging::truncate_field;
use crate::model::{
    attach_row_ids, conform_batch, observations_from_batch, observations_to_batch,
    read_float_column, read_string_column, stored_schema, NumericField, Observation,
    OBSERVATION_COLUMNS, ROW_ID_COLUMN,
};
use crate::security::SqlSecurity;
use arrow::array::{Array, Int64Array};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use datafusion::common::TableReference;
use datafusion::datasource::{MemTable, TableProvider};
use datafusion::execution::context::{SessionConfig, SessionContext};
use datafusion::execution::memory_pool::{FairSpillPool, MemoryPool};
use datafusion::execution::runtime_env::{RuntimeEnv, RuntimeEnvBuilder};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, instrument};

struct Snapshot {
    table: Arc<dyn TableProvider>,
    rows: u64,
    generation: u64,
    loaded_at: DateTime<Utc>,
}

/// Metadata about the dataset currently being served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotInfo {
    pub rows: u64,
    /// Incremented by every successful `replace_all`
    pub generation: u64,
    pub loaded_at: DateTime<Utc>,
}

struct QueryEngine {
    config: StoreConfig,
    table_sql: String,
    session_config: SessionConfig,
    runtime: Arc<RuntimeEnv>,
}

/// [`ObservationStore`] over an in-memory Arrow table queried with SQL.
pub struct DataFusionStore {
    engine: Arc<QueryEngine>,
    snapshot: RwLock<Arc<Snapshot>>,
    reload: Mutex<()>,
}

impl DataFusionStore {
    /// Creates an empty store.
    #[instrument(skip(config), fields(table = %config.table_name))]
    pub fn new(config: StoreConfig) -> Result<Self> {
        if config.table_name.contains('.') {
            return Err(WqError::Configuration(format!(
                "table name must not be qualified: '{}'",
                config.table_name
            )));
        }
        let table_sql = SqlSecurity::escape_identifier(&config.table_name)?;

        let session_config = SessionConfig::new()
            .with_batch_size(config.batch_size)
            .with_target_partitions(config.target_partitions.max(1));

        let memory_pool = Arc::new(FairSpillPool::new(config.max_memory)) as Arc<dyn MemoryPool>;
        let runtime = RuntimeEnvBuilder::new()
            .with_memory_pool(memory_pool)
            .with_temp_file_path(std::env::temp_dir())
            .build()
            .map(Arc::new)?;

        let empty = MemTable::try_new(stored_schema(), vec![vec![]])?;

        Ok(Self {
            engine: Arc::new(QueryEngine {
                config,
                table_sql,
                session_config,
                runtime,
            }),
            snapshot: RwLock::new(Arc::new(Snapshot {
                table: Arc::new(empty),
                rows: 0,
                generation: 0,
                loaded_at: Utc::now(),
            })),
            reload: Mutex::new(()),
        })
    }

    /// Creates a store holding `observations`.
    pub async fn from_observations(
        config: StoreConfig,
        observations: &[Observation],
    ) -> Result<Self> {
        let store = Self::new(config)?;
        store
            .replace_all(vec![observations_to_batch(observations)?])
            .await?;
        Ok(store)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.engine.config
    }

    /// Describes the snapshot queries currently run against.
    pub async fn snapshot_info(&self) -> SnapshotInfo {
        self.pinned().await.info()
    }

    async fn pinned(&self) -> PinnedSnapshot {
        PinnedSnapshot {
            engine: Arc::clone(&self.engine),
            snapshot: self.snapshot.read().await.clone(),
        }
    }
}

/// One snapshot and the engine that queries it. Read-only.
#[derive(Clone)]
struct PinnedSnapshot {
    engine: Arc<QueryEngine>,
    snapshot: Arc<Snapshot>,
}

impl PinnedSnapshot {
    fn info(&self) -> SnapshotInfo {
        SnapshotInfo {
            rows: self.snapshot.rows,
            generation: self.snapshot.generation,
            loaded_at: self.snapshot.loaded_at,
        }
    }

    fn session(&self, operation: &str) -> Result<SessionContext> {
        let ctx = SessionContext::new_with_config_rt(
            self.engine.session_config.clone(),
            self.engine.runtime.clone(),
        );
        ctx.register_table(
            TableReference::bare(self.engine.config.table_name.clone()),
            self.snapshot.table.clone(),
        )
        .map_err(|e| {
            WqError::storage_with_source(operation, "failed to register snapshot", Box::new(e))
        })?;
        Ok(ctx)
    }

    async fn query(&self, operation: &str, sql: String) -> Result<Vec<RecordBatch>> {
        let config = &self.engine.config;
        let ctx = self.session(operation)?;
        crate::log_query!(
            config.log,
            operation,
            generation = self.snapshot.generation,
            sql = %truncate_field(&sql, config.log.max_field_length),
            "executing store query"
        );

        let execution = async {
            let frame = ctx.sql(&sql).await?;
            frame.collect().await
        };

        match tokio::time::timeout(config.query_timeout, execution).await {
            Ok(result) => result.map_err(|e| {
                WqError::storage_with_source(operation, "query execution failed", Box::new(e))
            }),
            Err(_) => Err(WqError::Timeout {
                operation: operation.to_string(),
                timeout_ms: config.query_timeout.as_millis() as u64,
            }),
        }
    }

    fn table_sql(&self) -> &str {
        &self.engine.table_sql
    }
}

fn where_clause(predicate: &Predicate) -> Result<String> {
    match predicate {
        Predicate::All => Ok(String::new()),
        p => Ok(format!(" WHERE {}", p.to_sql()?)),
    }
}

fn column_list() -> Result<String> {
    let columns = OBSERVATION_COLUMNS
        .iter()
        .chain(std::iter::once(&ROW_ID_COLUMN))
        .map(|c| SqlSecurity::escape_identifier(c))
        .collect::<Result<Vec<_>>>()?;
    Ok(columns.join(", "))
}

fn first_count(batches: &[RecordBatch], operation: &str) -> Result<u64> {
    let batch = batches
        .iter()
        .find(|b| b.num_rows() > 0)
        .ok_or_else(|| WqError::storage(operation, "query returned no rows"))?;
    let counts = cast(batch.column(0), &DataType::Int64)?;
    let counts = counts
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| WqError::Internal("count did not yield Int64".to_string()))?;
    Ok(counts.value(0).max(0) as u64)
}

#[async_trait]
impl ObservationStore for PinnedSnapshot {
    #[instrument(skip(self), fields(table = %self.engine.config.table_name))]
    async fn distinct_values(&self, column: &str) -> Result<Vec<String>> {
        check_text_column(column)?;
        let col = SqlSecurity::escape_identifier(column)?;
        let sql = format!(
            "SELECT DISTINCT {col} AS distinct_value FROM {} WHERE {col} IS NOT NULL AND {col} <> '' ORDER BY distinct_value",
            self.table_sql()
        );
        let batches = self.query("distinct_values", sql).await?;

        let mut values = Vec::new();
        for batch in &batches {
            if let Some(strings) = read_string_column(batch, "distinct_value")? {
                values.extend(strings.iter().flatten().map(str::to_string));
            }
        }
        Ok(values)
    }

    #[instrument(skip(self), fields(table = %self.engine.config.table_name))]
    async fn count(&self, predicate: &Predicate) -> Result<u64> {
        let sql = format!(
            "SELECT COUNT(*) AS n FROM {}{}",
            self.table_sql(),
            where_clause(predicate)?
        );
        let batches = self.query("count", sql).await?;
        first_count(&batches, "count")
    }

    #[instrument(skip(self), fields(table = %self.engine.config.table_name))]
    async fn find(
        &self,
        predicate: &Predicate,
        page: Option<Pagination>,
    ) -> Result<Vec<Observation>> {
        let mut sql = format!(
            "SELECT {} FROM {}{} ORDER BY {}",
            column_list()?,
            self.table_sql(),
            where_clause(predicate)?,
            SqlSecurity::escape_identifier(ROW_ID_COLUMN)?
        );
        if let Some(page) = page {
            sql.push_str(&format!(" LIMIT {} OFFSET {}", page.limit(), page.skip()));
        }
        let batches = self.query("find", sql).await?;

        let mut observations = Vec::new();
        for batch in &batches {
            observations.extend(observations_from_batch(batch)?);
        }
        debug!(rows = observations.len(), "find complete");
        Ok(observations)
    }

    #[instrument(skip(self), fields(table = %self.engine.config.table_name))]
    async fn field_values(&self, field: NumericField, predicate: &Predicate) -> Result<Vec<f64>> {
        let predicate = predicate.clone().and(Predicate::NotNull(field));
        let sql = format!(
            "SELECT {} AS field_value FROM {}{} ORDER BY {}",
            SqlSecurity::escape_identifier(field.as_str())?,
            self.table_sql(),
            where_clause(&predicate)?,
            SqlSecurity::escape_identifier(ROW_ID_COLUMN)?
        );
        let batches = self.query("field_values", sql).await?;

        let mut values = Vec::new();
        for batch in &batches {
            if let Some(floats) = read_float_column(batch, "field_value")? {
                values.extend(floats.iter().flatten());
            }
        }
        Ok(values)
    }

    #[instrument(skip(self), fields(table = %self.engine.config.table_name))]
    async fn aggregate(
        &self,
        field: NumericField,
        predicate: &Predicate,
        group_by: Option<&str>,
    ) -> Result<Vec<AggregateRow>> {
        let value = SqlSecurity::escape_identifier(field.as_str())?;
        let predicate = predicate.clone().and(Predicate::NotNull(field));
        let metrics = format!(
            "COUNT({value}) AS n, AVG({value}) AS mean_value, STDDEV_POP({value}) AS stddev_value, \
             MIN({value}) AS min_value, MAX({value}) AS max_value"
        );
        let sql = match group_by {
            Some(column) => {
                check_text_column(column)?;
                let key = SqlSecurity::escape_identifier(column)?;
                format!(
                    "SELECT {key} AS group_key, {metrics} FROM {}{} GROUP BY {key} ORDER BY {key}",
                    self.table_sql(),
                    where_clause(&predicate)?
                )
            }
            None => format!(
                "SELECT {metrics} FROM {}{}",
                self.table_sql(),
                where_clause(&predicate)?
            ),
        };
        let batches = self.query("aggregate", sql).await?;

        let mut rows = Vec::new();
        for batch in &batches {
            let counts = cast(
                batch
                    .column_by_name("n")
                    .ok_or_else(|| WqError::storage("aggregate", "missing count column"))?,
                &DataType::Int64,
            )?;
            let counts = counts
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(|| WqError::Internal("count did not yield Int64".to_string()))?;
            let metric = |name: &str| -> Result<arrow::array::Float64Array> {
                read_float_column(batch, name)?.ok_or_else(|| {
                    WqError::storage("aggregate", format!("missing column '{name}'"))
                })
            };
            let (mean, stddev, min, max) = (
                metric("mean_value")?,
                metric("stddev_value")?,
                metric("min_value")?,
                metric("max_value")?,
            );
            let groups = read_string_column(batch, "group_key")?;

            for row in 0..batch.num_rows() {
                if counts.is_null(row) || counts.value(row) <= 0 {
                    continue;
                }
                let value_at = |array: &arrow::array::Float64Array| {
                    if array.is_valid(row) {
                        array.value(row)
                    } else {
                        0.0
                    }
                };
                rows.push(AggregateRow {
                    group: groups
                        .as_ref()
                        .filter(|g| g.is_valid(row))
                        .map(|g| g.value(row).to_string()),
                    count: counts.value(row) as u64,
                    avg: value_at(&mean),
                    stddev_pop: value_at(&stddev),
                    min: value_at(&min),
                    max: value_at(&max),
                });
            }
        }
        Ok(rows)
    }

    async fn snapshot(&self) -> Result<Arc<dyn ObservationStore>> {
        Ok(Arc::new(self.clone()))
    }

    async fn replace_all(&self, _batches: Vec<RecordBatch>) -> Result<u64> {
        Err(WqError::storage("replace_all", "snapshot views are read-only"))
    }
}

#[async_trait]
impl ObservationStore for DataFusionStore {
    async fn distinct_values(&self, column: &str) -> Result<Vec<String>> {
        self.pinned().await.distinct_values(column).await
    }

    async fn count(&self, predicate: &Predicate) -> Result<u64> {
        self.pinned().await.count(predicate).await
    }

    async fn find(
        &self,
        predicate: &Predicate,
        page: Option<Pagination>,
    ) -> Result<Vec<Observation>> {
        self.pinned().await.find(predicate, page).await
    }

    async fn field_values(&self, field: NumericField, predicate: &Predicate) -> Result<Vec<f64>> {
        self.pinned().await.field_values(field, predicate).await
    }

    async fn aggregate(
        &self,
        field: NumericField,
        predicate: &Predicate,
        group_by: Option<&str>,
    ) -> Result<Vec<AggregateRow>> {
        self.pinned().await.aggregate(field, predicate, group_by).await
    }

    async fn snapshot(&self) -> Result<Arc<dyn ObservationStore>> {
        let pinned = self.pinned().await;
        debug!(generation = pinned.snapshot.generation, "snapshot pinned");
        Ok(Arc::new(pinned))
    }

    #[instrument(skip(self, batches), fields(table = %self.engine.config.table_name, batches = batches.len()))]
    async fn replace_all(&self, batches: Vec<RecordBatch>) -> Result<u64> {
        let _reload = self.reload.lock().await;

        let mut staged = Vec::with_capacity(batches.len());
        let mut rows = 0u64;
        for batch in &batches {
            let conformed = conform_batch(batch)?;
            staged.push(attach_row_ids(&conformed, rows)?);
            rows += conformed.num_rows() as u64;
        }
        let table = MemTable::try_new(stored_schema(), vec![staged]).map_err(|e| {
            WqError::storage_with_source("replace_all", "failed to stage table", Box::new(e))
        })?;

        let generation = {
            let mut current = self.snapshot.write().await;
            let generation = current.generation + 1;
            *current = Arc::new(Snapshot {
                table: Arc::new(table),
                rows,
                generation,
                loaded_at: Utc::now(),
            });
            generation
        };

        crate::log_data_op!(self.engine.config.log, rows, generation, "observation snapshot replaced");
        Ok(rows)
    }
}
