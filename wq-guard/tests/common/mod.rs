//! Shared fixtures for integration tests.

#![allow(dead_code)]

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use wq_guard::error::Result;
use wq_guard::filter::{Pagination, Predicate};
use wq_guard::model::{NumericField, Observation};
use wq_guard::store::{AggregateRow, DataFusionStore, ObservationStore, StoreConfig};

/// A row with all three numeric readings on `date`.
pub fn reading(date: &str, temperature: f64, salinity: f64, odo: f64) -> Observation {
    Observation::on(date)
        .with(NumericField::Temperature, temperature)
        .with(NumericField::Salinity, salinity)
        .with(NumericField::Odo, odo)
}

/// Two days of readings. The 03/15/21 temperatures are all warm, so the
/// day-filtered and whole-table temperature populations differ.
pub fn two_day_observations() -> Vec<Observation> {
    let mut rows = Vec::new();
    for i in 0..10 {
        let d = i as f64 * 0.1;
        rows.push(reading("03/14/21", 20.0 + d, 35.0 + d, 6.0 + d));
    }
    for i in 0..10 {
        let d = i as f64 * 0.1;
        rows.push(reading("03/15/21", 26.0 + d, 35.0 + d, 6.0 + d));
    }
    rows
}

pub async fn store_with(observations: &[Observation]) -> DataFusionStore {
    DataFusionStore::from_observations(
        StoreConfig::default().with_target_partitions(2),
        observations,
    )
    .await
    .expect("fixture store should load")
}

/// Forwards to an inner store and counts every call, including calls on
/// the snapshot views it hands out.
pub struct CountingStore {
    inner: Arc<dyn ObservationStore>,
    calls: Arc<AtomicUsize>,
}

impl CountingStore {
    pub fn new(inner: Arc<dyn ObservationStore>) -> Self {
        Self {
            inner,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObservationStore for CountingStore {
    async fn distinct_values(&self, column: &str) -> Result<Vec<String>> {
        self.record();
        self.inner.distinct_values(column).await
    }

    async fn count(&self, predicate: &Predicate) -> Result<u64> {
        self.record();
        self.inner.count(predicate).await
    }

    async fn find(
        &self,
        predicate: &Predicate,
        page: Option<Pagination>,
    ) -> Result<Vec<Observation>> {
        self.record();
        self.inner.find(predicate, page).await
    }

    async fn field_values(&self, field: NumericField, predicate: &Predicate) -> Result<Vec<f64>> {
        self.record();
        self.inner.field_values(field, predicate).await
    }

    async fn aggregate(
        &self,
        field: NumericField,
        predicate: &Predicate,
        group_by: Option<&str>,
    ) -> Result<Vec<AggregateRow>> {
        self.record();
        self.inner.aggregate(field, predicate, group_by).await
    }

    async fn snapshot(&self) -> Result<Arc<dyn ObservationStore>> {
        self.record();
        Ok(Arc::new(CountingStore {
            inner: self.inner.snapshot().await?,
            calls: Arc::clone(&self.calls),
        }))
    }

    async fn replace_all(&self, batches: Vec<RecordBatch>) -> Result<u64> {
        self.record();
        self.inner.replace_all(batches).await
    }
}
