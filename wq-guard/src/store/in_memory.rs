//! Row-by-row implementation of [`ObservationStore`] for tests and small datasets.

use super::{check_text_column, AggregateRow, ObservationStore};
use crate::error::{Result, WqError};
use crate::filter::{Pagination, Predicate};
use crate::model::{conform_batch, observations_from_batch, NumericField, Observation};
use crate::stats::RunningMoments;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

/// Observations held in a `Vec`, predicates evaluated with [`Predicate::matches`].
#[derive(Default)]
pub struct InMemoryStore {
    rows: RwLock<Arc<Vec<Observation>>>,
    reload: Mutex<()>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `observations`.
    pub fn with_observations(observations: Vec<Observation>) -> Self {
        Self {
            rows: RwLock::new(Arc::new(observations)),
            reload: Mutex::new(()),
        }
    }

    async fn pinned(&self) -> PinnedRows {
        PinnedRows(self.rows.read().await.clone())
    }
}

/// One version of the rows. Read-only.
#[derive(Clone)]
struct PinnedRows(Arc<Vec<Observation>>);

fn text_value<'a>(observation: &'a Observation, column: &str) -> Option<&'a str> {
    match column {
        "time" => observation.time.as_deref(),
        _ => observation.date.as_deref(),
    }
}

#[async_trait]
impl ObservationStore for PinnedRows {
    async fn distinct_values(&self, column: &str) -> Result<Vec<String>> {
        check_text_column(column)?;
        let values: BTreeSet<&str> = self
            .0
            .iter()
            .filter_map(|o| text_value(o, column))
            .filter(|v| !v.is_empty())
            .collect();
        Ok(values.into_iter().map(str::to_string).collect())
    }

    async fn count(&self, predicate: &Predicate) -> Result<u64> {
        Ok(self.0.iter().filter(|o| predicate.matches(o)).count() as u64)
    }

    async fn find(
        &self,
        predicate: &Predicate,
        page: Option<Pagination>,
    ) -> Result<Vec<Observation>> {
        let matching = self.0.iter().filter(|o| predicate.matches(o));
        Ok(match page {
            Some(page) => matching
                .skip(page.skip() as usize)
                .take(page.limit() as usize)
                .cloned()
                .collect(),
            None => matching.cloned().collect(),
        })
    }

    async fn field_values(&self, field: NumericField, predicate: &Predicate) -> Result<Vec<f64>> {
        Ok(self
            .0
            .iter()
            .filter(|o| predicate.matches(o))
            .filter_map(|o| o.value(field))
            .collect())
    }

    async fn aggregate(
        &self,
        field: NumericField,
        predicate: &Predicate,
        group_by: Option<&str>,
    ) -> Result<Vec<AggregateRow>> {
        if let Some(column) = group_by {
            check_text_column(column)?;
        }

        let mut groups: BTreeMap<Option<String>, RunningMoments> = BTreeMap::new();
        for observation in self.0.iter().filter(|o| predicate.matches(o)) {
            let Some(value) = observation.value(field) else {
                continue;
            };
            let key = group_by.and_then(|c| text_value(observation, c).map(str::to_string));
            groups.entry(key).or_default().push(value);
        }

        Ok(groups
            .into_iter()
            .filter_map(|(group, moments)| {
                Some(AggregateRow {
                    group,
                    count: moments.count(),
                    avg: moments.mean()?,
                    stddev_pop: moments.population_stddev()?,
                    min: moments.min()?,
                    max: moments.max()?,
                })
            })
            .collect())
    }

    async fn snapshot(&self) -> Result<Arc<dyn ObservationStore>> {
        Ok(Arc::new(self.clone()))
    }

    async fn replace_all(&self, _batches: Vec<RecordBatch>) -> Result<u64> {
        Err(WqError::storage("replace_all", "snapshot views are read-only"))
    }
}

#[async_trait]
impl ObservationStore for InMemoryStore {
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
        Ok(Arc::new(self.pinned().await))
    }

    #[instrument(skip(self, batches), fields(batches = batches.len()))]
    async fn replace_all(&self, batches: Vec<RecordBatch>) -> Result<u64> {
        let _reload = self.reload.lock().await;
        let mut staged = Vec::new();
        for batch in &batches {
            staged.extend(observations_from_batch(&conform_batch(batch)?)?);
        }
        let stored = staged.len() as u64;
        *self.rows.write().await = Arc::new(staged);
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::sample_observations;

    #[tokio::test]
    async fn test_queries_match_predicates() {
        let store = InMemoryStore::with_observations(sample_observations());
        assert_eq!(store.count(&Predicate::All).await.unwrap(), 5);
        assert_eq!(
            store
                .count(&Predicate::AtLeast(NumericField::Odo, 7.0))
                .await
                .unwrap(),
            3
        );
        assert_eq!(
            store
                .field_values(NumericField::Temperature, &Predicate::All)
                .await
                .unwrap(),
            vec![20.0, 21.0, 22.0, 23.0]
        );
        assert_eq!(
            store.distinct_values("date").await.unwrap(),
            vec!["03/14/21", "03/15/21"]
        );
    }

    #[tokio::test]
    async fn test_grouped_aggregate_matches_sql_shape() {
        let store = InMemoryStore::with_observations(sample_observations());
        let rows = store
            .aggregate(NumericField::Temperature, &Predicate::All, Some("date"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].group.as_deref(), Some("03/14/21"));
        assert_eq!(rows[0].count, 2);
        assert_eq!(rows[0].avg, 20.5);
        assert_eq!(rows[0].stddev_pop, 0.5);
        assert_eq!(rows[1].min, 22.0);
    }

    #[tokio::test]
    async fn test_snapshot_keeps_rows_after_reload() {
        let store = InMemoryStore::with_observations(sample_observations());
        let view = store.snapshot().await.unwrap();
        store.replace_all(vec![]).await.unwrap();

        assert_eq!(store.count(&Predicate::All).await.unwrap(), 0);
        assert_eq!(view.count(&Predicate::All).await.unwrap(), 5);
        assert!(view.replace_all(vec![]).await.is_err());
    }
}
