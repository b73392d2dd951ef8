//! Summary statistics over numeric fields.
//!
//! Percentiles use linear interpolation between order statistics: for
//! percentile `p` over `n` sorted values the rank is `p / 100 * (n - 1)` and
//! the result interpolates between the values at the floor and ceiling of that
//! rank. The outlier detector's IQR quartiles use a different, rank-index
//! convention; see [`crate::outliers::IqrBaseline`].

mod moments;

pub use moments::RunningMoments;

use crate::error::Result;
use crate::filter::Population;
use crate::model::{NumericField, DATE_COLUMN};
use crate::sanitize::Sanitize;
use crate::store::ObservationStore;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::sync::Arc;
use tracing::{debug, instrument};

/// The 25th, 50th and 75th percentiles. Serialized with keys `"25"`, `"50"`, `"75"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Percentiles {
    #[serde(rename = "25")]
    pub p25: Option<f64>,
    #[serde(rename = "50")]
    pub p50: Option<f64>,
    #[serde(rename = "75")]
    pub p75: Option<f64>,
}

/// Summary of one field. Every statistic is `None` when `count == 0`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatResult {
    pub count: u64,
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub percentiles: Percentiles,
}

/// Linearly interpolated percentile of ascending `sorted` values.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let rank = (p / 100.0).clamp(0.0, 1.0) * last as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let (low, high) = (sorted[lo], sorted[hi]);
    if lo == hi {
        return Some(low);
    }
    // rounding must never leave the bracketing order statistics
    Some((low + (high - low) * (rank - lo as f64)).clamp(low, high))
}

/// Computes count, mean, min, max and quartile percentiles.
///
/// Non-finite inputs are not readings and are skipped. An empty input yields
/// `count == 0` with every statistic `None`.
pub fn compute_stats(values: &[f64]) -> StatResult {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return StatResult::default();
    }
    sorted.sort_by(f64::total_cmp);

    let moments = RunningMoments::from_values(&sorted);
    StatResult {
        count: moments.count(),
        mean: moments.mean(),
        min: sorted.first().copied(),
        max: sorted.last().copied(),
        percentiles: Percentiles {
            p25: percentile(&sorted, 25.0),
            p50: percentile(&sorted, 50.0),
            p75: percentile(&sorted, 75.0),
        },
    }
}

/// Per-field summaries in request order, serialized as `{field: StatResult}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryStats {
    fields: Vec<(NumericField, StatResult)>,
}

impl SummaryStats {
    pub fn get(&self, field: NumericField) -> Option<&StatResult> {
        self.fields.iter().find(|(f, _)| *f == field).map(|(_, s)| s)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(NumericField, StatResult)> {
        self.fields.iter()
    }
}

impl Serialize for SummaryStats {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (field, stats) in &self.fields {
            map.serialize_entry(field.as_str(), stats)?;
        }
        map.end()
    }
}

impl Sanitize for SummaryStats {
    fn sanitize(&mut self) {
        for (_, stats) in &mut self.fields {
            stats.sanitize();
        }
    }
}

/// Per-date aggregate of one field. Dates without a reading are not reported.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateAggregate {
    pub date: Option<String>,
    pub count: u64,
    pub mean: f64,
    /// Population standard deviation
    pub stddev: f64,
    pub min: f64,
    pub max: f64,
}

/// Store-backed statistics over a well-defined population.
#[derive(Clone)]
pub struct StatisticsEngine {
    store: Arc<dyn ObservationStore>,
}

impl StatisticsEngine {
    pub fn new(store: Arc<dyn ObservationStore>) -> Self {
        Self { store }
    }

    /// Statistics of `field` over `population`.
    #[instrument(skip(self))]
    pub async fn field_stats(
        &self,
        field: NumericField,
        population: &Population,
    ) -> Result<StatResult> {
        Self::stats_in(self.store.as_ref(), field, population).await
    }

    /// Statistics for each of `fields`, in the given order, all from one snapshot.
    pub async fn summary(
        &self,
        fields: &[NumericField],
        population: &Population,
    ) -> Result<SummaryStats> {
        let store = self.store.snapshot().await?;
        let mut summary = SummaryStats::default();
        for &field in fields {
            let stats = Self::stats_in(store.as_ref(), field, population).await?;
            summary.fields.push((field, stats));
        }
        Ok(summary)
    }

    async fn stats_in(
        store: &dyn ObservationStore,
        field: NumericField,
        population: &Population,
    ) -> Result<StatResult> {
        let values = store
            .field_values(field, &population.predicate(field))
            .await?;
        let stats = compute_stats(&values);
        debug!(field = %field, count = stats.count, "field statistics computed");
        Ok(stats)
    }

    /// Count, mean, population stddev, min and max of `field` for every date.
    #[instrument(skip(self))]
    pub async fn grouped_by_date(
        &self,
        field: NumericField,
        population: &Population,
    ) -> Result<Vec<DateAggregate>> {
        let rows = self
            .store
            .aggregate(field, &population.predicate(field), Some(DATE_COLUMN))
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| DateAggregate {
                date: row.group,
                count: row.count,
                mean: row.avg,
                stddev: row.stddev_pop,
                min: row.min,
                max: row.max,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterSpec;
    use crate::test_fixtures::sample_store;

    #[test]
    fn test_empty_input_is_all_null() {
        let stats = compute_stats(&[]);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.mean, None);
        assert_eq!(stats.percentiles, Percentiles::default());
        assert_eq!(
            serde_json::to_value(&stats).unwrap(),
            serde_json::json!({
                "count": 0,
                "mean": null,
                "min": null,
                "max": null,
                "percentiles": {"25": null, "50": null, "75": null},
            })
        );
    }

    #[test]
    fn test_linear_interpolation_literals() {
        // numpy.percentile([1, 2, 3, 4], [25, 50, 75]) == [1.75, 2.5, 3.25]
        let stats = compute_stats(&[4.0, 1.0, 3.0, 2.0]);
        assert_eq!(stats.count, 4);
        assert_eq!(stats.mean, Some(2.5));
        assert_eq!(stats.min, Some(1.0));
        assert_eq!(stats.max, Some(4.0));
        assert_eq!(stats.percentiles.p25, Some(1.75));
        assert_eq!(stats.percentiles.p50, Some(2.5));
        assert_eq!(stats.percentiles.p75, Some(3.25));

        // 1..=10: ranks 2.25, 4.5, 6.75
        let values: Vec<f64> = (1..=10).map(f64::from).collect();
        let stats = compute_stats(&values);
        assert_eq!(stats.percentiles.p25, Some(3.25));
        assert_eq!(stats.percentiles.p50, Some(5.5));
        assert_eq!(stats.percentiles.p75, Some(7.75));
    }

    #[test]
    fn test_single_value() {
        let stats = compute_stats(&[42.0]);
        assert_eq!(stats.count, 1);
        assert_eq!(stats.percentiles.p25, Some(42.0));
        assert_eq!(stats.percentiles.p75, Some(42.0));
    }

    #[test]
    fn test_non_finite_values_skipped() {
        let stats = compute_stats(&[1.0, f64::NAN, 3.0, f64::INFINITY]);
        assert_eq!(stats.count, 2);
        assert_eq!(stats.mean, Some(2.0));
    }

    #[test]
    fn test_summary_serializes_in_field_order() {
        let summary = SummaryStats {
            fields: vec![
                (NumericField::Temperature, compute_stats(&[1.0])),
                (NumericField::Odo, compute_stats(&[])),
            ],
        };
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.starts_with("{\"temperature\":{\"count\":1"));
        assert!(json.contains("\"odo\":{\"count\":0,\"mean\":null"));
    }

    #[tokio::test]
    async fn test_engine_over_store() {
        let engine = StatisticsEngine::new(Arc::new(sample_store().await));
        let summary = engine
            .summary(&NumericField::ALL, &Population::AllNonNull)
            .await
            .unwrap();
        let temperature = summary.get(NumericField::Temperature).unwrap();
        assert_eq!(temperature.count, 4);
        assert_eq!(temperature.mean, Some(21.5));
        assert_eq!(summary.get(NumericField::Odo).unwrap().count, 4);
        assert_eq!(summary.get(NumericField::Salinity).unwrap().count, 4);

        let filtered = Population::Filtered(FilterSpec::new().with_date("03/15/21"));
        let temperature = engine
            .field_stats(NumericField::Temperature, &filtered)
            .await
            .unwrap();
        assert_eq!(temperature.count, 2);
        assert_eq!(temperature.min, Some(22.0));
    }

    #[tokio::test]
    async fn test_grouped_by_date() {
        let engine = StatisticsEngine::new(Arc::new(sample_store().await));
        let groups = engine
            .grouped_by_date(NumericField::Odo, &Population::AllNonNull)
            .await
            .unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].date.as_deref(), Some("03/14/21"));
        assert_eq!(groups[0].count, 1);
        assert_eq!(groups[1].count, 3);
        assert_eq!(groups[1].min, 7.0);
        assert_eq!(groups[1].max, 8.0);
        assert_eq!(groups[1].mean, 7.5);

        let temperature = engine
            .grouped_by_date(NumericField::Temperature, &Population::AllNonNull)
            .await
            .unwrap();
        assert!((temperature[0].stddev - 0.5).abs() < 1e-9);
        assert!(temperature.iter().all(|g| g.count > 0));
    }
}
