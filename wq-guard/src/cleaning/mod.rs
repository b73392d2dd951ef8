//! Ingest-time Z-score cleaning of a fully materialized table.
//!
//! The cleaner makes two passes. The first accumulates population mean and
//! standard deviation for every numeric column over the whole table. The
//! second flags a row when any column has `|z| > 3.0`. Flagged rows are
//! dropped, then rows missing any numeric reading are dropped as incomplete.

use crate::error::Result;
use crate::model::{read_float_column, NumericField};
use crate::stats::RunningMoments;
use arrow::array::{Array, ArrayRef, BooleanArray, Float64Array};
use arrow::compute::filter_record_batch;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};

/// Fixed ingest-time threshold. Not caller-configurable.
pub const CLEANING_Z_THRESHOLD: f64 = 3.0;

/// Counts describing one cleaning run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleaningReport {
    /// Rows in the input table
    pub total: u64,
    /// Rows dropped as outliers
    pub removed: u64,
    /// Non-outlier rows dropped for a missing numeric reading
    pub incomplete: u64,
    /// Rows in the cleaned table
    pub remaining: u64,
}

/// Survivors and report of [`BatchCleaner::clean`].
#[derive(Debug, Clone)]
pub struct CleanedBatch {
    pub survivors: RecordBatch,
    pub report: CleaningReport,
}

#[derive(Debug, Clone, Copy)]
struct ColumnBaseline {
    mean: f64,
    stddev: f64,
}

impl ColumnBaseline {
    fn from_column(values: &Float64Array) -> Option<Self> {
        let mut moments = RunningMoments::new();
        for v in values.iter().flatten() {
            moments.push(v);
        }
        let mean = moments.mean()?;
        let stddev = moments.population_stddev()?;
        (stddev > 0.0 && stddev.is_finite()).then_some(Self { mean, stddev })
    }

    fn is_outlier(&self, value: f64) -> bool {
        ((value - self.mean) / self.stddev).abs() > CLEANING_Z_THRESHOLD
    }
}

/// Z-score cleaner over a set of numeric columns.
#[derive(Debug, Clone)]
pub struct BatchCleaner {
    columns: Vec<String>,
}

impl Default for BatchCleaner {
    fn default() -> Self {
        Self::new(NumericField::ALL.iter().map(|f| f.as_str().to_string()))
    }
}

impl BatchCleaner {
    /// Cleans the given numeric columns. Missing columns count as all-null.
    pub fn new(columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Cleans `batch`. The survivors keep the input schema, with numeric
    /// columns read as `Float64` and NaN/Infinity replaced by null.
    #[instrument(skip(self, batch), fields(rows = batch.num_rows(), columns = self.columns.len()))]
    pub fn clean(&self, batch: &RecordBatch) -> Result<CleanedBatch> {
        let rows = batch.num_rows();
        let mut numeric = Vec::with_capacity(self.columns.len());
        for name in &self.columns {
            let values = read_float_column(batch, name)?
                .unwrap_or_else(|| Float64Array::from(vec![None::<f64>; rows]));
            numeric.push(values);
        }

        // pass 1: population statistics per column
        let baselines: Vec<Option<ColumnBaseline>> =
            numeric.iter().map(ColumnBaseline::from_column).collect();

        // pass 2: classification
        let mut keep = Vec::with_capacity(rows);
        let mut removed = 0u64;
        let mut incomplete = 0u64;
        for row in 0..rows {
            let outlier = numeric.iter().zip(&baselines).any(|(values, baseline)| {
                match baseline {
                    Some(b) if values.is_valid(row) => b.is_outlier(values.value(row)),
                    _ => false,
                }
            });
            if outlier {
                removed += 1;
                keep.push(false);
            } else if numeric.iter().any(|values| values.is_null(row)) {
                incomplete += 1;
                keep.push(false);
            } else {
                keep.push(true);
            }
        }

        let normalized = self.replace_numeric_columns(batch, numeric)?;
        let survivors = filter_record_batch(&normalized, &BooleanArray::from(keep))?;
        let report = CleaningReport {
            total: rows as u64,
            removed,
            incomplete,
            remaining: survivors.num_rows() as u64,
        };
        info!(
            total = report.total,
            removed = report.removed,
            incomplete = report.incomplete,
            remaining = report.remaining,
            "cleaning complete"
        );
        Ok(CleanedBatch { survivors, report })
    }

    fn replace_numeric_columns(
        &self,
        batch: &RecordBatch,
        numeric: Vec<Float64Array>,
    ) -> Result<RecordBatch> {
        let schema = batch.schema();
        let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
        let mut columns: Vec<ArrayRef> = batch.columns().to_vec();

        for (name, values) in self.columns.iter().zip(numeric) {
            if let Some((idx, _)) = schema.column_with_name(name) {
                fields[idx] = Field::new(name, DataType::Float64, true);
                columns[idx] = Arc::new(values);
            }
        }
        Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WqError;
    use crate::model::{observations_from_batch, observations_to_batch, Observation};
    use arrow::array::StringArray;

    fn row(t: f64, s: f64, o: f64) -> Observation {
        Observation::on("03/14/21")
            .with(NumericField::Temperature, t)
            .with(NumericField::Salinity, s)
            .with(NumericField::Odo, o)
    }

    /// 30 well-behaved rows plus one extreme temperature.
    fn dataset_with_spike() -> Vec<Observation> {
        let mut rows: Vec<Observation> = (0..30)
            .map(|i| {
                let d = (i % 5) as f64 * 0.1;
                row(20.0 + d, 35.0 + d, 7.0 + d)
            })
            .collect();
        rows.push(row(80.0, 35.2, 7.2));
        rows
    }

    #[test]
    fn test_spike_is_removed() {
        let batch = observations_to_batch(&dataset_with_spike()).unwrap();
        let cleaned = BatchCleaner::default().clean(&batch).unwrap();
        assert_eq!(
            cleaned.report,
            CleaningReport {
                total: 31,
                removed: 1,
                incomplete: 0,
                remaining: 30
            }
        );
        let survivors = observations_from_batch(&cleaned.survivors).unwrap();
        assert!(survivors.iter().all(|o| o.temperature < Some(30.0)));
    }

    #[test]
    fn test_cleaning_is_idempotent() {
        let batch = observations_to_batch(&dataset_with_spike()).unwrap();
        let cleaner = BatchCleaner::default();
        let once = cleaner.clean(&batch).unwrap();
        let twice = cleaner.clean(&once.survivors).unwrap();
        assert_eq!(twice.report.removed, 0);
        assert_eq!(twice.report.remaining, once.report.remaining);
    }

    #[test]
    fn test_incomplete_rows_dropped_after_outliers() {
        let mut rows = dataset_with_spike();
        rows.push(Observation::on("03/14/21").with(NumericField::Temperature, 20.1));
        let batch = observations_to_batch(&rows).unwrap();
        let cleaned = BatchCleaner::default().clean(&batch).unwrap();
        assert_eq!(cleaned.report.total, 32);
        assert_eq!(cleaned.report.removed, 1);
        assert_eq!(cleaned.report.incomplete, 1);
        assert_eq!(cleaned.report.remaining, 30);
    }

    #[test]
    fn test_zero_variance_column_never_flags() {
        let rows: Vec<Observation> = (0..20).map(|i| row(20.0 + i as f64, 35.0, 7.0)).collect();
        let batch = observations_to_batch(&rows).unwrap();
        let cleaned = BatchCleaner::default().clean(&batch).unwrap();
        assert_eq!(cleaned.report.removed, 0);
        assert_eq!(cleaned.report.remaining, 20);
    }

    #[test]
    fn test_report_computed_when_nothing_removed() {
        let batch = observations_to_batch(&[row(1.0, 2.0, 3.0)]).unwrap();
        let cleaned = BatchCleaner::default().clean(&batch).unwrap();
        assert_eq!(
            cleaned.report,
            CleaningReport {
                total: 1,
                removed: 0,
                incomplete: 0,
                remaining: 1
            }
        );

        let empty = observations_to_batch(&[]).unwrap();
        assert_eq!(
            BatchCleaner::default().clean(&empty).unwrap().report,
            CleaningReport::default()
        );
    }

    #[test]
    fn test_text_numbers_are_coerced_or_rejected() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("date", DataType::Utf8, true),
            Field::new("temperature", DataType::Utf8, true),
        ]));
        let ok = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec!["a", "b"])),
                Arc::new(StringArray::from(vec!["20.5", "21"])),
            ],
        )
        .unwrap();
        let cleaner = BatchCleaner::new(["temperature"]);
        let cleaned = cleaner.clean(&ok).unwrap();
        assert_eq!(
            cleaned.survivors.schema().field_with_name("temperature").unwrap().data_type(),
            &DataType::Float64
        );

        let bad = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["a", "b"])),
                Arc::new(StringArray::from(vec!["20.5", "abc"])),
            ],
        )
        .unwrap();
        assert!(matches!(
            cleaner.clean(&bad),
            Err(WqError::DataIntegrity { .. })
        ));
    }
}
