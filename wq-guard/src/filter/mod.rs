//! Translation of raw request parameters into store predicates.
//!
//! A [`FilterSpec`] is built fresh for every request by [`QueryFilterBuilder`]
//! and discarded once the query has run.

mod builder;
mod predicate;

pub use builder::{QueryFilterBuilder, QueryParams};
pub use predicate::Predicate;

use crate::error::{Result, WqError};
use crate::model::NumericField;
use serde::Serialize;

/// Default page size when `limit` is omitted.
pub const DEFAULT_LIMIT: u64 = 100;

/// Largest page a caller can request.
pub const MAX_LIMIT: u64 = 1000;

/// Inclusive bounds on one numeric field. Either bound may be absent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RangeFilter {
    pub field: NumericField,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl RangeFilter {
    fn predicate(&self) -> Predicate {
        let lower = self
            .min
            .map_or(Predicate::All, |v| Predicate::AtLeast(self.field, v));
        let upper = self
            .max
            .map_or(Predicate::All, |v| Predicate::AtMost(self.field, v));
        lower.and(upper)
    }
}

/// Offset/limit pagination. `limit` is always in `(0, MAX_LIMIT]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    limit: u64,
    skip: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            skip: 0,
        }
    }
}

impl Pagination {
    /// Validates `limit > 0` and `skip >= 0`, then clamps `limit` to [`MAX_LIMIT`].
    pub fn new(limit: i64, skip: i64) -> Result<Self> {
        if limit <= 0 {
            return Err(WqError::invalid_argument("limit must be > 0"));
        }
        if skip < 0 {
            return Err(WqError::invalid_argument("skip must be >= 0"));
        }
        Ok(Self {
            limit: (limit as u64).min(MAX_LIMIT),
            skip: skip as u64,
        })
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn skip(&self) -> u64 {
        self.skip
    }
}

/// Immutable description of which observations a request selects.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterSpec {
    date: Option<String>,
    ranges: Vec<RangeFilter>,
    pagination: Pagination,
}

impl FilterSpec {
    /// A filter that selects everything with default pagination.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an exact-match date constraint.
    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    /// Adds a range constraint. Bounds must be finite.
    pub fn with_range(
        mut self,
        field: NumericField,
        min: Option<f64>,
        max: Option<f64>,
    ) -> Result<Self> {
        if min.into_iter().chain(max).any(|v| !v.is_finite()) {
            return Err(WqError::invalid_argument(
                "min/max numeric parameters must be valid numbers",
            ));
        }
        if min.is_some() || max.is_some() {
            self.ranges.push(RangeFilter { field, min, max });
        }
        Ok(self)
    }

    /// Replaces the pagination.
    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn date(&self) -> Option<&str> {
        self.date.as_deref()
    }

    pub fn ranges(&self) -> &[RangeFilter] {
        &self.ranges
    }

    pub fn pagination(&self) -> Pagination {
        self.pagination
    }

    /// Row predicate for the date and range constraints. Pagination is not part of it.
    pub fn predicate(&self) -> Predicate {
        let base = self
            .date
            .as_ref()
            .map_or(Predicate::All, |d| Predicate::DateEquals(d.clone()));
        self.ranges
            .iter()
            .fold(base, |acc, range| acc.and(range.predicate()))
    }
}

/// The record set statistics and outlier baselines are computed over.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Population {
    /// Every row where the field has a reading, regardless of request filters.
    #[default]
    AllNonNull,
    /// Rows matching the filter's date and range constraints that have a reading.
    Filtered(FilterSpec),
}

impl Population {
    /// Predicate selecting this population for `field`.
    pub fn predicate(&self, field: NumericField) -> Predicate {
        match self {
            Population::AllNonNull => Predicate::NotNull(field),
            Population::Filtered(spec) => spec.predicate().and(Predicate::NotNull(field)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_bounds() {
        assert_eq!(Pagination::new(5000, 0).unwrap().limit(), MAX_LIMIT);
        assert_eq!(Pagination::new(1, 7).unwrap().skip(), 7);
        assert_eq!(
            Pagination::new(0, 0).unwrap_err().to_string(),
            "limit must be > 0"
        );
        assert_eq!(
            Pagination::new(10, -1).unwrap_err().to_string(),
            "skip must be >= 0"
        );
    }

    #[test]
    fn test_filter_predicate() {
        let spec = FilterSpec::new()
            .with_date("03/14/21")
            .with_range(NumericField::Salinity, Some(30.0), None)
            .unwrap()
            .with_range(NumericField::Odo, None, None)
            .unwrap();
        assert_eq!(spec.ranges().len(), 1);
        assert_eq!(
            spec.predicate(),
            Predicate::And(vec![
                Predicate::DateEquals("03/14/21".to_string()),
                Predicate::AtLeast(NumericField::Salinity, 30.0),
            ])
        );
    }

    #[test]
    fn test_non_finite_bounds_rejected() {
        assert!(FilterSpec::new()
            .with_range(NumericField::Temperature, Some(f64::NAN), None)
            .is_err());
        assert!(FilterSpec::new()
            .with_range(NumericField::Temperature, None, Some(f64::INFINITY))
            .is_err());
    }

    #[test]
    fn test_population_predicates() {
        assert_eq!(
            Population::AllNonNull.predicate(NumericField::Odo),
            Predicate::NotNull(NumericField::Odo)
        );
        let filtered = Population::Filtered(FilterSpec::new().with_date("03/14/21"));
        assert_eq!(
            filtered.predicate(NumericField::Odo),
            Predicate::And(vec![
                Predicate::DateEquals("03/14/21".to_string()),
                Predicate::NotNull(NumericField::Odo),
            ])
        );
    }
}
