use super::{FilterSpec, Pagination, DEFAULT_LIMIT};
use crate::error::{Result, WqError};
use crate::model::NumericField;
use std::collections::BTreeMap;
use std::num::IntErrorKind;

/// Raw request parameters. When a key repeats, the first value wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    values: BTreeMap<String, String>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `key=value` pairs (e.g. command-line arguments).
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut params = Self::new();
        for pair in pairs {
            let pair = pair.as_ref();
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                WqError::invalid_argument(format!("expected key=value, got '{pair}'"))
            })?;
            params = params.with(key, value);
        }
        Ok(params)
    }

    /// Returns these parameters with `key` set, unless it is already present.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.entry(key.into()).or_insert_with(|| value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        iter.into_iter()
            .fold(Self::new(), |params, (k, v)| params.with(k, v))
    }
}

/// Builds a [`FilterSpec`] from observation-query parameters.
///
/// Recognized keys: `date`, `min_temp`/`max_temp`, `min_sal`/`max_sal`,
/// `min_odo`/`max_odo`, `limit` and `skip`. Unknown keys are ignored.
pub struct QueryFilterBuilder;

const RANGE_PARAMS: [(NumericField, &str, &str); 3] = [
    (NumericField::Temperature, "min_temp", "max_temp"),
    (NumericField::Salinity, "min_sal", "max_sal"),
    (NumericField::Odo, "min_odo", "max_odo"),
];

impl QueryFilterBuilder {
    /// Validates and translates `params`. Pure: touches no storage.
    pub fn build(params: &QueryParams) -> Result<FilterSpec> {
        let mut spec = FilterSpec::new();

        if let Some(date) = params.get("date").filter(|d| !d.is_empty()) {
            spec = spec.with_date(date);
        }

        for (field, min_key, max_key) in RANGE_PARAMS {
            let min = params.get(min_key).map(parse_bound).transpose()?;
            let max = params.get(max_key).map(parse_bound).transpose()?;
            spec = spec.with_range(field, min, max)?;
        }

        let limit = params
            .get("limit")
            .map(parse_integer)
            .transpose()?
            .unwrap_or(DEFAULT_LIMIT as i64);
        let skip = params.get("skip").map(parse_integer).transpose()?.unwrap_or(0);

        Ok(spec.with_pagination(Pagination::new(limit, skip)?))
    }
}

fn parse_bound(raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| WqError::invalid_argument("min/max numeric parameters must be valid numbers"))
}

fn parse_integer(raw: &str) -> Result<i64> {
    match raw.trim().parse::<i64>() {
        Ok(v) => Ok(v),
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow => Ok(i64::MAX),
            IntErrorKind::NegOverflow => Ok(i64::MIN),
            _ => Err(WqError::invalid_argument("limit and skip must be integers")),
        },
    }
}
