//! On-demand outlier detection over stored observations.
//!
//! Every request runs the same phases: arguments are validated before the
//! store is touched, a [`Baseline`] is computed over the population, the
//! request short-circuits on an empty population or a zero Z-score spread,
//! and otherwise the population is re-scanned and classified.

mod baseline;

pub use baseline::{Baseline, BaselineStatistics, IqrBaseline, ZScoreBaseline};

use crate::error::{Result, WqError};
use crate::filter::{Population, Predicate, QueryParams};
use crate::model::{NumericField, Observation};
use crate::sanitize::Sanitize;
use crate::store::ObservationStore;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Message attached to Z-score results whose population has no spread.
pub const ZERO_SPREAD_MESSAGE: &str = "Standard deviation is zero, no outliers detected";

/// Statistical method used to classify records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutlierMethod {
    /// `|value - mean| / stddev > k`
    #[default]
    ZScore,
    /// `value` outside `[Q1 - k*IQR, Q3 + k*IQR]`
    Iqr,
}

impl OutlierMethod {
    /// Method-appropriate threshold when the caller omits `k`.
    pub fn default_k(&self) -> f64 {
        match self {
            OutlierMethod::ZScore => 3.0,
            OutlierMethod::Iqr => 1.5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutlierMethod::ZScore => "zscore",
            OutlierMethod::Iqr => "iqr",
        }
    }
}

impl FromStr for OutlierMethod {
    type Err = WqError;

    /// Case-insensitive.
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "zscore" => Ok(OutlierMethod::ZScore),
            "iqr" => Ok(OutlierMethod::Iqr),
            _ => Err(WqError::invalid_argument("method must be 'zscore' or 'iqr'")),
        }
    }
}

impl fmt::Display for OutlierMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated detection request.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlierRequest {
    pub field: NumericField,
    pub method: OutlierMethod,
    pub k: f64,
    pub population: Population,
}

impl OutlierRequest {
    /// Builds a request over [`Population::AllNonNull`]. `k` defaults per method
    /// and must be finite.
    pub fn new(field: NumericField, method: OutlierMethod, k: Option<f64>) -> Result<Self> {
        let k = k.unwrap_or_else(|| method.default_k());
        if !k.is_finite() {
            return Err(WqError::invalid_argument("k must be a valid number"));
        }
        Ok(Self {
            field,
            method,
            k,
            population: Population::AllNonNull,
        })
    }

    /// Replaces the population baselines and classification run over.
    pub fn with_population(mut self, population: Population) -> Self {
        self.population = population;
        self
    }

    /// Validates `field`, then `method` (default `zscore`), then `k`.
    pub fn from_params(params: &QueryParams) -> Result<Self> {
        let field: NumericField = params.get("field").unwrap_or_default().parse()?;
        let method: OutlierMethod = params.get("method").unwrap_or("zscore").parse()?;
        let k = params
            .get("k")
            .map(|raw| {
                raw.trim()
                    .parse::<f64>()
                    .map_err(|_| WqError::invalid_argument("k must be a valid number"))
            })
            .transpose()?;
        Self::new(field, method, k)
    }
}

/// A stored record selected as an outlier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlierRecord {
    #[serde(flatten)]
    pub observation: Observation,
    /// Signed z-score, present for the Z-score method only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z_score: Option<f64>,
}

impl Sanitize for OutlierRecord {
    fn sanitize(&mut self) {
        self.observation.sanitize();
        self.z_score.sanitize();
    }
}

/// Outcome of one detection request.
///
/// `statistics` is omitted when the request short-circuited.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlierResult {
    pub count: u64,
    pub outliers: Vec<OutlierRecord>,
    pub method: OutlierMethod,
    pub field: NumericField,
    pub k: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<BaselineStatistics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl OutlierResult {
    fn empty(request: &OutlierRequest, message: Option<&str>) -> Self {
        Self {
            count: 0,
            outliers: Vec::new(),
            method: request.method,
            field: request.field,
            k: request.k,
            statistics: None,
            message: message.map(str::to_string),
        }
    }
}

impl Sanitize for OutlierResult {
    fn sanitize(&mut self) {
        self.outliers.sanitize();
        if let Some(statistics) = self.statistics.as_mut() {
            statistics.sanitize();
        }
    }
}

enum BaselineOutcome {
    EmptyPopulation,
    ZeroSpread,
    Ready(Box<dyn Baseline>),
}

/// Classifies stored records against a per-request baseline.
#[derive(Clone)]
pub struct OutlierDetector {
    store: Arc<dyn ObservationStore>,
}

impl OutlierDetector {
    pub fn new(store: Arc<dyn ObservationStore>) -> Self {
        Self { store }
    }

    /// Runs one detection request. Identical stored data and arguments give an identical result.
    ///
    /// The baseline and the classification read one pinned snapshot, so a
    /// concurrent reload never mixes two datasets into one result.
    #[instrument(skip(self, request), fields(field = %request.field, method = %request.method, k = request.k))]
    pub async fn detect(&self, request: &OutlierRequest) -> Result<OutlierResult> {
        let predicate = request.population.predicate(request.field);
        let store = self.store.snapshot().await?;

        let baseline = match Self::compute_baseline(store.as_ref(), request, &predicate).await? {
            BaselineOutcome::EmptyPopulation => {
                debug!("population is empty");
                return Ok(OutlierResult::empty(request, None));
            }
            BaselineOutcome::ZeroSpread => {
                debug!("population has zero spread");
                return Ok(OutlierResult::empty(request, Some(ZERO_SPREAD_MESSAGE)));
            }
            BaselineOutcome::Ready(baseline) => baseline,
        };

        let outliers =
            Self::classify(store.as_ref(), request.field, &predicate, baseline.as_ref()).await?;
        let (lower, upper) = baseline.bounds();
        info!(
            count = outliers.len(),
            center = baseline.center(),
            spread = baseline.spread(),
            lower,
            upper,
            "outlier detection complete"
        );

        Ok(OutlierResult {
            count: outliers.len() as u64,
            outliers,
            method: request.method,
            field: request.field,
            k: request.k,
            statistics: Some(baseline.statistics()),
            message: None,
        })
    }

    async fn compute_baseline(
        store: &dyn ObservationStore,
        request: &OutlierRequest,
        predicate: &Predicate,
    ) -> Result<BaselineOutcome> {
        match request.method {
            OutlierMethod::ZScore => {
                let rows = store.aggregate(request.field, predicate, None).await?;
                let Some(row) = rows.first() else {
                    return Ok(BaselineOutcome::EmptyPopulation);
                };
                Ok(match ZScoreBaseline::new(row.avg, row.stddev_pop, request.k) {
                    Some(baseline) => BaselineOutcome::Ready(Box::new(baseline)),
                    None => BaselineOutcome::ZeroSpread,
                })
            }
            OutlierMethod::Iqr => {
                let values = store.field_values(request.field, predicate).await?;
                Ok(match IqrBaseline::from_values(&values, request.k) {
                    Some(baseline) => BaselineOutcome::Ready(Box::new(baseline)),
                    None => BaselineOutcome::EmptyPopulation,
                })
            }
        }
    }

    async fn classify(
        store: &dyn ObservationStore,
        field: NumericField,
        predicate: &Predicate,
        baseline: &dyn Baseline,
    ) -> Result<Vec<OutlierRecord>> {
        let rows = store.find(predicate, None).await?;
        Ok(rows
            .into_iter()
            .filter_map(|observation| {
                let value = observation.value(field)?;
                baseline.is_outlier(value).then(|| OutlierRecord {
                    z_score: baseline.score(value),
                    observation,
                })
            })
            .collect())
    }
}
