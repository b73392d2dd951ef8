//! Request surface consumed by the dashboard.
//!
//! Each operation validates its parameters before touching the store and
//! returns a typed response. [`WaterQualityApi::handle`] adds endpoint
//! dispatch and renders either the response or an `{error: message}` body,
//! sanitized so that NaN and Infinity leave as `null`.

use crate::error::{Result, WqError};
use crate::filter::{Population, QueryFilterBuilder, QueryParams};
use crate::model::{NumericField, Observation, DATE_COLUMN};
use crate::outliers::{OutlierDetector, OutlierRequest, OutlierResult};
use crate::sanitize::Sanitize;
use crate::stats::{StatisticsEngine, SummaryStats};
use crate::store::ObservationStore;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatesResponse {
    pub dates: Vec<String>,
}

/// One page of matching observations. `count` is the total number of matches.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservationsResponse {
    pub count: u64,
    pub items: Vec<Observation>,
}

impl Sanitize for ObservationsResponse {
    fn sanitize(&mut self) {
        self.items.sanitize();
    }
}

/// Status and JSON body of a dispatched request.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    fn ok<T: Serialize + Sanitize>(mut payload: T) -> Self {
        payload.sanitize();
        match serde_json::to_value(&payload) {
            Ok(body) => Self { status: 200, body },
            Err(e) => Self::error(&WqError::Internal(format!("failed to serialize response: {e}"))),
        }
    }

    fn error(err: &WqError) -> Self {
        Self {
            status: err.status_code(),
            body: json!({ "error": err.to_string() }),
        }
    }

    fn not_found() -> Self {
        Self {
            status: 404,
            body: json!({ "error": "not found" }),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl Sanitize for HealthResponse {
    fn sanitize(&mut self) {}
}

impl Sanitize for DatesResponse {
    fn sanitize(&mut self) {}
}

/// The dashboard-facing operations over one shared store handle.
#[derive(Clone)]
pub struct WaterQualityApi {
    store: Arc<dyn ObservationStore>,
    stats: StatisticsEngine,
    outliers: OutlierDetector,
}

impl WaterQualityApi {
    pub fn new(store: Arc<dyn ObservationStore>) -> Self {
        Self {
            stats: StatisticsEngine::new(Arc::clone(&store)),
            outliers: OutlierDetector::new(Arc::clone(&store)),
            store,
        }
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse { status: "ok" }
    }

    /// Sorted distinct observation dates.
    pub async fn list_dates(&self) -> Result<DatesResponse> {
        let dates = self.store.distinct_values(DATE_COLUMN).await?;
        Ok(DatesResponse { dates })
    }

    /// Observations matching the date, range and pagination parameters.
    ///
    /// `count` and `items` come from the same snapshot.
    #[instrument(skip(self, params))]
    pub async fn observations(&self, params: &QueryParams) -> Result<ObservationsResponse> {
        let spec = QueryFilterBuilder::build(params)?;
        let predicate = spec.predicate();
        let store = self.store.snapshot().await?;
        let count = store.count(&predicate).await?;
        let items = store.find(&predicate, Some(spec.pagination())).await?;
        debug!(count, returned = items.len(), "observations queried");
        Ok(ObservationsResponse { count, items })
    }

    /// Statistics for every numeric field, or the comma separated `fields` subset.
    ///
    /// Each field is summarized over all of its non-null readings; observation
    /// filters do not apply here.
    pub async fn summary_stats(&self, params: &QueryParams) -> Result<SummaryStats> {
        let fields = match params.get("fields").map(str::trim).filter(|f| !f.is_empty()) {
            Some(list) => list
                .split(',')
                .map(|name| name.trim().parse::<NumericField>())
                .collect::<Result<Vec<_>>>()?,
            None => NumericField::ALL.to_vec(),
        };
        self.stats.summary(&fields, &Population::AllNonNull).await
    }

    /// Outlier detection over the field's whole non-null population.
    pub async fn outliers(&self, params: &QueryParams) -> Result<OutlierResult> {
        let request = OutlierRequest::from_params(params)?;
        self.outliers.detect(&request).await
    }

    /// Dispatches `path` and renders the result as a status and JSON body.
    #[instrument(skip(self, params))]
    pub async fn handle(&self, path: &str, params: &QueryParams) -> ApiResponse {
        let result = match path {
            "/api/health" => Ok(ApiResponse::ok(self.health())),
            "/api/dates" => self.list_dates().await.map(ApiResponse::ok),
            "/api/observations" => self.observations(params).await.map(ApiResponse::ok),
            "/api/stats" => self.summary_stats(params).await.map(ApiResponse::ok),
            "/api/outliers" => self.outliers(params).await.map(ApiResponse::ok),
            _ => return ApiResponse::not_found(),
        };
        result.unwrap_or_else(|err| {
            if err.is_client_error() {
                warn!(error = %err, "request rejected");
            } else {
                error!(error = %err, "request failed");
            }
            ApiResponse::error(&err)
        })
    }
}
