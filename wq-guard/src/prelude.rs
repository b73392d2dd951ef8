//! Prelude for commonly used types and traits in wq-guard.

pub use crate::api::{ApiResponse, WaterQualityApi};
pub use crate::cleaning::{BatchCleaner, CleaningReport};
pub use crate::config::ServiceConfig;
pub use crate::error::{Result, WqError};
pub use crate::filter::{FilterSpec, Population, Predicate, QueryFilterBuilder, QueryParams};
pub use crate::ingest::{IngestConfig, IngestPipeline};
pub use crate::logging::LogConfig;
pub use crate::model::{NumericField, Observation};
pub use crate::outliers::{OutlierDetector, OutlierMethod, OutlierRequest, OutlierResult};
pub use crate::sanitize::Sanitize;
pub use crate::stats::{StatResult, StatisticsEngine};
pub use crate::store::{DataFusionStore, ObservationStore, StoreConfig};
