//! # wq-guard - Water-Quality Observation Analysis
//!
//! wq-guard ingests water-quality sensor observations (temperature, salinity,
//! dissolved oxygen, position and timestamp) from CSV batches, cleans them
//! statistically and serves them to a dashboard through a small query and
//! analysis surface. It uses DataFusion as the in-process query engine.
//!
//! ## Overview
//!
//! - **Statistics**: count, mean, min, max and interpolated quartiles for any
//!   numeric field.
//! - **Outlier detection**: Z-score and IQR methods over one [`Baseline`]
//!   abstraction, with method-specific default thresholds.
//! - **Batch cleaning**: a two-pass Z-score filter run over a whole ingest
//!   batch before it is stored.
//! - **Query filters**: date, numeric range and offset/limit parameters
//!   translated into store predicates.
//!
//! ## Quick Start
//!
//! ```rust
//! use wq_guard::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> wq_guard::error::Result<()> {
//! let observations = vec![
//!     Observation::on("03/14/21").with(NumericField::Temperature, 20.5),
//!     Observation::on("03/14/21").with(NumericField::Temperature, 21.0),
//! ];
//! let store = Arc::new(DataFusionStore::from_observations(StoreConfig::default(), &observations).await?);
//!
//! let engine = StatisticsEngine::new(store.clone());
//! let stats = engine
//!     .field_stats(NumericField::Temperature, &Population::AllNonNull)
//!     .await?;
//! assert_eq!(stats.count, 2);
//!
//! let detector = OutlierDetector::new(store);
//! let request = OutlierRequest::new(NumericField::Temperature, OutlierMethod::Iqr, None)?;
//! let result = detector.detect(&request).await?;
//! assert_eq!(result.k, 1.5);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`store`]: the [`ObservationStore`] query surface and its DataFusion implementation
//! - [`stats`] and [`outliers`]: per-request computations over a store handle
//! - [`cleaning`] and [`ingest`]: the batch path that replaces the stored dataset
//! - [`api`]: parameter validation, dispatch and JSON rendering
//!
//! [`Baseline`]: outliers::Baseline
//! [`ObservationStore`]: store::ObservationStore

pub mod api;
pub mod cleaning;
pub mod config;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod outliers;
pub mod prelude;
pub mod sanitize;
pub mod security;
pub mod stats;
pub mod store;
#[cfg(test)]
mod test_fixtures;
