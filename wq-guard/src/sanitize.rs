//! Boundary normalization of non-finite floats.
//!
//! Everything the request surface returns passes through [`Sanitize`] before
//! serialization, so NaN and ±Infinity leave the system as `null`.

use crate::model::Observation;
use crate::outliers::BaselineStatistics;
use crate::stats::{Percentiles, StatResult};

/// Replaces every non-finite float reachable from `self` with `None`.
pub trait Sanitize {
    fn sanitize(&mut self);
}

impl Sanitize for Option<f64> {
    fn sanitize(&mut self) {
        if self.is_some_and(|v| !v.is_finite()) {
            *self = None;
        }
    }
}

impl<T: Sanitize> Sanitize for Vec<T> {
    fn sanitize(&mut self) {
        for item in self {
            item.sanitize();
        }
    }
}

impl Sanitize for Observation {
    fn sanitize(&mut self) {
        self.latitude.sanitize();
        self.longitude.sanitize();
        self.temperature.sanitize();
        self.salinity.sanitize();
        self.odo.sanitize();
    }
}

impl Sanitize for Percentiles {
    fn sanitize(&mut self) {
        self.p25.sanitize();
        self.p50.sanitize();
        self.p75.sanitize();
    }
}

impl Sanitize for BaselineStatistics {
    fn sanitize(&mut self) {
        match self {
            BaselineStatistics::ZScore { mean, stddev } => {
                mean.sanitize();
                stddev.sanitize();
            }
            BaselineStatistics::Iqr {
                q1,
                q3,
                iqr,
                lower_bound,
                upper_bound,
            } => {
                q1.sanitize();
                q3.sanitize();
                iqr.sanitize();
                lower_bound.sanitize();
                upper_bound.sanitize();
            }
        }
    }
}

impl Sanitize for StatResult {
    fn sanitize(&mut self) {
        self.mean.sanitize();
        self.min.sanitize();
        self.max.sanitize();
        self.percentiles.sanitize();
    }
}
