//! Baselines: the center/spread summary a detection request classifies against.

use serde::Serialize;
use std::fmt::Debug;

/// Method-shaped baseline statistics as returned to callers.
///
/// Values are always present when computed; sanitizing turns non-finite
/// ones, such as fences that overflowed, into `None`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BaselineStatistics {
    ZScore {
        mean: Option<f64>,
        stddev: Option<f64>,
    },
    Iqr {
        q1: Option<f64>,
        q3: Option<f64>,
        iqr: Option<f64>,
        lower_bound: Option<f64>,
        upper_bound: Option<f64>,
    },
}

/// A center/spread pair with a derived admissible range.
///
/// A value is an outlier when it falls outside the admissible range; the
/// comparison is strict, so values exactly on a boundary are inliers.
pub trait Baseline: Debug + Send + Sync {
    fn center(&self) -> f64;

    fn spread(&self) -> f64;

    /// Admissible range `[lower, upper]`.
    fn bounds(&self) -> (f64, f64);

    fn is_outlier(&self, value: f64) -> bool;

    /// Per-record annotation returned next to each outlier.
    fn score(&self, _value: f64) -> Option<f64> {
        None
    }

    fn statistics(&self) -> BaselineStatistics;
}

/// Mean and population standard deviation; outliers satisfy `|v - mean| / stddev > k`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZScoreBaseline {
    pub mean: f64,
    pub stddev: f64,
    pub k: f64,
}

impl ZScoreBaseline {
    /// Returns `None` when the spread is zero or undefined.
    pub fn new(mean: f64, stddev: f64, k: f64) -> Option<Self> {
        (stddev.is_finite() && stddev > 0.0 && mean.is_finite()).then_some(Self { mean, stddev, k })
    }

    /// Signed z-score of `value`.
    pub fn z_score(&self, value: f64) -> f64 {
        (value - self.mean) / self.stddev
    }
}

impl Baseline for ZScoreBaseline {
    fn center(&self) -> f64 {
        self.mean
    }

    fn spread(&self) -> f64 {
        self.stddev
    }

    fn bounds(&self) -> (f64, f64) {
        (
            self.mean - self.k * self.stddev,
            self.mean + self.k * self.stddev,
        )
    }

    fn is_outlier(&self, value: f64) -> bool {
        self.z_score(value).abs() > self.k
    }

    fn score(&self, value: f64) -> Option<f64> {
        Some(self.z_score(value))
    }

    fn statistics(&self) -> BaselineStatistics {
        BaselineStatistics::ZScore {
            mean: Some(self.mean),
            stddev: Some(self.stddev),
        }
    }
}

/// Rank-based quartiles with Tukey fences `[Q1 - k*IQR, Q3 + k*IQR]`.
///
/// Over `n` ascending values, `Q1` is the value at index `n / 4` and `Q3` the
/// value at index `3n / 4` (integer division). No interpolation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IqrBaseline {
    pub q1: f64,
    pub q3: f64,
    pub iqr: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

impl IqrBaseline {
    /// Builds the baseline from unsorted values. Returns `None` when `values` is empty.
    pub fn from_values(values: &[f64], k: f64) -> Option<Self> {
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        Self::from_sorted(&sorted, k)
    }

    /// Builds the baseline from ascending values.
    pub fn from_sorted(sorted: &[f64], k: f64) -> Option<Self> {
        let n = sorted.len();
        if n == 0 {
            return None;
        }
        let q1 = sorted[n / 4];
        let q3 = sorted[(3 * n) / 4];
        let iqr = q3 - q1;
        Some(Self {
            q1,
            q3,
            iqr,
            lower_bound: q1 - k * iqr,
            upper_bound: q3 + k * iqr,
        })
    }
}

impl Baseline for IqrBaseline {
    fn center(&self) -> f64 {
        (self.q1 + self.q3) / 2.0
    }

    fn spread(&self) -> f64 {
        self.iqr
    }

    fn bounds(&self) -> (f64, f64) {
        (self.lower_bound, self.upper_bound)
    }

    fn is_outlier(&self, value: f64) -> bool {
        value < self.lower_bound || value > self.upper_bound
    }

    fn statistics(&self) -> BaselineStatistics {
        BaselineStatistics::Iqr {
            q1: Some(self.q1),
            q3: Some(self.q3),
            iqr: Some(self.iqr),
            lower_bound: Some(self.lower_bound),
            upper_bound: Some(self.upper_bound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iqr_rank_indices() {
        let values: Vec<f64> = (1..=10).map(f64::from).collect();
        let baseline = IqrBaseline::from_values(&values, 1.5).unwrap();
        assert_eq!(baseline.q1, 3.0);
        assert_eq!(baseline.q3, 8.0);
        assert_eq!(baseline.iqr, 5.0);
        assert_eq!(baseline.bounds(), (-4.5, 15.5));
        assert!(values.iter().all(|v| !baseline.is_outlier(*v)));
        assert!(baseline.is_outlier(15.6));
        assert!(!baseline.is_outlier(15.5));
    }

    #[test]
    fn test_iqr_differs_from_interpolated_quartiles() {
        // linear interpolation gives Q1 = 1.75 here
        let baseline = IqrBaseline::from_values(&[4.0, 3.0, 2.0, 1.0], 1.5).unwrap();
        assert_eq!(baseline.q1, 2.0);
        assert_eq!(baseline.q3, 4.0);
    }

    #[test]
    fn test_iqr_small_inputs() {
        assert!(IqrBaseline::from_values(&[], 1.5).is_none());
        let single = IqrBaseline::from_values(&[5.0], 1.5).unwrap();
        assert_eq!((single.q1, single.q3, single.iqr), (5.0, 5.0, 0.0));
        assert!(single.is_outlier(5.1));
        assert!(!single.is_outlier(5.0));
    }

    #[test]
    fn test_fences_overflow_to_infinity() {
        let baseline = IqrBaseline::from_values(&[1.0, 2.0, 3.0, 10.0], 1e308).unwrap();
        assert_eq!(baseline.iqr, 8.0);
        assert_eq!(baseline.bounds(), (f64::NEG_INFINITY, f64::INFINITY));
        assert!(!baseline.is_outlier(f64::MAX));
        assert_eq!(baseline.center(), 6.0);
        assert_eq!(baseline.spread(), 8.0);
    }

    #[test]
    fn test_zscore_boundary_is_strict() {
        // [10, 10, 10, 10, 100]: mean 28, population stddev 36, z(100) = 2
        let baseline = ZScoreBaseline::new(28.0, 36.0, 1.0).unwrap();
        assert!(baseline.is_outlier(100.0));
        assert!(!baseline.is_outlier(10.0));
        assert_eq!(baseline.score(100.0), Some(2.0));
        assert_eq!(baseline.score(10.0), Some(-0.5));
        assert_eq!((baseline.center(), baseline.spread()), (28.0, 36.0));

        let at_boundary = ZScoreBaseline::new(28.0, 36.0, 2.0).unwrap();
        assert!(!at_boundary.is_outlier(100.0));
    }

    #[test]
    fn test_zscore_requires_positive_spread() {
        assert!(ZScoreBaseline::new(5.0, 0.0, 3.0).is_none());
        assert!(ZScoreBaseline::new(5.0, f64::NAN, 3.0).is_none());
    }

    #[test]
    fn test_statistics_shapes() {
        let z = ZScoreBaseline::new(1.0, 2.0, 3.0).unwrap();
        assert_eq!(
            serde_json::to_value(z.statistics()).unwrap(),
            serde_json::json!({"mean": 1.0, "stddev": 2.0})
        );
        let iqr = IqrBaseline::from_values(&[1.0, 2.0, 3.0, 4.0], 1.0).unwrap();
        assert_eq!(
            serde_json::to_value(iqr.statistics()).unwrap(),
            serde_json::json!({
                "q1": 2.0, "q3": 4.0, "iqr": 2.0, "lower_bound": 0.0, "upper_bound": 6.0
            })
        );
    }
}
