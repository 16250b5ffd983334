//! Descriptive statistics over path samples

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::error::CalculationError;

/// A sample sorted ascending, for repeated quantile queries
#[derive(Debug, Clone)]
pub struct SortedSample(Vec<f64>);

impl SortedSample {
    /// Sort a copy of `values`; fails on an empty or non-finite sample
    pub fn new(metric: &'static str, values: &[f64]) -> Result<Self, CalculationError> {
        if values.is_empty() {
            return Err(CalculationError::new(metric, "empty sample"));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(CalculationError::new(metric, "non-finite value in sample"));
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        Ok(Self(sorted))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.0
    }

    /// Linearly interpolated quantile, `q` in [0, 1]
    #[must_use]
    pub fn quantile(&self, q: f64) -> f64 {
        let n = self.0.len();
        if n == 1 {
            return self.0[0];
        }
        let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
        let lo = pos.floor() as usize;
        let hi = (lo + 1).min(n - 1);
        let frac = pos - lo as f64;
        self.0[lo] + (self.0[hi] - self.0[lo]) * frac
    }

    /// Mean of the values at or below the `q` quantile
    #[must_use]
    pub fn tail_mean(&self, q: f64) -> f64 {
        let cutoff = self.quantile(q);
        let tail: Vec<f64> = self.0.iter().copied().take_while(|v| *v <= cutoff).collect();
        if tail.is_empty() {
            cutoff
        } else {
            tail.mean()
        }
    }

    /// Fraction of values strictly above `threshold`
    #[must_use]
    pub fn fraction_above(&self, threshold: f64) -> f64 {
        let at_or_below = self.0.partition_point(|v| *v <= threshold);
        (self.0.len() - at_or_below) as f64 / self.0.len() as f64
    }

    /// Fraction of values at or above `threshold`
    #[must_use]
    pub fn fraction_at_least(&self, threshold: f64) -> f64 {
        let below = self.0.partition_point(|v| *v < threshold);
        (self.0.len() - below) as f64 / self.0.len() as f64
    }
}

/// First four moments of a sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BalanceMoments {
    pub n: usize,
    pub mean: f64,
    /// Sample standard deviation
    pub std_dev: f64,
    pub skewness: f64,
    pub excess_kurtosis: f64,
}

impl BalanceMoments {
    #[must_use]
    pub fn of(values: &[f64]) -> Self {
        let n = values.len();
        if n == 0 {
            return Self {
                n,
                mean: 0.0,
                std_dev: 0.0,
                skewness: 0.0,
                excess_kurtosis: 0.0,
            };
        }
        let mean = values.mean();
        let std_dev = if n > 1 { values.std_dev() } else { 0.0 };

        let (m2, m3, m4) = values.iter().fold((0.0, 0.0, 0.0), |(m2, m3, m4), v| {
            let d = v - mean;
            let d2 = d * d;
            (m2 + d2, m3 + d2 * d, m4 + d2 * d2)
        });
        let nf = n as f64;
        let (m2, m3, m4) = (m2 / nf, m3 / nf, m4 / nf);
        let (skewness, excess_kurtosis) = if m2 > 0.0 {
            (m3 / m2.powf(1.5), m4 / (m2 * m2) - 3.0)
        } else {
            (0.0, 0.0)
        };
        Self {
            n,
            mean,
            std_dev,
            skewness,
            excess_kurtosis,
        }
    }

    #[must_use]
    pub fn variance(&self) -> f64 {
        self.std_dev * self.std_dev
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantile_interpolates() {
        let s = SortedSample::new("t", &[4.0, 1.0, 3.0, 2.0, 5.0]).unwrap();
        assert_eq!(s.quantile(0.0), 1.0);
        assert_eq!(s.quantile(0.5), 3.0);
        assert_eq!(s.quantile(1.0), 5.0);
        assert!((s.quantile(0.1) - 1.4).abs() < 1e-12);
    }

    #[test]
    fn test_fractions() {
        let s = SortedSample::new("t", &[0.0, 0.0, 1.0, 2.0]).unwrap();
        assert_eq!(s.fraction_above(0.0), 0.5);
        assert_eq!(s.fraction_at_least(1.0), 0.5);
        assert_eq!(s.tail_mean(0.0), 0.0);
    }

    #[test]
    fn test_rejects_bad_samples() {
        assert!(SortedSample::new("t", &[]).is_err());
        let err = SortedSample::new("percentiles", &[1.0, f64::NAN]).unwrap_err();
        assert_eq!(err.metric, "percentiles");
    }

    #[test]
    fn test_moments_of_symmetric_sample() {
        let m = BalanceMoments::of(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(m.mean, 3.0);
        assert!((m.variance() - 2.5).abs() < 1e-12);
        assert!(m.skewness.abs() < 1e-12);
        // uniform-like: platykurtic
        assert!(m.excess_kurtosis < 0.0);
    }
}
