//! Goodness-of-fit and two-sample significance tests

use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF, Normal, StudentsT};

use crate::error::CalculationError;

use super::stats::{BalanceMoments, SortedSample};

/// Significance level tests report against
pub const SIGNIFICANCE_LEVEL: f64 = 0.05;

/// Smallest sample the goodness-of-fit tests run on
pub const MIN_FIT_SAMPLE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub statistic: f64,
    pub p_value: f64,
    /// Null hypothesis rejected at the 5% level
    pub significant: bool,
}

impl TestResult {
    fn new(statistic: f64, p_value: f64) -> Self {
        let p_value = p_value.clamp(0.0, 1.0);
        Self {
            statistic,
            p_value,
            significant: p_value < SIGNIFICANCE_LEVEL,
        }
    }
}

/// Fit diagnostics of a balance distribution; informational only
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistributionFit {
    pub jarque_bera_normal: TestResult,
    pub kolmogorov_smirnov_normal: TestResult,
    /// Tests on log balances; absent when any balance is non-positive
    pub jarque_bera_lognormal: Option<TestResult>,
    pub kolmogorov_smirnov_lognormal: Option<TestResult>,
}

/// Jarque-Bera normality test
pub fn jarque_bera(moments: &BalanceMoments) -> Result<TestResult, CalculationError> {
    let n = moments.n as f64;
    let jb = n / 6.0 * (moments.skewness.powi(2) + moments.excess_kurtosis.powi(2) / 4.0);
    let chi2 = ChiSquared::new(2.0).map_err(|e| CalculationError::new("jarque_bera", e.to_string()))?;
    Ok(TestResult::new(jb, 1.0 - chi2.cdf(jb)))
}

/// Asymptotic Kolmogorov distribution tail, `P(K > lambda)`
fn kolmogorov_tail(lambda: f64) -> f64 {
    if lambda < 0.2 {
        return 1.0;
    }
    let mut sum = 0.0;
    for k in 1..=100 {
        let k = f64::from(k);
        let term = 2.0 * (-1.0_f64).powf(k - 1.0) * (-2.0 * k * k * lambda * lambda).exp();
        sum += term;
        if term.abs() < 1e-12 {
            break;
        }
    }
    sum.clamp(0.0, 1.0)
}

/// One-sample Kolmogorov-Smirnov test against a normal with the sample's
/// own mean and standard deviation
pub fn kolmogorov_smirnov_normal(
    sample: &SortedSample,
    mean: f64,
    std_dev: f64,
) -> Result<TestResult, CalculationError> {
    let normal =
        Normal::new(mean, std_dev).map_err(|e| CalculationError::new("kolmogorov_smirnov", e.to_string()))?;
    let n = sample.len() as f64;
    let d = sample
        .values()
        .iter()
        .enumerate()
        .map(|(i, &x)| {
            let cdf = normal.cdf(x);
            let above = (i as f64 + 1.0) / n - cdf;
            let below = cdf - i as f64 / n;
            above.max(below)
        })
        .fold(0.0_f64, f64::max);
    let sqrt_n = n.sqrt();
    let lambda = (sqrt_n + 0.12 + 0.11 / sqrt_n) * d;
    Ok(TestResult::new(d, kolmogorov_tail(lambda)))
}

/// Run both fit tests on `values` and, when all are positive, their logs.
/// Returns `None` for samples too small or degenerate to test.
pub fn distribution_fit(values: &[f64]) -> Result<Option<DistributionFit>, CalculationError> {
    let moments = BalanceMoments::of(values);
    if values.len() < MIN_FIT_SAMPLE || moments.std_dev <= 0.0 {
        return Ok(None);
    }
    let sample = SortedSample::new("distribution_fit", values)?;

    let (jarque_bera_lognormal, kolmogorov_smirnov_lognormal) =
        if values.iter().all(|v| *v > 0.0) {
            let logs: Vec<f64> = values.iter().map(|v| v.ln()).collect();
            let log_moments = BalanceMoments::of(&logs);
            if log_moments.std_dev > 0.0 {
                let log_sample = SortedSample::new("distribution_fit", &logs)?;
                (
                    Some(jarque_bera(&log_moments)?),
                    Some(kolmogorov_smirnov_normal(
                        &log_sample,
                        log_moments.mean,
                        log_moments.std_dev,
                    )?),
                )
            } else {
                (None, None)
            }
        } else {
            (None, None)
        };

    Ok(Some(DistributionFit {
        jarque_bera_normal: jarque_bera(&moments)?,
        kolmogorov_smirnov_normal: kolmogorov_smirnov_normal(
            &sample,
            moments.mean,
            moments.std_dev,
        )?,
        jarque_bera_lognormal,
        kolmogorov_smirnov_lognormal,
    }))
}

/// Welch's unequal-variance t-test on two sample means.
///
/// A sample of fewer than two paths has no variance estimate; the difference
/// is then reported as not significant.
pub fn welch_t_test(a: &BalanceMoments, b: &BalanceMoments) -> Result<TestResult, CalculationError> {
    if a.n < 2 || b.n < 2 {
        return Ok(TestResult::new(0.0, 1.0));
    }
    let va = a.variance() / a.n as f64;
    let vb = b.variance() / b.n as f64;
    let se2 = va + vb;
    if se2 <= 0.0 {
        // identical constant samples
        let same = a.mean == b.mean;
        return Ok(TestResult::new(0.0, if same { 1.0 } else { 0.0 }));
    }
    let t = (b.mean - a.mean) / se2.sqrt();
    let df = se2 * se2
        / (va * va / (a.n as f64 - 1.0) + vb * vb / (b.n as f64 - 1.0));
    let dist =
        StudentsT::new(0.0, 1.0, df).map_err(|e| CalculationError::new("welch_t_test", e.to_string()))?;
    Ok(TestResult::new(t, 2.0 * (1.0 - dist.cdf(t.abs()))))
}

/// Pooled two-proportion z-test
pub fn two_proportion_z_test(
    p1: f64,
    n1: usize,
    p2: f64,
    n2: usize,
) -> Result<TestResult, CalculationError> {
    if n1 == 0 || n2 == 0 {
        return Err(CalculationError::new("proportion_test", "empty sample"));
    }
    let (n1f, n2f) = (n1 as f64, n2 as f64);
    let pooled = (p1 * n1f + p2 * n2f) / (n1f + n2f);
    let se = (pooled * (1.0 - pooled) * (1.0 / n1f + 1.0 / n2f)).sqrt();
    if se <= 0.0 {
        let same = p1 == p2;
        return Ok(TestResult::new(0.0, if same { 1.0 } else { 0.0 }));
    }
    let z = (p2 - p1) / se;
    let normal = Normal::standard();
    Ok(TestResult::new(z, 2.0 * (1.0 - normal.cdf(z.abs()))))
}

/// Cohen's d with pooled standard deviation; zero when both samples are constant
#[must_use]
pub fn cohens_d(a: &BalanceMoments, b: &BalanceMoments) -> f64 {
    let dof = (a.n + b.n).saturating_sub(2) as f64;
    if dof <= 0.0 {
        return 0.0;
    }
    let pooled = (((a.n as f64 - 1.0) * a.variance() + (b.n as f64 - 1.0) * b.variance()) / dof)
        .sqrt();
    if pooled > 0.0 {
        (b.mean - a.mean) / pooled
    } else {
        0.0
    }
}

/// Two-sided standard normal critical value for `level` (e.g. 1.96 at 0.95)
pub fn normal_critical(level: f64) -> Result<f64, CalculationError> {
    if !(level > 0.0 && level < 1.0) {
        return Err(CalculationError::new(
            "confidence_interval",
            format!("confidence level {level} outside (0, 1)"),
        ));
    }
    Ok(Normal::standard().inverse_cdf(0.5 + level / 2.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use rand_distr::{Distribution, LogNormal, StandardNormal};

    #[test]
    fn test_normal_sample_passes_normality() {
        let mut rng = SmallRng::seed_from_u64(11);
        let values: Vec<f64> = (0..4_000)
            .map(|_| {
                let z: f64 = StandardNormal.sample(&mut rng);
                100.0 + 15.0 * z
            })
            .collect();
        let fit = distribution_fit(&values).unwrap().unwrap();
        assert!(fit.jarque_bera_normal.p_value > 0.001);
        assert!(fit.kolmogorov_smirnov_normal.p_value > 0.001);
    }

    #[test]
    fn test_lognormal_sample_fails_normality_passes_lognormality() {
        let mut rng = SmallRng::seed_from_u64(12);
        let dist = LogNormal::new(12.0, 0.8).unwrap();
        let values: Vec<f64> = (0..4_000).map(|_| dist.sample(&mut rng)).collect();
        let fit = distribution_fit(&values).unwrap().unwrap();
        assert!(fit.jarque_bera_normal.significant);
        assert!(fit.kolmogorov_smirnov_normal.significant);
        assert!(fit.jarque_bera_lognormal.unwrap().p_value > 0.001);
        assert!(fit.kolmogorov_smirnov_lognormal.unwrap().p_value > 0.001);
    }

    #[test]
    fn test_small_or_constant_samples_are_skipped() {
        assert_eq!(distribution_fit(&[1.0, 2.0, 3.0]).unwrap(), None);
        assert_eq!(distribution_fit(&[5.0; 20]).unwrap(), None);
    }

    #[test]
    fn test_welch_detects_shift() {
        let a = BalanceMoments {
            n: 1_000,
            mean: 100.0,
            std_dev: 10.0,
            skewness: 0.0,
            excess_kurtosis: 0.0,
        };
        let b = BalanceMoments { mean: 103.0, ..a };
        let t = welch_t_test(&a, &b).unwrap();
        assert!(t.statistic > 6.0);
        assert!(t.significant);
        assert!((cohens_d(&a, &b) - 0.3).abs() < 1e-12);

        let same = welch_t_test(&a, &a).unwrap();
        assert!(!same.significant);
    }

    #[test]
    fn test_welch_single_path_not_significant() {
        let one = BalanceMoments::of(&[250_000.0]);
        let many = BalanceMoments::of(&[100_000.0, 300_000.0, 500_000.0]);
        let t = welch_t_test(&one, &many).unwrap();
        assert_eq!(t.p_value, 1.0);
        assert!(!t.significant);
        assert_eq!(welch_t_test(&one, &one).unwrap().p_value, 1.0);
        assert_eq!(cohens_d(&one, &one), 0.0);
    }

    #[test]
    fn test_proportion_test() {
        let t = two_proportion_z_test(0.80, 10_000, 0.85, 10_000).unwrap();
        assert!(t.statistic > 0.0);
        assert!(t.significant);
        let t = two_proportion_z_test(1.0, 100, 1.0, 100).unwrap();
        assert_eq!(t.p_value, 1.0);
    }

    #[test]
    fn test_critical_value() {
        assert!((normal_critical(0.95).unwrap() - 1.959964).abs() < 1e-5);
        assert!(normal_critical(1.0).is_err());
    }
}
