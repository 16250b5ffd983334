use serde::{Deserialize, Serialize};

use crate::error::CalculationError;

use super::ComprehensiveResults;
use super::inference::{TestResult, cohens_d, two_proportion_z_test, welch_t_test};

/// How an alternative run differs from a baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    /// Alternative minus baseline, in percentage points
    pub success_rate_delta: f64,
    pub success_test: TestResult,
    /// Welch test on mean retirement balance
    pub balance_test: TestResult,
    /// Cohen's d of the retirement balance
    pub effect_size: f64,
    pub median_improvement_pct: f64,
    pub mean_improvement_pct: f64,
    pub p10_improvement_pct: f64,
    /// Either test significant at the 5% level
    pub significant: bool,
}

fn improvement_pct(baseline: f64, alternative: f64) -> f64 {
    if baseline.abs() > f64::EPSILON {
        (alternative - baseline) / baseline.abs() * 100.0
    } else {
        0.0
    }
}

/// Compare two analyzed runs
pub fn compare(
    baseline: &ComprehensiveResults,
    alternative: &ComprehensiveResults,
) -> Result<Comparison, CalculationError> {
    let success_test = two_proportion_z_test(
        baseline.success_probability(),
        baseline.n_paths,
        alternative.success_probability(),
        alternative.n_paths,
    )?;
    let balance_test = welch_t_test(&baseline.retirement_moments, &alternative.retirement_moments)?;

    let (b, a) = (&baseline.outcome.percentiles, &alternative.outcome.percentiles);
    Ok(Comparison {
        success_rate_delta: (alternative.success_probability() - baseline.success_probability())
            * 100.0,
        success_test,
        balance_test,
        effect_size: cohens_d(&baseline.retirement_moments, &alternative.retirement_moments),
        median_improvement_pct: improvement_pct(b.p50, a.p50),
        mean_improvement_pct: improvement_pct(
            baseline.outcome.mean_retirement_balance,
            alternative.outcome.mean_retirement_balance,
        ),
        p10_improvement_pct: improvement_pct(b.p10, a.p10),
        significant: success_test.significant || balance_test.significant,
    })
}
