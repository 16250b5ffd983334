//! Results calculator
//!
//! [`analyze`] is a pure function over one run's [`PathResults`]: it never
//! mutates its input and either returns every statistic or fails with the
//! metric that could not be derived.

mod compare;
mod inference;
mod stats;

use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::error::CalculationError;
use crate::model::PathResults;

pub use compare::{Comparison, compare};
pub use inference::{
    DistributionFit, MIN_FIT_SAMPLE, SIGNIFICANCE_LEVEL, TestResult, cohens_d, distribution_fit,
    jarque_bera, normal_critical, two_proportion_z_test, welch_t_test,
};
pub use stats::{BalanceMoments, SortedSample};

/// Ratio floor used when a balance implies a total loss, so log returns stay finite
const MIN_GROWTH_RATIO: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub p5: f64,
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
}

impl Percentiles {
    fn of(sample: &SortedSample) -> Self {
        Self {
            p5: sample.quantile(0.05),
            p10: sample.quantile(0.10),
            p25: sample.quantile(0.25),
            p50: sample.quantile(0.50),
            p75: sample.quantile(0.75),
            p90: sample.quantile(0.90),
            p95: sample.quantile(0.95),
        }
    }

    /// Ladder is non-decreasing
    #[must_use]
    pub fn is_ordered(&self) -> bool {
        let ladder = [
            self.p5, self.p10, self.p25, self.p50, self.p75, self.p90, self.p95,
        ];
        ladder.windows(2).all(|w| w[0] <= w[1])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub level: f64,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeMetrics {
    /// Fraction of paths ending the horizon with a positive balance
    pub success_probability: f64,
    pub success_interval: ConfidenceInterval,
    /// Percentiles of the retirement balance
    pub percentiles: Percentiles,
    pub mean_retirement_balance: f64,
    pub mean_interval: ConfidenceInterval,
    pub mean_final_balance: f64,
    pub median_final_balance: f64,
    pub target_value: Option<f64>,
    /// Fraction of paths retiring below the target
    pub shortfall_probability: Option<f64>,
    /// Mean gap below the target over the paths that fall short
    pub expected_shortfall: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    /// Loss of cumulative accumulation return not exceeded with 95% probability
    pub var_95: f64,
    pub var_99: f64,
    /// Mean loss beyond `var_95`
    pub cvar_95: f64,
    /// Standard deviation of annualized log returns across paths
    pub volatility: f64,
    pub downside_deviation: f64,
    pub sortino_ratio: f64,
    /// Mean and worst peak-to-trough decline over the sampled paths'
    /// accumulation phase; absent without sampled paths
    pub mean_max_drawdown: Option<f64>,
    pub worst_max_drawdown: Option<f64>,
    pub skewness: f64,
    pub excess_kurtosis: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnMetrics {
    /// Geometric mean annual return implied by the mean log return
    pub annualized_return: f64,
    pub annualized_return_percentiles: Percentiles,
    pub sharpe_ratio: f64,
    /// Annualized return net of the assumed long-term inflation
    pub real_return: f64,
    pub risk_free_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalRateOutcome {
    pub rate: f64,
    pub success_probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalMetrics {
    pub withdrawal_rate: f64,
    pub by_rate: Vec<WithdrawalRateOutcome>,
    /// Highest candidate rate clearing the success threshold
    pub optimal_rate: Option<f64>,
    pub success_threshold: f64,
    /// Rate sustained by exactly `success_threshold` of the paths
    pub threshold_sustainable_rate: f64,
    pub depletion_probability: f64,
    /// Median retirement month of depletion, over depleted paths
    pub median_depletion_month: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GoalOutcome {
    pub threshold: f64,
    /// Probability the retirement balance reaches the threshold
    pub probability: f64,
    /// Years from the start until the median path reaches the threshold,
    /// extrapolated at the configured growth rate
    pub years_to_threshold: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalMetrics {
    pub goal_growth_rate: f64,
    pub thresholds: Vec<GoalOutcome>,
    pub target: Option<GoalOutcome>,
}

/// Every statistic derived from one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComprehensiveResults {
    pub n_paths: usize,
    pub outcome: OutcomeMetrics,
    pub risk: RiskMetrics,
    pub returns: ReturnMetrics,
    pub withdrawal: WithdrawalMetrics,
    pub goals: GoalMetrics,
    /// Moments of the retirement balance, kept for comparisons
    pub retirement_moments: BalanceMoments,
    /// Diagnostic only; absent for small or degenerate samples
    pub distribution_fit: Option<DistributionFit>,
}

impl ComprehensiveResults {
    #[must_use]
    pub fn success_probability(&self) -> f64 {
        self.outcome.success_probability
    }

    #[must_use]
    pub fn median_retirement_balance(&self) -> f64 {
        self.outcome.percentiles.p50
    }
}

/// Derive every statistic from one run's output
pub fn analyze(
    results: &PathResults,
    target_value: Option<f64>,
    config: &AnalysisConfig,
) -> Result<ComprehensiveResults, CalculationError> {
    let n = results.n_paths();
    if n == 0 {
        return Err(CalculationError::new("outcome", "run produced no paths"));
    }
    if !results.is_consistent() {
        return Err(CalculationError::new(
            "outcome",
            "per-path arrays differ in length",
        ));
    }

    let retirement = SortedSample::new("retirement_balance", &results.retirement_balance)?;
    let finals = SortedSample::new("final_balance", &results.final_balance)?;
    let retirement_moments = BalanceMoments::of(&results.retirement_balance);

    let outcome = outcome_metrics(
        results,
        &retirement,
        &finals,
        &retirement_moments,
        target_value,
        config,
    )?;
    let log_returns = annual_log_returns(results);
    let risk = risk_metrics(results, &log_returns, &retirement_moments, config)?;
    let returns = return_metrics(results, &log_returns, config)?;
    let withdrawal = withdrawal_metrics(results, config)?;
    let goals = goal_metrics(results, &retirement, target_value, config);
    let distribution_fit = inference::distribution_fit(&results.retirement_balance)?;

    Ok(ComprehensiveResults {
        n_paths: n,
        outcome,
        risk,
        returns,
        withdrawal,
        goals,
        retirement_moments,
        distribution_fit,
    })
}

fn outcome_metrics(
    results: &PathResults,
    retirement: &SortedSample,
    finals: &SortedSample,
    moments: &BalanceMoments,
    target_value: Option<f64>,
    config: &AnalysisConfig,
) -> Result<OutcomeMetrics, CalculationError> {
    let n = retirement.len() as f64;
    let z = normal_critical(config.confidence_level)?;

    let success = finals.fraction_above(0.0);
    let success_half = z * (success * (1.0 - success) / n).sqrt();
    let mean_half = z * moments.std_dev / n.sqrt();

    let (shortfall_probability, expected_shortfall) = match target_value {
        Some(target) => {
            let gaps: Vec<f64> = results
                .retirement_balance
                .iter()
                .filter(|b| **b < target)
                .map(|b| target - b)
                .collect();
            let probability = gaps.len() as f64 / n;
            let mean_gap = if gaps.is_empty() {
                0.0
            } else {
                gaps.iter().sum::<f64>() / gaps.len() as f64
            };
            (Some(probability), Some(mean_gap))
        }
        None => (None, None),
    };

    Ok(OutcomeMetrics {
        success_probability: success,
        success_interval: ConfidenceInterval {
            level: config.confidence_level,
            lower: (success - success_half).max(0.0),
            upper: (success + success_half).min(1.0),
        },
        percentiles: Percentiles::of(retirement),
        mean_retirement_balance: moments.mean,
        mean_interval: ConfidenceInterval {
            level: config.confidence_level,
            lower: moments.mean - mean_half,
            upper: moments.mean + mean_half,
        },
        mean_final_balance: finals.values().iter().sum::<f64>() / n,
        median_final_balance: finals.quantile(0.5),
        target_value,
        shortfall_probability,
        expected_shortfall,
    })
}

/// Capital the accumulation return is measured against: the initial value,
/// or total contributions for a plan that starts from nothing
fn return_base(results: &PathResults) -> f64 {
    let summary = &results.summary;
    if summary.initial_value > 0.0 {
        summary.initial_value
    } else {
        summary.total_contributions
    }
}

/// Annualized log return of every path over the accumulation phase; zero
/// for every path when nothing was invested
fn annual_log_returns(results: &PathResults) -> Vec<f64> {
    let base = return_base(results);
    let years = f64::from(results.summary.years_accumulation);
    if base <= 0.0 || years <= 0.0 {
        return vec![0.0; results.retirement_balance.len()];
    }
    results
        .retirement_balance
        .iter()
        .map(|b| (b / base).max(MIN_GROWTH_RATIO).ln() / years)
        .collect()
}

fn risk_metrics(
    results: &PathResults,
    log_returns: &[f64],
    moments: &BalanceMoments,
    config: &AnalysisConfig,
) -> Result<RiskMetrics, CalculationError> {
    let base = return_base(results);
    let cumulative: Vec<f64> = results
        .retirement_balance
        .iter()
        .map(|b| if base > 0.0 { b / base - 1.0 } else { 0.0 })
        .collect();
    let cumulative = SortedSample::new("value_at_risk", &cumulative)?;

    let log_moments = BalanceMoments::of(log_returns);
    let rf = (1.0 + config.risk_free_rate).ln();
    let downside_deviation = (log_returns
        .iter()
        .map(|r| (r - rf).min(0.0).powi(2))
        .sum::<f64>()
        / log_returns.len() as f64)
        .sqrt();
    let sortino_ratio = if downside_deviation > 0.0 {
        (log_moments.mean - rf) / downside_deviation
    } else {
        0.0
    };

    let acc_months = results.summary.years_accumulation as usize * 12;
    let drawdowns: Vec<f64> = results
        .sampled_paths
        .iter()
        .map(|p| p.max_drawdown_until(acc_months))
        .collect();
    let (mean_max_drawdown, worst_max_drawdown) = if drawdowns.is_empty() {
        (None, None)
    } else {
        (
            Some(drawdowns.iter().sum::<f64>() / drawdowns.len() as f64),
            drawdowns.iter().copied().reduce(f64::max),
        )
    };

    Ok(RiskMetrics {
        var_95: (-cumulative.quantile(0.05)).max(0.0),
        var_99: (-cumulative.quantile(0.01)).max(0.0),
        cvar_95: (-cumulative.tail_mean(0.05)).max(0.0),
        volatility: log_moments.std_dev,
        downside_deviation,
        sortino_ratio,
        mean_max_drawdown,
        worst_max_drawdown,
        skewness: moments.skewness,
        excess_kurtosis: moments.excess_kurtosis,
    })
}

fn return_metrics(
    results: &PathResults,
    log_returns: &[f64],
    config: &AnalysisConfig,
) -> Result<ReturnMetrics, CalculationError> {
    let log_moments = BalanceMoments::of(log_returns);
    let annualized_return = log_moments.mean.exp() - 1.0;
    let simple: Vec<f64> = log_returns.iter().map(|r| r.exp() - 1.0).collect();
    let simple = SortedSample::new("annualized_return", &simple)?;

    let sharpe_ratio = if log_moments.std_dev > 0.0 {
        (annualized_return - config.risk_free_rate) / log_moments.std_dev
    } else {
        0.0
    };
    let inflation = results.summary.inflation_assumption;

    Ok(ReturnMetrics {
        annualized_return,
        annualized_return_percentiles: Percentiles::of(&simple),
        sharpe_ratio,
        real_return: (1.0 + annualized_return) / (1.0 + inflation) - 1.0,
        risk_free_rate: config.risk_free_rate,
    })
}

fn withdrawal_metrics(
    results: &PathResults,
    config: &AnalysisConfig,
) -> Result<WithdrawalMetrics, CalculationError> {
    let sustainable = SortedSample::new("withdrawal_rates", &results.sustainable_rate)?;
    let n = sustainable.len() as f64;

    let by_rate: Vec<WithdrawalRateOutcome> = config
        .candidate_withdrawal_rates
        .iter()
        .map(|&rate| WithdrawalRateOutcome {
            rate,
            success_probability: sustainable.fraction_above(rate),
        })
        .collect();
    let optimal_rate = by_rate
        .iter()
        .filter(|o| o.success_probability >= config.success_threshold)
        .map(|o| o.rate)
        .reduce(f64::max);

    let depleted: Vec<f64> = results
        .depletion_month
        .iter()
        .flatten()
        .map(|m| f64::from(*m))
        .collect();
    let depletion_probability = depleted.len() as f64 / n;
    let median_depletion_month = if depleted.is_empty() {
        None
    } else {
        Some(SortedSample::new("depletion", &depleted)?.quantile(0.5))
    };

    Ok(WithdrawalMetrics {
        withdrawal_rate: results.summary.withdrawal_rate,
        by_rate,
        optimal_rate,
        success_threshold: config.success_threshold,
        threshold_sustainable_rate: sustainable.quantile(1.0 - config.success_threshold),
        depletion_probability,
        median_depletion_month,
    })
}

fn goal_outcome(
    retirement: &SortedSample,
    threshold: f64,
    years_accumulation: f64,
    growth: f64,
) -> GoalOutcome {
    let median = retirement.quantile(0.5);
    let years_to_threshold = (median > 0.0).then(|| {
        let extra = (threshold / median).ln() / (1.0 + growth).ln();
        (years_accumulation + extra).max(0.0)
    });
    GoalOutcome {
        threshold,
        probability: retirement.fraction_at_least(threshold),
        years_to_threshold,
    }
}

fn goal_metrics(
    results: &PathResults,
    retirement: &SortedSample,
    target_value: Option<f64>,
    config: &AnalysisConfig,
) -> GoalMetrics {
    let years = f64::from(results.summary.years_accumulation);
    let growth = config.goal_growth_rate;
    GoalMetrics {
        goal_growth_rate: growth,
        thresholds: config
            .wealth_thresholds
            .iter()
            .map(|&t| goal_outcome(retirement, t, years, growth))
            .collect(),
        target: target_value
            .filter(|t| *t > 0.0)
            .map(|t| goal_outcome(retirement, t, years, growth)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BackendKind, RunSummary, SampledPath};

    fn summary() -> RunSummary {
        RunSummary {
            initial_value: 100_000.0,
            total_contributions: 0.0,
            years_accumulation: 10,
            years_retirement: 20,
            withdrawal_rate: 0.04,
            inflation_assumption: 0.025,
            portfolio_expected_return: 0.07,
            portfolio_volatility: 0.12,
            seed: 1,
            backend: BackendKind::Cpu,
            fallback_reason: None,
        }
    }

    fn results(retirement: Vec<f64>, finals: Vec<f64>, sustainable: Vec<f64>) -> PathResults {
        let depletion_month = finals
            .iter()
            .map(|f| (*f <= 0.0).then_some(120))
            .collect();
        PathResults {
            retirement_balance: retirement,
            final_balance: finals,
            depletion_month,
            sustainable_rate: sustainable,
            sampled_paths: vec![SampledPath {
                path_index: 0,
                monthly_balances: vec![100.0, 80.0, 120.0, 90.0],
            }],
            summary: summary(),
        }
    }

    fn fixture() -> PathResults {
        let retirement: Vec<f64> = (1..=100).map(|i| f64::from(i) * 10_000.0).collect();
        let finals: Vec<f64> = (1..=100)
            .map(|i| if i <= 20 { 0.0 } else { f64::from(i) * 1_000.0 })
            .collect();
        let sustainable: Vec<f64> = (1..=100).map(|i| 0.0199 + f64::from(i) * 0.0005).collect();
        results(retirement, finals, sustainable)
    }

    #[test]
    fn test_outcome_metrics() {
        let r = analyze(&fixture(), Some(500_000.0), &AnalysisConfig::default()).unwrap();
        assert_eq!(r.n_paths, 100);
        assert!((r.success_probability() - 0.80).abs() < 1e-12);
        assert!(r.outcome.percentiles.is_ordered());
        assert!((r.median_retirement_balance() - 505_000.0).abs() < 1e-6);
        // 49 paths below 500k with gaps 10k..490k
        assert!((r.outcome.shortfall_probability.unwrap() - 0.49).abs() < 1e-12);
        assert!((r.outcome.expected_shortfall.unwrap() - 250_000.0).abs() < 1e-6);
        let ci = r.outcome.success_interval;
        assert!(ci.lower < 0.80 && ci.upper > 0.80);
    }

    #[test]
    fn test_withdrawal_rates_from_sustainable_rates() {
        let r = analyze(&fixture(), None, &AnalysisConfig::default()).unwrap();
        let w = &r.withdrawal;
        // sustainable rates are 0.0204..=0.0699; 3% is sustained by paths 21..=100
        let at_3 = w.by_rate.iter().find(|o| o.rate == 0.03).unwrap();
        assert!((at_3.success_probability - 0.80).abs() < 1e-12);
        assert!(
            w.by_rate
                .windows(2)
                .all(|p| p[0].success_probability >= p[1].success_probability)
        );
        assert_eq!(w.optimal_rate, None);
        assert!((w.depletion_probability - 0.20).abs() < 1e-12);
        assert_eq!(w.median_depletion_month, Some(120.0));
    }

    #[test]
    fn test_goals_and_risk() {
        let r = analyze(&fixture(), None, &AnalysisConfig::default()).unwrap();
        let million = r
            .goals
            .thresholds
            .iter()
            .find(|g| g.threshold == 1_000_000.0)
            .unwrap();
        assert!((million.probability - 0.01).abs() < 1e-12);
        let years = million.years_to_threshold.unwrap();
        let expected = 10.0 + (1_000_000.0_f64 / 505_000.0).ln() / 1.05_f64.ln();
        assert!((years - expected).abs() < 1e-9);

        let half = r
            .goals
            .thresholds
            .iter()
            .find(|g| g.threshold == 500_000.0)
            .unwrap();
        assert!(half.years_to_threshold.unwrap() < 10.0);

        assert!(r.risk.var_99 >= r.risk.var_95);
        assert!(r.risk.cvar_95 >= r.risk.var_95);
        assert!((r.risk.worst_max_drawdown.unwrap() - 0.25).abs() < 1e-12);
        assert!(r.distribution_fit.is_some());
    }

    #[test]
    fn test_empty_run_is_calculation_error() {
        let err = analyze(
            &results(vec![], vec![], vec![]),
            None,
            &AnalysisConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err.metric, "outcome");
    }

    #[test]
    fn test_no_invested_capital_reports_zero_returns() {
        let mut r = results(vec![0.0; 10], vec![0.0; 10], vec![0.0; 10]);
        r.summary.initial_value = 0.0;
        r.summary.total_contributions = 0.0;
        let a = analyze(&r, Some(100_000.0), &AnalysisConfig::default()).unwrap();
        assert_eq!(a.success_probability(), 0.0);
        assert_eq!(a.returns.annualized_return, 0.0);
        assert_eq!(a.risk.var_95, 0.0);
        assert_eq!(a.risk.volatility, 0.0);
        assert!(a.returns.sharpe_ratio.is_finite());
        assert!(a.risk.sortino_ratio.is_finite());
        assert_eq!(a.goals.target.unwrap().years_to_threshold, None);
        assert!(a.distribution_fit.is_none());
    }

    #[test]
    fn test_non_finite_balance_names_metric() {
        let mut r = fixture();
        r.final_balance[3] = f64::NAN;
        let err = analyze(&r, None, &AnalysisConfig::default()).unwrap_err();
        assert_eq!(err.metric, "final_balance");
    }
}
