//! Engine output
//!
//! `PathResults` is owned by the run that produced it and is consumed
//! read-only by the results calculator. It is never persisted on its own.

use serde::{Deserialize, Serialize};

/// Which execution backend produced a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Cpu,
    Gpu,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Cpu => f.write_str("cpu"),
            BackendKind::Gpu => f.write_str("gpu"),
        }
    }
}

/// Full monthly balance trace for one diagnostic path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampledPath {
    pub path_index: usize,
    /// Balance at the end of every month, accumulation then retirement
    pub monthly_balances: Vec<f64>,
}

impl SampledPath {
    /// Largest peak-to-trough decline as a fraction of the peak
    #[must_use]
    pub fn max_drawdown(&self) -> f64 {
        max_drawdown(&self.monthly_balances)
    }

    /// Largest decline within the first `months` months
    #[must_use]
    pub fn max_drawdown_until(&self, months: usize) -> f64 {
        let end = months.min(self.monthly_balances.len());
        max_drawdown(&self.monthly_balances[..end])
    }
}

fn max_drawdown(balances: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for &value in balances {
        peak = peak.max(value);
        if peak > 0.0 {
            worst = worst.max((peak - value) / peak);
        }
    }
    worst
}

/// Inputs of a run that the results calculator needs to interpret balances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub initial_value: f64,
    pub total_contributions: f64,
    pub years_accumulation: u32,
    pub years_retirement: u32,
    pub withdrawal_rate: f64,
    /// Long-term inflation target of the assumptions used
    pub inflation_assumption: f64,
    pub portfolio_expected_return: f64,
    pub portfolio_volatility: f64,
    pub seed: u64,
    pub backend: BackendKind,
    /// Why the preferred backend was bypassed, when it was
    #[serde(default)]
    pub fallback_reason: Option<String>,
}

/// Per-path outcomes of one engine run; every vector has length `n_paths`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathResults {
    /// Balance at the accumulation/retirement boundary
    pub retirement_balance: Vec<f64>,
    /// Balance at horizon end, zero when depleted
    pub final_balance: Vec<f64>,
    /// Retirement month (1-based) in which the path was depleted
    pub depletion_month: Vec<Option<u32>>,
    /// Highest initial withdrawal rate the path's retirement sequence sustains
    pub sustainable_rate: Vec<f64>,
    /// Diagnostic subset of full monthly traces
    pub sampled_paths: Vec<SampledPath>,
    pub summary: RunSummary,
}

impl PathResults {
    #[must_use]
    pub fn n_paths(&self) -> usize {
        self.final_balance.len()
    }

    /// Fraction of paths finishing with a positive balance
    #[must_use]
    pub fn success_probability(&self) -> f64 {
        if self.final_balance.is_empty() {
            return 0.0;
        }
        let successes = self.final_balance.iter().filter(|b| **b > 0.0).count();
        successes as f64 / self.final_balance.len() as f64
    }

    /// Check that all per-path vectors agree in length
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let n = self.retirement_balance.len();
        self.final_balance.len() == n
            && self.depletion_month.len() == n
            && self.sustainable_rate.len() == n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_drawdown() {
        let path = SampledPath {
            path_index: 0,
            monthly_balances: vec![100.0, 120.0, 60.0, 90.0, 130.0, 117.0],
        };
        assert!((path.max_drawdown() - 0.5).abs() < 1e-12);
        assert!((path.max_drawdown_until(2) - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_max_drawdown_monotonic_path() {
        let path = SampledPath {
            path_index: 3,
            monthly_balances: vec![1.0, 2.0, 3.0],
        };
        assert_eq!(path.max_drawdown(), 0.0);
    }
}
