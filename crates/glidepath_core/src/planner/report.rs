use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::analysis::ComprehensiveResults;
use crate::error::AllocationViolation;
use crate::market::{MarketRegime, PortfolioStats};
use crate::model::{PortfolioAllocation, RunSummary, SimulationParameters};
use crate::portfolio::EtfCandidate;
use crate::tradeoff::TradeOffReport;

/// Success probability below which a plan needs attention
pub const LOW_SUCCESS: f64 = 0.75;
/// Success probability below which a stressed plan is flagged
pub const STRESS_FLOOR: f64 = 0.50;
/// Trade-off scenarios surfaced as recommendations
pub const MAX_SCENARIO_RECOMMENDATIONS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    SuccessRate,
    Withdrawal,
    Allocation,
    Scenario,
    Stress,
    OnTrack,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: Priority,
    pub kind: RecommendationKind,
    pub title: String,
    pub detail: String,
    /// Trade-off scenario backing the recommendation
    #[serde(default)]
    pub scenario: Option<String>,
}

/// Plan outcome under a shifted market regime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressTestResult {
    pub regime: MarketRegime,
    pub success_probability: f64,
    pub median_retirement_balance: f64,
    /// Relative to the baseline, in percentage points
    pub success_rate_delta: f64,
}

/// The assembled planning report; plain data, safe to persist as-is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningReport {
    pub generated_at: Timestamp,
    pub assumptions_version: String,
    pub regime: MarketRegime,
    pub allocation: PortfolioAllocation,
    pub allocation_warnings: Vec<AllocationViolation>,
    pub portfolio: PortfolioStats,
    pub etf_recommendations: Vec<EtfCandidate>,
    pub blended_expense_ratio: f64,
    pub parameters: SimulationParameters,
    pub run: RunSummary,
    pub results: ComprehensiveResults,
    #[serde(default)]
    pub tradeoffs: Option<TradeOffReport>,
    #[serde(default)]
    pub stress_tests: Vec<StressTestResult>,
    pub recommendations: Vec<Recommendation>,
}

fn pct(x: f64) -> String {
    format!("{:.1}%", x * 100.0)
}

/// Rule-based guidance merged with the trade-off ranking, most urgent first
pub(crate) fn recommendations(
    results: &ComprehensiveResults,
    warnings: &[AllocationViolation],
    tradeoffs: Option<&TradeOffReport>,
    stress_tests: &[StressTestResult],
) -> Vec<Recommendation> {
    let mut out = Vec::new();
    let success = results.success_probability();
    let threshold = results.withdrawal.success_threshold;

    if success < threshold {
        out.push(Recommendation {
            priority: if success < LOW_SUCCESS {
                Priority::High
            } else {
                Priority::Medium
            },
            kind: RecommendationKind::SuccessRate,
            title: "Improve the probability of success".to_string(),
            detail: format!(
                "{} of simulated paths last through retirement; the target is {}",
                pct(success),
                pct(threshold)
            ),
            scenario: None,
        });
    }

    let rate = results.withdrawal.withdrawal_rate;
    match results.withdrawal.optimal_rate {
        Some(optimal) if rate > optimal => out.push(Recommendation {
            priority: Priority::Medium,
            kind: RecommendationKind::Withdrawal,
            title: "Lower the planned withdrawal rate".to_string(),
            detail: format!(
                "A {} initial withdrawal exceeds the {} rate that succeeds in {} of paths",
                pct(rate),
                pct(optimal),
                pct(threshold)
            ),
            scenario: None,
        }),
        None => out.push(Recommendation {
            priority: Priority::High,
            kind: RecommendationKind::Withdrawal,
            title: "No candidate withdrawal rate is sustainable".to_string(),
            detail: format!(
                "Even the lowest candidate rate succeeds in fewer than {} of paths",
                pct(threshold)
            ),
            scenario: None,
        }),
        Some(_) => {}
    }

    for warning in warnings {
        out.push(Recommendation {
            priority: Priority::Low,
            kind: RecommendationKind::Allocation,
            title: "Reduce allocation concentration".to_string(),
            detail: warning.to_string(),
            scenario: None,
        });
    }

    if let Some(report) = tradeoffs {
        for outcome in report
            .scenarios
            .iter()
            .filter(|o| o.net_benefit_score > 0.0)
            .take(MAX_SCENARIO_RECOMMENDATIONS)
        {
            out.push(Recommendation {
                priority: if outcome.rank == 1 {
                    Priority::Medium
                } else {
                    Priority::Low
                },
                kind: RecommendationKind::Scenario,
                title: outcome.description.clone(),
                detail: format!(
                    "Changes success probability by {:+.1} points and the median balance by {:+.1}%",
                    outcome.success_rate_delta, outcome.median_balance_delta_pct
                ),
                scenario: Some(outcome.name.clone()),
            });
        }
    }

    for stress in stress_tests
        .iter()
        .filter(|s| s.success_probability < STRESS_FLOOR)
    {
        out.push(Recommendation {
            priority: Priority::Medium,
            kind: RecommendationKind::Stress,
            title: format!("Vulnerable to a {} market", stress.regime),
            detail: format!(
                "Success probability falls to {} under {} assumptions",
                pct(stress.success_probability),
                stress.regime
            ),
            scenario: None,
        });
    }

    if out.is_empty() {
        out.push(Recommendation {
            priority: Priority::Low,
            kind: RecommendationKind::OnTrack,
            title: "Plan is on track".to_string(),
            detail: format!("{} of simulated paths last through retirement", pct(success)),
            scenario: None,
        });
    }

    out.sort_by_key(|r| r.priority);
    out
}
