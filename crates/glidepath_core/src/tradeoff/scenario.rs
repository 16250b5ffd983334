use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{LookupError, ValidationError};
use crate::model::{
    MAX_CONTRIBUTION_GROWTH, MAX_WITHDRAWAL_RATE, MIN_CONTRIBUTION_GROWTH, MIN_WITHDRAWAL_RATE,
    PortfolioAllocation, SimulationParameters,
};
use crate::portfolio::PortfolioMapper;

/// One change to a baseline plan; each kind carries only what it needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParameterDelta {
    /// Save an extra fraction of income each year (of the current
    /// contribution when no income is known)
    SaveMore { income_fraction: f64 },
    /// Raise the yearly contribution growth rate
    ContributionGrowth { rate_delta: f64 },
    /// Retire later (positive) or earlier (negative) over a fixed horizon
    RetirementShift { years: i32 },
    /// Scale retirement spending, i.e. the withdrawal rate
    Spending { factor: f64 },
    /// Move weight into (positive) or out of the growth sleeve
    PortfolioShift { growth_delta: f64 },
}

/// Qualitative size of a scenario's expected effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactTag {
    Low,
    Moderate,
    High,
}

impl fmt::Display for ImpactTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ImpactTag::Low => "low",
            ImpactTag::Moderate => "moderate",
            ImpactTag::High => "high",
        })
    }
}

/// A named what-if: deltas applied together to a baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOffScenario {
    pub name: String,
    pub description: String,
    pub deltas: Vec<ParameterDelta>,
    pub expected_impact: ImpactTag,
    /// Implementation difficulty, 0 (trivial) to 10
    pub difficulty: u8,
}

/// Allocation and parameters a scenario is applied to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanBaseline {
    pub allocation: PortfolioAllocation,
    pub params: SimulationParameters,
    /// Gross annual income, zero when unknown
    pub annual_income: f64,
}

struct CatalogEntry {
    name: &'static str,
    description: &'static str,
    deltas: &'static [ParameterDelta],
    impact: ImpactTag,
    difficulty: u8,
}

const CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        name: "save_3pct_more",
        description: "Save an additional 3% of income every year",
        deltas: &[ParameterDelta::SaveMore {
            income_fraction: 0.03,
        }],
        impact: ImpactTag::High,
        difficulty: 4,
    },
    CatalogEntry {
        name: "grow_contributions_2pct",
        description: "Raise contributions 2% faster each year",
        deltas: &[ParameterDelta::ContributionGrowth { rate_delta: 0.02 }],
        impact: ImpactTag::Moderate,
        difficulty: 3,
    },
    CatalogEntry {
        name: "work_2_years_longer",
        description: "Work two more years before retiring",
        deltas: &[ParameterDelta::RetirementShift { years: 2 }],
        impact: ImpactTag::High,
        difficulty: 6,
    },
    CatalogEntry {
        name: "retire_2_years_earlier",
        description: "Retire two years earlier",
        deltas: &[ParameterDelta::RetirementShift { years: -2 }],
        impact: ImpactTag::High,
        difficulty: 1,
    },
    CatalogEntry {
        name: "spend_10pct_less",
        description: "Cut retirement spending by 10%",
        deltas: &[ParameterDelta::Spending { factor: 0.9 }],
        impact: ImpactTag::Moderate,
        difficulty: 5,
    },
    CatalogEntry {
        name: "more_aggressive",
        description: "Move 10 percentage points from bonds into equities",
        deltas: &[ParameterDelta::PortfolioShift { growth_delta: 0.10 }],
        impact: ImpactTag::Moderate,
        difficulty: 2,
    },
    CatalogEntry {
        name: "more_conservative",
        description: "Move 10 percentage points from equities into bonds",
        deltas: &[ParameterDelta::PortfolioShift {
            growth_delta: -0.10,
        }],
        impact: ImpactTag::Low,
        difficulty: 2,
    },
    CatalogEntry {
        name: "save_more_and_work_longer",
        description: "Save 3% more of income and work two more years",
        deltas: &[
            ParameterDelta::SaveMore {
                income_fraction: 0.03,
            },
            ParameterDelta::RetirementShift { years: 2 },
        ],
        impact: ImpactTag::High,
        difficulty: 8,
    },
];

impl CatalogEntry {
    fn scenario(&self) -> TradeOffScenario {
        TradeOffScenario {
            name: self.name.to_string(),
            description: self.description.to_string(),
            deltas: self.deltas.to_vec(),
            expected_impact: self.impact,
            difficulty: self.difficulty,
        }
    }
}

/// Every built-in scenario template
#[must_use]
pub fn catalog() -> Vec<TradeOffScenario> {
    CATALOG.iter().map(CatalogEntry::scenario).collect()
}

/// Built-in scenario by name
pub fn scenario(name: &str) -> Result<TradeOffScenario, LookupError> {
    CATALOG
        .iter()
        .find(|e| e.name == name)
        .map(CatalogEntry::scenario)
        .ok_or_else(|| LookupError::UnknownScenario(name.to_string()))
}

/// Implementation difficulty of a built-in scenario
pub fn difficulty(name: &str) -> Result<u8, LookupError> {
    CATALOG
        .iter()
        .find(|e| e.name == name)
        .map(|e| e.difficulty)
        .ok_or_else(|| LookupError::UnknownScenario(name.to_string()))
}

impl ParameterDelta {
    /// Apply to `plan` in place; results are clamped to the valid parameter ranges
    fn apply_to(&self, plan: &mut PlanBaseline, mapper: &PortfolioMapper) -> Result<(), ValidationError> {
        let params = &mut plan.params;
        match *self {
            ParameterDelta::SaveMore { income_fraction } => {
                let base = if plan.annual_income > 0.0 {
                    plan.annual_income
                } else {
                    params.annual_contribution
                };
                params.annual_contribution = (params.annual_contribution
                    + income_fraction * base)
                    .max(0.0);
            }
            ParameterDelta::ContributionGrowth { rate_delta } => {
                params.contribution_growth_rate = (params.contribution_growth_rate + rate_delta)
                    .clamp(MIN_CONTRIBUTION_GROWTH, MAX_CONTRIBUTION_GROWTH);
            }
            ParameterDelta::RetirementShift { years } => {
                let horizon = params.years_accumulation + params.years_retirement;
                if horizon < 2 {
                    return Err(ValidationError::Request {
                        field: "years_retirement",
                        reason: "horizon too short to shift retirement".to_string(),
                    });
                }
                let shifted = (i64::from(params.years_accumulation) + i64::from(years))
                    .clamp(1, i64::from(horizon) - 1);
                let shifted = u32::try_from(shifted).map_err(|_| ValidationError::Request {
                    field: "years_accumulation",
                    reason: format!("cannot shift retirement by {years} years"),
                })?;
                params.years_accumulation = shifted;
                params.years_retirement = horizon - shifted;
            }
            ParameterDelta::Spending { factor } => {
                params.withdrawal_rate =
                    (params.withdrawal_rate * factor).clamp(MIN_WITHDRAWAL_RATE, MAX_WITHDRAWAL_RATE);
            }
            ParameterDelta::PortfolioShift { growth_delta } => {
                plan.allocation = mapper.shift_growth(&plan.allocation, growth_delta)?.allocation;
            }
        }
        Ok(())
    }
}

impl TradeOffScenario {
    /// A new, independent plan with every delta applied; `baseline` is untouched
    pub fn apply(
        &self,
        baseline: &PlanBaseline,
        mapper: &PortfolioMapper,
    ) -> Result<PlanBaseline, ValidationError> {
        let mut plan = baseline.clone();
        for delta in &self.deltas {
            delta.apply_to(&mut plan, mapper)?;
        }
        Ok(plan)
    }
}
