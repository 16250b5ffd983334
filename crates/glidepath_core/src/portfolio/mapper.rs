use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{AllocationViolation, Severity, ValidationError};
use crate::market::CapitalMarketAssumptions;
use crate::model::{AssetClassId, AssetSleeve, PortfolioAllocation};

use super::models::RiskTier;

/// Single-asset weight above which an allocation is flagged
pub const CONCENTRATION_LIMIT: f64 = 0.70;

/// Cap on the age-based defensive target
pub const MAX_AGE_DEFENSIVE: f64 = 0.60;

/// Fraction of the gap to the age target closed by the age adjustment.
///
/// The defensive sleeve moves halfway from its current weight toward
/// `min(age / 100, MAX_AGE_DEFENSIVE)`, not all the way: a 60-year-old in a
/// 30% defensive portfolio ends at 45%, not 60%.
const AGE_BLEND: f64 = 0.5;

/// Turns a risk tier, age or custom weights into a validated allocation
#[derive(Debug, Clone)]
pub struct PortfolioMapper {
    assumptions: Arc<CapitalMarketAssumptions>,
    concentration_limit: f64,
}

/// Result of moving weight between the growth and defensive sleeves
#[derive(Debug, Clone, PartialEq)]
pub struct SleeveShift {
    pub allocation: PortfolioAllocation,
    /// Growth-sleeve change actually applied after bounding
    pub applied: f64,
}

impl PortfolioMapper {
    #[must_use]
    pub fn new(assumptions: Arc<CapitalMarketAssumptions>) -> Self {
        Self {
            assumptions,
            concentration_limit: CONCENTRATION_LIMIT,
        }
    }

    #[must_use]
    pub fn with_concentration_limit(mut self, limit: f64) -> Self {
        self.concentration_limit = limit;
        self
    }

    #[must_use]
    pub fn assumptions(&self) -> &Arc<CapitalMarketAssumptions> {
        &self.assumptions
    }

    /// Sleeve of an asset; unknown assets count as growth
    /// Sleeve of `id`; unknown asset classes count as equity
    fn sleeve(&self, id: &AssetClassId) -> AssetSleeve {
        match self.assumptions.get_asset(id) {
            Ok(asset) => asset.sleeve,
            Err(err) => {
                tracing::warn!(error = %err, "unknown asset class, treating as equity");
                AssetSleeve::Equity
            }
        }
    }

    fn ensure_known(&self, allocation: PortfolioAllocation) -> Result<PortfolioAllocation, ValidationError> {
        let unknown = self.assumptions.unknown_assets(&allocation);
        if unknown.is_empty() {
            Ok(allocation)
        } else {
            Err(ValidationError::Allocation(
                unknown
                    .into_iter()
                    .map(|asset| AllocationViolation::UnknownAsset { asset })
                    .collect(),
            ))
        }
    }

    pub fn model_portfolio(&self, tier: RiskTier) -> Result<PortfolioAllocation, ValidationError> {
        let allocation = PortfolioAllocation::from_pairs(tier.model_weights().iter().cloned())?;
        self.ensure_known(allocation)
    }

    /// Model portfolio moved halfway toward a defensive weight of
    /// `min(age / 100, 0.60)`
    pub fn age_adjusted_portfolio(
        &self,
        tier: RiskTier,
        age: u32,
    ) -> Result<PortfolioAllocation, ValidationError> {
        let model = self.model_portfolio(tier)?;
        self.adjust_for_age(&model, age)
    }

    pub fn adjust_for_age(
        &self,
        allocation: &PortfolioAllocation,
        age: u32,
    ) -> Result<PortfolioAllocation, ValidationError> {
        let target = (f64::from(age) / 100.0).min(MAX_AGE_DEFENSIVE);
        let current = self.defensive_weight(allocation);
        let blended = current + AGE_BLEND * (target - current);
        tracing::debug!(age, current, target, blended, "age-adjusting defensive sleeve");
        self.with_defensive_weight(allocation, blended)
    }

    /// Combined weight of the fixed income and cash sleeves
    #[must_use]
    pub fn defensive_weight(&self, allocation: &PortfolioAllocation) -> f64 {
        allocation
            .iter()
            .filter(|(id, _)| self.sleeve(id).is_defensive())
            .map(|(_, w)| w)
            .sum()
    }

    #[must_use]
    pub fn growth_weight(&self, allocation: &PortfolioAllocation) -> f64 {
        1.0 - self.defensive_weight(allocation)
    }

    /// Rescale the sleeves so the defensive sleeve holds `target`, keeping the
    /// relative weights inside each sleeve.
    ///
    /// An empty sleeve that must receive weight is seeded with a broad asset
    /// class (Treasuries for defensive, US large cap for growth).
    pub fn with_defensive_weight(
        &self,
        allocation: &PortfolioAllocation,
        target: f64,
    ) -> Result<PortfolioAllocation, ValidationError> {
        let target = target.clamp(0.0, 1.0);
        let defensive = self.defensive_weight(allocation);
        let growth = 1.0 - defensive;

        let mut weights: BTreeMap<AssetClassId, f64> = BTreeMap::new();
        for (id, w) in allocation.iter() {
            let scaled = if self.sleeve(id).is_defensive() {
                if defensive > 0.0 { w * target / defensive } else { 0.0 }
            } else if growth > 0.0 {
                w * (1.0 - target) / growth
            } else {
                0.0
            };
            weights.insert(id.clone(), scaled);
        }
        if defensive <= 0.0 && target > 0.0 {
            *weights.entry(AssetClassId::US_TREASURY_BONDS).or_insert(0.0) += target;
        }
        if growth <= 0.0 && target < 1.0 {
            *weights.entry(AssetClassId::US_LARGE_CAP).or_insert(0.0) += 1.0 - target;
        }

        self.ensure_known(PortfolioAllocation::new(weights)?)
    }

    /// Move `growth_shift` of total weight into the growth sleeve (negative
    /// moves it out), bounded by the weight available in the source sleeve.
    pub fn shift_growth(
        &self,
        allocation: &PortfolioAllocation,
        growth_shift: f64,
    ) -> Result<SleeveShift, ValidationError> {
        let defensive = self.defensive_weight(allocation);
        let growth = 1.0 - defensive;
        let applied = if growth_shift >= 0.0 {
            growth_shift.min(defensive)
        } else {
            growth_shift.max(-growth)
        };
        if applied == 0.0 {
            return Ok(SleeveShift {
                allocation: allocation.clone(),
                applied,
            });
        }
        let allocation = self.with_defensive_weight(allocation, defensive - applied)?;
        Ok(SleeveShift {
            allocation,
            applied,
        })
    }

    /// Check an allocation against the active assumptions.
    ///
    /// `Ok` carries soft warnings (concentration); `Err` carries every
    /// violation, hard and soft, when at least one hard rule fails.
    pub fn validate(
        &self,
        allocation: &PortfolioAllocation,
    ) -> Result<Vec<AllocationViolation>, Vec<AllocationViolation>> {
        self.validate_weights(allocation.weights())
    }

    /// Same checks as [`validate`](Self::validate) on raw caller-supplied weights
    pub fn validate_weights(
        &self,
        weights: &BTreeMap<AssetClassId, f64>,
    ) -> Result<Vec<AllocationViolation>, Vec<AllocationViolation>> {
        let mut violations = PortfolioAllocation::structural_violations(weights);
        for (asset, &weight) in weights {
            if !self.assumptions.contains(asset) {
                violations.push(AllocationViolation::UnknownAsset {
                    asset: asset.clone(),
                });
            }
            if weight > self.concentration_limit {
                violations.push(AllocationViolation::Concentration {
                    asset: asset.clone(),
                    weight,
                    limit: self.concentration_limit,
                });
            }
        }

        if violations.iter().any(|v| v.severity() == Severity::Error) {
            Err(violations)
        } else {
            for warning in &violations {
                tracing::warn!(%warning, "allocation warning");
            }
            Ok(violations)
        }
    }

    /// Build a validated allocation from caller-supplied weights, returning
    /// any soft warnings alongside it
    pub fn custom_allocation(
        &self,
        weights: BTreeMap<AssetClassId, f64>,
    ) -> Result<(PortfolioAllocation, Vec<AllocationViolation>), ValidationError> {
        let warnings = self
            .validate_weights(&weights)
            .map_err(ValidationError::Allocation)?;
        Ok((PortfolioAllocation::new(weights)?, warnings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper() -> PortfolioMapper {
        PortfolioMapper::new(Arc::new(CapitalMarketAssumptions::default_assumptions()))
    }

    #[test]
    fn test_every_tier_is_valid() {
        let m = mapper();
        let mut last_growth = 0.0;
        for tier in RiskTier::ALL {
            let alloc = m.model_portfolio(tier).unwrap();
            assert_eq!(m.validate(&alloc), Ok(vec![]));
            let growth = m.growth_weight(&alloc);
            assert!(growth > last_growth, "{tier} is not more aggressive");
            last_growth = growth;
        }
    }

    #[test]
    fn test_age_adjustment_moves_toward_target() {
        let m = mapper();
        let model = m.model_portfolio(RiskTier::Aggressive).unwrap();
        let before = m.defensive_weight(&model);

        let adjusted = m.age_adjusted_portfolio(RiskTier::Aggressive, 60).unwrap();
        let after = m.defensive_weight(&adjusted);
        assert!((after - (before + 0.5 * (0.60 - before))).abs() < 1e-9);

        let sum: f64 = adjusted.weights().values().sum();
        assert!((sum - 1.0).abs() < 1e-12);

        // relative weights inside the growth sleeve are preserved
        let ratio_before = model.weight(&AssetClassId::US_LARGE_CAP)
            / model.weight(&AssetClassId::US_SMALL_CAP);
        let ratio_after = adjusted.weight(&AssetClassId::US_LARGE_CAP)
            / adjusted.weight(&AssetClassId::US_SMALL_CAP);
        assert!((ratio_before - ratio_after).abs() < 1e-9);
    }

    #[test]
    fn test_age_target_is_capped() {
        let m = mapper();
        let adjusted = m.age_adjusted_portfolio(RiskTier::Conservative, 95).unwrap();
        // conservative holds 0.80 defensive, blended halfway toward the 0.60 cap
        assert!((m.defensive_weight(&adjusted) - 0.70).abs() < 1e-9);
    }

    #[test]
    fn test_shift_is_bounded_by_source_sleeve() {
        let m = mapper();
        let alloc = m.model_portfolio(RiskTier::Aggressive).unwrap();
        let shift = m.shift_growth(&alloc, 0.50).unwrap();
        assert!((shift.applied - 0.07).abs() < 1e-9);
        assert!(m.defensive_weight(&shift.allocation).abs() < 1e-12);
        assert!(shift.allocation.iter().all(|(_, w)| (0.0..=1.0).contains(&w)));
    }

    #[test]
    fn test_shift_into_empty_sleeve() {
        let m = mapper();
        let all_equity =
            PortfolioAllocation::from_pairs([(AssetClassId::US_LARGE_CAP, 1.0)]).unwrap();
        let shift = m.shift_growth(&all_equity, -0.2).unwrap();
        assert!((shift.allocation.weight(&AssetClassId::US_TREASURY_BONDS) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_concentration_is_a_warning() {
        let m = mapper();
        let alloc = PortfolioAllocation::from_pairs([
            (AssetClassId::US_LARGE_CAP, 0.8),
            (AssetClassId::CASH, 0.2),
        ])
        .unwrap();
        let warnings = m.validate(&alloc).unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].severity(), Severity::Warning);
    }

    #[test]
    fn test_unknown_asset_rejected() {
        let m = mapper();
        let mut weights = BTreeMap::new();
        weights.insert(AssetClassId::new("BEANIE_BABIES"), 0.5);
        weights.insert(AssetClassId::US_LARGE_CAP, 0.5);
        let err = m.custom_allocation(weights).unwrap_err();
        let ValidationError::Allocation(violations) = err else {
            panic!("expected allocation error");
        };
        assert!(
            violations
                .iter()
                .any(|v| matches!(v, AllocationViolation::UnknownAsset { .. }))
        );
    }

    #[test]
    fn test_unknown_asset_counts_as_growth() {
        let m = mapper();
        let alloc = PortfolioAllocation::from_pairs([
            (AssetClassId::new("BEANIE_BABIES"), 0.6),
            (AssetClassId::US_TREASURY_BONDS, 0.4),
        ])
        .unwrap();
        assert!((m.defensive_weight(&alloc) - 0.4).abs() < 1e-12);
        assert!((m.growth_weight(&alloc) - 0.6).abs() < 1e-12);
        assert!(m.with_defensive_weight(&alloc, 0.5).is_err());
    }
}
