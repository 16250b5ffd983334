use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{AllocationViolation, ValidationError};
use crate::model::AssetClassId;

/// Relative tolerance on the weight sum before an allocation is rejected
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-3;

/// Target portfolio weights keyed by asset class.
///
/// Construction enforces non-negative weights that sum to one within
/// [`WEIGHT_SUM_TOLERANCE`]; accepted weights are renormalized to sum to
/// exactly one. Whether every asset exists in the active assumptions is
/// checked by the portfolio mapper and by the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioAllocation {
    weights: BTreeMap<AssetClassId, f64>,
}

impl PortfolioAllocation {
    pub fn new(weights: BTreeMap<AssetClassId, f64>) -> Result<Self, ValidationError> {
        let violations = Self::structural_violations(&weights);
        if !violations.is_empty() {
            return Err(ValidationError::Allocation(violations));
        }

        let sum: f64 = weights.values().sum();
        let weights = weights
            .into_iter()
            .filter(|(_, w)| *w > 0.0)
            .map(|(id, w)| (id, w / sum))
            .collect();
        Ok(Self { weights })
    }

    /// Build from `(asset, weight)` pairs; duplicate assets accumulate.
    pub fn from_pairs<I, A>(pairs: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (A, f64)>,
        A: Into<AssetClassId>,
    {
        let mut weights = BTreeMap::new();
        for (asset, weight) in pairs {
            *weights.entry(asset.into()).or_insert(0.0) += weight;
        }
        Self::new(weights)
    }

    /// Violations that make a weight map unusable regardless of assumptions
    pub(crate) fn structural_violations(
        weights: &BTreeMap<AssetClassId, f64>,
    ) -> Vec<AllocationViolation> {
        let mut violations = Vec::new();
        if weights.is_empty() {
            violations.push(AllocationViolation::Empty);
            return violations;
        }

        for (asset, &weight) in weights {
            if !weight.is_finite() {
                violations.push(AllocationViolation::NonFiniteWeight {
                    asset: asset.clone(),
                });
            } else if weight < 0.0 {
                violations.push(AllocationViolation::NegativeWeight {
                    asset: asset.clone(),
                    weight,
                });
            } else if weight > 1.0 + WEIGHT_SUM_TOLERANCE {
                violations.push(AllocationViolation::WeightAboveOne {
                    asset: asset.clone(),
                    weight,
                });
            }
        }

        let sum: f64 = weights.values().sum();
        if sum.is_finite() && (sum - 1.0).abs() >= WEIGHT_SUM_TOLERANCE {
            violations.push(AllocationViolation::SumMismatch { sum });
        }
        violations
    }

    #[must_use]
    pub fn weight(&self, asset: &AssetClassId) -> f64 {
        self.weights.get(asset).copied().unwrap_or(0.0)
    }

    #[must_use]
    pub fn weights(&self) -> &BTreeMap<AssetClassId, f64> {
        &self.weights
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AssetClassId, f64)> {
        self.weights.iter().map(|(id, w)| (id, *w))
    }

    pub fn assets(&self) -> impl Iterator<Item = &AssetClassId> {
        self.weights.keys()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Largest single-asset weight and its asset
    #[must_use]
    pub fn max_weight(&self) -> Option<(&AssetClassId, f64)> {
        self.weights
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(id, w)| (id, *w))
    }
}

impl<'de> Deserialize<'de> for PortfolioAllocation {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let weights = BTreeMap::<AssetClassId, f64>::deserialize(deserializer)?;
        PortfolioAllocation::new(weights).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&'static str, f64)]) -> Result<PortfolioAllocation, ValidationError> {
        PortfolioAllocation::from_pairs(items.iter().copied())
    }

    #[test]
    fn test_valid_allocation_sums_to_one() {
        let alloc = pairs(&[("US_LARGE_CAP", 0.7), ("CORPORATE_BONDS", 0.3)]).unwrap();
        let sum: f64 = alloc.weights().values().sum();
        assert!((sum - 1.0).abs() < 1e-12);
        assert!(alloc.iter().all(|(_, w)| (0.0..=1.0).contains(&w)));
    }

    #[test]
    fn test_sum_of_point_nine_rejected() {
        let err = pairs(&[("US_LARGE_CAP", 0.6), ("CORPORATE_BONDS", 0.3)]).unwrap_err();
        match err {
            ValidationError::Allocation(v) => {
                assert!(
                    v.iter()
                        .any(|x| matches!(x, AllocationViolation::SumMismatch { .. }))
                );
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_within_tolerance_is_renormalized() {
        let alloc = pairs(&[("US_LARGE_CAP", 0.6004), ("CORPORATE_BONDS", 0.4)]).unwrap();
        let sum: f64 = alloc.weights().values().sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_negative_weight_rejected() {
        let err = pairs(&[("US_LARGE_CAP", 1.2), ("CORPORATE_BONDS", -0.2)]).unwrap_err();
        let ValidationError::Allocation(v) = err else {
            panic!("expected allocation error");
        };
        assert!(
            v.iter()
                .any(|x| matches!(x, AllocationViolation::NegativeWeight { .. }))
        );
        assert!(
            v.iter()
                .any(|x| matches!(x, AllocationViolation::WeightAboveOne { .. }))
        );
    }

    #[test]
    fn test_empty_rejected() {
        let err = PortfolioAllocation::new(BTreeMap::new()).unwrap_err();
        assert_eq!(
            err,
            ValidationError::Allocation(vec![AllocationViolation::Empty])
        );
    }

    #[test]
    fn test_zero_weights_dropped() {
        let alloc = pairs(&[("US_LARGE_CAP", 1.0), ("CASH", 0.0)]).unwrap();
        assert_eq!(alloc.len(), 1);
        assert_eq!(alloc.weight(&AssetClassId::CASH), 0.0);
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: PortfolioAllocation =
            serde_json::from_str(r#"{"US_LARGE_CAP":0.5,"TIPS":0.5}"#).unwrap();
        assert_eq!(ok.weight(&AssetClassId::TIPS), 0.5);

        let bad = serde_json::from_str::<PortfolioAllocation>(r#"{"US_LARGE_CAP":0.5}"#);
        assert!(bad.is_err());
    }
}
