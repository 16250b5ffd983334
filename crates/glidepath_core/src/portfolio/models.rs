use serde::{Deserialize, Serialize};

use crate::model::AssetClassId;

/// Risk tolerance bucket, from most conservative to most aggressive
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Conservative,
    ModeratelyConservative,
    Moderate,
    ModeratelyAggressive,
    Aggressive,
}

impl RiskTier {
    pub const ALL: [RiskTier; 5] = [
        RiskTier::Conservative,
        RiskTier::ModeratelyConservative,
        RiskTier::Moderate,
        RiskTier::ModeratelyAggressive,
        RiskTier::Aggressive,
    ];

    /// Model portfolio weights for this tier
    #[must_use]
    pub fn model_weights(self) -> &'static [(AssetClassId, f64)] {
        match self {
            RiskTier::Conservative => CONSERVATIVE,
            RiskTier::ModeratelyConservative => MODERATELY_CONSERVATIVE,
            RiskTier::Moderate => MODERATE,
            RiskTier::ModeratelyAggressive => MODERATELY_AGGRESSIVE,
            RiskTier::Aggressive => AGGRESSIVE,
        }
    }
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RiskTier::Conservative => "conservative",
            RiskTier::ModeratelyConservative => "moderately conservative",
            RiskTier::Moderate => "moderate",
            RiskTier::ModeratelyAggressive => "moderately aggressive",
            RiskTier::Aggressive => "aggressive",
        };
        f.write_str(name)
    }
}

const CONSERVATIVE: &[(AssetClassId, f64)] = &[
    (AssetClassId::US_LARGE_CAP, 0.15),
    (AssetClassId::INTERNATIONAL_DEVELOPED, 0.05),
    (AssetClassId::US_TREASURY_BONDS, 0.35),
    (AssetClassId::CORPORATE_BONDS, 0.25),
    (AssetClassId::TIPS, 0.10),
    (AssetClassId::CASH, 0.10),
];

const MODERATELY_CONSERVATIVE: &[(AssetClassId, f64)] = &[
    (AssetClassId::US_LARGE_CAP, 0.25),
    (AssetClassId::US_SMALL_CAP, 0.05),
    (AssetClassId::INTERNATIONAL_DEVELOPED, 0.08),
    (AssetClassId::EMERGING_MARKETS, 0.02),
    (AssetClassId::US_TREASURY_BONDS, 0.25),
    (AssetClassId::CORPORATE_BONDS, 0.20),
    (AssetClassId::TIPS, 0.08),
    (AssetClassId::REITS, 0.03),
    (AssetClassId::CASH, 0.04),
];

const MODERATE: &[(AssetClassId, f64)] = &[
    (AssetClassId::US_LARGE_CAP, 0.35),
    (AssetClassId::US_SMALL_CAP, 0.07),
    (AssetClassId::INTERNATIONAL_DEVELOPED, 0.12),
    (AssetClassId::EMERGING_MARKETS, 0.04),
    (AssetClassId::US_TREASURY_BONDS, 0.15),
    (AssetClassId::CORPORATE_BONDS, 0.15),
    (AssetClassId::TIPS, 0.05),
    (AssetClassId::REITS, 0.05),
    (AssetClassId::COMMODITIES, 0.02),
];

const MODERATELY_AGGRESSIVE: &[(AssetClassId, f64)] = &[
    (AssetClassId::US_LARGE_CAP, 0.40),
    (AssetClassId::US_SMALL_CAP, 0.10),
    (AssetClassId::INTERNATIONAL_DEVELOPED, 0.15),
    (AssetClassId::EMERGING_MARKETS, 0.07),
    (AssetClassId::US_TREASURY_BONDS, 0.08),
    (AssetClassId::CORPORATE_BONDS, 0.10),
    (AssetClassId::TIPS, 0.02),
    (AssetClassId::REITS, 0.05),
    (AssetClassId::COMMODITIES, 0.03),
];

const AGGRESSIVE: &[(AssetClassId, f64)] = &[
    (AssetClassId::US_LARGE_CAP, 0.45),
    (AssetClassId::US_SMALL_CAP, 0.12),
    (AssetClassId::INTERNATIONAL_DEVELOPED, 0.18),
    (AssetClassId::EMERGING_MARKETS, 0.10),
    (AssetClassId::US_TREASURY_BONDS, 0.03),
    (AssetClassId::CORPORATE_BONDS, 0.04),
    (AssetClassId::REITS, 0.05),
    (AssetClassId::COMMODITIES, 0.03),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_tables_sum_to_one() {
        for tier in RiskTier::ALL {
            let sum: f64 = tier.model_weights().iter().map(|(_, w)| w).sum();
            assert!((sum - 1.0).abs() < 1e-9, "{tier} sums to {sum}");
        }
    }

    #[test]
    fn test_tier_serde_names() {
        let json = serde_json::to_string(&RiskTier::ModeratelyAggressive).unwrap();
        assert_eq!(json, "\"moderately_aggressive\"");
    }
}
