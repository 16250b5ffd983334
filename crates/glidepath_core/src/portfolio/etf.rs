use serde::{Deserialize, Serialize};

use crate::model::{AssetClassId, PortfolioAllocation};

/// A fund that can implement one asset-class weight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EtfCandidate {
    pub asset_class: AssetClassId,
    pub ticker: String,
    pub name: String,
    pub expense_ratio: f64,
    pub weight: f64,
}

const ETF_TABLE: &[(AssetClassId, &str, &str, f64)] = &[
    (AssetClassId::US_LARGE_CAP, "VOO", "Vanguard S&P 500 ETF", 0.0003),
    (AssetClassId::US_SMALL_CAP, "VB", "Vanguard Small-Cap ETF", 0.0005),
    (AssetClassId::INTERNATIONAL_DEVELOPED, "VEA", "Vanguard FTSE Developed Markets ETF", 0.0005),
    (AssetClassId::EMERGING_MARKETS, "VWO", "Vanguard FTSE Emerging Markets ETF", 0.0008),
    (AssetClassId::US_TREASURY_BONDS, "GOVT", "iShares U.S. Treasury Bond ETF", 0.0005),
    (AssetClassId::CORPORATE_BONDS, "LQD", "iShares iBoxx $ Investment Grade Corporate Bond ETF", 0.0014),
    (AssetClassId::TIPS, "SCHP", "Schwab U.S. TIPS ETF", 0.0003),
    (AssetClassId::REITS, "VNQ", "Vanguard Real Estate ETF", 0.0013),
    (AssetClassId::COMMODITIES, "PDBC", "Invesco Optimum Yield Diversified Commodity Strategy ETF", 0.0059),
    (AssetClassId::CASH, "SGOV", "iShares 0-3 Month Treasury Bond ETF", 0.0009),
];

/// One candidate fund per allocated asset class, largest weight first.
///
/// Asset classes without a known fund are omitted.
#[must_use]
pub fn etf_recommendations(allocation: &PortfolioAllocation) -> Vec<EtfCandidate> {
    let mut out: Vec<EtfCandidate> = allocation
        .iter()
        .filter_map(|(id, weight)| {
            ETF_TABLE
                .iter()
                .find(|(asset, ..)| asset == id)
                .map(|(asset, ticker, name, expense_ratio)| EtfCandidate {
                    asset_class: asset.clone(),
                    ticker: (*ticker).to_string(),
                    name: (*name).to_string(),
                    expense_ratio: *expense_ratio,
                    weight,
                })
        })
        .collect();
    out.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    out
}

/// Weighted expense ratio of a set of candidates
#[must_use]
pub fn blended_expense_ratio(candidates: &[EtfCandidate]) -> f64 {
    let total: f64 = candidates.iter().map(|c| c.weight).sum();
    if total <= 0.0 {
        return 0.0;
    }
    candidates
        .iter()
        .map(|c| c.weight * c.expense_ratio)
        .sum::<f64>()
        / total
}
