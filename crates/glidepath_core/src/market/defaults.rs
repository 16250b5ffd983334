//! Built-in capital market assumptions
//!
//! Long-horizon annual estimates. Column and row order of the correlation
//! table follows `ASSETS`.

use crate::model::{AssetClassId, AssetSleeve};

use super::assumptions::{AssetSpec, AssumptionSet};
use super::inflation::InflationParameters;

pub const DEFAULT_ASSUMPTIONS_VERSION: &str = "builtin-2025.4";
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.02;

/// (id, display name, sleeve, expected return, volatility)
const ASSETS: [(AssetClassId, &str, AssetSleeve, f64, f64); 10] = [
    (AssetClassId::US_LARGE_CAP, "US Large Cap Equity", AssetSleeve::Equity, 0.100, 0.160),
    (AssetClassId::US_SMALL_CAP, "US Small Cap Equity", AssetSleeve::Equity, 0.110, 0.200),
    (
        AssetClassId::INTERNATIONAL_DEVELOPED,
        "International Developed Equity",
        AssetSleeve::Equity,
        0.085,
        0.170,
    ),
    (AssetClassId::EMERGING_MARKETS, "Emerging Markets Equity", AssetSleeve::Equity, 0.095, 0.230),
    (AssetClassId::US_TREASURY_BONDS, "US Treasury Bonds", AssetSleeve::FixedIncome, 0.045, 0.060),
    (AssetClassId::CORPORATE_BONDS, "Investment Grade Corporate Bonds", AssetSleeve::FixedIncome, 0.055, 0.080),
    (AssetClassId::TIPS, "Treasury Inflation-Protected Securities", AssetSleeve::FixedIncome, 0.040, 0.055),
    (AssetClassId::REITS, "Real Estate Investment Trusts", AssetSleeve::RealAsset, 0.080, 0.190),
    (AssetClassId::COMMODITIES, "Broad Commodities", AssetSleeve::RealAsset, 0.050, 0.180),
    (AssetClassId::CASH, "Cash Equivalents", AssetSleeve::Cash, 0.030, 0.010),
];

#[rustfmt::skip]
const CORRELATIONS: [[f64; 10]; 10] = [
    //  USLC   USSC   INTL    EM    UST   CORP   TIPS   REIT   COMM   CASH
    [ 1.00,  0.85,  0.80,  0.70, -0.10,  0.25,  0.05,  0.65,  0.30,  0.00],
    [ 0.85,  1.00,  0.75,  0.70, -0.15,  0.20,  0.00,  0.70,  0.30,  0.00],
    [ 0.80,  0.75,  1.00,  0.80, -0.05,  0.30,  0.10,  0.60,  0.40,  0.00],
    [ 0.70,  0.70,  0.80,  1.00, -0.05,  0.30,  0.10,  0.55,  0.45,  0.00],
    [-0.10, -0.15, -0.05, -0.05,  1.00,  0.70,  0.75,  0.10, -0.10,  0.20],
    [ 0.25,  0.20,  0.30,  0.30,  0.70,  1.00,  0.60,  0.35,  0.10,  0.10],
    [ 0.05,  0.00,  0.10,  0.10,  0.75,  0.60,  1.00,  0.20,  0.30,  0.15],
    [ 0.65,  0.70,  0.60,  0.55,  0.10,  0.35,  0.20,  1.00,  0.25,  0.00],
    [ 0.30,  0.30,  0.40,  0.45, -0.10,  0.10,  0.30,  0.25,  1.00,  0.05],
    [ 0.00,  0.00,  0.00,  0.00,  0.20,  0.10,  0.15,  0.00,  0.05,  1.00],
];

/// The built-in assumption set as external data would supply it
#[must_use]
pub fn default_set() -> AssumptionSet {
    AssumptionSet {
        version: DEFAULT_ASSUMPTIONS_VERSION.to_string(),
        risk_free_rate: DEFAULT_RISK_FREE_RATE,
        assets: ASSETS
            .iter()
            .map(|(id, name, sleeve, expected_return, volatility)| AssetSpec {
                id: id.clone(),
                name: (*name).to_string(),
                sleeve: *sleeve,
                expected_return: *expected_return,
                volatility: *volatility,
            })
            .collect(),
        correlations: CORRELATIONS.iter().map(|row| row.to_vec()).collect(),
        inflation: InflationParameters::default(),
    }
}
