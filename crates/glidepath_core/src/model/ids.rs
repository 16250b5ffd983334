//! Stable identifiers for planning entities
//!
//! Asset classes are keyed by a stable upper-snake-case string (e.g.
//! `US_LARGE_CAP`) so that externally sourced assumption sets can introduce
//! keys beyond the built-in ones.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for an asset class within a set of assumptions
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetClassId(pub Cow<'static, str>);

impl AssetClassId {
    pub const US_LARGE_CAP: AssetClassId = AssetClassId::from_static("US_LARGE_CAP");
    pub const US_SMALL_CAP: AssetClassId = AssetClassId::from_static("US_SMALL_CAP");
    pub const INTERNATIONAL_DEVELOPED: AssetClassId =
        AssetClassId::from_static("INTERNATIONAL_DEVELOPED");
    pub const EMERGING_MARKETS: AssetClassId = AssetClassId::from_static("EMERGING_MARKETS");
    pub const US_TREASURY_BONDS: AssetClassId = AssetClassId::from_static("US_TREASURY_BONDS");
    pub const CORPORATE_BONDS: AssetClassId = AssetClassId::from_static("CORPORATE_BONDS");
    pub const TIPS: AssetClassId = AssetClassId::from_static("TIPS");
    pub const REITS: AssetClassId = AssetClassId::from_static("REITS");
    pub const COMMODITIES: AssetClassId = AssetClassId::from_static("COMMODITIES");
    pub const CASH: AssetClassId = AssetClassId::from_static("CASH");

    #[must_use]
    pub const fn from_static(key: &'static str) -> Self {
        AssetClassId(Cow::Borrowed(key))
    }

    pub fn new(key: impl Into<Cow<'static, str>>) -> Self {
        AssetClassId(key.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for AssetClassId {
    fn from(key: &'static str) -> Self {
        AssetClassId::from_static(key)
    }
}

impl From<String> for AssetClassId {
    fn from(key: String) -> Self {
        AssetClassId(Cow::Owned(key))
    }
}

/// Which sleeve of the portfolio an asset class belongs to.
///
/// The mapper and the trade-off shifts move weight between the growth
/// sleeves (equity, real assets) and the defensive sleeves (fixed income, cash).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetSleeve {
    Equity,
    FixedIncome,
    RealAsset,
    Cash,
}

impl AssetSleeve {
    #[must_use]
    pub fn is_defensive(self) -> bool {
        matches!(self, AssetSleeve::FixedIncome | AssetSleeve::Cash)
    }

    #[must_use]
    pub fn is_growth(self) -> bool {
        !self.is_defensive()
    }
}
