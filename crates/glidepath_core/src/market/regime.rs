use serde::{Deserialize, Serialize};

/// Off-diagonal correlations are clamped to this magnitude after scaling
pub const MAX_SCALED_CORRELATION: f64 = 0.99;

/// Market environment applied to a baseline set of assumptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketRegime {
    #[default]
    Normal,
    Bull,
    Bear,
    Crisis,
}

/// Scaling applied to expected returns, volatilities and off-diagonal correlations
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegimeMultipliers {
    pub returns: f64,
    pub volatility: f64,
    pub correlation: f64,
}

impl MarketRegime {
    pub const ALL: [MarketRegime; 4] = [
        MarketRegime::Normal,
        MarketRegime::Bull,
        MarketRegime::Bear,
        MarketRegime::Crisis,
    ];

    #[must_use]
    pub const fn multipliers(self) -> RegimeMultipliers {
        match self {
            MarketRegime::Normal => RegimeMultipliers {
                returns: 1.0,
                volatility: 1.0,
                correlation: 1.0,
            },
            MarketRegime::Bull => RegimeMultipliers {
                returns: 1.2,
                volatility: 0.85,
                correlation: 0.9,
            },
            MarketRegime::Bear => RegimeMultipliers {
                returns: 0.5,
                volatility: 1.3,
                correlation: 1.2,
            },
            MarketRegime::Crisis => RegimeMultipliers {
                returns: -0.5,
                volatility: 1.8,
                correlation: 1.5,
            },
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            MarketRegime::Normal => "normal",
            MarketRegime::Bull => "bull",
            MarketRegime::Bear => "bear",
            MarketRegime::Crisis => "crisis",
        }
    }
}

impl std::fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Scale an off-diagonal correlation, keeping it strictly inside (-1, 1)
#[inline]
#[must_use]
pub fn scale_correlation(rho: f64, multiplier: f64) -> f64 {
    (rho * multiplier).clamp(-MAX_SCALED_CORRELATION, MAX_SCALED_CORRELATION)
}
