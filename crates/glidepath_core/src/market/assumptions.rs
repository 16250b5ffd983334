use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{LookupError, MarketError, ValidationError};
use crate::model::{AssetClassId, AssetSleeve, PortfolioAllocation};

use super::defaults::{DEFAULT_RISK_FREE_RATE, default_set};
use super::inflation::{self, InflationParameters};
use super::linalg::{EIGENVALUE_FLOOR, repair_correlation};
use super::regime::{MarketRegime, scale_correlation};

const SYMMETRY_TOLERANCE: f64 = 1e-8;

fn default_risk_free_rate() -> f64 {
    DEFAULT_RISK_FREE_RATE
}

/// Return and risk estimate for one asset class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetClassAssumption {
    pub id: AssetClassId,
    pub name: String,
    pub sleeve: AssetSleeve,
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
}

/// One asset class as supplied by an external data source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetSpec {
    pub id: AssetClassId,
    pub name: String,
    pub sleeve: AssetSleeve,
    pub expected_return: f64,
    pub volatility: f64,
}

/// Serializable form of a complete assumption snapshot.
///
/// `correlations` is a dense row-major matrix in the order of `assets`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssumptionSet {
    pub version: String,
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,
    pub assets: Vec<AssetSpec>,
    pub correlations: Vec<Vec<f64>>,
    #[serde(default)]
    pub inflation: InflationParameters,
}

/// Expected return, volatility and Sharpe ratio of an allocation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioStats {
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
}

#[derive(Debug, Clone)]
struct MarketData {
    assets: Vec<AssetClassAssumption>,
    correlation: DMatrix<f64>,
}

/// Immutable snapshot of capital market assumptions.
///
/// Snapshots are shared read-only between concurrent runs; a regime shift
/// produces a new snapshot derived from the unshifted baseline.
#[derive(Debug, Clone)]
pub struct CapitalMarketAssumptions {
    version: String,
    regime: MarketRegime,
    risk_free_rate: f64,
    inflation: InflationParameters,
    index: Arc<FxHashMap<AssetClassId, usize>>,
    baseline: Arc<MarketData>,
    current: MarketData,
}

fn sharpe(expected_return: f64, volatility: f64, risk_free_rate: f64) -> f64 {
    if volatility > 0.0 {
        (expected_return - risk_free_rate) / volatility
    } else {
        0.0
    }
}

fn invalid(reason: String) -> MarketError {
    MarketError::Validation(ValidationError::Assumptions(reason))
}

impl Default for CapitalMarketAssumptions {
    fn default() -> Self {
        Self::default_assumptions()
    }
}

impl CapitalMarketAssumptions {
    /// The built-in snapshot
    #[must_use]
    pub fn default_assumptions() -> Self {
        let set = default_set();
        let n = set.assets.len();
        let correlation = DMatrix::from_fn(n, n, |i, j| set.correlations[i][j]);
        Self::assemble(set, correlation)
    }

    /// Validate an externally supplied set and build a snapshot from it.
    ///
    /// A correlation matrix that is not positive semi-definite is repaired
    /// and the repair is logged.
    pub fn from_set(set: AssumptionSet) -> Result<Self, MarketError> {
        let n = set.assets.len();
        if n == 0 {
            return Err(invalid("no asset classes".into()));
        }
        if !set.risk_free_rate.is_finite() {
            return Err(invalid("risk-free rate is not finite".into()));
        }
        set.inflation.validate()?;

        let mut seen = FxHashMap::default();
        for (i, asset) in set.assets.iter().enumerate() {
            if seen.insert(asset.id.clone(), i).is_some() {
                return Err(invalid(format!("duplicate asset class {}", asset.id)));
            }
            if !asset.expected_return.is_finite() || asset.expected_return <= -1.0 {
                return Err(invalid(format!(
                    "{} expected return {} out of range",
                    asset.id, asset.expected_return
                )));
            }
            if !asset.volatility.is_finite() || asset.volatility < 0.0 {
                return Err(invalid(format!(
                    "{} volatility {} out of range",
                    asset.id, asset.volatility
                )));
            }
        }

        if set.correlations.len() != n || set.correlations.iter().any(|row| row.len() != n) {
            return Err(invalid(format!(
                "correlation matrix must be {n}x{n} to match the asset list"
            )));
        }
        for i in 0..n {
            let diag = set.correlations[i][i];
            if (diag - 1.0).abs() > SYMMETRY_TOLERANCE {
                return Err(invalid(format!("correlation diagonal entry {i} is {diag}")));
            }
            for j in 0..n {
                let rho = set.correlations[i][j];
                if !rho.is_finite() || !(-1.0..=1.0).contains(&rho) {
                    return Err(invalid(format!("correlation ({i}, {j}) = {rho} outside [-1, 1]")));
                }
                if (rho - set.correlations[j][i]).abs() > SYMMETRY_TOLERANCE {
                    return Err(invalid(format!("correlation matrix not symmetric at ({i}, {j})")));
                }
            }
        }

        let raw = DMatrix::from_fn(n, n, |i, j| {
            if i == j {
                1.0
            } else {
                set.correlations[i][j]
            }
        });
        let repair = repair_correlation(&raw, EIGENVALUE_FLOOR)?;
        if repair.repaired {
            tracing::warn!(
                version = %set.version,
                min_eigenvalue = repair.original_min_eigenvalue,
                floor = EIGENVALUE_FLOOR,
                "correlation matrix not positive semi-definite, eigenvalues clipped"
            );
        }
        Ok(Self::assemble(set, repair.matrix))
    }

    fn assemble(set: AssumptionSet, correlation: DMatrix<f64>) -> Self {
        let risk_free_rate = set.risk_free_rate;
        let assets: Vec<AssetClassAssumption> = set
            .assets
            .into_iter()
            .map(|spec| AssetClassAssumption {
                sharpe_ratio: sharpe(spec.expected_return, spec.volatility, risk_free_rate),
                id: spec.id,
                name: spec.name,
                sleeve: spec.sleeve,
                expected_return: spec.expected_return,
                volatility: spec.volatility,
            })
            .collect();
        let index = assets
            .iter()
            .enumerate()
            .map(|(i, a)| (a.id.clone(), i))
            .collect();
        let data = MarketData {
            assets,
            correlation,
        };
        Self {
            version: set.version,
            regime: MarketRegime::Normal,
            risk_free_rate,
            inflation: set.inflation,
            index: Arc::new(index),
            baseline: Arc::new(data.clone()),
            current: data,
        }
    }

    /// Serializable form of this snapshot (regime applied)
    #[must_use]
    pub fn to_set(&self) -> AssumptionSet {
        let n = self.len();
        AssumptionSet {
            version: self.version.clone(),
            risk_free_rate: self.risk_free_rate,
            assets: self
                .current
                .assets
                .iter()
                .map(|a| AssetSpec {
                    id: a.id.clone(),
                    name: a.name.clone(),
                    sleeve: a.sleeve,
                    expected_return: a.expected_return,
                    volatility: a.volatility,
                })
                .collect(),
            correlations: (0..n)
                .map(|i| (0..n).map(|j| self.current.correlation[(i, j)]).collect())
                .collect(),
            inflation: self.inflation,
        }
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[must_use]
    pub fn regime(&self) -> MarketRegime {
        self.regime
    }

    #[must_use]
    pub fn risk_free_rate(&self) -> f64 {
        self.risk_free_rate
    }

    #[must_use]
    pub fn inflation(&self) -> &InflationParameters {
        &self.inflation
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.current.assets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current.assets.is_empty()
    }

    /// Asset classes in matrix order
    #[must_use]
    pub fn assets(&self) -> &[AssetClassAssumption] {
        &self.current.assets
    }

    pub fn asset_ids(&self) -> impl Iterator<Item = &AssetClassId> {
        self.current.assets.iter().map(|a| &a.id)
    }

    pub fn index_of(&self, id: &AssetClassId) -> Result<usize, LookupError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| LookupError::UnknownAsset(id.clone()))
    }

    pub fn get_asset(&self, id: &AssetClassId) -> Result<&AssetClassAssumption, LookupError> {
        self.index_of(id).map(|i| &self.current.assets[i])
    }

    #[must_use]
    pub fn contains(&self, id: &AssetClassId) -> bool {
        self.index.contains_key(id)
    }

    #[must_use]
    pub fn correlation_matrix(&self) -> &DMatrix<f64> {
        &self.current.correlation
    }

    pub fn correlation(&self, a: &AssetClassId, b: &AssetClassId) -> Result<f64, LookupError> {
        Ok(self.current.correlation[(self.index_of(a)?, self.index_of(b)?)])
    }

    /// Annual covariance matrix and the asset order of its rows
    #[must_use]
    pub fn covariance_matrix(&self) -> (DMatrix<f64>, Vec<AssetClassId>) {
        let vols = DVector::from_iterator(
            self.len(),
            self.current.assets.iter().map(|a| a.volatility),
        );
        let cov = self.current.correlation.component_mul(&(&vols * vols.transpose()));
        (cov, self.asset_ids().cloned().collect())
    }

    /// Sub-matrix of the correlation matrix restricted to `indices`, in that order
    #[must_use]
    pub fn correlation_subset(&self, indices: &[usize]) -> DMatrix<f64> {
        let k = indices.len();
        DMatrix::from_fn(k, k, |i, j| {
            self.current.correlation[(indices[i], indices[j])]
        })
    }

    /// Monthly inflation paths, one row per path
    #[must_use]
    pub fn simulate_inflation_path(&self, years: u32, n_paths: usize, seed: u64) -> Vec<Vec<f64>> {
        inflation::simulate_paths(&self.inflation, years, n_paths, seed)
    }

    /// Asset classes of `allocation` missing from this snapshot
    #[must_use]
    pub fn unknown_assets(&self, allocation: &PortfolioAllocation) -> Vec<AssetClassId> {
        allocation
            .assets()
            .filter(|id| !self.contains(id))
            .cloned()
            .collect()
    }

    pub fn portfolio_stats(
        &self,
        allocation: &PortfolioAllocation,
    ) -> Result<PortfolioStats, LookupError> {
        let mut picks = Vec::with_capacity(allocation.len());
        for (id, weight) in allocation.iter() {
            picks.push((self.index_of(id)?, weight));
        }

        let mut expected_return = 0.0;
        let mut variance = 0.0;
        for &(i, wi) in &picks {
            let ai = &self.current.assets[i];
            expected_return += wi * ai.expected_return;
            for &(j, wj) in &picks {
                let aj = &self.current.assets[j];
                variance +=
                    wi * wj * ai.volatility * aj.volatility * self.current.correlation[(i, j)];
            }
        }
        let volatility = variance.max(0.0).sqrt();
        Ok(PortfolioStats {
            expected_return,
            volatility,
            sharpe_ratio: sharpe(expected_return, volatility, self.risk_free_rate),
        })
    }

    /// Snapshot under `regime`, derived from the unshifted baseline.
    ///
    /// Returns and volatilities are scaled, off-diagonal correlations are
    /// scaled and clamped, and the result is repaired if needed.
    pub fn with_regime(&self, regime: MarketRegime) -> Result<Self, MarketError> {
        let m = regime.multipliers();
        let base = &self.baseline;
        let n = base.assets.len();

        let assets = base
            .assets
            .iter()
            .map(|a| {
                let expected_return = a.expected_return * m.returns;
                let volatility = a.volatility * m.volatility;
                AssetClassAssumption {
                    id: a.id.clone(),
                    name: a.name.clone(),
                    sleeve: a.sleeve,
                    expected_return,
                    volatility,
                    sharpe_ratio: sharpe(expected_return, volatility, self.risk_free_rate),
                }
            })
            .collect();

        let scaled = DMatrix::from_fn(n, n, |i, j| {
            if i == j {
                1.0
            } else {
                scale_correlation(base.correlation[(i, j)], m.correlation)
            }
        });
        let repair = repair_correlation(&scaled, EIGENVALUE_FLOOR)?;
        if repair.repaired {
            tracing::warn!(
                %regime,
                min_eigenvalue = repair.original_min_eigenvalue,
                "regime-scaled correlation matrix repaired"
            );
        }

        Ok(Self {
            version: self.version.clone(),
            regime,
            risk_free_rate: self.risk_free_rate,
            inflation: self.inflation,
            index: Arc::clone(&self.index),
            baseline: Arc::clone(&self.baseline),
            current: MarketData {
                assets,
                correlation: repair.matrix,
            },
        })
    }
}
