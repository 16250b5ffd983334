use thiserror::Error;

use crate::model::AssetClassId;

/// Errors related to resource lookups
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LookupError {
    #[error("unknown asset class {0}")]
    UnknownAsset(AssetClassId),
    #[error("unknown trade-off scenario {0:?}")]
    UnknownScenario(String),
}

/// A single constraint violated by a request, parameter set or allocation.
///
/// Validation errors are never retried; they carry the specific constraint
/// so the caller can correct the input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("parameter {name} = {value} violates {constraint}")]
    Parameter {
        name: &'static str,
        value: f64,
        constraint: &'static str,
    },
    #[error("invalid request field {field}: {reason}")]
    Request { field: &'static str, reason: String },
    #[error("invalid allocation: {}", format_violations(.0))]
    Allocation(Vec<AllocationViolation>),
    #[error("invalid assumptions: {0}")]
    Assumptions(String),
    #[error(transparent)]
    Lookup(#[from] LookupError),
}

fn format_violations(violations: &[AllocationViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// How strongly an allocation rule is enforced
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Severity {
    /// Reported but does not reject the allocation
    Warning,
    /// Rejects the allocation
    Error,
}

/// One allocation rule that failed
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum AllocationViolation {
    Empty,
    NegativeWeight { asset: AssetClassId, weight: f64 },
    WeightAboveOne { asset: AssetClassId, weight: f64 },
    NonFiniteWeight { asset: AssetClassId },
    SumMismatch { sum: f64 },
    UnknownAsset { asset: AssetClassId },
    Concentration { asset: AssetClassId, weight: f64, limit: f64 },
}

impl AllocationViolation {
    #[must_use]
    pub fn severity(&self) -> Severity {
        match self {
            AllocationViolation::Concentration { .. } => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

impl std::fmt::Display for AllocationViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AllocationViolation::Empty => write!(f, "allocation has no assets"),
            AllocationViolation::NegativeWeight { asset, weight } => {
                write!(f, "{asset} has negative weight {weight}")
            }
            AllocationViolation::WeightAboveOne { asset, weight } => {
                write!(f, "{asset} has weight {weight} above 1")
            }
            AllocationViolation::NonFiniteWeight { asset } => {
                write!(f, "{asset} has a non-finite weight")
            }
            AllocationViolation::SumMismatch { sum } => {
                write!(f, "weights sum to {sum:.6}, expected 1")
            }
            AllocationViolation::UnknownAsset { asset } => {
                write!(f, "{asset} is not in the active assumptions")
            }
            AllocationViolation::Concentration {
                asset,
                weight,
                limit,
            } => write!(
                f,
                "{asset} holds {:.1}% of the portfolio (limit {:.0}%)",
                weight * 100.0,
                limit * 100.0
            ),
        }
    }
}

/// Fatal numerical failures for a run
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NumericalError {
    #[error(
        "correlation repair left minimum eigenvalue {min_eigenvalue:e} below floor {floor:e}"
    )]
    RepairExhausted { min_eigenvalue: f64, floor: f64 },
    #[error("cholesky factorization failed for {context}")]
    Factorization { context: &'static str },
    #[error("matrix dimension mismatch: expected {expected}x{expected}, got {rows}x{cols}")]
    Dimension {
        expected: usize,
        rows: usize,
        cols: usize,
    },
    #[error("non-finite value in {context}")]
    NonFinite { context: &'static str },
}

/// Errors building or reshaping a capital-market-assumption snapshot
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarketError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Numerical(#[from] NumericalError),
}

impl From<LookupError> for MarketError {
    fn from(err: LookupError) -> Self {
        MarketError::Validation(ValidationError::Lookup(err))
    }
}

/// Failures of an execution backend.
///
/// Device-side variants are recovered locally by the fallback backend.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    #[error("compute device unavailable: {0}")]
    Unavailable(String),
    #[error("device memory exhausted: {required} bytes required, {available} available")]
    OutOfDeviceMemory { required: usize, available: usize },
    #[error("kernel compilation failed: {0}")]
    KernelCompile(String),
    #[error("kernel launch failed on stream {stream}: {reason}")]
    KernelLaunch { stream: usize, reason: String },
    #[error("worker pool error: {0}")]
    WorkerPool(String),
    #[error("simulation cancelled")]
    Cancelled,
    #[error("primary backend failed ({primary}) and fallback failed ({fallback})")]
    Exhausted {
        primary: Box<BackendError>,
        fallback: Box<BackendError>,
    },
}

impl BackendError {
    /// Whether the fallback backend should take over after this error
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, BackendError::Cancelled | BackendError::Exhausted { .. })
    }
}

/// Failure while deriving a statistic from engine output
#[derive(Debug, Clone, PartialEq, Error)]
#[error("failed to compute {metric}: {reason}")]
pub struct CalculationError {
    pub metric: &'static str,
    pub reason: String,
}

impl CalculationError {
    pub fn new(metric: &'static str, reason: impl Into<String>) -> Self {
        Self {
            metric,
            reason: reason.into(),
        }
    }
}

/// Errors surfaced by a simulation engine run
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Numerical(#[from] NumericalError),
    #[error("simulation cancelled")]
    Cancelled,
    #[error("all backends failed (primary: {primary}; fallback: {fallback})")]
    BackendsExhausted {
        primary: BackendError,
        fallback: BackendError,
    },
    #[error("backend failed: {0}")]
    Backend(BackendError),
}

impl From<LookupError> for EngineError {
    fn from(err: LookupError) -> Self {
        EngineError::Validation(ValidationError::Lookup(err))
    }
}

impl From<MarketError> for EngineError {
    fn from(err: MarketError) -> Self {
        match err {
            MarketError::Validation(e) => EngineError::Validation(e),
            MarketError::Numerical(e) => EngineError::Numerical(e),
        }
    }
}

impl From<BackendError> for EngineError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Cancelled => EngineError::Cancelled,
            BackendError::Exhausted { primary, fallback } => EngineError::BackendsExhausted {
                primary: *primary,
                fallback: *fallback,
            },
            other => EngineError::Backend(other),
        }
    }
}

/// Errors returned to the caller of the planner
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanningError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Numerical(#[from] NumericalError),
    #[error("simulation failed{}: {source}", context_suffix(.context))]
    Engine {
        context: Option<String>,
        #[source]
        source: EngineError,
    },
    #[error(transparent)]
    Calculation(#[from] CalculationError),
}

fn context_suffix(context: &Option<String>) -> String {
    context
        .as_ref()
        .map(|c| format!(" ({c})"))
        .unwrap_or_default()
}

impl PlanningError {
    /// Attach a reproduction context (component, parameters) to an engine failure
    pub fn engine(source: EngineError, context: impl Into<String>) -> Self {
        PlanningError::Engine {
            context: Some(context.into()),
            source,
        }
    }
}

impl From<EngineError> for PlanningError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Validation(e) => PlanningError::Validation(e),
            EngineError::Numerical(e) => PlanningError::Numerical(e),
            other => PlanningError::Engine {
                context: None,
                source: other,
            },
        }
    }
}

impl From<MarketError> for PlanningError {
    fn from(err: MarketError) -> Self {
        match err {
            MarketError::Validation(e) => PlanningError::Validation(e),
            MarketError::Numerical(e) => PlanningError::Numerical(e),
        }
    }
}

impl From<LookupError> for PlanningError {
    fn from(err: LookupError) -> Self {
        PlanningError::Validation(ValidationError::Lookup(err))
    }
}

pub type Result<T, E = PlanningError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_converts_cancel() {
        let err: EngineError = BackendError::Cancelled.into();
        assert_eq!(err, EngineError::Cancelled);

        let err: EngineError = BackendError::Unavailable("no device".into()).into();
        assert!(matches!(err, EngineError::Backend(_)));

        let err: EngineError = BackendError::Exhausted {
            primary: Box::new(BackendError::KernelCompile("too many assets".into())),
            fallback: Box::new(BackendError::WorkerPool("no threads".into())),
        }
        .into();
        assert!(matches!(err, EngineError::BackendsExhausted { .. }));
    }

    #[test]
    fn test_planning_error_unwraps_validation() {
        let engine = EngineError::Validation(ValidationError::Parameter {
            name: "n_paths",
            value: 0.0,
            constraint: "> 0",
        });
        let planning: PlanningError = engine.into();
        assert!(matches!(planning, PlanningError::Validation(_)));
        assert!(planning.to_string().contains("n_paths"));
    }

    #[test]
    fn test_allocation_violation_display_and_severity() {
        let v = AllocationViolation::Concentration {
            asset: AssetClassId::US_LARGE_CAP,
            weight: 0.8,
            limit: 0.7,
        };
        assert_eq!(v.severity(), Severity::Warning);
        assert!(v.to_string().contains("80.0%"));

        let err = ValidationError::Allocation(vec![
            AllocationViolation::SumMismatch { sum: 0.9 },
            AllocationViolation::Empty,
        ]);
        assert!(err.to_string().contains("0.900000"));
    }

    #[test]
    fn test_engine_context_suffix() {
        let err = PlanningError::engine(EngineError::Cancelled, "engine, n_paths=10");
        assert_eq!(
            err.to_string(),
            "simulation failed (engine, n_paths=10): simulation cancelled"
        );
    }
}
