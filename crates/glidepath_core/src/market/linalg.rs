//! Correlation repair and factorization
//!
//! Correlation matrices sourced from data or scaled by a regime shift are not
//! guaranteed to be positive semi-definite. Repair clips the spectrum at a
//! small positive floor and rescales back to a unit diagonal.

use nalgebra::{DMatrix, SymmetricEigen};

use crate::error::NumericalError;

/// Smallest eigenvalue a repaired correlation matrix may have
pub const EIGENVALUE_FLOOR: f64 = 1e-8;

const MAX_REPAIR_PASSES: usize = 8;

/// Outcome of a repair attempt
#[derive(Debug, Clone)]
pub struct Repair {
    pub matrix: DMatrix<f64>,
    /// Smallest eigenvalue before any clipping
    pub original_min_eigenvalue: f64,
    pub repaired: bool,
}

/// Check that `matrix` is square with side `expected`
pub fn check_square(matrix: &DMatrix<f64>, expected: usize) -> Result<(), NumericalError> {
    if matrix.nrows() != expected || matrix.ncols() != expected {
        return Err(NumericalError::Dimension {
            expected,
            rows: matrix.nrows(),
            cols: matrix.ncols(),
        });
    }
    Ok(())
}

#[must_use]
pub fn min_eigenvalue(matrix: &DMatrix<f64>) -> f64 {
    SymmetricEigen::new(matrix.clone()).eigenvalues.min()
}

fn symmetrize(matrix: &mut DMatrix<f64>) {
    let n = matrix.nrows();
    for i in 0..n {
        for j in (i + 1)..n {
            let avg = 0.5 * (matrix[(i, j)] + matrix[(j, i)]);
            matrix[(i, j)] = avg;
            matrix[(j, i)] = avg;
        }
    }
}

fn normalize_diagonal(matrix: &mut DMatrix<f64>) -> Result<(), NumericalError> {
    let n = matrix.nrows();
    let scale: Vec<f64> = (0..n).map(|i| matrix[(i, i)].sqrt()).collect();
    if scale.iter().any(|s| !s.is_finite() || *s <= 0.0) {
        return Err(NumericalError::NonFinite {
            context: "correlation diagonal",
        });
    }
    for i in 0..n {
        for j in 0..n {
            matrix[(i, j)] = if i == j {
                1.0
            } else {
                matrix[(i, j)] / (scale[i] * scale[j])
            };
        }
    }
    Ok(())
}

/// Repair a symmetric correlation matrix so that every eigenvalue is at least
/// `floor` and the diagonal is exactly one.
///
/// Each pass clips eigenvalues to twice the floor, reconstructs the matrix and
/// renormalizes its diagonal. A matrix already above the floor is returned
/// unchanged.
pub fn repair_correlation(matrix: &DMatrix<f64>, floor: f64) -> Result<Repair, NumericalError> {
    check_square(matrix, matrix.nrows())?;
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(NumericalError::NonFinite {
            context: "correlation matrix",
        });
    }

    let mut current = matrix.clone();
    symmetrize(&mut current);
    let original_min_eigenvalue = min_eigenvalue(&current);
    if original_min_eigenvalue >= floor {
        return Ok(Repair {
            matrix: current,
            original_min_eigenvalue,
            repaired: false,
        });
    }

    let target = 2.0 * floor;
    let mut min_eig = original_min_eigenvalue;
    for _ in 0..MAX_REPAIR_PASSES {
        let mut eigen = SymmetricEigen::new(current.clone());
        eigen.eigenvalues.iter_mut().for_each(|l| *l = l.max(target));
        current = eigen.recompose();
        symmetrize(&mut current);
        normalize_diagonal(&mut current)?;

        min_eig = min_eigenvalue(&current);
        if min_eig >= floor {
            return Ok(Repair {
                matrix: current,
                original_min_eigenvalue,
                repaired: true,
            });
        }
    }

    Err(NumericalError::RepairExhausted {
        min_eigenvalue: min_eig,
        floor,
    })
}

/// Lower Cholesky factor of a positive-definite matrix
pub fn cholesky_lower(
    matrix: &DMatrix<f64>,
    context: &'static str,
) -> Result<DMatrix<f64>, NumericalError> {
    matrix
        .clone()
        .cholesky()
        .map(|c| c.l())
        .ok_or(NumericalError::Factorization { context })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broken() -> DMatrix<f64> {
        DMatrix::from_row_slice(3, 3, &[1.0, 0.9, -0.9, 0.9, 1.0, 0.9, -0.9, 0.9, 1.0])
    }

    #[test]
    fn test_valid_matrix_untouched() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 0.3, 0.3, 1.0]);
        let repair = repair_correlation(&m, EIGENVALUE_FLOOR).unwrap();
        assert!(!repair.repaired);
        assert_eq!(repair.matrix, m);
    }

    #[test]
    fn test_broken_matrix_repaired() {
        let m = broken();
        assert!(min_eigenvalue(&m) < 0.0);

        let repair = repair_correlation(&m, EIGENVALUE_FLOOR).unwrap();
        assert!(repair.repaired);
        assert!(repair.original_min_eigenvalue < -0.7);
        for i in 0..3 {
            assert_eq!(repair.matrix[(i, i)], 1.0);
            for j in 0..3 {
                assert!(repair.matrix[(i, j)].abs() <= 1.0);
                assert_eq!(repair.matrix[(i, j)], repair.matrix[(j, i)]);
            }
        }
        assert!(min_eigenvalue(&repair.matrix) >= EIGENVALUE_FLOOR);
    }

    #[test]
    fn test_cholesky_reconstructs() {
        let m = DMatrix::from_row_slice(3, 3, &[1.0, 0.5, 0.2, 0.5, 1.0, 0.3, 0.2, 0.3, 1.0]);
        let l = cholesky_lower(&m, "test").unwrap();
        let back = &l * l.transpose();
        assert!((back - m).abs().max() < 1e-12);
        assert_eq!(l[(0, 1)], 0.0);
    }

    #[test]
    fn test_cholesky_rejects_indefinite() {
        let err = cholesky_lower(&broken(), "broken").unwrap_err();
        assert_eq!(err, NumericalError::Factorization { context: "broken" });
    }

    #[test]
    fn test_dimension_check() {
        let m = DMatrix::<f64>::zeros(2, 3);
        assert!(matches!(
            check_square(&m, 2),
            Err(NumericalError::Dimension { rows: 2, cols: 3, .. })
        ));
    }
}
