//! Dense reference backend built on nalgebra's Cholesky.
//!
//! Expands the band to a full matrix, so factorization is O(n³). Used to
//! cross-check the native backend and as a fallback for tiny problems.

use nalgebra::{DMatrix, DVector};

use super::{BandedCholeskyBackend, LinAlgError, LinAlgResult, SymmetricBandMatrix};

#[derive(Debug, Clone)]
pub struct DenseCholesky {
    order: usize,
    superdiagonals: usize,
    /// Lower factor `L = Rᵀ`
    lower: Option<DMatrix<f64>>,
}

impl DenseCholesky {
    /// Dense upper factor `R` with `RᵀR = A`
    pub fn to_dense_upper(&self) -> Option<DMatrix<f64>> {
        self.lower.as_ref().map(|l| l.transpose())
    }
}

impl BandedCholeskyBackend for DenseCholesky {
    fn with_dimensions(order: usize, superdiagonals: usize) -> Self {
        Self {
            order,
            superdiagonals: superdiagonals.min(order.saturating_sub(1)),
            lower: None,
        }
    }

    fn factorize(&mut self, matrix: &SymmetricBandMatrix) -> LinAlgResult<()> {
        if matrix.order() != self.order || matrix.superdiagonals() != self.superdiagonals {
            return Err(LinAlgError::DimensionMismatch {
                expected: self.order,
                actual: matrix.order(),
            });
        }
        self.lower = None;
        let dense = matrix.to_dense();
        let cholesky = dense.clone().cholesky().ok_or_else(|| {
            // nalgebra does not report the failing column; find the first bad leading minor pivot
            let column = (0..self.order)
                .find(|&k| {
                    dense
                        .view((0, 0), (k + 1, k + 1))
                        .clone_owned()
                        .cholesky()
                        .is_none()
                })
                .unwrap_or(0);
            LinAlgError::NotPositiveDefinite {
                column,
                pivot: f64::NAN,
            }
        })?;
        self.lower = Some(cholesky.unpack());
        Ok(())
    }

    fn solve_triangular_in_place(&self, rhs: &mut [f64], transpose: bool) -> LinAlgResult<()> {
        let lower = self.lower.as_ref().ok_or(LinAlgError::NotFactorized)?;
        if rhs.len() != self.order {
            return Err(LinAlgError::DimensionMismatch {
                expected: self.order,
                actual: rhs.len(),
            });
        }
        let mut v = DVector::from_column_slice(rhs);
        // Rᵀ = L, R = Lᵀ
        let solved = if transpose {
            lower.solve_lower_triangular_mut(&mut v)
        } else {
            lower.tr_solve_lower_triangular_mut(&mut v)
        };
        if !solved {
            return Err(LinAlgError::NotPositiveDefinite {
                column: 0,
                pivot: 0.0,
            });
        }
        rhs.copy_from_slice(v.as_slice());
        Ok(())
    }

    fn is_factorized(&self) -> bool {
        self.lower.is_some()
    }

    fn order(&self) -> usize {
        self.order
    }

    fn name(&self) -> &'static str {
        "dense nalgebra Cholesky"
    }
}
