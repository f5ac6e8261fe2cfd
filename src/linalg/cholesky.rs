//! Native banded Cholesky factorization.
//!
//! Right-looking `UᵀU` factorization working directly on the packed upper
//! band storage. Factorization costs O(n·kd²), each triangular solve O(n·kd).

use nalgebra::DMatrix;

use super::{BandedCholeskyBackend, LinAlgError, LinAlgResult, SymmetricBandMatrix};

#[derive(Debug, Clone)]
pub struct BandCholesky {
    factor: SymmetricBandMatrix,
    factorized: bool,
}

impl BandCholesky {
    /// Packed upper factor, valid after a successful factorization
    pub fn packed_factor(&self) -> Option<&SymmetricBandMatrix> {
        self.factorized.then_some(&self.factor)
    }

    /// Dense upper triangular factor `R` with `RᵀR = A`
    pub fn to_dense_upper(&self) -> Option<DMatrix<f64>> {
        let factor = self.packed_factor()?;
        let n = factor.order();
        Some(DMatrix::from_fn(n, n, |i, j| {
            if i <= j { factor.get(i, j) } else { 0.0 }
        }))
    }
}

impl BandedCholeskyBackend for BandCholesky {
    fn with_dimensions(order: usize, superdiagonals: usize) -> Self {
        Self {
            factor: SymmetricBandMatrix::new(order, superdiagonals),
            factorized: false,
        }
    }

    fn factorize(&mut self, matrix: &SymmetricBandMatrix) -> LinAlgResult<()> {
        if matrix.order() != self.factor.order()
            || matrix.superdiagonals() != self.factor.superdiagonals()
        {
            return Err(LinAlgError::DimensionMismatch {
                expected: self.factor.as_slice().len(),
                actual: matrix.as_slice().len(),
            });
        }
        self.factorized = false;
        self.factor.as_mut_slice().copy_from_slice(matrix.as_slice());

        let n = self.factor.order();
        let kd = self.factor.superdiagonals();
        let f = &mut self.factor;

        for j in 0..n {
            let pivot = f.as_slice()[f.packed_index(j, j)];
            if !pivot.is_finite() || pivot <= 0.0 {
                return Err(LinAlgError::NotPositiveDefinite { column: j, pivot });
            }
            let diag = pivot.sqrt();
            let idx = f.packed_index(j, j);
            f.as_mut_slice()[idx] = diag;

            let kn = kd.min(n - 1 - j);
            for a in 1..=kn {
                let idx = f.packed_index(j, j + a);
                f.as_mut_slice()[idx] /= diag;
            }
            // Symmetric rank-one update of the trailing kn x kn window
            for a in 1..=kn {
                let ua = f.as_slice()[f.packed_index(j, j + a)];
                if ua == 0.0 {
                    continue;
                }
                for b in a..=kn {
                    let ub = f.as_slice()[f.packed_index(j, j + b)];
                    let idx = f.packed_index(j + a, j + b);
                    f.as_mut_slice()[idx] -= ua * ub;
                }
            }
        }

        self.factorized = true;
        Ok(())
    }

    fn solve_triangular_in_place(&self, rhs: &mut [f64], transpose: bool) -> LinAlgResult<()> {
        if !self.factorized {
            return Err(LinAlgError::NotFactorized);
        }
        let n = self.factor.order();
        if rhs.len() != n {
            return Err(LinAlgError::DimensionMismatch {
                expected: n,
                actual: rhs.len(),
            });
        }
        let kd = self.factor.superdiagonals();
        let f = &self.factor;
        let data = f.as_slice();

        if transpose {
            // Rᵀ y = b, forward substitution over columns of R
            for j in 0..n {
                let mut sum = rhs[j];
                for i in j.saturating_sub(kd)..j {
                    sum -= data[f.packed_index(i, j)] * rhs[i];
                }
                rhs[j] = sum / data[f.packed_index(j, j)];
            }
        } else {
            // R y = b, backward substitution over rows of R
            for i in (0..n).rev() {
                let mut sum = rhs[i];
                let last = (i + kd).min(n - 1);
                for j in (i + 1)..=last {
                    sum -= data[f.packed_index(i, j)] * rhs[j];
                }
                rhs[i] = sum / data[f.packed_index(i, i)];
            }
        }
        Ok(())
    }

    fn is_factorized(&self) -> bool {
        self.factorized
    }

    fn order(&self) -> usize {
        self.factor.order()
    }

    fn name(&self) -> &'static str {
        "native band Cholesky"
    }
}
