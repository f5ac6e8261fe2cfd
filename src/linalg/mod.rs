//! Linear algebra utilities for the banded Gamma factorization.
//!
//! This module provides the banded capability the SLRA core depends on:
//! - Symmetric band storage in LAPACK `UPLO = 'U'` layout
//! - Banded SPD Cholesky factorization
//! - Triangular and symmetric banded solves
//!
//! Backends implement [`BandedCholeskyBackend`], so any library offering a
//! banded dense factorization can be substituted for the native one.

use thiserror::Error;

pub mod band;
pub mod cholesky;
pub mod dense;

pub use band::SymmetricBandMatrix;
pub use cholesky::BandCholesky;
pub use dense::DenseCholesky;

/// Errors reported by the banded linear algebra backends
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinAlgError {
    /// A non-positive pivot was met during Cholesky factorization
    #[error("matrix is not positive definite (pivot {pivot:.3e} at column {column})")]
    NotPositiveDefinite { column: usize, pivot: f64 },

    /// Right-hand side or matrix has the wrong size
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A solve was requested before a successful factorization
    #[error("factorization has not been computed")]
    NotFactorized,

    /// An entry outside the stored band was addressed
    #[error("entry ({row}, {col}) lies outside the upper band of width {superdiagonals}")]
    OutOfBand {
        row: usize,
        col: usize,
        superdiagonals: usize,
    },
}

/// Result type for banded linear algebra operations
pub type LinAlgResult<T> = Result<T, LinAlgError>;

/// Banded SPD factorization capability
///
/// The factor is upper triangular, `RᵀR = A`, with the bandwidth of `A`.
pub trait BandedCholeskyBackend: Send {
    /// Create a backend for matrices of the given order and number of superdiagonals
    fn with_dimensions(order: usize, superdiagonals: usize) -> Self
    where
        Self: Sized;

    /// Factorize a symmetric positive definite band matrix
    fn factorize(&mut self, matrix: &SymmetricBandMatrix) -> LinAlgResult<()>;

    /// Solve `Rᵀ y = b` (`transpose = true`) or `R y = b` in place
    fn solve_triangular_in_place(&self, rhs: &mut [f64], transpose: bool) -> LinAlgResult<()>;

    /// Solve `A y = b` in place using the two triangular solves
    fn solve_in_place(&self, rhs: &mut [f64]) -> LinAlgResult<()> {
        self.solve_triangular_in_place(rhs, true)?;
        self.solve_triangular_in_place(rhs, false)
    }

    /// Check if the backend holds a valid factor
    fn is_factorized(&self) -> bool;

    /// Order of the matrices this backend factors
    fn order(&self) -> usize;

    /// Short name used in log messages
    fn name(&self) -> &'static str;
}
