//! Error types for the slra library
//!
//! This module provides the main error and result types used throughout the library.
//! All errors use the `thiserror` crate for automatic trait implementations.

use crate::linalg::LinAlgError;
use thiserror::Error;

/// Main result type used throughout the slra library
pub type SlraResult<T> = Result<T, SlraError>;

/// Main error type for the slra library
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SlraError {
    /// Malformed structure or invalid rank/configuration, detected before any evaluation
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Gamma(X) is not positive definite at the requested X
    #[error("Factorization error: {0}")]
    Factorization(String),

    /// A vector or matrix does not match the sizes implied by the structure
    #[error("Dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Other linear algebra failures
    #[error("Linear algebra error: {0}")]
    LinearAlgebra(String),
}

impl SlraError {
    /// Whether the caller may recover by trying another X (reject the step,
    /// raise regularization).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SlraError::Factorization(_))
    }

    pub(crate) fn check_len(
        context: &'static str,
        expected: usize,
        actual: usize,
    ) -> SlraResult<()> {
        if expected == actual {
            Ok(())
        } else {
            Err(SlraError::DimensionMismatch {
                context,
                expected,
                actual,
            })
        }
    }
}

impl From<LinAlgError> for SlraError {
    fn from(err: LinAlgError) -> Self {
        match err {
            LinAlgError::NotPositiveDefinite { .. } => SlraError::Factorization(err.to_string()),
            LinAlgError::DimensionMismatch { expected, actual } => SlraError::DimensionMismatch {
                context: "banded solve",
                expected,
                actual,
            },
            other => SlraError::LinearAlgebra(other.to_string()),
        }
    }
}
