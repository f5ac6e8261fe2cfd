//! Core components of structured low-rank approximation
//!
//! This module contains the building blocks of the variable-projection
//! formulation:
//! - Layered structure and the affine map `p -> S(p)`
//! - Banded factorization of the weighted Gram matrix `Gamma(X)`
//! - Natural and replica-contiguous row layouts
//! - Cost, residual and Jacobian evaluation for an external optimizer
//! - Projection of a converged `X` back to corrected parameters

use nalgebra::DMatrix;
use std::fmt;

use crate::error::{SlraError, SlraResult};

pub mod correction;
pub mod evaluator;
pub mod gamma;
pub mod layout;
pub mod problem;
pub mod structure;

pub use correction::SlraSolution;
pub use evaluator::{LeastSquaresObjective, SlraEvaluator};
pub use gamma::{GammaFactorizer, ReplicaFactorization};
pub use layout::ReshapedLayout;
pub use problem::SlraProblem;
pub use structure::{Layer, LayerKind, StructureModel, extended_basis};

/// Configuration of an SLRA problem
///
/// Only `rank`, `column_map`, `reg_gamma` and `replica_factorization` affect
/// evaluation; the tolerances are passed through to the outer optimizer
/// untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct SlraConfig {
    /// Target rank `n`; the rank complement is `d = n + d - rank`
    pub rank: usize,
    /// Optional column map `Φ` (`(n+d) x (n+d)'`): the rank constraint is
    /// imposed on `S(p) Φ` and `d = (n+d)' - rank`
    pub column_map: Option<DMatrix<f64>>,
    /// Absolute regularization added to the diagonal of `Γ_0`
    pub reg_gamma: f64,
    /// Sharing of the Gamma factor across replicas
    pub replica_factorization: ReplicaFactorization,
    /// Maximum number of outer iterations
    pub max_iterations: usize,
    /// Absolute step tolerance
    pub epsabs: f64,
    /// Relative step tolerance
    pub epsrel: f64,
    /// Gradient tolerance
    pub epsgrad: f64,
}

impl SlraConfig {
    pub fn new(rank: usize) -> Self {
        Self {
            rank,
            column_map: None,
            reg_gamma: 0.0,
            replica_factorization: ReplicaFactorization::Auto,
            max_iterations: 100,
            epsabs: 0.0,
            epsrel: 1e-5,
            epsgrad: 1e-5,
        }
    }

    /// Constrain the rank of `S(p) Φ` instead of `S(p)`
    pub fn with_column_map(mut self, phi: DMatrix<f64>) -> Self {
        self.column_map = Some(phi);
        self
    }

    /// Set the absolute regularization of `Γ_0`
    pub fn with_reg_gamma(mut self, reg_gamma: f64) -> Self {
        self.reg_gamma = reg_gamma;
        self
    }

    pub fn with_replica_factorization(mut self, mode: ReplicaFactorization) -> Self {
        self.replica_factorization = mode;
        self
    }

    /// Set the maximum number of outer iterations
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the step and gradient tolerances
    pub fn with_tolerances(mut self, epsabs: f64, epsrel: f64, epsgrad: f64) -> Self {
        self.epsabs = epsabs;
        self.epsrel = epsrel;
        self.epsgrad = epsgrad;
        self
    }

    /// Check the settings that do not depend on the structure
    pub fn validate(&self) -> SlraResult<()> {
        if self.rank == 0 {
            return Err(SlraError::Configuration("rank must be positive".into()));
        }
        if !self.reg_gamma.is_finite() || self.reg_gamma < 0.0 {
            return Err(SlraError::Configuration(format!(
                "reg_gamma must be a finite nonnegative number, got {}",
                self.reg_gamma
            )));
        }
        if let Some(phi) = &self.column_map {
            if phi.is_empty() {
                return Err(SlraError::Configuration("column map is empty".into()));
            }
            if phi.iter().any(|v| !v.is_finite()) {
                return Err(SlraError::Configuration(
                    "column map has non-finite entries".into(),
                ));
            }
        }
        for (name, value) in [
            ("epsabs", self.epsabs),
            ("epsrel", self.epsrel),
            ("epsgrad", self.epsgrad),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(SlraError::Configuration(format!(
                    "{name} must lie in [0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Number of columns `(n+d)'` whose rank is constrained
    pub fn constrained_columns(&self, structure: &StructureModel) -> usize {
        self.column_map
            .as_ref()
            .map_or(structure.n_plus_d(), |phi| phi.ncols())
    }

    /// Check `rank` and the column map against `structure` and return `d`
    pub fn rank_complement(&self, structure: &StructureModel) -> SlraResult<usize> {
        let Some(phi) = &self.column_map else {
            return structure.validate_rank(self.rank);
        };
        SlraError::check_len("column map rows", structure.n_plus_d(), phi.nrows())?;
        if self.rank == 0 || self.rank >= phi.ncols() {
            return Err(SlraError::Configuration(format!(
                "rank {} outside (0, {})",
                self.rank,
                phi.ncols()
            )));
        }
        Ok(phi.ncols() - self.rank)
    }
}

impl fmt::Display for SlraConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "SLRA configuration:")?;
        writeln!(f, "  Rank: {}", self.rank)?;
        match &self.column_map {
            Some(phi) => writeln!(f, "  Column map: {} x {}", phi.nrows(), phi.ncols())?,
            None => writeln!(f, "  Column map: none")?,
        }
        writeln!(f, "  Gamma regularization: {:.3e}", self.reg_gamma)?;
        writeln!(f, "  Replica factorization: {}", self.replica_factorization)?;
        writeln!(f, "  Max iterations: {}", self.max_iterations)?;
        write!(
            f,
            "  Tolerances: epsabs {:.1e}, epsrel {:.1e}, epsgrad {:.1e}",
            self.epsabs, self.epsrel, self.epsgrad
        )
    }
}
