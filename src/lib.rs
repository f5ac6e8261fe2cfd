//! # slra
//!
//! Structured low-rank approximation with a banded `Gamma(X)` Cholesky
//! factorization and a variable-projection cost/Jacobian evaluator.
//!
//! Given parameters `p` mapped affinely into a structured matrix `S(p)`
//! (Toeplitz, Hankel, unstructured and exact-zero layers, possibly replicated
//! as a mosaic), the crate evaluates the cost
//!
//! ```text
//! f(X) = ‖R^{-T} (A X - B)‖²,   RᵀR = Gamma(X)
//! ```
//!
//! together with its Jacobian, for an external nonlinear least squares
//! driver, and maps a converged `X` back to corrected parameters `p̂` with
//! `rank S(p̂) <= n`.
//!
//! ## Example
//! ```no_run
//! use slra::{Layer, LeastSquaresObjective, SlraConfig, SlraProblem, StructureModel};
//!
//! # fn main() -> slra::SlraResult<()> {
//! let structure = StructureModel::new(vec![Layer::hankel(4)], 1, 10)?;
//! let p: Vec<f64> = (0..13).map(|t| 0.9f64.powi(t) + (0.5 * t as f64).cos()).collect();
//! let problem = SlraProblem::new(structure, p, SlraConfig::new(3))?;
//!
//! let x0 = problem.initial_approximation()?;
//! let mut evaluator = problem.evaluator()?;
//! let cost = evaluator.cost(&SlraProblem::flatten(&x0))?;
//! let solution = evaluator.solution(&SlraProblem::flatten(&x0))?;
//! println!("{cost:.3e}\n{solution}");
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod error;
pub mod linalg;
pub mod logger;

pub use crate::core::{
    GammaFactorizer, Layer, LayerKind, LeastSquaresObjective, ReplicaFactorization,
    ReshapedLayout, SlraConfig, SlraEvaluator, SlraProblem, SlraSolution, StructureModel,
    extended_basis,
};
pub use error::{SlraError, SlraResult};
pub use linalg::{
    BandCholesky, BandedCholeskyBackend, DenseCholesky, LinAlgError, SymmetricBandMatrix,
};
pub use logger::{init_logger, init_logger_with_level};
