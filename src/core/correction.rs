//! Projection of a converged `X` onto corrected parameters.

use nalgebra::DMatrix;
use std::fmt;
use tracing::debug;

use crate::core::evaluator::{LeastSquaresObjective, SlraEvaluator};
use crate::error::{SlraError, SlraResult};
use crate::linalg::BandedCholeskyBackend;

/// Result of an SLRA run at a given `X`
#[derive(Debug, Clone)]
pub struct SlraSolution {
    /// Rank-complement parameter, `n x d`
    pub x: DMatrix<f64>,
    /// Corrected parameters `p̂` with `rank S(p̂) <= n`
    pub corrected_parameters: Vec<f64>,
    /// Final cost `‖f(X)‖²`
    pub cost: f64,
    /// `(JᵀJ)^{-1}` in row-major `X` order, `None` when `JᵀJ` is singular
    pub covariance: Option<DMatrix<f64>>,
}

impl fmt::Display for SlraSolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "SLRA solution:")?;
        writeln!(f, "  X: {} x {}", self.x.nrows(), self.x.ncols())?;
        writeln!(f, "  Cost: {:.6e}", self.cost)?;
        writeln!(f, "  Parameters: {}", self.corrected_parameters.len())?;
        match &self.covariance {
            Some(cov) => write!(f, "  Covariance: {} x {}", cov.nrows(), cov.ncols()),
            None => write!(f, "  Covariance: unavailable"),
        }
    }
}

impl<B: BandedCholeskyBackend> SlraEvaluator<B> {
    /// `p̂ = p - Δp` where `Δp` is the minimal weighted correction making
    /// `S(p̂) Φ Xext = 0` (`Φ = I` without a column map)
    pub fn corrected_parameters(&mut self, x: &[f64]) -> SlraResult<Vec<f64>> {
        let d = self.rank_complement();
        let solved = self.solve_misfit(x)?.to_vec();
        let natural = self.layout().reshape(&solved, d, false)?;
        let y = DMatrix::from_row_slice(self.structure().rows(), d, &natural);

        let dp = self
            .structure()
            .correction_from_kernel(&y, &self.kernel_basis())?;
        let corrected: Vec<f64> = self
            .parameters()
            .iter()
            .zip(&dp)
            .map(|(p, delta)| p - delta)
            .collect();
        debug!(
            "Correction applied: |p - p̂| = {:.3e}",
            self.parameters()
                .iter()
                .zip(&corrected)
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f64>()
                .sqrt()
        );
        Ok(corrected)
    }

    /// `(JᵀJ)^{-1}` at `x`
    pub fn covariance(&mut self, x: &[f64]) -> SlraResult<DMatrix<f64>> {
        let mut jacobian = DMatrix::zeros(self.residual_count(), self.parameter_count());
        self.jacobian(x, &mut jacobian)?;
        let jtj = jacobian.tr_mul(&jacobian);
        jtj.cholesky()
            .map(|chol| chol.inverse())
            .ok_or_else(|| SlraError::LinearAlgebra("JᵀJ is singular".into()))
    }

    /// Corrected parameters, cost and covariance at a converged `x`
    pub fn solution(&mut self, x: &[f64]) -> SlraResult<SlraSolution> {
        let cost = self.cost(x)?;
        let corrected_parameters = self.corrected_parameters(x)?;
        let covariance = match self.covariance(x) {
            Ok(cov) => Some(cov),
            Err(SlraError::LinearAlgebra(msg)) => {
                debug!("Covariance unavailable: {}", msg);
                None
            }
            Err(err) => return Err(err),
        };
        Ok(SlraSolution {
            x: self.x().clone(),
            corrected_parameters,
            cost,
            covariance,
        })
    }
}
