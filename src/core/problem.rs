use nalgebra as na;
use tracing::debug;

use crate::core::SlraConfig;
use crate::core::evaluator::SlraEvaluator;
use crate::core::structure::StructureModel;
use crate::error::{SlraError, SlraResult};
use crate::linalg::{BandCholesky, BandedCholeskyBackend};

/// A validated `(structure, p, config)` triple
#[derive(Debug, Clone)]
pub struct SlraProblem {
    structure: StructureModel,
    parameters: Vec<f64>,
    config: SlraConfig,
}

impl SlraProblem {
    pub fn new(
        structure: StructureModel,
        parameters: Vec<f64>,
        config: SlraConfig,
    ) -> SlraResult<Self> {
        config.validate()?;
        config.rank_complement(&structure)?;
        SlraError::check_len(
            "parameter vector",
            structure.parameter_count(),
            parameters.len(),
        )?;
        Ok(Self {
            structure,
            parameters,
            config,
        })
    }

    pub fn structure(&self) -> &StructureModel {
        &self.structure
    }

    pub fn parameters(&self) -> &[f64] {
        &self.parameters
    }

    pub fn config(&self) -> &SlraConfig {
        &self.config
    }

    /// Rank complement `d`
    pub fn rank_complement(&self) -> usize {
        self.config.constrained_columns(&self.structure) - self.config.rank
    }

    /// `S(p)` in natural layout
    pub fn structured_matrix(&self) -> SlraResult<na::DMatrix<f64>> {
        self.structure.fill_matrix(&self.parameters)
    }

    /// `S(p) Φ`, the matrix whose rank is constrained
    pub fn constrained_matrix(&self) -> SlraResult<na::DMatrix<f64>> {
        let s = self.structured_matrix()?;
        Ok(match &self.config.column_map {
            Some(phi) => s * phi,
            None => s,
        })
    }

    /// Unstructured total least squares estimate of `X`
    ///
    /// Takes the `d` right singular vectors of `S = S(p) Φ` with the smallest
    /// singular values (eigenvectors of `SᵀS`), splits them as `[V_a; V_b]`
    /// and returns `X₀ = -V_a V_b^{-1}`, so that `S [X₀; -I] ≈ 0`.
    pub fn initial_approximation(&self) -> SlraResult<na::DMatrix<f64>> {
        let s = self.constrained_matrix()?;
        let n = self.config.rank;
        let d = self.rank_complement();

        let eigen = na::SymmetricEigen::new(s.tr_mul(&s));
        let mut order: Vec<usize> = (0..eigen.eigenvalues.len()).collect();
        order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));

        let mut v = na::DMatrix::zeros(n + d, d);
        for (c, &idx) in order.iter().take(d).enumerate() {
            v.set_column(c, &eigen.eigenvectors.column(idx));
        }
        debug!(
            "Initial approximation: smallest eigenvalues {:?}",
            order
                .iter()
                .take(d)
                .map(|&i| eigen.eigenvalues[i])
                .collect::<Vec<_>>()
        );

        let vb_inv = v
            .view((n, 0), (d, d))
            .clone_owned()
            .try_inverse()
            .ok_or_else(|| {
                SlraError::LinearAlgebra(
                    "initial approximation: trailing block of the null-space basis is singular"
                        .into(),
                )
            })?;
        Ok(-(v.view((0, 0), (n, d)) * vb_inv))
    }

    /// `X` flattened row-major, the layout the evaluator expects
    pub fn flatten(x: &na::DMatrix<f64>) -> Vec<f64> {
        x.transpose().as_slice().to_vec()
    }

    /// Evaluator with the native band backend
    pub fn evaluator(&self) -> SlraResult<SlraEvaluator<BandCholesky>> {
        self.evaluator_with_backend()
    }

    pub fn evaluator_with_backend<B: BandedCholeskyBackend>(&self) -> SlraResult<SlraEvaluator<B>> {
        SlraEvaluator::new(self.structure.clone(), &self.parameters, &self.config)
    }
}
