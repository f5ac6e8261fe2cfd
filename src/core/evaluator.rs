//! Variable-projection cost, residual and Jacobian.
//!
//! For a rank-complement parameter `X` (`n x d`) the residual is the
//! Gamma-whitened misfit
//!
//! ```text
//! f(X) = R^{-T} (A X - B),   RᵀR = Gamma(X)
//! ```
//!
//! where `A` and `B` are the first `n` and last `d` columns of the reshaped
//! structured matrix, or of `S(p) Φ` when a column map is configured. The cost `‖f‖²` equals the minimal weighted correction
//! norm needed to make `S(p̂) Xext = 0`.
//!
//! The Jacobian returned here is
//!
//! ```text
//! J[:, (i, c)] = R^{-T} (A[:, i] ⊗ e_c - ½ dGamma/dX_ic · Gamma^{-1}(A X - B))
//! ```
//!
//! which reproduces the exact gradient `2 Jᵀ f` of the cost and coincides
//! with `∂f/∂X` wherever `f = 0`.

use nalgebra::DMatrix;
use tracing::{info, warn};

use crate::core::SlraConfig;
use crate::core::gamma::{GammaFactorizer, block_toeplitz_multiply};
use crate::core::layout::ReshapedLayout;
use crate::core::structure::StructureModel;
use crate::error::{SlraError, SlraResult};
use crate::linalg::{BandCholesky, BandedCholeskyBackend};

/// Interface consumed by an external nonlinear least squares driver
///
/// `x` is the optimization variable flattened row-major; `&mut self` is the
/// workspace handle, so one objective serves one driver at a time.
pub trait LeastSquaresObjective {
    /// Number of optimization variables
    fn parameter_count(&self) -> usize;

    /// Number of residuals
    fn residual_count(&self) -> usize;

    fn residual(&mut self, x: &[f64], residual: &mut [f64]) -> SlraResult<()>;

    /// Jacobian of size `residual_count x parameter_count`
    fn jacobian(&mut self, x: &[f64], jacobian: &mut DMatrix<f64>) -> SlraResult<()>;

    fn residual_and_jacobian(
        &mut self,
        x: &[f64],
        residual: &mut [f64],
        jacobian: &mut DMatrix<f64>,
    ) -> SlraResult<()> {
        self.residual(x, residual)?;
        self.jacobian(x, jacobian)
    }

    /// Sum of squared residuals
    fn cost(&mut self, x: &[f64]) -> SlraResult<f64> {
        let mut residual = vec![0.0; self.residual_count()];
        self.residual(x, &mut residual)?;
        Ok(residual.iter().map(|r| r * r).sum())
    }
}

/// Buffers reused across evaluations
#[derive(Debug, Clone)]
struct Workspace {
    x: DMatrix<f64>,
    /// `A X - B`, m x d
    misfit: DMatrix<f64>,
    /// Misfit flattened row-major, then whitened in place
    residual: Vec<f64>,
    /// `Gamma^{-1} (A X - B)`
    solved: Vec<f64>,
    column: Vec<f64>,
    product: Vec<f64>,
    dgamma: Vec<DMatrix<f64>>,
}

/// Cost/Jacobian evaluator for one `(structure, p, config)` triple
#[derive(Debug, Clone)]
pub struct SlraEvaluator<B: BandedCholeskyBackend = BandCholesky> {
    structure: StructureModel,
    layout: ReshapedLayout,
    gamma: GammaFactorizer<B>,
    column_map: Option<DMatrix<f64>>,
    parameters: Vec<f64>,
    a: DMatrix<f64>,
    b: DMatrix<f64>,
    n: usize,
    d: usize,
    ws: Workspace,
}

impl<B: BandedCholeskyBackend> SlraEvaluator<B> {
    pub fn new(structure: StructureModel, parameters: &[f64], config: &SlraConfig) -> SlraResult<Self> {
        config.validate()?;
        let d = config.rank_complement(&structure)?;
        let n = config.rank;
        SlraError::check_len("parameter vector", structure.parameter_count(), parameters.len())?;

        let layout = ReshapedLayout::new(structure.replicas(), structure.rows_per_replica());
        let mut s = structure.fill_matrix(parameters)?;
        if let Some(phi) = &config.column_map {
            s = s * phi;
        }
        let s = layout.reshape_matrix(&s, true)?;
        let a = s.columns(0, n).into_owned();
        let b = s.columns(n, d).into_owned();

        let gamma: GammaFactorizer<B> = GammaFactorizer::with_column_map(
            &structure,
            config.column_map.as_ref(),
            n,
            config.reg_gamma,
            config.replica_factorization,
        )?;

        if config.reg_gamma == 0.0
            && structure
                .layers()
                .iter()
                .any(|layer| layer.inv_weight() == 0.0)
        {
            warn!("structure has exact layers and reg_gamma = 0; Gamma may be singular");
        }

        let m = structure.rows();
        let block = structure.rows_per_replica() * d;
        info!(
            "SLRA evaluator: m = {}, n = {}, d = {}, s = {}, Np = {}, {} replica(s), {} Gamma factor ({})",
            m,
            n,
            d,
            structure.bandwidth(),
            structure.parameter_count(),
            structure.replicas(),
            if gamma.is_shared() { "shared" } else { "per-replica" },
            gamma.factor(0).name()
        );

        let ws = Workspace {
            x: DMatrix::zeros(n, d),
            misfit: DMatrix::zeros(m, d),
            residual: vec![0.0; m * d],
            solved: vec![0.0; m * d],
            column: vec![0.0; block],
            product: vec![0.0; block],
            dgamma: vec![DMatrix::zeros(d, d); structure.bandwidth()],
        };

        Ok(Self {
            structure,
            layout,
            gamma,
            column_map: config.column_map.clone(),
            parameters: parameters.to_vec(),
            a,
            b,
            n,
            d,
            ws,
        })
    }

    pub fn structure(&self) -> &StructureModel {
        &self.structure
    }

    pub fn layout(&self) -> &ReshapedLayout {
        &self.layout
    }

    pub fn gamma(&self) -> &GammaFactorizer<B> {
        &self.gamma
    }

    pub fn column_map(&self) -> Option<&DMatrix<f64>> {
        self.column_map.as_ref()
    }

    /// Kernel basis `Φ Xext` of `S(p̂)` for the last evaluated `X`
    pub fn kernel_basis(&self) -> DMatrix<f64> {
        match &self.column_map {
            Some(phi) => phi * self.gamma.xext(),
            None => self.gamma.xext().clone(),
        }
    }

    /// Original parameter vector `p`
    pub fn parameters(&self) -> &[f64] {
        &self.parameters
    }

    pub fn rank(&self) -> usize {
        self.n
    }

    /// Rank complement `d`
    pub fn rank_complement(&self) -> usize {
        self.d
    }

    /// `X` from the last evaluation
    pub fn x(&self) -> &DMatrix<f64> {
        &self.ws.x
    }

    fn load_x(&mut self, x: &[f64]) -> SlraResult<()> {
        SlraError::check_len("X", self.n * self.d, x.len())?;
        let d = self.d;
        for (i, row) in x.chunks(d).enumerate() {
            for (c, value) in row.iter().enumerate() {
                self.ws.x[(i, c)] = *value;
            }
        }
        Ok(())
    }

    /// Build and factor `Gamma(X)` for a flattened `x`
    pub fn compute_cholesky_of_gamma(&mut self, x: &[f64]) -> SlraResult<()> {
        self.load_x(x)?;
        self.gamma.compute_cholesky(&self.ws.x)
    }

    /// `A X - B` into the flat residual buffer
    fn compute_misfit(&mut self) {
        let ws = &mut self.ws;
        ws.misfit.copy_from(&self.b);
        ws.misfit.gemm(1.0, &self.a, &ws.x, -1.0);
        let d = self.d;
        for (i, row) in ws.residual.chunks_mut(d).enumerate() {
            for (c, value) in row.iter_mut().enumerate() {
                *value = ws.misfit[(i, c)];
            }
        }
    }

    /// Factor at `x` and return `Gamma^{-1}(A X - B)` in reshaped layout
    pub(crate) fn solve_misfit(&mut self, x: &[f64]) -> SlraResult<&[f64]> {
        self.compute_cholesky_of_gamma(x)?;
        self.compute_misfit();
        self.ws.solved.copy_from_slice(&self.ws.residual);
        self.gamma.multiply_inverse_gamma(&mut self.ws.solved)?;
        Ok(&self.ws.solved)
    }

    fn check_jacobian(&self, jacobian: &DMatrix<f64>) -> SlraResult<()> {
        SlraError::check_len("Jacobian rows", self.residual_count(), jacobian.nrows())?;
        SlraError::check_len("Jacobian columns", self.parameter_count(), jacobian.ncols())
    }

    /// Fill `J` from the current factor and `ws.solved`
    fn assemble_jacobian(&mut self, jacobian: &mut DMatrix<f64>) -> SlraResult<()> {
        let d = self.d;
        let m_rep = self.structure.rows_per_replica();
        let block = m_rep * d;
        let gamma = &self.gamma;
        let ws = &mut self.ws;

        for i in 0..self.n {
            for c in 0..d {
                let col = i * d + c;
                fill_dgamma(gamma.weight_blocks(), gamma.xext(), i, c, &mut ws.dgamma);

                for r in 0..gamma.replicas() {
                    let base = r * block;
                    ws.column.fill(0.0);
                    for t in 0..m_rep {
                        ws.column[t * d + c] = self.a[(r * m_rep + t, i)];
                    }

                    block_toeplitz_multiply(
                        &ws.dgamma,
                        d,
                        &ws.solved[base..base + block],
                        &mut ws.product,
                    );
                    let scale = 0.5 * gamma.replica_scale(r);
                    for (v, p) in ws.column.iter_mut().zip(&ws.product) {
                        *v -= scale * p;
                    }

                    gamma.multiply_inverse_cholesky_replica(r, &mut ws.column, true)?;
                    for (q, v) in ws.column.iter().enumerate() {
                        jacobian[(base + q, col)] = *v;
                    }
                }
            }
        }
        Ok(())
    }
}

/// `dΓ_k / dX_ic` for every lag: row `c` gets `W_k[i, :] Xext`, column `c`
/// gets `Xextᵀ W_k[:, i]`
fn fill_dgamma(
    weights: &[DMatrix<f64>],
    xext: &DMatrix<f64>,
    i: usize,
    c: usize,
    out: &mut [DMatrix<f64>],
) {
    let (n_plus_d, d) = xext.shape();
    for (w, dg) in weights.iter().zip(out.iter_mut()) {
        dg.fill(0.0);
        for e in 0..d {
            let mut row = 0.0;
            let mut col = 0.0;
            for a in 0..n_plus_d {
                let xa = xext[(a, e)];
                row += w[(i, a)] * xa;
                col += w[(a, i)] * xa;
            }
            dg[(c, e)] += row;
            dg[(e, c)] += col;
        }
    }
}

impl<B: BandedCholeskyBackend> LeastSquaresObjective for SlraEvaluator<B> {
    fn parameter_count(&self) -> usize {
        self.n * self.d
    }

    fn residual_count(&self) -> usize {
        self.structure.rows() * self.d
    }

    fn residual(&mut self, x: &[f64], residual: &mut [f64]) -> SlraResult<()> {
        SlraError::check_len("residual", self.residual_count(), residual.len())?;
        self.compute_cholesky_of_gamma(x)?;
        self.compute_misfit();
        residual.copy_from_slice(&self.ws.residual);
        self.gamma.multiply_inverse_cholesky(residual, true)
    }

    fn jacobian(&mut self, x: &[f64], jacobian: &mut DMatrix<f64>) -> SlraResult<()> {
        self.check_jacobian(jacobian)?;
        self.solve_misfit(x)?;
        self.assemble_jacobian(jacobian)
    }

    fn residual_and_jacobian(
        &mut self,
        x: &[f64],
        residual: &mut [f64],
        jacobian: &mut DMatrix<f64>,
    ) -> SlraResult<()> {
        SlraError::check_len("residual", self.residual_count(), residual.len())?;
        self.check_jacobian(jacobian)?;
        self.compute_cholesky_of_gamma(x)?;
        self.compute_misfit();

        residual.copy_from_slice(&self.ws.residual);
        self.gamma.multiply_inverse_cholesky(residual, true)?;
        self.ws.solved.copy_from_slice(residual);
        self.gamma.multiply_inverse_cholesky(&mut self.ws.solved, false)?;

        self.assemble_jacobian(jacobian)
    }

    fn cost(&mut self, x: &[f64]) -> SlraResult<f64> {
        self.compute_cholesky_of_gamma(x)?;
        self.compute_misfit();
        self.gamma.multiply_inverse_cholesky(&mut self.ws.residual, true)?;
        Ok(self.ws.residual.iter().map(|r| r * r).sum())
    }
}
