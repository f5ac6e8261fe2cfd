//! Banded factorization of `Gamma(X)`.
//!
//! For one replica, `Gamma(X)` is the `M·d x M·d` symmetric block-Toeplitz
//! matrix whose block `(t, t + k)` is `Γ_k = Xextᵀ W_k Xext`, zero for
//! `k >= s`. Across replicas Gamma is block diagonal, replica `r` scaled by
//! its inverse-weight multiplier `c_r`. Only the upper band (`d·s - 1`
//! superdiagonals) is assembled and factored.

use nalgebra::DMatrix;
use std::fmt;
use tracing::debug;

use crate::core::structure::StructureModel;
use crate::error::{SlraError, SlraResult};
use crate::linalg::{BandCholesky, BandedCholeskyBackend, SymmetricBandMatrix};

/// How replica blocks of Gamma are factored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplicaFactorization {
    /// Share one factor when all replica weights are equal
    #[default]
    Auto,
    /// Always share one factor; unequal replica weights are an error
    Shared,
    /// One factor per replica
    PerReplica,
}

impl fmt::Display for ReplicaFactorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicaFactorization::Auto => write!(f, "auto"),
            ReplicaFactorization::Shared => write!(f, "shared"),
            ReplicaFactorization::PerReplica => write!(f, "per-replica"),
        }
    }
}

/// Builds `Gamma(X)` and keeps its Cholesky factor(s)
#[derive(Debug, Clone)]
pub struct GammaFactorizer<B: BandedCholeskyBackend = BandCholesky> {
    n: usize,
    d: usize,
    rows_per_replica: usize,
    replicas: usize,
    reg_gamma: f64,
    weight_blocks: Vec<DMatrix<f64>>,
    replica_scales: Vec<f64>,
    shared: bool,
    xext: DMatrix<f64>,
    gamma_blocks: Vec<DMatrix<f64>>,
    /// `Xextᵀ W_k`, d x (n+d)
    scratch: DMatrix<f64>,
    band: SymmetricBandMatrix,
    factors: Vec<B>,
    factorized: bool,
}

impl<B: BandedCholeskyBackend> GammaFactorizer<B> {
    /// Size all buffers for `structure` with `rank = n`.
    pub fn new(
        structure: &StructureModel,
        rank: usize,
        reg_gamma: f64,
        mode: ReplicaFactorization,
    ) -> SlraResult<Self> {
        Self::with_column_map(structure, None, rank, reg_gamma, mode)
    }

    /// Like [`new`](Self::new) for the rank constraint on `S(p) Φ`
    ///
    /// `Φ` is `(n+d) x (n+d)'`; the weight blocks become `Φᵀ W_k Φ` and `X`
    /// is `n x ((n+d)' - n)`.
    pub fn with_column_map(
        structure: &StructureModel,
        column_map: Option<&DMatrix<f64>>,
        rank: usize,
        reg_gamma: f64,
        mode: ReplicaFactorization,
    ) -> SlraResult<Self> {
        let (columns, weight_blocks) = match column_map {
            None => (structure.n_plus_d(), structure.weight_blocks().to_vec()),
            Some(phi) => {
                SlraError::check_len("column map rows", structure.n_plus_d(), phi.nrows())?;
                let blocks: Vec<DMatrix<f64>> = structure
                    .weight_blocks()
                    .iter()
                    .map(|w| phi.tr_mul(&(w * phi)))
                    .collect();
                (phi.ncols(), blocks)
            }
        };
        if rank == 0 || rank >= columns {
            return Err(SlraError::Configuration(format!(
                "rank {rank} outside (0, {columns})"
            )));
        }
        let d = columns - rank;
        if !reg_gamma.is_finite() || reg_gamma < 0.0 {
            return Err(SlraError::Configuration(format!(
                "reg_gamma must be a finite nonnegative number, got {reg_gamma}"
            )));
        }

        let uniform = structure.has_uniform_replica_weights();
        let shared = match mode {
            ReplicaFactorization::Auto => uniform,
            ReplicaFactorization::Shared if !uniform => {
                return Err(SlraError::Configuration(
                    "shared Gamma factorization requires equal replica weights".into(),
                ));
            }
            ReplicaFactorization::Shared => true,
            ReplicaFactorization::PerReplica => false,
        };

        let s = structure.bandwidth();
        let m_rep = structure.rows_per_replica();
        let order = m_rep * d;
        let band = SymmetricBandMatrix::new(order, d * s - 1);
        let factor_count = if shared { 1 } else { structure.replicas() };
        let factors = (0..factor_count)
            .map(|_| B::with_dimensions(order, band.superdiagonals()))
            .collect();

        Ok(Self {
            n: rank,
            d,
            rows_per_replica: m_rep,
            replicas: structure.replicas(),
            reg_gamma,
            weight_blocks,
            replica_scales: structure.replica_inv_weights().to_vec(),
            shared,
            xext: DMatrix::zeros(columns, d),
            gamma_blocks: vec![DMatrix::zeros(d, d); s],
            scratch: DMatrix::zeros(d, columns),
            band,
            factors,
            factorized: false,
        })
    }

    /// Build `Gamma(X)` for `x` (`n x d`) and factor it
    pub fn compute_cholesky(&mut self, x: &DMatrix<f64>) -> SlraResult<()> {
        SlraError::check_len("X rows", self.n, x.nrows())?;
        SlraError::check_len("X columns", self.d, x.ncols())?;
        self.factorized = false;

        self.xext.view_mut((0, 0), (self.n, self.d)).copy_from(x);
        self.xext.view_mut((self.n, 0), (self.d, self.d)).fill(0.0);
        for c in 0..self.d {
            self.xext[(self.n + c, c)] = -1.0;
        }

        for (w, gamma) in self.weight_blocks.iter().zip(self.gamma_blocks.iter_mut()) {
            self.scratch.gemm_tr(1.0, &self.xext, w, 0.0);
            gamma.gemm(1.0, &self.scratch, &self.xext, 0.0);
        }
        if self.reg_gamma > 0.0 {
            for i in 0..self.d {
                self.gamma_blocks[0][(i, i)] += self.reg_gamma;
            }
        }

        for f in 0..self.factors.len() {
            let scale = self.replica_scales[f];
            self.assemble_band(scale)?;
            if let Err(err) = self.factors[f].factorize(&self.band) {
                debug!(
                    "Gamma factorization failed for replica block {} ({}): {}",
                    f,
                    self.factors[f].name(),
                    err
                );
                return Err(err.into());
            }
        }
        self.factorized = true;
        Ok(())
    }

    /// Write `scale·Γ_k` into the upper band
    fn assemble_band(&mut self, scale: f64) -> SlraResult<()> {
        let d = self.d;
        let m_rep = self.rows_per_replica;
        self.band.fill_zero();
        for t in 0..m_rep {
            for (lag, gamma) in self.gamma_blocks.iter().enumerate() {
                if t + lag >= m_rep {
                    break;
                }
                for a in 0..d {
                    let b0 = if lag == 0 { a } else { 0 };
                    for b in b0..d {
                        self.band
                            .set(t * d + a, (t + lag) * d + b, scale * gamma[(a, b)])?;
                    }
                }
            }
        }
        Ok(())
    }

    fn factor_for(&self, replica: usize) -> &B {
        if self.shared {
            &self.factors[0]
        } else {
            &self.factors[replica]
        }
    }

    fn ensure_factorized(&self) -> SlraResult<()> {
        if self.factorized {
            Ok(())
        } else {
            Err(SlraError::LinearAlgebra(
                "Gamma has not been factorized".into(),
            ))
        }
    }

    /// Apply `R^{-T}` (`transpose`) or `R^{-1}` to one replica block of length `M·d`
    pub fn multiply_inverse_cholesky_replica(
        &self,
        replica: usize,
        v: &mut [f64],
        transpose: bool,
    ) -> SlraResult<()> {
        self.ensure_factorized()?;
        if replica >= self.replicas {
            return Err(SlraError::DimensionMismatch {
                context: "replica index",
                expected: self.replicas,
                actual: replica,
            });
        }
        self.factor_for(replica)
            .solve_triangular_in_place(v, transpose)?;
        Ok(())
    }

    /// Apply `R^{-T}` or `R^{-1}` to an `m·d` vector in reshaped layout
    pub fn multiply_inverse_cholesky(&self, v: &mut [f64], transpose: bool) -> SlraResult<()> {
        self.ensure_factorized()?;
        SlraError::check_len("Gamma solve vector", self.order(), v.len())?;
        for (r, chunk) in v.chunks_mut(self.replica_order()).enumerate() {
            self.factor_for(r).solve_triangular_in_place(chunk, transpose)?;
        }
        Ok(())
    }

    /// Apply `Gamma^{-1}` to an `m·d` vector in reshaped layout
    pub fn multiply_inverse_gamma(&self, v: &mut [f64]) -> SlraResult<()> {
        self.multiply_inverse_cholesky(v, true)?;
        self.multiply_inverse_cholesky(v, false)
    }

    /// Dense `Gamma(X)` over all replicas, for verification
    pub fn dense_gamma(&self) -> DMatrix<f64> {
        let d = self.d;
        let m_rep = self.rows_per_replica;
        let block = self.replica_order();
        let mut gamma = DMatrix::zeros(self.order(), self.order());
        for (r, scale) in self.replica_scales.iter().enumerate() {
            let base = r * block;
            for t in 0..m_rep {
                for (lag, g) in self.gamma_blocks.iter().enumerate() {
                    if t + lag >= m_rep {
                        break;
                    }
                    let (i0, j0) = (base + t * d, base + (t + lag) * d);
                    gamma.view_mut((i0, j0), (d, d)).copy_from(&(g * *scale));
                    if lag > 0 {
                        gamma.view_mut((j0, i0), (d, d)).copy_from(&(g.transpose() * *scale));
                    }
                }
            }
        }
        gamma
    }

    /// Blocks `Γ_0 … Γ_{s-1}` from the last call to [`compute_cholesky`](Self::compute_cholesky)
    pub fn gamma_blocks(&self) -> &[DMatrix<f64>] {
        &self.gamma_blocks
    }

    /// Extended basis `[X; -I]` from the last call to [`compute_cholesky`](Self::compute_cholesky)
    pub fn xext(&self) -> &DMatrix<f64> {
        &self.xext
    }

    pub fn weight_blocks(&self) -> &[DMatrix<f64>] {
        &self.weight_blocks
    }

    /// Multiplier `c_r` of replica `r`
    pub fn replica_scale(&self, replica: usize) -> f64 {
        self.replica_scales[replica]
    }

    /// Backend factor used for `replica`
    pub fn factor(&self, replica: usize) -> &B {
        self.factor_for(replica)
    }

    pub fn is_shared(&self) -> bool {
        self.shared
    }

    pub fn is_factorized(&self) -> bool {
        self.factorized
    }

    pub fn bandwidth(&self) -> usize {
        self.gamma_blocks.len()
    }

    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// Order `M·d` of one replica block
    pub fn replica_order(&self) -> usize {
        self.rows_per_replica * self.d
    }

    /// Order `m·d` of the whole Gamma
    pub fn order(&self) -> usize {
        self.replicas * self.replica_order()
    }
}

/// Symmetric block-Toeplitz product for one replica
///
/// `blocks[k]` is the block at `(t, t + k)`; its transpose sits at `(t + k, t)`.
pub(crate) fn block_toeplitz_multiply(
    blocks: &[DMatrix<f64>],
    d: usize,
    y: &[f64],
    out: &mut [f64],
) {
    let m_rep = y.len() / d;
    out.fill(0.0);
    for t in 0..m_rep {
        for (lag, g) in blocks.iter().enumerate() {
            if t + lag >= m_rep {
                break;
            }
            let u = t + lag;
            for a in 0..d {
                for b in 0..d {
                    let gab = g[(a, b)];
                    if gab == 0.0 {
                        continue;
                    }
                    out[t * d + a] += gab * y[u * d + b];
                    if lag > 0 {
                        out[u * d + b] += gab * y[t * d + a];
                    }
                }
            }
        }
    }
}
