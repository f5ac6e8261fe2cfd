//! Affine structure of the data matrix.
//!
//! A structure is an ordered list of layers (Toeplitz, Hankel, unstructured
//! or exact-zero blocks of columns), replicated `k` times as a mosaic. Each
//! replica has `M` rows; rows of the natural layout are interleaved by
//! replica, row `t * k + r` being time `t` of replica `r`.
//!
//! Parameters of a layer are stored time-major: entry `b` of time step `τ` of
//! replica `r` lives at `offset + (τ * k + r) * nb + b`.

use nalgebra::DMatrix;
use std::fmt;

use crate::error::{SlraError, SlraResult};

/// Kind of a layer, each with its own fill rule and weight pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    /// Lag `j` occupies the reversed column block `L - 1 - j`
    Toeplitz,
    /// Lag `j` occupies column block `j`
    Hankel,
    /// Every entry is a separate parameter
    Unstructured,
    /// Block of exact zeros, owns no parameters
    ExactZero,
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerKind::Toeplitz => write!(f, "Toeplitz"),
            LayerKind::Hankel => write!(f, "Hankel"),
            LayerKind::Unstructured => write!(f, "Unstructured"),
            LayerKind::ExactZero => write!(f, "ExactZero"),
        }
    }
}

/// One block of columns of the structured matrix
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    kind: LayerKind,
    columns: usize,
    block_width: usize,
    inv_weight: f64,
}

impl Layer {
    /// Layer with unit inverse weight. Block width is ignored for
    /// unstructured and exact-zero layers.
    pub fn new(kind: LayerKind, columns: usize, block_width: usize) -> Self {
        Self {
            kind,
            columns,
            block_width,
            inv_weight: 1.0,
        }
    }

    pub fn hankel(columns: usize) -> Self {
        Self::new(LayerKind::Hankel, columns, 1)
    }

    pub fn toeplitz(columns: usize) -> Self {
        Self::new(LayerKind::Toeplitz, columns, 1)
    }

    pub fn unstructured(columns: usize) -> Self {
        Self::new(LayerKind::Unstructured, columns, columns)
    }

    pub fn exact_zero(columns: usize) -> Self {
        Self::new(LayerKind::ExactZero, columns, columns)
    }

    /// Set the inverse weight; zero marks an exact (noiseless) layer
    pub fn with_inv_weight(mut self, inv_weight: f64) -> Self {
        self.inv_weight = inv_weight;
        self
    }

    pub fn kind(&self) -> LayerKind {
        self.kind
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn block_width(&self) -> usize {
        self.block_width
    }

    pub fn inv_weight(&self) -> f64 {
        self.inv_weight
    }

    /// Number of lags `L = ncol / nb`
    pub fn lags(&self) -> usize {
        self.columns / self.block_width
    }

    /// Parameters of this layer are never corrected
    pub fn is_exact(&self) -> bool {
        self.kind == LayerKind::ExactZero || self.inv_weight == 0.0
    }

    /// Column inside the layer holding entry `b` of lag `lag`
    #[inline]
    fn column_of(&self, lag: usize, b: usize) -> usize {
        match self.kind {
            LayerKind::Toeplitz => (self.lags() - 1 - lag) * self.block_width + b,
            _ => lag * self.block_width + b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LayerPlacement {
    param_offset: usize,
    col_offset: usize,
    time_steps: usize,
}

/// Immutable description of the affine map `p -> S(p)`
#[derive(Debug, Clone)]
pub struct StructureModel {
    layers: Vec<Layer>,
    placements: Vec<LayerPlacement>,
    replicas: usize,
    rows_per_replica: usize,
    n_plus_d: usize,
    bandwidth: usize,
    parameter_count: usize,
    replica_inv_weights: Vec<f64>,
    weight_blocks: Vec<DMatrix<f64>>,
}

impl StructureModel {
    /// Build a mosaic of `replicas` copies of `layers`, each with `rows_per_replica` rows.
    pub fn new(
        layers: Vec<Layer>,
        replicas: usize,
        rows_per_replica: usize,
    ) -> SlraResult<Self> {
        if layers.is_empty() {
            return Err(SlraError::Configuration(
                "structure must contain at least one layer".into(),
            ));
        }
        if replicas == 0 {
            return Err(SlraError::Configuration(
                "replica count must be at least 1".into(),
            ));
        }
        if rows_per_replica == 0 {
            return Err(SlraError::Configuration(
                "rows per replica must be at least 1".into(),
            ));
        }

        let mut layers = layers;
        for (l, layer) in layers.iter_mut().enumerate() {
            if layer.columns == 0 {
                return Err(SlraError::Configuration(format!("layer {l} has no columns")));
            }
            if !layer.inv_weight.is_finite() || layer.inv_weight < 0.0 {
                return Err(SlraError::Configuration(format!(
                    "layer {l} has invalid inverse weight {}",
                    layer.inv_weight
                )));
            }
            match layer.kind {
                LayerKind::Toeplitz | LayerKind::Hankel => {
                    if layer.block_width == 0 || layer.columns % layer.block_width != 0 {
                        return Err(SlraError::Configuration(format!(
                            "layer {l} ({}): {} columns not divisible by block width {}",
                            layer.kind, layer.columns, layer.block_width
                        )));
                    }
                }
                LayerKind::Unstructured | LayerKind::ExactZero => {
                    layer.block_width = layer.columns;
                }
            }
        }
        if layers.iter().all(Layer::is_exact) {
            return Err(SlraError::Configuration(
                "structure has no layer with positive inverse weight".into(),
            ));
        }

        let mut placements = Vec::with_capacity(layers.len());
        let mut param_offset = 0;
        let mut col_offset = 0;
        for layer in &layers {
            let time_steps = match layer.kind {
                LayerKind::ExactZero => 0,
                _ => layer.lags() + rows_per_replica - 1,
            };
            placements.push(LayerPlacement {
                param_offset,
                col_offset,
                time_steps,
            });
            param_offset += time_steps * replicas * layer.block_width;
            col_offset += layer.columns;
        }

        let bandwidth = layers
            .iter()
            .filter(|layer| matches!(layer.kind, LayerKind::Toeplitz | LayerKind::Hankel))
            .map(Layer::lags)
            .max()
            .unwrap_or(1)
            .max(1);

        let mut model = Self {
            layers,
            placements,
            replicas,
            rows_per_replica,
            n_plus_d: col_offset,
            bandwidth,
            parameter_count: param_offset,
            replica_inv_weights: vec![1.0; replicas],
            weight_blocks: Vec::with_capacity(bandwidth),
        };
        model.weight_blocks = (0..bandwidth).map(|lag| model.build_weight_block(lag)).collect();
        Ok(model)
    }

    /// Per-replica inverse-weight multipliers (all 1 by default)
    pub fn with_replica_weights(mut self, inv_weights: Vec<f64>) -> SlraResult<Self> {
        SlraError::check_len("replica weights", self.replicas, inv_weights.len())?;
        if let Some(bad) = inv_weights.iter().find(|w| !w.is_finite() || **w <= 0.0) {
            return Err(SlraError::Configuration(format!(
                "replica inverse weights must be positive, got {bad}"
            )));
        }
        self.replica_inv_weights = inv_weights;
        Ok(self)
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn replicas(&self) -> usize {
        self.replicas
    }

    pub fn rows_per_replica(&self) -> usize {
        self.rows_per_replica
    }

    /// Total number of rows `m = k * M`
    pub fn rows(&self) -> usize {
        self.replicas * self.rows_per_replica
    }

    /// Number of columns `n + d`
    pub fn n_plus_d(&self) -> usize {
        self.n_plus_d
    }

    /// Block bandwidth `s` of Gamma
    pub fn bandwidth(&self) -> usize {
        self.bandwidth
    }

    /// Length `Np` of the parameter vector
    pub fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    pub fn replica_inv_weights(&self) -> &[f64] {
        &self.replica_inv_weights
    }

    /// Whether every replica carries the same weight, so one Gamma factor serves all
    pub fn has_uniform_replica_weights(&self) -> bool {
        self.replica_inv_weights
            .windows(2)
            .all(|pair| pair[0] == pair[1])
    }

    /// Weight block `W_lag`, `(n+d) x (n+d)`
    ///
    /// `None` for `lag >= s`, where the block is identically zero.
    pub fn weight_block(&self, lag: usize) -> Option<&DMatrix<f64>> {
        self.weight_blocks.get(lag)
    }

    pub fn weight_blocks(&self) -> &[DMatrix<f64>] {
        &self.weight_blocks
    }

    /// Inverse weight `c_r * inv_w` of every parameter, zero for exact layers
    pub fn parameter_inv_weights(&self) -> Vec<f64> {
        let mut weights = vec![0.0; self.parameter_count];
        for (l, (layer, place)) in self.layers.iter().zip(&self.placements).enumerate() {
            if layer.is_exact() {
                continue;
            }
            for time in 0..place.time_steps {
                for (r, c_r) in self.replica_inv_weights.iter().enumerate() {
                    for b in 0..layer.block_width {
                        weights[self.param_index(l, time, r, b)] = c_r * layer.inv_weight;
                    }
                }
            }
        }
        weights
    }

    /// Check `0 < rank < n + d` and return `d = n + d - rank`
    pub fn validate_rank(&self, rank: usize) -> SlraResult<usize> {
        if rank == 0 || rank >= self.n_plus_d {
            return Err(SlraError::Configuration(format!(
                "rank {rank} outside (0, {})",
                self.n_plus_d
            )));
        }
        Ok(self.n_plus_d - rank)
    }

    fn build_weight_block(&self, lag: usize) -> DMatrix<f64> {
        let mut w = DMatrix::zeros(self.n_plus_d, self.n_plus_d);
        for (layer, place) in self.layers.iter().zip(&self.placements) {
            let c0 = place.col_offset;
            let offset = layer.block_width * lag;
            match layer.kind {
                LayerKind::Hankel if offset < layer.columns => {
                    for i in 0..layer.columns - offset {
                        w[(c0 + i + offset, c0 + i)] = layer.inv_weight;
                    }
                }
                LayerKind::Toeplitz if offset < layer.columns => {
                    for i in 0..layer.columns - offset {
                        w[(c0 + i, c0 + i + offset)] = layer.inv_weight;
                    }
                }
                LayerKind::Unstructured if lag == 0 => {
                    for i in 0..layer.columns {
                        w[(c0 + i, c0 + i)] = layer.inv_weight;
                    }
                }
                _ => {}
            }
        }
        w
    }

    #[inline]
    fn param_index(&self, l: usize, time: usize, replica: usize, b: usize) -> usize {
        let nb = self.layers[l].block_width;
        self.placements[l].param_offset + (time * self.replicas + replica) * nb + b
    }

    /// Scatter `p` into the structured matrix `S(p)` (natural row layout)
    pub fn fill_matrix(&self, p: &[f64]) -> SlraResult<DMatrix<f64>> {
        SlraError::check_len("parameter vector", self.parameter_count, p.len())?;
        let k = self.replicas;
        let mut s = DMatrix::zeros(self.rows(), self.n_plus_d);

        for (l, (layer, place)) in self.layers.iter().zip(&self.placements).enumerate() {
            if layer.kind == LayerKind::ExactZero {
                continue;
            }
            for r in 0..k {
                for t in 0..self.rows_per_replica {
                    let row = t * k + r;
                    for lag in 0..layer.lags() {
                        for b in 0..layer.block_width {
                            let col = place.col_offset + layer.column_of(lag, b);
                            s[(row, col)] = p[self.param_index(l, t + lag, r, b)];
                        }
                    }
                }
            }
        }
        Ok(s)
    }

    /// Gather the parameter vector back from a structured matrix
    ///
    /// Each parameter is read at its first occurrence, so this inverts
    /// [`fill_matrix`](Self::fill_matrix) on matrices that have the structure.
    pub fn parameters_from_matrix(&self, s: &DMatrix<f64>) -> SlraResult<Vec<f64>> {
        SlraError::check_len("structured matrix rows", self.rows(), s.nrows())?;
        SlraError::check_len("structured matrix columns", self.n_plus_d, s.ncols())?;
        let k = self.replicas;
        let last_t = self.rows_per_replica - 1;
        let mut p = vec![0.0; self.parameter_count];

        for (l, (layer, place)) in self.layers.iter().zip(&self.placements).enumerate() {
            for r in 0..k {
                for time in 0..place.time_steps {
                    let (t, lag) = if time <= last_t {
                        (time, 0)
                    } else {
                        (last_t, time - last_t)
                    };
                    for b in 0..layer.block_width {
                        let col = place.col_offset + layer.column_of(lag, b);
                        p[self.param_index(l, time, r, b)] = s[(t * k + r, col)];
                    }
                }
            }
        }
        Ok(p)
    }

    /// Adjoint scatter of a Gamma-whitened residual
    ///
    /// `y` is `Gamma(X)^{-1} (S(p) Xext)` in natural row layout (`m x d`).
    /// Every occurrence of a raw parameter accumulates `c_r * inv_w * (Xext y_row)`
    /// at the column where [`fill_matrix`](Self::fill_matrix) placed it, which
    /// gives the minimal weighted-norm `Δp` with `S(p - Δp) Xext = 0`.
    pub fn correction_from_residual(
        &self,
        y: &DMatrix<f64>,
        x: &DMatrix<f64>,
    ) -> SlraResult<Vec<f64>> {
        SlraError::check_len("X columns", y.ncols(), x.ncols())?;
        SlraError::check_len("X rows", self.n_plus_d.saturating_sub(y.ncols()), x.nrows())?;
        self.correction_from_kernel(y, &extended_basis(x))
    }

    /// [`correction_from_residual`](Self::correction_from_residual) for an
    /// arbitrary kernel basis `K` (`(n+d) x d`), giving `S(p - Δp) K = 0`
    ///
    /// A column map `Φ` enters here as `K = Φ Xext`.
    pub fn correction_from_kernel(
        &self,
        y: &DMatrix<f64>,
        kernel: &DMatrix<f64>,
    ) -> SlraResult<Vec<f64>> {
        let d = y.ncols();
        SlraError::check_len("residual rows", self.rows(), y.nrows())?;
        SlraError::check_len("kernel rows", self.n_plus_d, kernel.nrows())?;
        SlraError::check_len("kernel columns", d, kernel.ncols())?;

        let k = self.replicas;
        let mut dp = vec![0.0; self.parameter_count];
        let mut v = Vec::new();

        for (l, (layer, place)) in self.layers.iter().zip(&self.placements).enumerate() {
            if layer.is_exact() {
                continue;
            }
            v.resize(layer.columns, 0.0);
            for r in 0..k {
                let scale = layer.inv_weight * self.replica_inv_weights[r];
                for t in 0..self.rows_per_replica {
                    let row = t * k + r;
                    for (c, vc) in v.iter_mut().enumerate() {
                        *vc = (0..d)
                            .map(|e| kernel[(place.col_offset + c, e)] * y[(row, e)])
                            .sum();
                    }
                    for lag in 0..layer.lags() {
                        for b in 0..layer.block_width {
                            dp[self.param_index(l, t + lag, r, b)] +=
                                scale * v[layer.column_of(lag, b)];
                        }
                    }
                }
            }
        }
        Ok(dp)
    }

    /// `p - Δp` with `Δp` from [`correction_from_residual`](Self::correction_from_residual)
    pub fn corrected_parameters(
        &self,
        p: &[f64],
        y: &DMatrix<f64>,
        x: &DMatrix<f64>,
    ) -> SlraResult<Vec<f64>> {
        SlraError::check_len("parameter vector", self.parameter_count, p.len())?;
        let dp = self.correction_from_residual(y, x)?;
        Ok(p.iter().zip(&dp).map(|(pi, dpi)| pi - dpi).collect())
    }
}

impl fmt::Display for StructureModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} layer(s) x {} replica(s), m = {}, n+d = {}, s = {}, Np = {}",
            self.layers.len(),
            self.replicas,
            self.rows(),
            self.n_plus_d,
            self.bandwidth,
            self.parameter_count
        )
    }
}

/// Extended basis `[X; -I_d]`
pub fn extended_basis(x: &DMatrix<f64>) -> DMatrix<f64> {
    let (n, d) = x.shape();
    let mut xext = DMatrix::zeros(n + d, d);
    xext.view_mut((0, 0), (n, d)).copy_from(x);
    for c in 0..d {
        xext[(n + c, c)] = -1.0;
    }
    xext
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize) -> Vec<f64> {
        (0..n).map(|i| 1.0 + i as f64).collect()
    }

    #[test]
    fn test_hankel_fill() {
        let s = StructureModel::new(vec![Layer::hankel(3)], 1, 4).unwrap();
        assert_eq!(s.parameter_count(), 6);
        assert_eq!(s.bandwidth(), 3);

        let m = s.fill_matrix(&ramp(6)).unwrap();
        for i in 0..4 {
            for j in 0..3 {
                assert_eq!(m[(i, j)], (1 + i + j) as f64);
            }
        }
    }

    #[test]
    fn test_toeplitz_fill_reverses_lags() {
        let s = StructureModel::new(vec![Layer::toeplitz(3)], 1, 2).unwrap();
        let m = s.fill_matrix(&ramp(4)).unwrap();
        // row t: [p(t+2), p(t+1), p(t)]
        assert_eq!(m.row(0).iter().copied().collect::<Vec<_>>(), vec![3.0, 2.0, 1.0]);
        assert_eq!(m.row(1).iter().copied().collect::<Vec<_>>(), vec![4.0, 3.0, 2.0]);
    }

    #[test]
    fn test_block_hankel_fill() {
        let s = StructureModel::new(vec![Layer::new(LayerKind::Hankel, 4, 2)], 1, 3).unwrap();
        assert_eq!(s.bandwidth(), 2);
        assert_eq!(s.parameter_count(), 8);
        let m = s.fill_matrix(&ramp(8)).unwrap();
        // row t = [p(t), p(t+1)] with 2-vectors p(τ) = (2τ+1, 2τ+2)
        assert_eq!(m.row(1).iter().copied().collect::<Vec<_>>(), vec![3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_mosaic_rows_are_interleaved() {
        let s = StructureModel::new(vec![Layer::hankel(2)], 2, 3).unwrap();
        assert_eq!(s.parameter_count(), 8);
        let m = s.fill_matrix(&ramp(8)).unwrap();
        // replica 0 uses odd-numbered entries 1,3,5,7; replica 1 uses 2,4,6,8
        assert_eq!(m[(0, 0)], 1.0);
        assert_eq!(m[(0, 1)], 3.0);
        assert_eq!(m[(1, 0)], 2.0);
        assert_eq!(m[(1, 1)], 4.0);
        assert_eq!(m[(4, 1)], 7.0);
        assert_eq!(m[(5, 1)], 8.0);
    }

    #[test]
    fn test_unstructured_and_exact_zero_layers() {
        let layers = vec![Layer::hankel(2), Layer::exact_zero(1), Layer::unstructured(2)];
        let s = StructureModel::new(layers, 1, 3).unwrap();
        assert_eq!(s.n_plus_d(), 5);
        assert_eq!(s.parameter_count(), 4 + 6);
        let m = s.fill_matrix(&ramp(10)).unwrap();
        for i in 0..3 {
            assert_eq!(m[(i, 2)], 0.0);
            assert_eq!(m[(i, 3)], (5 + 2 * i) as f64);
            assert_eq!(m[(i, 4)], (6 + 2 * i) as f64);
        }
    }

    #[test]
    fn test_parameters_round_trip() {
        let layers = vec![
            Layer::new(LayerKind::Toeplitz, 4, 2),
            Layer::hankel(3),
            Layer::exact_zero(2),
            Layer::unstructured(1),
        ];
        let s = StructureModel::new(layers, 3, 5).unwrap();
        let p: Vec<f64> = (0..s.parameter_count()).map(|i| (i as f64 * 0.7).cos()).collect();
        let m = s.fill_matrix(&p).unwrap();
        assert_eq!(s.parameters_from_matrix(&m).unwrap(), p);
    }

    #[test]
    fn test_zero_residual_leaves_parameters_unchanged() {
        let s = StructureModel::new(vec![Layer::hankel(3), Layer::toeplitz(2)], 2, 4).unwrap();
        let p = ramp(s.parameter_count());
        let x = DMatrix::from_row_slice(3, 2, &[0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
        let y = DMatrix::zeros(s.rows(), 2);
        assert_eq!(s.corrected_parameters(&p, &y, &x).unwrap(), p);
    }

    #[test]
    fn test_indivisible_columns_are_rejected() {
        let err = StructureModel::new(vec![Layer::new(LayerKind::Hankel, 5, 2)], 1, 4).unwrap_err();
        assert!(matches!(err, SlraError::Configuration(_)));
    }

    #[test]
    fn test_invalid_structures_are_rejected() {
        assert!(StructureModel::new(vec![], 1, 3).is_err());
        assert!(StructureModel::new(vec![Layer::hankel(2)], 0, 3).is_err());
        assert!(StructureModel::new(vec![Layer::hankel(2)], 1, 0).is_err());
        assert!(StructureModel::new(vec![Layer::hankel(2).with_inv_weight(-1.0)], 1, 3).is_err());
        assert!(StructureModel::new(vec![Layer::hankel(2).with_inv_weight(0.0)], 1, 3).is_err());
        assert!(StructureModel::new(vec![Layer::exact_zero(2)], 1, 3).is_err());
    }

    #[test]
    fn test_rank_validation() {
        let s = StructureModel::new(vec![Layer::hankel(4)], 1, 10).unwrap();
        assert_eq!(s.validate_rank(3).unwrap(), 1);
        assert!(s.validate_rank(0).is_err());
        assert!(s.validate_rank(4).is_err());
    }

    #[test]
    fn test_weight_blocks() {
        let layers = vec![Layer::hankel(3).with_inv_weight(2.0), Layer::toeplitz(2), Layer::unstructured(1)];
        let s = StructureModel::new(layers, 1, 6).unwrap();
        assert_eq!(s.bandwidth(), 3);

        let w0 = s.weight_block(0).unwrap();
        assert_eq!(w0[(0, 0)], 2.0);
        assert_eq!(w0[(3, 3)], 1.0);
        assert_eq!(w0[(5, 5)], 1.0);

        let w1 = s.weight_block(1).unwrap();
        // Hankel shifts down, Toeplitz shifts right, unstructured vanishes
        assert_eq!(w1[(1, 0)], 2.0);
        assert_eq!(w1[(2, 1)], 2.0);
        assert_eq!(w1[(0, 1)], 0.0);
        assert_eq!(w1[(3, 4)], 1.0);
        assert_eq!(w1[(5, 5)], 0.0);

        let w2 = s.weight_block(2).unwrap();
        assert_eq!(w2[(2, 0)], 2.0);
        assert_eq!(w2.iter().filter(|v| **v != 0.0).count(), 1);

        // beyond the bandwidth the block is zero and not stored
        assert!(s.weight_block(3).is_none());
        assert!(s.weight_block(usize::MAX).is_none());
    }

    #[test]
    fn test_replica_weights() {
        let s = StructureModel::new(vec![Layer::hankel(2)], 3, 4).unwrap();
        assert!(s.has_uniform_replica_weights());
        let s = s.with_replica_weights(vec![1.0, 2.0, 1.0]).unwrap();
        assert!(!s.has_uniform_replica_weights());

        let s = StructureModel::new(vec![Layer::hankel(2)], 3, 4).unwrap();
        assert!(s.clone().with_replica_weights(vec![1.0, 1.0]).is_err());
        assert!(s.with_replica_weights(vec![1.0, 0.0, 1.0]).is_err());
    }

    #[test]
    fn test_parameter_inv_weights() {
        let layers = vec![
            Layer::hankel(2).with_inv_weight(2.0),
            Layer::exact_zero(1),
            Layer::unstructured(1).with_inv_weight(0.0),
        ];
        let s = StructureModel::new(layers, 2, 3)
            .unwrap()
            .with_replica_weights(vec![1.0, 0.5])
            .unwrap();
        let w = s.parameter_inv_weights();
        assert_eq!(w.len(), s.parameter_count());
        // Hankel: 4 time steps x 2 replicas, interleaved by replica
        assert_eq!(&w[..8], &[2.0, 1.0, 2.0, 1.0, 2.0, 1.0, 2.0, 1.0]);
        assert!(w[8..].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_correction_from_kernel_matches_extended_basis() {
        let s = StructureModel::new(vec![Layer::hankel(3)], 1, 5).unwrap();
        let x = DMatrix::from_row_slice(2, 1, &[0.5, -0.25]);
        let y = DMatrix::from_fn(5, 1, |i, _| 1.0 + i as f64);
        let from_x = s.correction_from_residual(&y, &x).unwrap();
        let from_kernel = s.correction_from_kernel(&y, &extended_basis(&x)).unwrap();
        assert_eq!(from_x, from_kernel);
        assert!(s.correction_from_kernel(&y, &DMatrix::zeros(2, 1)).is_err());
    }

    #[test]
    fn test_extended_basis() {
        let x = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let xext = extended_basis(&x);
        let expected = DMatrix::from_row_slice(
            4,
            2,
            &[1.0, 2.0, 3.0, 4.0, -1.0, 0.0, 0.0, -1.0],
        );
        assert_eq!(xext, expected);
    }
}
