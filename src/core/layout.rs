//! Row permutation between the natural and reshaped layouts.
//!
//! The natural layout interleaves replicas (`row = t * k + r`); the reshaped
//! layout stores each replica contiguously (`row = r * M + t`), which keeps
//! Gamma block-banded within a replica.

use nalgebra::DMatrix;

use crate::error::{SlraError, SlraResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReshapedLayout {
    replicas: usize,
    rows_per_replica: usize,
}

impl ReshapedLayout {
    pub fn new(replicas: usize, rows_per_replica: usize) -> Self {
        Self {
            replicas,
            rows_per_replica,
        }
    }

    pub fn rows(&self) -> usize {
        self.replicas * self.rows_per_replica
    }

    /// With a single replica both layouts coincide
    pub fn is_identity(&self) -> bool {
        self.replicas <= 1
    }

    /// Reshaped row of natural row `t * k + r`
    #[inline]
    pub fn reshaped_row(&self, natural: usize) -> usize {
        let t = natural / self.replicas;
        let r = natural % self.replicas;
        r * self.rows_per_replica + t
    }

    /// Natural row of reshaped row `r * M + t`
    #[inline]
    pub fn natural_row(&self, reshaped: usize) -> usize {
        let r = reshaped / self.rows_per_replica;
        let t = reshaped % self.rows_per_replica;
        t * self.replicas + r
    }

    /// Permute row-major rows of `width` values. `forward` maps natural to
    /// reshaped, otherwise reshaped to natural.
    pub fn reshape_into(
        &self,
        src: &[f64],
        dst: &mut [f64],
        width: usize,
        forward: bool,
    ) -> SlraResult<()> {
        let len = self.rows() * width;
        SlraError::check_len("reshape source", len, src.len())?;
        SlraError::check_len("reshape destination", len, dst.len())?;

        for natural in 0..self.rows() {
            let reshaped = self.reshaped_row(natural);
            let (from, to) = if forward {
                (natural, reshaped)
            } else {
                (reshaped, natural)
            };
            dst[to * width..(to + 1) * width].copy_from_slice(&src[from * width..(from + 1) * width]);
        }
        Ok(())
    }

    pub fn reshape(&self, src: &[f64], width: usize, forward: bool) -> SlraResult<Vec<f64>> {
        let mut dst = vec![0.0; src.len()];
        self.reshape_into(src, &mut dst, width, forward)?;
        Ok(dst)
    }

    /// Row permutation of a matrix with `m` rows
    pub fn reshape_matrix(&self, matrix: &DMatrix<f64>, forward: bool) -> SlraResult<DMatrix<f64>> {
        SlraError::check_len("reshape matrix rows", self.rows(), matrix.nrows())?;
        Ok(DMatrix::from_fn(matrix.nrows(), matrix.ncols(), |i, j| {
            let from = if forward {
                self.natural_row(i)
            } else {
                self.reshaped_row(i)
            };
            matrix[(from, j)]
        }))
    }
}
