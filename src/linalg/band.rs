//! Symmetric band storage.
//!
//! Only the upper triangle of the band is stored, column by column, with
//! leading dimension `kd + 1`: entry `(i, j)` with `j - kd <= i <= j` lives at
//! `data[j * (kd + 1) + kd + i - j]`. This is the LAPACK `UPLO = 'U'` layout,
//! so the buffer can be handed to an external `dpbtrf` unchanged.

use nalgebra::DMatrix;

use super::{LinAlgError, LinAlgResult};

#[derive(Debug, Clone, PartialEq)]
pub struct SymmetricBandMatrix {
    order: usize,
    superdiagonals: usize,
    data: Vec<f64>,
}

impl SymmetricBandMatrix {
    /// Zero band matrix. The number of superdiagonals is capped at `order - 1`.
    pub fn new(order: usize, superdiagonals: usize) -> Self {
        let superdiagonals = superdiagonals.min(order.saturating_sub(1));
        Self {
            order,
            superdiagonals,
            data: vec![0.0; order * (superdiagonals + 1)],
        }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn superdiagonals(&self) -> usize {
        self.superdiagonals
    }

    /// Leading dimension of the packed storage
    pub fn leading_dimension(&self) -> usize {
        self.superdiagonals + 1
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn fill_zero(&mut self) {
        self.data.fill(0.0);
    }

    /// Packed index of upper entry `(row, col)`; caller guarantees it is in the band.
    #[inline]
    pub(crate) fn packed_index(&self, row: usize, col: usize) -> usize {
        col * (self.superdiagonals + 1) + self.superdiagonals + row - col
    }

    fn check_upper(&self, row: usize, col: usize) -> LinAlgResult<()> {
        if row > col || col >= self.order || col - row > self.superdiagonals {
            return Err(LinAlgError::OutOfBand {
                row,
                col,
                superdiagonals: self.superdiagonals,
            });
        }
        Ok(())
    }

    /// Set upper entry `(row, col)`, `row <= col`
    pub fn set(&mut self, row: usize, col: usize, value: f64) -> LinAlgResult<()> {
        self.check_upper(row, col)?;
        let idx = self.packed_index(row, col);
        self.data[idx] = value;
        Ok(())
    }

    /// Add to upper entry `(row, col)`, `row <= col`
    pub fn add(&mut self, row: usize, col: usize, value: f64) -> LinAlgResult<()> {
        self.check_upper(row, col)?;
        let idx = self.packed_index(row, col);
        self.data[idx] += value;
        Ok(())
    }

    /// Symmetric read; entries outside the band are zero
    pub fn get(&self, row: usize, col: usize) -> f64 {
        let (i, j) = if row <= col { (row, col) } else { (col, row) };
        if j >= self.order || j - i > self.superdiagonals {
            0.0
        } else {
            self.data[self.packed_index(i, j)]
        }
    }

    /// Expand to a dense symmetric matrix
    pub fn to_dense(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.order, self.order, |i, j| self.get(i, j))
    }
}
