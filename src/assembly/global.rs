//! Accumulation of scalar contributions into the global sparse matrix.
use crate::assembly::ContributionSink;
use crate::Real;
use log::{debug, warn};
use nalgebra::DMatrix;
use nalgebra_sparse::{CooMatrix, CsrMatrix};

/// Collects `(row, column, value)` contributions and turns them into a CSR matrix.
///
/// Duplicate contributions to the same entry are summed when the matrix is finalized. Explicitly
/// contributed zeros are kept as stored entries, so the sparsity pattern of the result is exactly
/// the set of entries that received a contribution.
#[derive(Debug, Clone)]
pub struct LorMatrixBuilder<T> {
    coo: CooMatrix<T>,
}

impl<T: Real> LorMatrixBuilder<T> {
    pub fn new(nrows: usize, ncols: usize) -> Self {
        Self {
            coo: CooMatrix::new(nrows, ncols),
        }
    }

    pub fn nrows(&self) -> usize {
        self.coo.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.coo.ncols()
    }

    /// Number of contributions pushed so far, duplicates included.
    pub fn nnz_pushed(&self) -> usize {
        self.coo.nnz()
    }

    /// Adds `value` to the entry `(row, col)`.
    ///
    /// # Panics
    ///
    /// Panics if the indices are out of bounds.
    pub fn add(&mut self, row: usize, col: usize, value: T) {
        self.coo.push(row, col, value);
    }

    pub fn add_triplets(&mut self, triplets: impl IntoIterator<Item = (usize, usize, T)>) {
        for (i, j, v) in triplets {
            self.coo.push(i, j, v);
        }
    }

    /// Adds a dense local matrix whose rows and columns correspond to the given global indices.
    pub fn add_local_matrix(&mut self, indices: &[usize], local: &DMatrix<T>) {
        assert_eq!(local.nrows(), indices.len(), "Local matrix rows must match indices");
        assert_eq!(local.ncols(), indices.len(), "Local matrix columns must match indices");
        for (j_local, &j) in indices.iter().enumerate() {
            for (i_local, &i) in indices.iter().enumerate() {
                self.coo.push(i, j, local[(i_local, j_local)]);
            }
        }
    }

    /// Sums duplicates, eliminates the essential degrees of freedom and returns the CSR matrix.
    pub fn finalize(self, essential_dofs: &[usize]) -> CsrMatrix<T> {
        let pushed = self.coo.nnz();
        let mut csr = CsrMatrix::from(&self.coo);
        debug!(
            "Finalized {}x{} LOR matrix: {} contributions summed into {} stored entries",
            csr.nrows(),
            csr.ncols(),
            pushed,
            csr.nnz()
        );
        eliminate_rows_and_columns_csr(&mut csr, essential_dofs);
        csr
    }
}

impl<T: Real> ContributionSink<T> for LorMatrixBuilder<T> {
    #[inline(always)]
    fn add(&mut self, row: usize, col: usize, value: T) {
        self.coo.push(row, col, value);
    }
}

/// Zeros every off-diagonal entry in the rows and columns of the essential degrees of freedom,
/// keeping their diagonal entries.
///
/// The sparsity pattern is left unchanged. Indices outside the matrix are ignored with a warning.
/// Applying the elimination twice gives the same matrix as applying it once.
pub fn eliminate_rows_and_columns_csr<T: Real>(matrix: &mut CsrMatrix<T>, essential_dofs: &[usize]) {
    let n = matrix.nrows().min(matrix.ncols());
    let mut is_essential = vec![false; matrix.nrows().max(matrix.ncols())];
    let mut num_ignored = 0;
    for &dof in essential_dofs {
        if dof < n {
            is_essential[dof] = true;
        } else {
            num_ignored += 1;
        }
    }
    if num_ignored > 0 {
        warn!(
            "Ignored {} essential degrees of freedom outside of the {}x{} matrix",
            num_ignored,
            matrix.nrows(),
            matrix.ncols()
        );
    }

    if !is_essential.iter().any(|&e| e) {
        return;
    }

    // Single pass over all stored entries, since the pattern need not be symmetric
    for (row_index, mut row) in matrix.row_iter_mut().enumerate() {
        let row_is_essential = is_essential[row_index];
        let (cols, values) = row.cols_and_values_mut();
        for (&col_index, value) in cols.iter().zip(values) {
            if col_index != row_index && (row_is_essential || is_essential[col_index]) {
                *value = T::zero();
            }
        }
    }
}
