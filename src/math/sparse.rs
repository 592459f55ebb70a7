//! Sparse matrix utilities for operator assembly and products
//!
//! Structural mass, damping and stiffness operators are typically 95-99% sparse.
//! They are exchanged as CSR matrices and only converted into a solver-specific
//! layout (skyline, compressed column) when a factorization is requested.

use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CsrMatrix};

use crate::error::{FEAError, FEAResult};

/// Sparse matrix builder using COO format
/// More efficient for incremental assembly
pub struct SparseMatrixBuilder {
    size: usize,
    entries: Vec<(usize, usize, f64)>,
}

impl SparseMatrixBuilder {
    /// Create a new sparse matrix builder
    pub fn new(size: usize) -> Self {
        // Banded structural operators: a handful of couplings per dof
        let estimated_nnz = size * 8;
        Self {
            size,
            entries: Vec::with_capacity(estimated_nnz),
        }
    }

    /// Matrix dimension
    pub fn size(&self) -> usize {
        self.size
    }

    /// Add a value to the matrix (accumulates if already exists)
    ///
    /// Only exact zeros are skipped; operators in small units keep every term.
    #[inline]
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        if value != 0.0 {
            self.entries.push((row, col, value));
        }
    }

    /// Add a value and its mirror entry across the diagonal
    #[inline]
    pub fn add_symmetric(&mut self, row: usize, col: usize, value: f64) {
        self.add(row, col, value);
        if row != col {
            self.add(col, row, value);
        }
    }

    /// Add values from a small fixed-size element matrix
    pub fn add_element_matrix<const N: usize>(
        &mut self,
        dofs: &[usize; N],
        k_elem: &[[f64; N]; N],
    ) {
        for (i, &di) in dofs.iter().enumerate() {
            for (j, &dj) in dofs.iter().enumerate() {
                self.add(di, dj, k_elem[i][j]);
            }
        }
    }

    /// Add every stored entry of `matrix`, scaled by `factor`
    pub fn add_scaled(&mut self, matrix: &CsrMatrix<f64>, factor: f64) {
        if factor == 0.0 {
            return;
        }
        for (row, col, &val) in matrix.triplet_iter() {
            self.add(row, col, factor * val);
        }
    }

    /// Convert to CSR format; duplicate entries are summed
    pub fn to_csr(&self) -> CsrMatrix<f64> {
        let mut coo = CooMatrix::new(self.size, self.size);

        for &(row, col, val) in &self.entries {
            coo.push(row, col, val);
        }

        CsrMatrix::from(&coo)
    }

    /// Convert to dense matrix (for comparison/debugging)
    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut mat = DMatrix::zeros(self.size, self.size);

        for &(row, col, val) in &self.entries {
            mat[(row, col)] += val;
        }

        mat
    }

    /// Get estimated non-zero count
    pub fn nnz(&self) -> usize {
        self.entries.len()
    }
}

/// Build a CSR matrix from a dense one, dropping exact zeros
pub fn csr_from_dense(dense: &DMatrix<f64>) -> CsrMatrix<f64> {
    let mut builder = SparseMatrixBuilder::new(dense.nrows());
    for i in 0..dense.nrows() {
        for j in 0..dense.ncols() {
            builder.add(i, j, dense[(i, j)]);
        }
    }
    builder.to_csr()
}

/// Diagonal CSR matrix
pub fn csr_diagonal(values: &[f64]) -> CsrMatrix<f64> {
    let mut builder = SparseMatrixBuilder::new(values.len());
    for (i, &v) in values.iter().enumerate() {
        builder.add(i, i, v);
    }
    builder.to_csr()
}

/// Weighted sum `Σ w_k · A_k` of equally sized square operators
pub fn linear_combination(terms: &[(f64, &CsrMatrix<f64>)]) -> FEAResult<CsrMatrix<f64>> {
    let size = match terms.first() {
        Some((_, m)) => m.nrows(),
        None => return Err(FEAError::InvalidInput("empty linear combination".to_string())),
    };

    let mut builder = SparseMatrixBuilder::new(size);
    for &(factor, matrix) in terms {
        if matrix.nrows() != size || matrix.ncols() != size {
            return Err(FEAError::dimension(size, matrix.nrows().max(matrix.ncols())));
        }
        builder.add_scaled(matrix, factor);
    }

    Ok(builder.to_csr())
}

/// Sparse matrix-vector multiplication
#[inline]
pub fn sparse_matvec(csr: &CsrMatrix<f64>, x: &DVector<f64>) -> DVector<f64> {
    let n = csr.nrows();
    let mut y = DVector::zeros(n);

    let row_offsets = csr.row_offsets();
    let col_indices = csr.col_indices();
    let values = csr.values();

    for row in 0..n {
        let start = row_offsets[row];
        let end = row_offsets[row + 1];

        let mut sum = 0.0;
        for idx in start..end {
            sum += values[idx] * x[col_indices[idx]];
        }
        y[row] = sum;
    }

    y
}

/// Checked variant of [`sparse_matvec`]
pub fn checked_matvec(csr: &CsrMatrix<f64>, x: &DVector<f64>) -> FEAResult<DVector<f64>> {
    if csr.ncols() != x.len() {
        return Err(FEAError::dimension(csr.ncols(), x.len()));
    }
    Ok(sparse_matvec(csr, x))
}

/// Check `|A_ij - A_ji| <= tol * max|A|` for every stored entry
pub fn is_symmetric(csr: &CsrMatrix<f64>, tol: f64) -> bool {
    if csr.nrows() != csr.ncols() {
        return false;
    }
    let scale = csr
        .values()
        .iter()
        .fold(0.0_f64, |acc, v| acc.max(v.abs()))
        .max(f64::MIN_POSITIVE);

    let transpose = csr.transpose();
    csr.triplet_iter().all(|(i, j, &v)| {
        let mirror = transpose
            .get_entry(i, j)
            .map(|e| e.into_value())
            .unwrap_or(0.0);
        (v - mirror).abs() <= tol * scale
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sparse_builder() {
        let mut builder = SparseMatrixBuilder::new(4);
        builder.add(0, 0, 4.0);
        builder.add(0, 1, 1.0);
        builder.add(1, 0, 1.0);
        builder.add(1, 1, 3.0);
        builder.add(1, 2, 1.0);
        builder.add(2, 1, 1.0);
        builder.add(2, 2, 2.0);
        builder.add(3, 3, 1.0);

        let dense = builder.to_dense();
        assert!((dense[(0, 0)] - 4.0).abs() < 1e-10);
        assert!((dense[(1, 1)] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_duplicates_are_summed() {
        let mut builder = SparseMatrixBuilder::new(2);
        builder.add(0, 0, 1.5);
        builder.add(0, 0, 2.5);
        builder.add_symmetric(0, 1, -1.0);

        let csr = builder.to_csr();
        assert_eq!(csr.nnz(), 3);
        assert_relative_eq!(csr.get_entry(0, 0).unwrap().into_value(), 4.0);
        assert_relative_eq!(csr.get_entry(1, 0).unwrap().into_value(), -1.0);
    }

    #[test]
    fn test_linear_combination() {
        let m = csr_diagonal(&[2.0, 2.0]);
        let mut kb = SparseMatrixBuilder::new(2);
        kb.add_element_matrix(&[0, 1], &[[3.0, -3.0], [-3.0, 3.0]]);
        let k = kb.to_csr();

        let eff = linear_combination(&[(10.0, &m), (1.0, &k)]).unwrap();
        let x = DVector::from_vec(vec![1.0, -1.0]);
        let y = sparse_matvec(&eff, &x);

        assert_relative_eq!(y[0], 20.0 + 6.0, epsilon = 1e-12);
        assert_relative_eq!(y[1], -20.0 - 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_small_unit_entries_are_kept() {
        let m = csr_diagonal(&[1e-18, 2e-18]);
        let c = csr_diagonal(&[1e-20, 0.0]);
        assert_eq!(m.nnz(), 2);
        assert_eq!(c.nnz(), 1);

        let eff = linear_combination(&[(4.0, &m), (0.5, &c)]).unwrap();
        assert_eq!(eff.nnz(), 2);
        assert_relative_eq!(eff.get_entry(0, 0).unwrap().into_value(), 4e-18 + 0.5e-20);
        assert_relative_eq!(eff.get_entry(1, 1).unwrap().into_value(), 8e-18);
    }

    #[test]
    fn test_linear_combination_rejects_mismatch() {
        let a = csr_diagonal(&[1.0, 1.0]);
        let b = csr_diagonal(&[1.0, 1.0, 1.0]);
        assert!(matches!(
            linear_combination(&[(1.0, &a), (1.0, &b)]),
            Err(FEAError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_symmetry_check() {
        let mut builder = SparseMatrixBuilder::new(2);
        builder.add(0, 0, 1.0);
        builder.add(0, 1, 2.0);
        builder.add(1, 1, 1.0);
        assert!(!is_symmetric(&builder.to_csr(), 1e-12));

        builder.add(1, 0, 2.0);
        assert!(is_symmetric(&builder.to_csr(), 1e-12));
    }
}
