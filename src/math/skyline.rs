//! Skyline storage and LDLᵀ factorization for symmetric operators
//!
//! Row `i` stores the lower profile from its first non-zero column up to the
//! diagonal, which is the same as the column profile of the upper triangle.

use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;

/// Failed pivot during factorization
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PivotFailure {
    /// Row/column of the offending pivot (in factorization order)
    pub index: usize,
    /// Value of the pivot
    pub pivot: f64,
}

/// Symmetric matrix in skyline (variable band) storage
#[derive(Debug, Clone)]
pub struct SkylineMatrix {
    size: usize,
    // Skyline storage: for each row, store from first non-zero to diagonal
    skyline: Vec<Vec<f64>>,
    // Row heights (distance from diagonal to first non-zero on the left)
    heights: Vec<usize>,
}

impl SkylineMatrix {
    /// Build from the lower triangle of a symmetric CSR matrix
    pub fn from_csr(csr: &CsrMatrix<f64>) -> Self {
        let size = csr.nrows();

        // Compute row heights (skyline profile)
        let mut heights = vec![0usize; size];
        for (row, col, _val) in csr.triplet_iter() {
            if col < row {
                heights[row] = heights[row].max(row - col);
            }
        }

        let mut skyline: Vec<Vec<f64>> = heights.iter().map(|&h| vec![0.0; h + 1]).collect();

        // Copy values into skyline storage
        for (row, col, &val) in csr.triplet_iter() {
            if col <= row {
                let idx = col - (row - heights[row]);
                skyline[row][idx] += val;
            }
        }

        Self {
            size,
            skyline,
            heights,
        }
    }

    /// Matrix dimension
    pub fn size(&self) -> usize {
        self.size
    }

    /// Stored entries (lower profile including the diagonal)
    pub fn nnz(&self) -> usize {
        self.heights.iter().map(|h| h + 1).sum()
    }

    /// Largest row height
    pub fn max_height(&self) -> usize {
        self.heights.iter().copied().max().unwrap_or(0)
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        if col > row {
            return self.get(col, row); // Symmetric
        }
        let start = row - self.heights[row];
        if col < start {
            return 0.0;
        }
        self.skyline[row][col - start]
    }

    /// Dense copy of the full symmetric matrix
    pub fn to_dense(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.size, self.size, |i, j| self.get(i, j))
    }

    /// Factorize in place as `A = L D Lᵀ` with unit lower `L`
    ///
    /// Every pivot is compared against `tolerance · |a_ii|` as soon as it is
    /// formed, including pivots that later rows never divide by.
    pub fn factorize_ldl(mut self, tolerance: f64) -> Result<LdlSkyline, PivotFailure> {
        for i in 0..self.size {
            let hi = self.heights[i];
            let start_i = i - hi;
            let a_ii = self.skyline[i][hi];

            // Reduce row i: g_ij = a_ij - Σ_k g_ik l_jk (g_ik still unscaled)
            for j in (start_i + 1)..i {
                let start_j = j - self.heights[j];
                let start = start_i.max(start_j);

                let mut sum = 0.0;
                for k in start..j {
                    sum += self.skyline[i][k - start_i] * self.skyline[j][k - start_j];
                }
                self.skyline[i][j - start_i] -= sum;
            }

            // Scale to l_ij = g_ij / d_j and accumulate the pivot
            let mut diag = a_ii;
            for j in start_i..i {
                let d_j = self.skyline[j][self.heights[j]];
                let g_ij = self.skyline[i][j - start_i];
                let l_ij = g_ij / d_j;
                diag -= g_ij * l_ij;
                self.skyline[i][j - start_i] = l_ij;
            }

            if !diag.is_finite() || diag.abs() <= tolerance * a_ii.abs().max(f64::MIN_POSITIVE) {
                return Err(PivotFailure {
                    index: i,
                    pivot: diag,
                });
            }
            self.skyline[i][hi] = diag;
        }

        Ok(LdlSkyline { factor: self })
    }
}

/// LDLᵀ factor stored in the skyline profile of the original matrix
#[derive(Debug, Clone)]
pub struct LdlSkyline {
    factor: SkylineMatrix,
}

impl LdlSkyline {
    /// System order
    pub fn size(&self) -> usize {
        self.factor.size
    }

    /// Pivots `D`
    pub fn diagonal(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.factor.size,
            (0..self.factor.size).map(|i| self.factor.skyline[i][self.factor.heights[i]]),
        )
    }

    /// Number of negative pivots (inertia of the factorized matrix)
    pub fn negative_pivots(&self) -> usize {
        self.diagonal().iter().filter(|&&d| d < 0.0).count()
    }

    /// Solve `L D Lᵀ x = b` overwriting `x`, which holds `b` on entry
    pub fn solve_in_place(&self, x: &mut DVector<f64>) {
        let f = &self.factor;

        // Forward substitution: L * y = b
        for i in 0..f.size {
            let start = i - f.heights[i];
            let row = &f.skyline[i];

            let mut sum = 0.0;
            for j in start..i {
                sum += row[j - start] * x[j];
            }
            x[i] -= sum;
        }

        // Diagonal scaling: D * z = y
        for i in 0..f.size {
            x[i] /= f.skyline[i][f.heights[i]];
        }

        // Backward substitution: L^T * x = z
        for i in (0..f.size).rev() {
            let start = i - f.heights[i];
            let row = &f.skyline[i];
            let xi = x[i];

            for j in start..i {
                x[j] -= row[j - start] * xi;
            }
        }
    }
}
