//! Sparse LDLᵀ factorization on compressed-column storage
//!
//! The symbolic pass walks the elimination tree to size each column of `L`;
//! the numeric pass computes one row of `L` at a time from the reach of that
//! row in the tree. Only entries on or above the diagonal of each column are
//! read, so a full symmetric CSR matrix can be passed directly (its rows are
//! the columns of the upper triangle).

use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;

use super::skyline::PivotFailure;

const NONE: usize = usize::MAX;

/// Factor `A = L D Lᵀ` in compressed-column form
#[derive(Debug, Clone)]
pub struct LdlCsc {
    size: usize,
    /// Column pointers of `L`
    lp: Vec<usize>,
    /// Row indices of `L`
    li: Vec<usize>,
    /// Values of `L` (unit diagonal not stored)
    lx: Vec<f64>,
    /// Pivots
    d: Vec<f64>,
    /// Elimination tree
    parent: Vec<usize>,
}

impl LdlCsc {
    /// Factorize a symmetric matrix; pivots with
    /// `|d_k| <= tolerance · |a_kk|` are rejected
    pub fn factorize(csr: &CsrMatrix<f64>, tolerance: f64) -> Result<Self, PivotFailure> {
        let n = csr.nrows();
        let ap = csr.row_offsets();
        let ai = csr.col_indices();
        let ax = csr.values();

        // Symbolic: elimination tree and column counts
        let mut parent = vec![NONE; n];
        let mut flag = vec![NONE; n];
        let mut lnz = vec![0usize; n];

        for k in 0..n {
            flag[k] = k;
            for &col in &ai[ap[k]..ap[k + 1]] {
                let mut i = col;
                if i < k {
                    while flag[i] != k {
                        if parent[i] == NONE {
                            parent[i] = k;
                        }
                        lnz[i] += 1;
                        flag[i] = k;
                        i = parent[i];
                    }
                }
            }
        }

        let mut lp = vec![0usize; n + 1];
        for k in 0..n {
            lp[k + 1] = lp[k] + lnz[k];
        }

        // Numeric: up-looking, row k of L from the reach of column k
        let nnz = lp[n];
        let mut li = vec![0usize; nnz];
        let mut lx = vec![0.0; nnz];
        let mut d = vec![0.0; n];
        let mut y = vec![0.0; n];
        let mut pattern = vec![0usize; n];
        flag.fill(NONE);
        lnz.fill(0);

        for k in 0..n {
            y[k] = 0.0;
            let mut top = n;
            flag[k] = k;
            let mut a_kk = 0.0;

            for p in ap[k]..ap[k + 1] {
                let mut i = ai[p];
                if i > k {
                    continue;
                }
                if i == k {
                    a_kk += ax[p];
                }
                y[i] += ax[p];

                let mut len = 0;
                while flag[i] != k {
                    pattern[len] = i;
                    len += 1;
                    flag[i] = k;
                    i = parent[i];
                }
                while len > 0 {
                    top -= 1;
                    len -= 1;
                    pattern[top] = pattern[len];
                }
            }

            d[k] = y[k];
            y[k] = 0.0;

            while top < n {
                let i = pattern[top];
                let yi = y[i];
                y[i] = 0.0;

                let p2 = lp[i] + lnz[i];
                for p in lp[i]..p2 {
                    y[li[p]] -= lx[p] * yi;
                }

                let l_ki = yi / d[i];
                d[k] -= l_ki * yi;
                li[p2] = k;
                lx[p2] = l_ki;
                lnz[i] += 1;
                top += 1;
            }

            if !d[k].is_finite() || d[k].abs() <= tolerance * f64::abs(a_kk).max(f64::MIN_POSITIVE) {
                return Err(PivotFailure {
                    index: k,
                    pivot: d[k],
                });
            }
        }

        Ok(Self {
            size: n,
            lp,
            li,
            lx,
            d,
            parent,
        })
    }

    /// System order
    pub fn size(&self) -> usize {
        self.size
    }

    /// Off-diagonal non-zeros of `L`
    pub fn nnz_factor(&self) -> usize {
        self.lp[self.size]
    }

    /// Parent of column `k` in the elimination tree, `None` for a root
    pub fn etree_parent(&self, k: usize) -> Option<usize> {
        match self.parent[k] {
            NONE => None,
            p => Some(p),
        }
    }

    /// Pivots `D`
    pub fn diagonal(&self) -> DVector<f64> {
        DVector::from_column_slice(&self.d)
    }

    /// Solve `L D Lᵀ x = b` overwriting `x`, which holds `b` on entry
    pub fn solve_in_place(&self, x: &mut DVector<f64>) {
        for j in 0..self.size {
            let xj = x[j];
            for p in self.lp[j]..self.lp[j + 1] {
                x[self.li[p]] -= self.lx[p] * xj;
            }
        }

        for j in 0..self.size {
            x[j] /= self.d[j];
        }

        for j in (0..self.size).rev() {
            let mut sum = 0.0;
            for p in self.lp[j]..self.lp[j + 1] {
                sum += self.lx[p] * x[self.li[p]];
            }
            x[j] -= sum;
        }
    }
}
