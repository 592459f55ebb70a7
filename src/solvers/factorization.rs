use nalgebra_sparse::CsrMatrix;

use super::SolverOptions;
use crate::math::ordering::{permute_symmetric, permute_vector, unpermute_vector};
use crate::math::{LdlCsc, LdlSkyline, Mat, PivotFailure, Reordering, SkylineMatrix, Vec as FEVec};

/// A factorized operator that can be reused for many right-hand sides
pub trait Factorization: Sized {
    /// Short name used in logs
    const NAME: &'static str;

    /// Reordering used when the options leave it unset
    const DEFAULT_REORDERING: Reordering;

    /// Factorize `matrix`; pivot failures are reported in the original dof numbering
    fn factorize(matrix: &CsrMatrix<f64>, options: &SolverOptions) -> Result<Self, PivotFailure>;

    fn size(&self) -> usize;

    /// Solve for `b`, writing into `x`
    fn solve_into(&self, b: &FEVec, x: &mut FEVec);

    /// Solve for every column of `b`
    fn solve_multiple(&self, b: &Mat) -> Mat {
        let mut x = Mat::zeros(b.nrows(), b.ncols());
        let mut column = FEVec::zeros(b.nrows());
        for j in 0..b.ncols() {
            self.solve_into(&b.column(j).into_owned(), &mut column);
            x.set_column(j, &column);
        }
        x
    }
}

/// Apply the configured reordering, then hand the permuted operator to `kernel`
fn factorize_permuted<K>(
    matrix: &CsrMatrix<f64>,
    reordering: Reordering,
    kernel: impl FnOnce(&CsrMatrix<f64>) -> Result<K, PivotFailure>,
) -> Result<(K, Option<Vec<usize>>), PivotFailure> {
    match reordering.permutation(matrix) {
        None => Ok((kernel(matrix)?, None)),
        Some(perm) => {
            let factor = kernel(&permute_symmetric(matrix, &perm)).map_err(|failure| PivotFailure {
                index: perm[failure.index],
                pivot: failure.pivot,
            })?;
            Ok((factor, Some(perm)))
        }
    }
}

fn solve_permuted(perm: Option<&[usize]>, b: &FEVec, x: &mut FEVec, kernel: impl Fn(&mut FEVec)) {
    match perm {
        None => {
            x.copy_from(b);
            kernel(x);
        }
        Some(perm) => {
            let mut y = permute_vector(b, perm);
            kernel(&mut y);
            *x = unpermute_vector(&y, perm);
        }
    }
}

/// Skyline LDLᵀ, optionally after a bandwidth-reducing reordering
#[derive(Debug, Clone)]
pub struct SkylineFactorization {
    factor: LdlSkyline,
    perm: Option<Vec<usize>>,
}

impl SkylineFactorization {
    /// Number of negative pivots
    pub fn negative_pivots(&self) -> usize {
        self.factor.negative_pivots()
    }
}

impl Factorization for SkylineFactorization {
    const NAME: &'static str = "skyline LDLt";
    const DEFAULT_REORDERING: Reordering = Reordering::Natural;

    fn factorize(matrix: &CsrMatrix<f64>, options: &SolverOptions) -> Result<Self, PivotFailure> {
        let reordering = options.reordering.unwrap_or(Self::DEFAULT_REORDERING);
        let (factor, perm) = factorize_permuted(matrix, reordering, |m| {
            SkylineMatrix::from_csr(m).factorize_ldl(options.pivot_tolerance)
        })?;
        Ok(Self { factor, perm })
    }

    fn size(&self) -> usize {
        self.factor.size()
    }

    fn solve_into(&self, b: &FEVec, x: &mut FEVec) {
        solve_permuted(self.perm.as_deref(), b, x, |y| self.factor.solve_in_place(y));
    }
}

/// Sparse LDLᵀ on compressed-column storage, fill-reducing order by default
#[derive(Debug, Clone)]
pub struct CscFactorization {
    factor: LdlCsc,
    perm: Option<Vec<usize>>,
}

impl CscFactorization {
    /// Off-diagonal non-zeros of the factor
    pub fn nnz_factor(&self) -> usize {
        self.factor.nnz_factor()
    }
}

impl Factorization for CscFactorization {
    const NAME: &'static str = "CSC LDLt";
    const DEFAULT_REORDERING: Reordering = Reordering::MinimumDegree;

    fn factorize(matrix: &CsrMatrix<f64>, options: &SolverOptions) -> Result<Self, PivotFailure> {
        let reordering = options.reordering.unwrap_or(Self::DEFAULT_REORDERING);
        let (factor, perm) = factorize_permuted(matrix, reordering, |m| {
            LdlCsc::factorize(m, options.pivot_tolerance)
        })?;
        Ok(Self { factor, perm })
    }

    fn size(&self) -> usize {
        self.factor.size()
    }

    fn solve_into(&self, b: &FEVec, x: &mut FEVec) {
        solve_permuted(self.perm.as_deref(), b, x, |y| self.factor.solve_in_place(y));
    }
}
