//! Mathematical utilities for transient analysis
//!
//! Dense aliases, sparse assembly helpers, dof reorderings and the two
//! LDLᵀ factorizations used by the direct solvers.

pub mod ldl;
pub mod ordering;
pub mod skyline;
pub mod sparse;

use nalgebra::{DMatrix, DVector};

pub use ldl::LdlCsc;
pub use ordering::{
    apply_permutation, bandwidth, inverse_permutation, minimum_degree, permute_symmetric,
    reverse_cuthill_mckee, Reordering,
};
pub use skyline::{LdlSkyline, PivotFailure, SkylineMatrix};
pub use sparse::{
    csr_diagonal, csr_from_dense, is_symmetric, linear_combination, sparse_matvec,
    SparseMatrixBuilder,
};

pub type Mat = DMatrix<f64>;
pub type Vec = DVector<f64>;

/// Solve a linear system using LU decomposition
pub fn solve_linear_system(a: &Mat, b: &Vec) -> Option<Vec> {
    a.clone().lu().solve(b)
}
