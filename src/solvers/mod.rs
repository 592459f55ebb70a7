//! Direct sparse solvers with cached factorizations
//!
//! A solver owns one [`LinearSystem`] per subdomain. Installing a new
//! operator drops the cached factorization; subsequent solves reuse it until
//! the next change.

mod direct;
mod factorization;

pub use direct::{CachedDirectSolver, CscLdlSolver, DirectSolver, SkylineSolver};
pub use factorization::{CscFactorization, Factorization, SkylineFactorization};

use nalgebra_sparse::CsrMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{FEAError, FEAResult};
use crate::math::{Reordering, Vec as FEVec};
use crate::model::SubdomainId;

/// Options shared by the direct solvers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// Pivots with `|d_k| <= pivot_tolerance · |a_kk|` are treated as singular
    pub pivot_tolerance: f64,
    /// Dof reordering; `None` uses the factorization's own default
    pub reordering: Option<Reordering>,
    /// Relative tolerance of the symmetry check run before factorizing
    pub symmetry_tolerance: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            pivot_tolerance: 1e-12,
            reordering: None,
            symmetry_tolerance: 1e-10,
        }
    }
}

impl SolverOptions {
    pub fn with_pivot_tolerance(mut self, tol: f64) -> Self {
        self.pivot_tolerance = tol;
        self
    }

    pub fn with_reordering(mut self, reordering: Reordering) -> Self {
        self.reordering = Some(reordering);
        self
    }

    pub fn with_symmetry_tolerance(mut self, tol: f64) -> Self {
        self.symmetry_tolerance = tol;
        self
    }
}

/// Linear system `A x = b` of one subdomain
#[derive(Debug, Clone)]
pub struct LinearSystem {
    id: SubdomainId,
    size: usize,
    matrix: Option<CsrMatrix<f64>>,
    /// Right-hand side
    pub rhs: FEVec,
    /// Most recent solution, or a seed from a prior analysis
    pub solution: Option<FEVec>,
}

impl LinearSystem {
    pub fn new(id: SubdomainId, size: usize) -> Self {
        Self {
            id,
            size,
            matrix: None,
            rhs: FEVec::zeros(size),
            solution: None,
        }
    }

    /// Seed the solution with the end state of a previous analysis
    pub fn with_initial_solution(mut self, solution: FEVec) -> FEAResult<Self> {
        if solution.len() != self.size {
            return Err(FEAError::dimension(self.size, solution.len()));
        }
        self.solution = Some(solution);
        Ok(self)
    }

    pub fn id(&self) -> SubdomainId {
        self.id
    }

    /// Number of free dofs
    pub fn size(&self) -> usize {
        self.size
    }

    /// Installed operator, if any
    pub fn matrix(&self) -> Option<&CsrMatrix<f64>> {
        self.matrix.as_ref()
    }

    pub(crate) fn replace_matrix(&mut self, matrix: CsrMatrix<f64>) -> FEAResult<()> {
        if matrix.nrows() != matrix.ncols() {
            return Err(FEAError::InvalidInput(format!(
                "operator for subdomain {} is not square ({}x{})",
                self.id,
                matrix.nrows(),
                matrix.ncols()
            )));
        }
        if matrix.nrows() != self.size {
            return Err(FEAError::dimension(self.size, matrix.nrows()));
        }
        self.matrix = Some(matrix);
        Ok(())
    }
}
