use std::time::Instant;

use log::{debug, info};
use nalgebra_sparse::CsrMatrix;

use super::{Factorization, LinearSystem, SolverOptions};
use super::factorization::{CscFactorization, SkylineFactorization};
use crate::error::{FEAError, FEAResult};
use crate::math::{is_symmetric, Mat, Vec as FEVec};
use crate::model::SubdomainId;

/// Solver interface seen by the analyzers
///
/// Systems are addressed by handle, their position in [`linear_systems`](Self::linear_systems).
pub trait DirectSolver {
    fn linear_systems(&self) -> &[LinearSystem];

    fn linear_system(&self, handle: usize) -> FEAResult<&LinearSystem>;

    /// Mutable access for rhs and solution seeding; the operator can only
    /// be replaced through [`set_matrix`](Self::set_matrix)
    fn linear_system_mut(&mut self, handle: usize) -> FEAResult<&mut LinearSystem>;

    fn handle_of(&self, id: SubdomainId) -> FEAResult<usize>;

    /// Install a new operator and drop the cached factorization
    fn set_matrix(&mut self, handle: usize, matrix: CsrMatrix<f64>) -> FEAResult<()>;

    /// Drop the cached factorization of a system
    fn notify_operator_changed(&mut self, handle: usize) -> FEAResult<()>;

    /// Factorize stale systems and solve every system into its solution buffer
    fn solve(&mut self) -> FEAResult<()>;

    /// Solve one system for several right-hand sides without touching them
    fn solve_multiple(&mut self, handle: usize, rhs: &Mat) -> FEAResult<Mat>;

    fn is_factorized(&self, handle: usize) -> bool;

    /// Factorizations performed so far
    fn factorization_count(&self) -> usize;
}

/// Direct solver caching one factorization per linear system
#[derive(Debug)]
pub struct CachedDirectSolver<F: Factorization> {
    systems: Vec<LinearSystem>,
    factorizations: Vec<Option<F>>,
    options: SolverOptions,
    factorization_count: usize,
}

/// Skyline LDLᵀ solver
pub type SkylineSolver = CachedDirectSolver<SkylineFactorization>;

/// Sparse LDLᵀ solver on compressed-column storage
pub type CscLdlSolver = CachedDirectSolver<CscFactorization>;

impl<F: Factorization> Default for CachedDirectSolver<F> {
    fn default() -> Self {
        Self::new(SolverOptions::default())
    }
}

impl<F: Factorization> CachedDirectSolver<F> {
    pub fn new(options: SolverOptions) -> Self {
        Self {
            systems: Vec::new(),
            factorizations: Vec::new(),
            options,
            factorization_count: 0,
        }
    }

    /// Register a linear system and return its handle
    pub fn add_system(&mut self, system: LinearSystem) -> FEAResult<usize> {
        if self.systems.iter().any(|s| s.id() == system.id()) {
            return Err(FEAError::InvalidInput(format!(
                "subdomain {} already has a linear system",
                system.id()
            )));
        }
        self.systems.push(system);
        self.factorizations.push(None);
        Ok(self.systems.len() - 1)
    }

    /// Builder-style [`add_system`](Self::add_system)
    pub fn with_system(mut self, system: LinearSystem) -> FEAResult<Self> {
        self.add_system(system)?;
        Ok(self)
    }

    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    /// Cached factorization of a system
    pub fn factorization(&self, handle: usize) -> Option<&F> {
        self.factorizations.get(handle)?.as_ref()
    }

    fn check_handle(&self, handle: usize) -> FEAResult<()> {
        if handle < self.systems.len() {
            Ok(())
        } else {
            Err(FEAError::InvalidInput(format!(
                "no linear system with handle {}",
                handle
            )))
        }
    }

    fn ensure_factorized(&mut self, handle: usize) -> FEAResult<()> {
        self.check_handle(handle)?;
        if self.factorizations[handle].is_some() {
            return Ok(());
        }

        let system = &self.systems[handle];
        let matrix = system.matrix().ok_or(FEAError::MissingOperator(system.id()))?;
        if !is_symmetric(matrix, self.options.symmetry_tolerance) {
            return Err(FEAError::InvalidInput(format!(
                "operator for subdomain {} is not symmetric",
                system.id()
            )));
        }

        let start = Instant::now();
        let factor = F::factorize(matrix, &self.options).map_err(|failure| {
            FEAError::SingularMatrix {
                subdomain: system.id(),
                pivot_index: failure.index,
                pivot: failure.pivot,
            }
        })?;
        info!(
            "{} factorization of subdomain {} ({} dofs, {} nnz) took {:?}",
            F::NAME,
            system.id(),
            system.size(),
            matrix.nnz(),
            start.elapsed()
        );

        self.factorizations[handle] = Some(factor);
        self.factorization_count += 1;
        Ok(())
    }
}

impl<F: Factorization> DirectSolver for CachedDirectSolver<F> {
    fn linear_systems(&self) -> &[LinearSystem] {
        &self.systems
    }

    fn linear_system(&self, handle: usize) -> FEAResult<&LinearSystem> {
        self.check_handle(handle)?;
        Ok(&self.systems[handle])
    }

    fn linear_system_mut(&mut self, handle: usize) -> FEAResult<&mut LinearSystem> {
        self.check_handle(handle)?;
        Ok(&mut self.systems[handle])
    }

    fn handle_of(&self, id: SubdomainId) -> FEAResult<usize> {
        self.systems
            .iter()
            .position(|s| s.id() == id)
            .ok_or(FEAError::SubdomainNotFound(id))
    }

    fn set_matrix(&mut self, handle: usize, matrix: CsrMatrix<f64>) -> FEAResult<()> {
        self.check_handle(handle)?;
        self.systems[handle].replace_matrix(matrix)?;
        self.notify_operator_changed(handle)
    }

    fn notify_operator_changed(&mut self, handle: usize) -> FEAResult<()> {
        self.check_handle(handle)?;
        if self.factorizations[handle].take().is_some() {
            debug!(
                "Dropped cached factorization of subdomain {}",
                self.systems[handle].id()
            );
        }
        Ok(())
    }

    fn solve(&mut self) -> FEAResult<()> {
        // Factorize and check every system before any solution is overwritten
        for handle in 0..self.systems.len() {
            self.ensure_factorized(handle)?;
            let system = &self.systems[handle];
            if system.rhs.len() != system.size() {
                return Err(FEAError::dimension(system.size(), system.rhs.len()));
            }
        }

        for handle in 0..self.systems.len() {
            let system = &mut self.systems[handle];
            let factor = match &self.factorizations[handle] {
                Some(factor) => factor,
                None => return Err(FEAError::MissingOperator(system.id())),
            };

            let start = Instant::now();
            let mut x = system
                .solution
                .take()
                .filter(|s| s.len() == system.size())
                .unwrap_or_else(|| FEVec::zeros(system.size()));
            factor.solve_into(&system.rhs, &mut x);
            system.solution = Some(x);
            debug!(
                "{} substitution for subdomain {} took {:?}",
                F::NAME,
                system.id(),
                start.elapsed()
            );
        }
        Ok(())
    }

    fn solve_multiple(&mut self, handle: usize, rhs: &Mat) -> FEAResult<Mat> {
        self.ensure_factorized(handle)?;
        let size = self.systems[handle].size();
        if rhs.nrows() != size {
            return Err(FEAError::dimension(size, rhs.nrows()));
        }
        match &self.factorizations[handle] {
            Some(factor) => Ok(factor.solve_multiple(rhs)),
            None => Err(FEAError::MissingOperator(self.systems[handle].id())),
        }
    }

    fn is_factorized(&self, handle: usize) -> bool {
        matches!(self.factorizations.get(handle), Some(Some(_)))
    }

    fn factorization_count(&self) -> usize {
        self.factorization_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::sparse::{csr_diagonal, SparseMatrixBuilder};
    use approx::assert_relative_eq;

    fn spring_chain(n: usize, k: f64) -> CsrMatrix<f64> {
        // Grounded at the left end
        let mut b = SparseMatrixBuilder::new(n);
        b.add(0, 0, k);
        for i in 0..n - 1 {
            b.add_element_matrix(&[i, i + 1], &[[k, -k], [-k, k]]);
        }
        b.to_csr()
    }

    fn solver_with_chain<F: Factorization>(n: usize) -> CachedDirectSolver<F> {
        let mut solver = CachedDirectSolver::<F>::default();
        let handle = solver.add_system(LinearSystem::new(SubdomainId(0), n)).unwrap();
        solver.set_matrix(handle, spring_chain(n, 100.0)).unwrap();
        solver
    }

    #[test]
    fn test_factorization_is_cached() {
        let mut solver = solver_with_chain::<SkylineFactorization>(4);
        solver.linear_system_mut(0).unwrap().rhs[3] = 1.0;

        solver.solve().unwrap();
        let first = solver.linear_system(0).unwrap().solution.clone().unwrap();
        solver.solve().unwrap();
        let second = solver.linear_system(0).unwrap().solution.clone().unwrap();

        assert_eq!(solver.factorization_count(), 1);
        assert!(solver.is_factorized(0));
        assert_eq!(first, second);
        // Unit tip load on a grounded chain: every spring carries 1
        assert_relative_eq!(first[3], 4.0 / 100.0, epsilon = 1e-12);
    }

    #[test]
    fn test_set_matrix_invalidates() {
        let mut solver = solver_with_chain::<CscFactorization>(3);
        solver.solve().unwrap();
        assert!(solver.is_factorized(0));

        solver.set_matrix(0, spring_chain(3, 50.0)).unwrap();
        assert!(!solver.is_factorized(0));
        solver.solve().unwrap();
        assert_eq!(solver.factorization_count(), 2);

        solver.notify_operator_changed(0).unwrap();
        assert!(!solver.is_factorized(0));
    }

    #[test]
    fn test_missing_operator() {
        let mut solver = SkylineSolver::default();
        solver.add_system(LinearSystem::new(SubdomainId(3), 2)).unwrap();
        assert!(matches!(
            solver.solve(),
            Err(FEAError::MissingOperator(SubdomainId(3)))
        ));
    }

    #[test]
    fn test_wrong_size_operator_rejected() {
        let mut solver = CscLdlSolver::default();
        solver.add_system(LinearSystem::new(SubdomainId(0), 2)).unwrap();
        assert!(matches!(
            solver.set_matrix(0, csr_diagonal(&[1.0, 1.0, 1.0])),
            Err(FEAError::DimensionMismatch { expected: 2, found: 3 })
        ));
    }

    #[test]
    fn test_unconstrained_chain_is_singular() {
        let mut b = SparseMatrixBuilder::new(3);
        for i in 0..2 {
            b.add_element_matrix(&[i, i + 1], &[[10.0, -10.0], [-10.0, 10.0]]);
        }
        let mut solver = SkylineSolver::default();
        solver.add_system(LinearSystem::new(SubdomainId(1), 3)).unwrap();
        solver.set_matrix(0, b.to_csr()).unwrap();

        match solver.solve() {
            Err(FEAError::SingularMatrix { subdomain, pivot_index, .. }) => {
                assert_eq!(subdomain, SubdomainId(1));
                assert_eq!(pivot_index, 2);
            }
            other => panic!("expected singular matrix, got {:?}", other),
        }
        assert_eq!(solver.factorization_count(), 0);
    }

    #[test]
    fn test_failed_solve_leaves_every_solution_untouched() {
        let seed = FEVec::from_vec(vec![0.5, 0.25]);
        let mut solver = CscLdlSolver::default()
            .with_system(
                LinearSystem::new(SubdomainId(0), 2)
                    .with_initial_solution(seed.clone())
                    .unwrap(),
            )
            .unwrap()
            .with_system(LinearSystem::new(SubdomainId(1), 2))
            .unwrap();
        solver.set_matrix(0, spring_chain(2, 100.0)).unwrap();
        solver.set_matrix(1, csr_diagonal(&[1.0, 0.0])).unwrap();
        solver.linear_system_mut(0).unwrap().rhs[1] = 1.0;

        assert!(matches!(
            solver.solve(),
            Err(FEAError::SingularMatrix { subdomain: SubdomainId(1), .. })
        ));
        assert_eq!(solver.linear_system(0).unwrap().solution.as_ref(), Some(&seed));
        assert!(solver.linear_system(1).unwrap().solution.is_none());
        assert!(solver.is_factorized(0));

        solver.set_matrix(1, csr_diagonal(&[1.0, 2.0])).unwrap();
        solver.solve().unwrap();
        assert_relative_eq!(
            solver.linear_system(0).unwrap().solution.clone().unwrap(),
            FEVec::from_vec(vec![0.01, 0.02]),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_asymmetric_operator_rejected() {
        let mut b = SparseMatrixBuilder::new(2);
        b.add(0, 0, 1.0);
        b.add(1, 1, 1.0);
        b.add(0, 1, 0.5);
        let mut solver = SkylineSolver::default();
        solver.add_system(LinearSystem::new(SubdomainId(0), 2)).unwrap();
        solver.set_matrix(0, b.to_csr()).unwrap();
        assert!(matches!(solver.solve(), Err(FEAError::InvalidInput(_))));
    }

    #[test]
    fn test_solve_multiple_leaves_input_untouched() {
        let mut solver = solver_with_chain::<SkylineFactorization>(3);
        let rhs = Mat::from_fn(3, 2, |i, j| (i * 2 + j) as f64);
        let before = rhs.clone();

        let x = solver.solve_multiple(0, &rhs).unwrap();
        assert_eq!(rhs, before);

        let k = spring_chain(3, 100.0);
        for j in 0..2 {
            let col = crate::math::sparse_matvec(&k, &x.column(j).into_owned());
            assert_relative_eq!(col, rhs.column(j).into_owned(), epsilon = 1e-10);
        }
        assert_eq!(solver.factorization_count(), 1);
    }

    #[test]
    fn test_duplicate_system_rejected() {
        let mut solver = SkylineSolver::default();
        solver.add_system(LinearSystem::new(SubdomainId(0), 1)).unwrap();
        assert!(solver.add_system(LinearSystem::new(SubdomainId(0), 1)).is_err());
        assert!(matches!(
            solver.handle_of(SubdomainId(9)),
            Err(FEAError::SubdomainNotFound(_))
        ));
    }
}
