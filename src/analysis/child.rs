//! Child analyzers: the per-step algebraic solve beneath the time integrator

use std::collections::HashMap;

use log::debug;

use crate::error::{FEAError, FEAResult};
use crate::math::Vec as FEVec;
use crate::model::SubdomainId;
use crate::results::DofDisplacementLog;
use crate::solvers::DirectSolver;

/// Right-hand side terms contributed by the enclosing time integrator
///
/// A nonlinear child needs these to form its residual; a linear child can
/// ignore them.
pub trait RhsContributions {
    /// Inertial and damping terms for a trial displacement `x`
    fn other_rhs_components(&self, id: SubdomainId, x: &FEVec) -> FEAResult<FEVec>;
}

/// Solves the algebraic system of each time step
pub trait ChildAnalyzer {
    fn initialize(&mut self, solver: &mut dyn DirectSolver) -> FEAResult<()>;

    fn solve(
        &mut self,
        solver: &mut dyn DirectSolver,
        contributions: &dyn RhsContributions,
    ) -> FEAResult<()>;

    /// Result logs of a subdomain, updated after every solve
    fn logs(&self, id: SubdomainId) -> &[DofDisplacementLog];
}

/// One direct solve per step, sampling watched dofs afterwards
#[derive(Debug, Clone, Default)]
pub struct LinearAnalyzer {
    logs: HashMap<SubdomainId, Vec<DofDisplacementLog>>,
}

impl LinearAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log the displacements of `dofs` (free-dof numbering) of a subdomain
    pub fn watch(&mut self, id: SubdomainId, dofs: Vec<usize>) {
        self.logs
            .entry(id)
            .or_default()
            .push(DofDisplacementLog::new(id, dofs));
    }

    pub fn with_watch(mut self, id: SubdomainId, dofs: Vec<usize>) -> Self {
        self.watch(id, dofs);
        self
    }
}

impl ChildAnalyzer for LinearAnalyzer {
    fn initialize(&mut self, solver: &mut dyn DirectSolver) -> FEAResult<()> {
        for (id, logs) in &self.logs {
            let handle = solver.handle_of(*id)?;
            let size = solver.linear_system(handle)?.size();
            for log in logs {
                if let Some(&dof) = log.dofs.iter().find(|&&d| d >= size) {
                    return Err(FEAError::InvalidInput(format!(
                        "watched dof {} out of range for subdomain {} ({} free dofs)",
                        dof, id, size
                    )));
                }
            }
        }
        Ok(())
    }

    fn solve(
        &mut self,
        solver: &mut dyn DirectSolver,
        _contributions: &dyn RhsContributions,
    ) -> FEAResult<()> {
        solver.solve()?;

        for system in solver.linear_systems() {
            let Some(logs) = self.logs.get_mut(&system.id()) else {
                continue;
            };
            let solution = system
                .solution
                .as_ref()
                .ok_or(FEAError::MissingOperator(system.id()))?;
            for log in logs.iter_mut() {
                log.record(solution);
            }
        }
        debug!("Linear child solved {} system(s)", solver.linear_systems().len());
        Ok(())
    }

    fn logs(&self, id: SubdomainId) -> &[DofDisplacementLog] {
        self.logs.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }
}
