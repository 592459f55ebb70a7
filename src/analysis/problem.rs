//! Structural integration provider
//!
//! Holds assembled mass, damping and stiffness operators per subdomain and the
//! time-dependent excitations: nodal load histories, ground acceleration and
//! prescribed velocity/acceleration increments.

use std::collections::{BTreeMap, HashMap};

use log::debug;
use nalgebra_sparse::CsrMatrix;

use super::provider::{ImplicitIntegrationProvider, IntegrationCoefficients};
use crate::error::{FEAError, FEAResult};
use crate::math::sparse::{checked_matvec, linear_combination};
use crate::math::Vec as FEVec;
use crate::model::SubdomainId;
use crate::solvers::LinearSystem;

/// Damping model of a subdomain
#[derive(Debug, Clone)]
pub enum Damping {
    None,
    /// Explicit damping operator
    Matrix(CsrMatrix<f64>),
    /// `C = alpha·M + beta·K`
    Rayleigh { alpha: f64, beta: f64 },
}

#[derive(Debug, Clone)]
struct SubdomainOperators {
    mass: CsrMatrix<f64>,
    stiffness: CsrMatrix<f64>,
    damping: Damping,
}

/// Load `pattern · magnitudes[step]`; zero past the end of the record
#[derive(Debug, Clone)]
pub struct TimeHistoryLoad {
    pub pattern: FEVec,
    pub magnitudes: Vec<f64>,
}

/// Support excitation `-M · influence · accelerations[step]`
#[derive(Debug, Clone)]
pub struct GroundMotion {
    pub influence: FEVec,
    pub accelerations: Vec<f64>,
}

/// Reference provider for structural dynamics
#[derive(Debug, Clone, Default)]
pub struct StructuralProblem {
    operators: HashMap<SubdomainId, SubdomainOperators>,
    loads: HashMap<SubdomainId, Vec<TimeHistoryLoad>>,
    ground_motions: HashMap<SubdomainId, GroundMotion>,
    /// Prescribed increments, keyed by step
    external_velocities: BTreeMap<usize, HashMap<SubdomainId, FEVec>>,
    external_accelerations: BTreeMap<usize, HashMap<SubdomainId, FEVec>>,
    current_step: Option<usize>,
}

impl StructuralProblem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the mass and stiffness operators of a subdomain
    pub fn add_subdomain(
        &mut self,
        id: SubdomainId,
        mass: CsrMatrix<f64>,
        stiffness: CsrMatrix<f64>,
    ) -> FEAResult<()> {
        if self.operators.contains_key(&id) {
            return Err(FEAError::InvalidInput(format!(
                "operators for subdomain {} already registered",
                id
            )));
        }
        let n = stiffness.nrows();
        if stiffness.ncols() != n {
            return Err(FEAError::dimension(n, stiffness.ncols()));
        }
        if mass.nrows() != n || mass.ncols() != n {
            return Err(FEAError::dimension(n, mass.nrows().max(mass.ncols())));
        }

        self.operators.insert(
            id,
            SubdomainOperators {
                mass,
                stiffness,
                damping: Damping::None,
            },
        );
        Ok(())
    }

    /// Use an explicit damping operator
    pub fn set_damping_matrix(&mut self, id: SubdomainId, damping: CsrMatrix<f64>) -> FEAResult<()> {
        let n = self.size(id)?;
        if damping.nrows() != n || damping.ncols() != n {
            return Err(FEAError::dimension(n, damping.nrows().max(damping.ncols())));
        }
        self.operators_mut(id)?.damping = Damping::Matrix(damping);
        Ok(())
    }

    /// Use Rayleigh damping `C = alpha·M + beta·K`
    pub fn set_rayleigh_damping(&mut self, id: SubdomainId, alpha: f64, beta: f64) -> FEAResult<()> {
        self.operators_mut(id)?.damping = Damping::Rayleigh { alpha, beta };
        Ok(())
    }

    /// Add a time-history load; `magnitudes[i]` applies at step `i`
    pub fn add_time_history_load(
        &mut self,
        id: SubdomainId,
        pattern: FEVec,
        magnitudes: Vec<f64>,
    ) -> FEAResult<()> {
        let n = self.size(id)?;
        if pattern.len() != n {
            return Err(FEAError::dimension(n, pattern.len()));
        }
        self.loads
            .entry(id)
            .or_default()
            .push(TimeHistoryLoad { pattern, magnitudes });
        Ok(())
    }

    /// Excite a subdomain through its supports; `influence` maps the ground
    /// acceleration onto the free dofs
    pub fn set_ground_motion(
        &mut self,
        id: SubdomainId,
        influence: FEVec,
        accelerations: Vec<f64>,
    ) -> FEAResult<()> {
        let n = self.size(id)?;
        if influence.len() != n {
            return Err(FEAError::dimension(n, influence.len()));
        }
        self.ground_motions.insert(
            id,
            GroundMotion {
                influence,
                accelerations,
            },
        );
        Ok(())
    }

    /// Velocity increment added after the kinematic update of `step`
    pub fn set_external_velocity(&mut self, id: SubdomainId, step: usize, dv: FEVec) -> FEAResult<()> {
        let n = self.size(id)?;
        if dv.len() != n {
            return Err(FEAError::dimension(n, dv.len()));
        }
        self.external_velocities
            .entry(step)
            .or_default()
            .insert(id, dv);
        Ok(())
    }

    /// Acceleration increment added after the kinematic update of `step`
    pub fn set_external_acceleration(
        &mut self,
        id: SubdomainId,
        step: usize,
        da: FEVec,
    ) -> FEAResult<()> {
        let n = self.size(id)?;
        if da.len() != n {
            return Err(FEAError::dimension(n, da.len()));
        }
        self.external_accelerations
            .entry(step)
            .or_default()
            .insert(id, da);
        Ok(())
    }

    /// Free-dof count of a subdomain
    pub fn size(&self, id: SubdomainId) -> FEAResult<usize> {
        Ok(self.operators(id)?.stiffness.nrows())
    }

    pub fn mass(&self, id: SubdomainId) -> FEAResult<&CsrMatrix<f64>> {
        Ok(&self.operators(id)?.mass)
    }

    pub fn stiffness(&self, id: SubdomainId) -> FEAResult<&CsrMatrix<f64>> {
        Ok(&self.operators(id)?.stiffness)
    }

    /// Step the histories were last advanced to
    pub fn current_step(&self) -> Option<usize> {
        self.current_step
    }

    fn operators(&self, id: SubdomainId) -> FEAResult<&SubdomainOperators> {
        self.operators.get(&id).ok_or(FEAError::SubdomainNotFound(id))
    }

    fn operators_mut(&mut self, id: SubdomainId) -> FEAResult<&mut SubdomainOperators> {
        self.operators.get_mut(&id).ok_or(FEAError::SubdomainNotFound(id))
    }

    fn increments(
        table: &BTreeMap<usize, HashMap<SubdomainId, FEVec>>,
        step: usize,
    ) -> HashMap<SubdomainId, FEVec> {
        table.get(&step).cloned().unwrap_or_default()
    }
}

impl ImplicitIntegrationProvider for StructuralProblem {
    fn assemble_effective_operator(
        &self,
        id: SubdomainId,
        coefficients: &IntegrationCoefficients,
    ) -> FEAResult<CsrMatrix<f64>> {
        let ops = self.operators(id)?;
        let mut terms = vec![
            (coefficients.mass, &ops.mass),
            (coefficients.stiffness, &ops.stiffness),
        ];
        match &ops.damping {
            Damping::None => {}
            Damping::Matrix(c) => terms.push((coefficients.damping, c)),
            Damping::Rayleigh { alpha, beta } => {
                terms.push((coefficients.damping * alpha, &ops.mass));
                terms.push((coefficients.damping * beta, &ops.stiffness));
            }
        }

        let effective = linear_combination(&terms)?;
        debug!(
            "Assembled effective operator for subdomain {} ({} nnz)",
            id,
            effective.nnz()
        );
        Ok(effective)
    }

    fn mass_product(&self, id: SubdomainId, x: &FEVec) -> FEAResult<FEVec> {
        checked_matvec(&self.operators(id)?.mass, x)
    }

    fn damping_product(&self, id: SubdomainId, x: &FEVec) -> FEAResult<FEVec> {
        let ops = self.operators(id)?;
        match &ops.damping {
            Damping::None => {
                if x.len() != ops.stiffness.nrows() {
                    return Err(FEAError::dimension(ops.stiffness.nrows(), x.len()));
                }
                Ok(FEVec::zeros(x.len()))
            }
            Damping::Matrix(c) => checked_matvec(c, x),
            Damping::Rayleigh { alpha, beta } => {
                let m = checked_matvec(&ops.mass, x)?;
                let k = checked_matvec(&ops.stiffness, x)?;
                Ok(m * *alpha + k * *beta)
            }
        }
    }

    fn refresh_pure_load(
        &self,
        system: &mut LinearSystem,
        _coefficients: &IntegrationCoefficients,
    ) -> FEAResult<()> {
        let id = system.id();
        let n = self.size(id)?;
        if system.rhs.len() != n {
            return Err(FEAError::dimension(n, system.rhs.len()));
        }

        // Before the first step only the static part applies
        let Some(step) = self.current_step else {
            return Ok(());
        };

        if let Some(loads) = self.loads.get(&id) {
            for load in loads {
                if let Some(&magnitude) = load.magnitudes.get(step) {
                    system.rhs.axpy(magnitude, &load.pattern, 1.0);
                }
            }
        }

        if let Some(ground) = self.ground_motions.get(&id) {
            if let Some(&ag) = ground.accelerations.get(step) {
                let inertia = self.mass_product(id, &(&ground.influence * ag))?;
                system.rhs -= inertia;
            }
        }

        Ok(())
    }

    fn advance_history(&mut self, step: usize) -> FEAResult<()> {
        self.current_step = Some(step);
        Ok(())
    }

    fn external_velocities(&self, step: usize) -> HashMap<SubdomainId, FEVec> {
        Self::increments(&self.external_velocities, step)
    }

    fn external_accelerations(&self, step: usize) -> HashMap<SubdomainId, FEVec> {
        Self::increments(&self.external_accelerations, step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::sparse::{csr_diagonal, SparseMatrixBuilder};
    use approx::assert_relative_eq;

    const ID: SubdomainId = SubdomainId(0);

    fn two_dof() -> StructuralProblem {
        let mut kb = SparseMatrixBuilder::new(2);
        kb.add(0, 0, 100.0);
        kb.add_element_matrix(&[0, 1], &[[50.0, -50.0], [-50.0, 50.0]]);

        let mut problem = StructuralProblem::new();
        problem
            .add_subdomain(ID, csr_diagonal(&[2.0, 1.0]), kb.to_csr())
            .unwrap();
        problem
    }

    #[test]
    fn test_effective_operator_with_rayleigh() {
        let mut problem = two_dof();
        problem.set_rayleigh_damping(ID, 0.5, 0.01).unwrap();

        let coeffs = IntegrationCoefficients::new(10.0, 2.0, 1.0);
        let eff = problem.assemble_effective_operator(ID, &coeffs).unwrap();

        // 10 M + 2 (0.5 M + 0.01 K) + K = 11 M + 1.02 K
        let e00 = eff.get_entry(0, 0).unwrap().into_value();
        let e01 = eff.get_entry(0, 1).unwrap().into_value();
        assert_relative_eq!(e00, 11.0 * 2.0 + 1.02 * 150.0, epsilon = 1e-10);
        assert_relative_eq!(e01, -1.02 * 50.0, epsilon = 1e-10);
    }

    #[test]
    fn test_products() {
        let mut problem = two_dof();
        let x = FEVec::from_vec(vec![1.0, 2.0]);
        assert_eq!(problem.mass_product(ID, &x).unwrap().as_slice(), &[2.0, 2.0]);
        assert_eq!(problem.damping_product(ID, &x).unwrap().as_slice(), &[0.0, 0.0]);

        problem.set_damping_matrix(ID, csr_diagonal(&[3.0, 4.0])).unwrap();
        assert_eq!(problem.damping_product(ID, &x).unwrap().as_slice(), &[3.0, 8.0]);

        assert!(matches!(
            problem.mass_product(SubdomainId(5), &x),
            Err(FEAError::SubdomainNotFound(_))
        ));
    }

    #[test]
    fn test_history_and_ground_motion_loads() {
        let mut problem = two_dof();
        problem
            .add_time_history_load(ID, FEVec::from_vec(vec![0.0, 1.0]), vec![5.0, 7.0])
            .unwrap();
        problem
            .set_ground_motion(ID, FEVec::from_vec(vec![1.0, 1.0]), vec![0.0, 3.0])
            .unwrap();
        let coeffs = IntegrationCoefficients::new(0.0, 0.0, 1.0);

        let mut system = LinearSystem::new(ID, 2);
        problem.refresh_pure_load(&mut system, &coeffs).unwrap();
        assert_eq!(system.rhs.as_slice(), &[0.0, 0.0]);

        problem.advance_history(1).unwrap();
        problem.refresh_pure_load(&mut system, &coeffs).unwrap();
        // 7 on dof 1, minus M·r·3
        assert_eq!(system.rhs.as_slice(), &[-6.0, 7.0 - 3.0]);

        // Past the end of the record nothing more is added
        let mut fresh = LinearSystem::new(ID, 2);
        problem.advance_history(10).unwrap();
        problem.refresh_pure_load(&mut fresh, &coeffs).unwrap();
        assert_eq!(fresh.rhs.as_slice(), &[0.0, 0.0]);
    }

    #[test]
    fn test_external_increments_by_step() {
        let mut problem = two_dof();
        problem
            .set_external_velocity(ID, 3, FEVec::from_vec(vec![0.1, 0.0]))
            .unwrap();
        assert!(problem.external_velocities(2).is_empty());
        assert_eq!(problem.external_velocities(3)[&ID][0], 0.1);
        assert!(problem.external_accelerations(3).is_empty());
        assert!(problem
            .set_external_acceleration(ID, 0, FEVec::zeros(3))
            .is_err());
    }
    #[test]
    fn test_increments_grouped_per_step() {
        let other = SubdomainId(1);
        let mut problem = two_dof();
        problem
            .add_subdomain(other, csr_diagonal(&[1.0]), csr_diagonal(&[10.0]))
            .unwrap();

        problem
            .set_external_acceleration(ID, 4, FEVec::from_vec(vec![1.0, 2.0]))
            .unwrap();
        problem
            .set_external_acceleration(other, 4, FEVec::from_vec(vec![3.0]))
            .unwrap();
        problem
            .set_external_acceleration(other, 5, FEVec::from_vec(vec![9.0]))
            .unwrap();
        // A second increment for the same step replaces the first
        problem
            .set_external_acceleration(ID, 4, FEVec::from_vec(vec![-1.0, 0.0]))
            .unwrap();

        let step4 = problem.external_accelerations(4);
        assert_eq!(step4.len(), 2);
        assert_eq!(step4[&ID].as_slice(), &[-1.0, 0.0]);
        assert_eq!(step4[&other].as_slice(), &[3.0]);

        let step5 = problem.external_accelerations(5);
        assert_eq!(step5.len(), 1);
        assert_eq!(step5[&other][0], 9.0);
        assert!(problem.external_velocities(4).is_empty());
    }
}
