use std::collections::HashMap;

use nalgebra_sparse::CsrMatrix;

use crate::error::FEAResult;
use crate::math::Vec as FEVec;
use crate::model::SubdomainId;
use crate::solvers::LinearSystem;

/// Scalar weights of the mass, damping and stiffness operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntegrationCoefficients {
    pub mass: f64,
    pub damping: f64,
    pub stiffness: f64,
}

impl IntegrationCoefficients {
    pub fn new(mass: f64, damping: f64, stiffness: f64) -> Self {
        Self {
            mass,
            damping,
            stiffness,
        }
    }
}

/// Operators and load histories required by implicit time integration
pub trait ImplicitIntegrationProvider {
    /// `mass·M + damping·C + stiffness·K` for one subdomain
    fn assemble_effective_operator(
        &self,
        id: SubdomainId,
        coefficients: &IntegrationCoefficients,
    ) -> FEAResult<CsrMatrix<f64>>;

    /// `M x`
    fn mass_product(&self, id: SubdomainId, x: &FEVec) -> FEAResult<FEVec>;

    /// `C x`
    fn damping_product(&self, id: SubdomainId, x: &FEVec) -> FEAResult<FEVec>;

    /// Add the externally applied load of the current step into `system.rhs`
    fn refresh_pure_load(
        &self,
        system: &mut LinearSystem,
        coefficients: &IntegrationCoefficients,
    ) -> FEAResult<()>;

    /// Move the load histories to `step`
    fn advance_history(&mut self, step: usize) -> FEAResult<()>;

    /// Prescribed velocity increments applied at `step`
    fn external_velocities(&self, step: usize) -> HashMap<SubdomainId, FEVec>;

    /// Prescribed acceleration increments applied at `step`
    fn external_accelerations(&self, step: usize) -> HashMap<SubdomainId, FEVec>;
}
