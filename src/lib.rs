//! FEA Transient - implicit dynamic analysis for Rust
//!
//! This library integrates the equations of motion `M ü + C u̇ + K u = F(t)`
//! of discretized structures with the Newmark-beta method, supporting:
//! - Average acceleration and numerically damped Newmark variants
//! - Time-history loads, ground acceleration and prescribed motion
//! - Skyline LDLᵀ and sparse LDLᵀ (compressed column) direct solvers
//! - Natural, reverse Cuthill-McKee and minimum-degree dof orderings
//! - Factorization caching across time steps and restart from prior solutions
//!
//! ## Example
//! ```rust
//! use fea_transient::prelude::*;
//! use fea_transient::math::sparse::csr_diagonal;
//!
//! let mut model = FEModel::new();
//! let id = model.add_subdomain("SDOF", 1).unwrap();
//! model.add_node_load("SDOF", NodeLoad::new(0, 100.0)).unwrap();
//!
//! let mut problem = StructuralProblem::new();
//! problem.add_subdomain(id, csr_diagonal(&[1.0]), csr_diagonal(&[400.0])).unwrap();
//!
//! let solver = SkylineSolver::default().with_system(LinearSystem::new(id, 1)).unwrap();
//! let child = LinearAnalyzer::new().with_watch(id, vec![0]);
//! let params = NewmarkParameters::average_acceleration(0.01, 0.5);
//!
//! let mut analyzer = NewmarkDynamicAnalyzer::new(model, solver, problem, Some(child), params).unwrap();
//! analyzer.register_result_storage(id, TimeHistoryLog::new());
//! analyzer.initialize().unwrap();
//! analyzer.solve().unwrap();
//!
//! assert_eq!(analyzer.result_storage(id).unwrap().len(), 50);
//! ```

pub mod analysis;
pub mod error;
pub mod math;
pub mod model;
pub mod results;
pub mod solvers;

// Re-export common types
pub mod prelude {
    pub use crate::analysis::{
        ChildAnalyzer, ImplicitIntegrationProvider, IntegrationCoefficients, KinematicState,
        LinearAnalyzer, NewmarkCoefficients, NewmarkDynamicAnalyzer, NewmarkParameters,
        RhsContributions, StructuralProblem,
    };
    pub use crate::error::{FEAError, FEAResult};
    pub use crate::math::Reordering;
    pub use crate::model::{FEModel, NodeLoad, StructuralModel, SubdomainId};
    pub use crate::results::{DofDisplacementLog, StepRecord, TimeHistoryLog};
    pub use crate::solvers::{
        CscLdlSolver, DirectSolver, LinearSystem, SkylineSolver, SolverOptions,
    };
}
