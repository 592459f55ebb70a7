//! Transient analysis: Newmark-beta integration over direct solvers

pub mod child;
pub mod newmark;
pub mod problem;
pub mod provider;
pub mod state;

pub use child::{ChildAnalyzer, LinearAnalyzer, RhsContributions};
pub use newmark::{NewmarkCoefficients, NewmarkDynamicAnalyzer, NewmarkParameters};
pub use problem::{Damping, GroundMotion, StructuralProblem, TimeHistoryLoad};
pub use provider::{ImplicitIntegrationProvider, IntegrationCoefficients};
pub use state::KinematicState;
