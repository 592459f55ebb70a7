//! Newmark-beta implicit time integration
//!
//! The analyzer forms the effective operator `a0·M + a1·C + K` once per run,
//! then for every step assembles the implicit right-hand side
//! `F + M·(a0·u + a2·u̇ + a3·ü) + C·(a1·u + a4·u̇ + a5·ü)`, hands the system
//! to the child analyzer and updates velocities and accelerations from the
//! new displacement.

use std::collections::HashMap;
use std::time::Instant;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::child::{ChildAnalyzer, RhsContributions};
use super::provider::{ImplicitIntegrationProvider, IntegrationCoefficients};
use super::state::KinematicState;
use crate::error::{FEAError, FEAResult};
use crate::math::Vec as FEVec;
use crate::model::{StructuralModel, SubdomainId};
use crate::results::TimeHistoryLog;
use crate::solvers::DirectSolver;

/// Time stepping parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewmarkParameters {
    pub time_step: f64,
    pub total_time: f64,
    /// Newmark beta
    pub alpha: f64,
    /// Newmark gamma
    pub delta: f64,
}

impl Default for NewmarkParameters {
    fn default() -> Self {
        Self {
            time_step: 0.01,
            total_time: 1.0,
            alpha: 0.25,
            delta: 0.5,
        }
    }
}

impl NewmarkParameters {
    /// Constant average acceleration (trapezoidal rule)
    pub fn average_acceleration(time_step: f64, total_time: f64) -> Self {
        Self {
            time_step,
            total_time,
            ..Self::default()
        }
    }

    /// Linear acceleration; only conditionally stable, so `validate` rejects it
    pub fn linear_acceleration(time_step: f64, total_time: f64) -> Self {
        Self {
            time_step,
            total_time,
            alpha: 1.0 / 6.0,
            delta: 0.5,
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_delta(mut self, delta: f64) -> Self {
        self.delta = delta;
        self
    }

    pub fn with_time_step(mut self, time_step: f64) -> Self {
        self.time_step = time_step;
        self
    }

    pub fn with_total_time(mut self, total_time: f64) -> Self {
        self.total_time = total_time;
        self
    }

    /// Check step sizes and the unconditional stability bounds
    pub fn validate(&self) -> FEAResult<()> {
        if !self.time_step.is_finite() || self.time_step <= 0.0 {
            return Err(FEAError::InvalidParameter(format!(
                "time step must be positive and finite, got {}",
                self.time_step
            )));
        }
        if !self.total_time.is_finite() || self.total_time <= 0.0 {
            return Err(FEAError::InvalidParameter(format!(
                "total time must be positive and finite, got {}",
                self.total_time
            )));
        }
        if !(self.delta >= 0.5) {
            return Err(FEAError::InvalidParameter(format!(
                "Newmark delta must be at least 0.5, got {}",
                self.delta
            )));
        }
        let min_alpha = 0.25 * (0.5 + self.delta).powi(2);
        if !(self.alpha >= min_alpha) {
            return Err(FEAError::InvalidParameter(format!(
                "Newmark alpha must be at least 0.25·(0.5 + delta)² = {} for delta = {}, got {}",
                min_alpha, self.delta, self.alpha
            )));
        }
        Ok(())
    }

    /// Number of steps covering `total_time`
    ///
    /// This is not a plain `floor(total_time / time_step)`: a ratio within a
    /// relative 1e-12 of an integer is rounded to it, so `0.3 / 0.1`
    /// (`2.9999999999999996` in floating point) gives 3 steps where a floor
    /// would give 2. Ratios further from an integer are floored.
    pub fn num_steps(&self) -> usize {
        let ratio = self.total_time / self.time_step;
        let nearest = ratio.round();
        if (ratio - nearest).abs() <= 1e-12 * nearest.max(1.0) {
            nearest as usize
        } else {
            ratio.floor() as usize
        }
    }
}

/// Integration constants `a0..a7` derived from the parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewmarkCoefficients {
    a0: f64,
    a1: f64,
    a2: f64,
    a3: f64,
    a4: f64,
    a5: f64,
    a6: f64,
    a7: f64,
}

impl NewmarkCoefficients {
    pub fn new(params: &NewmarkParameters) -> FEAResult<Self> {
        params.validate()?;
        let dt = params.time_step;
        let alpha = params.alpha;
        let delta = params.delta;

        Ok(Self {
            a0: 1.0 / (alpha * dt * dt),
            a1: delta / (alpha * dt),
            a2: 1.0 / (alpha * dt),
            a3: 1.0 / (2.0 * alpha) - 1.0,
            a4: delta / alpha - 1.0,
            a5: dt * 0.5 * (delta / alpha - 2.0),
            a6: dt * (1.0 - delta),
            a7: delta * dt,
        })
    }

    pub fn a0(&self) -> f64 {
        self.a0
    }

    pub fn a1(&self) -> f64 {
        self.a1
    }

    pub fn a2(&self) -> f64 {
        self.a2
    }

    pub fn a3(&self) -> f64 {
        self.a3
    }

    pub fn a4(&self) -> f64 {
        self.a4
    }

    pub fn a5(&self) -> f64 {
        self.a5
    }

    pub fn a6(&self) -> f64 {
        self.a6
    }

    pub fn a7(&self) -> f64 {
        self.a7
    }

    /// Operator weights `{a0, a1, 1}`
    pub fn integration(&self) -> IntegrationCoefficients {
        IntegrationCoefficients::new(self.a0, self.a1, 1.0)
    }
}

/// `a0·M·x + a1·C·x` through the provider
struct NewmarkContributions<'a, P> {
    provider: &'a P,
    coefficients: NewmarkCoefficients,
}

impl<P: ImplicitIntegrationProvider> RhsContributions for NewmarkContributions<'_, P> {
    fn other_rhs_components(&self, id: SubdomainId, x: &FEVec) -> FEAResult<FEVec> {
        let m = self.provider.mass_product(id, x)?;
        let c = self.provider.damping_product(id, x)?;
        if m.len() != c.len() {
            return Err(FEAError::dimension(m.len(), c.len()));
        }
        Ok(m * self.coefficients.a0 + c * self.coefficients.a1)
    }
}

/// Newmark-beta transient analyzer
pub struct NewmarkDynamicAnalyzer<M, S, P, C> {
    model: M,
    solver: S,
    provider: P,
    child: Option<C>,
    parameters: NewmarkParameters,
    coefficients: NewmarkCoefficients,
    /// Indexed by linear system handle
    states: Vec<KinematicState>,
    storages: HashMap<SubdomainId, TimeHistoryLog>,
    initialized: bool,
}

impl<M, S, P, C> NewmarkDynamicAnalyzer<M, S, P, C>
where
    M: StructuralModel,
    S: DirectSolver,
    P: ImplicitIntegrationProvider,
    C: ChildAnalyzer,
{
    /// Validate the parameters and derive the integration coefficients
    pub fn new(
        model: M,
        solver: S,
        provider: P,
        child: Option<C>,
        parameters: NewmarkParameters,
    ) -> FEAResult<Self> {
        let coefficients = NewmarkCoefficients::new(&parameters)?;
        Ok(Self {
            model,
            solver,
            provider,
            child,
            parameters,
            coefficients,
            states: Vec::new(),
            storages: HashMap::new(),
            initialized: false,
        })
    }

    /// Install `a0·M + a1·C + K` as the operator of every linear system
    pub fn build_matrices(&mut self) -> FEAResult<()> {
        let weights = self.coefficients.integration();
        for handle in 0..self.solver.linear_systems().len() {
            let id = self.solver.linear_system(handle)?.id();
            let operator = self.provider.assemble_effective_operator(id, &weights)?;
            self.solver.set_matrix(handle, operator)?;
        }
        Ok(())
    }

    /// Prepare the model, the kinematic state and the child analyzer
    pub fn initialize(&mut self) -> FEAResult<()> {
        let child = self.child.as_mut().ok_or_else(|| {
            FEAError::Configuration("Newmark analyzer requires a child analyzer".to_string())
        })?;

        self.model.connect_data_structures()?;
        self.model.order_dofs()?;
        self.model.assign_loads()?;

        let weights = self.coefficients.integration();
        let mut states = Vec::with_capacity(self.solver.linear_systems().len());
        for handle in 0..self.solver.linear_systems().len() {
            let id = self.solver.linear_system(handle)?.id();
            let forces = self.model.forces(id)?;
            let system = self.solver.linear_system_mut(handle)?;
            if forces.len() != system.size() {
                return Err(FEAError::dimension(system.size(), forces.len()));
            }
            system.rhs = forces;

            let mut state = KinematicState::zeros(system.size());
            if let Some(previous) = &system.solution {
                if previous.len() != state.size() {
                    return Err(FEAError::dimension(state.size(), previous.len()));
                }
                state.v.copy_from(previous);
                debug!("Subdomain {} starts from a prior solution", id);
            }

            self.provider.refresh_pure_load(system, &weights)?;
            state.rhs.copy_from(&system.rhs);
            states.push(state);
        }
        self.states = states;

        child.initialize(&mut self.solver)?;
        self.initialized = true;

        info!(
            "Newmark analyzer initialized: {} subdomain(s), dt = {}, {} step(s)",
            self.states.len(),
            self.parameters.time_step,
            self.parameters.num_steps()
        );
        Ok(())
    }

    /// Run the whole time history
    pub fn solve(&mut self) -> FEAResult<()> {
        if !self.initialized {
            return Err(FEAError::NotInitialized);
        }
        self.build_matrices()?;

        let num_steps = self.parameters.num_steps();
        let run_start = Instant::now();

        for step in 0..num_steps {
            self.provider.advance_history(step)?;

            for handle in 0..self.states.len() {
                self.refresh_rhs(handle)?;
                self.assemble_implicit_rhs(handle)?;
            }

            let child = self.child.as_mut().ok_or_else(|| {
                FEAError::Configuration("Newmark analyzer requires a child analyzer".to_string())
            })?;
            let contributions = NewmarkContributions {
                provider: &self.provider,
                coefficients: self.coefficients,
            };
            let start = Instant::now();
            child.solve(&mut self.solver, &contributions)?;
            let end = Instant::now();

            let velocities = self.provider.external_velocities(step);
            let accelerations = self.provider.external_accelerations(step);
            for handle in 0..self.states.len() {
                let id = self.solver.linear_system(handle)?.id();
                self.update_kinematics(handle, velocities.get(&id), accelerations.get(&id))?;
            }

            self.store_results(start, end)?;
            debug!(
                "Step {}/{} (t = {:.6}) solved in {:?}",
                step + 1,
                num_steps,
                (step + 1) as f64 * self.parameters.time_step,
                end - start
            );
        }

        info!(
            "Newmark analysis finished: {} step(s) in {:?}",
            num_steps,
            run_start.elapsed()
        );
        Ok(())
    }

    /// `a0·M·x + a1·C·x` for one subdomain
    pub fn other_rhs_components(&self, id: SubdomainId, x: &FEVec) -> FEAResult<FEVec> {
        NewmarkContributions {
            provider: &self.provider,
            coefficients: self.coefficients,
        }
        .other_rhs_components(id, x)
    }

    /// Attach a time-history storage to a subdomain
    pub fn register_result_storage(&mut self, id: SubdomainId, storage: TimeHistoryLog) {
        self.storages.insert(id, storage);
    }

    pub fn result_storage(&self, id: SubdomainId) -> Option<&TimeHistoryLog> {
        self.storages.get(&id)
    }

    pub fn coefficients(&self) -> &NewmarkCoefficients {
        &self.coefficients
    }

    pub fn parameters(&self) -> &NewmarkParameters {
        &self.parameters
    }

    pub fn num_steps(&self) -> usize {
        self.parameters.num_steps()
    }

    /// Kinematic state of a subdomain, available after `initialize`
    pub fn state(&self, id: SubdomainId) -> FEAResult<&KinematicState> {
        let handle = self.solver.handle_of(id)?;
        self.states.get(handle).ok_or(FEAError::NotInitialized)
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    pub fn solver_mut(&mut self) -> &mut S {
        &mut self.solver
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn child(&self) -> Option<&C> {
        self.child.as_ref()
    }

    /// rhs := model forces + pure load of the current step
    fn refresh_rhs(&mut self, handle: usize) -> FEAResult<()> {
        let weights = self.coefficients.integration();
        let id = self.solver.linear_system(handle)?.id();
        let forces = self.model.forces(id)?;

        let system = self.solver.linear_system_mut(handle)?;
        if forces.len() != system.size() {
            return Err(FEAError::dimension(system.size(), forces.len()));
        }
        system.rhs = forces;
        self.provider.refresh_pure_load(system, &weights)?;
        self.states[handle].rhs.copy_from(&system.rhs);
        Ok(())
    }

    fn assemble_implicit_rhs(&mut self, handle: usize) -> FEAResult<()> {
        let c = self.coefficients;
        let id = self.solver.linear_system(handle)?.id();
        let state = &mut self.states[handle];

        state.uu = &state.v * c.a0 + &state.v1 * c.a2 + &state.v2 * c.a3;
        state.uc = &state.v * c.a1 + &state.v1 * c.a4 + &state.v2 * c.a5;
        state.uum = self.provider.mass_product(id, &state.uu)?;
        state.ucc = self.provider.damping_product(id, &state.uc)?;
        if state.uum.len() != state.size() || state.ucc.len() != state.size() {
            return Err(FEAError::dimension(
                state.size(),
                state.uum.len().max(state.ucc.len()),
            ));
        }

        let system = self.solver.linear_system_mut(handle)?;
        system.rhs = &state.rhs + &state.uum + &state.ucc;
        Ok(())
    }

    fn update_kinematics(
        &mut self,
        handle: usize,
        external_velocity: Option<&FEVec>,
        external_acceleration: Option<&FEVec>,
    ) -> FEAResult<()> {
        let c = self.coefficients;
        let system = self.solver.linear_system(handle)?;
        let solution = system
            .solution
            .as_ref()
            .ok_or(FEAError::MissingOperator(system.id()))?;
        let state = &mut self.states[handle];
        if solution.len() != state.size() {
            return Err(FEAError::dimension(state.size(), solution.len()));
        }

        std::mem::swap(&mut state.u, &mut state.v);
        state.v.copy_from(solution);

        let mut vv = state.v2.clone();
        if let Some(da) = external_acceleration {
            if da.len() != vv.len() {
                return Err(FEAError::dimension(vv.len(), da.len()));
            }
            vv += da;
        }

        let v2 = (&state.v - &state.u) * c.a0 - &state.v1 * c.a2 - &vv * c.a3;
        let mut v1 = &state.v1 + &vv * c.a6 + &v2 * c.a7;
        if let Some(dv) = external_velocity {
            if dv.len() != v1.len() {
                return Err(FEAError::dimension(v1.len(), dv.len()));
            }
            v1 += dv;
        }

        state.v1 = v1;
        state.v2 = v2;
        Ok(())
    }

    fn store_results(&mut self, start: Instant, end: Instant) -> FEAResult<()> {
        let Some(child) = self.child.as_ref() else {
            return Ok(());
        };
        for system in self.solver.linear_systems() {
            let Some(storage) = self.storages.get_mut(&system.id()) else {
                continue;
            };
            for entry in child.logs(system.id()) {
                storage.store_results(start, end, entry);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_trapezoidal_coefficients() {
        let params = NewmarkParameters::average_acceleration(0.1, 1.0);
        let c = NewmarkCoefficients::new(&params).unwrap();
        assert_relative_eq!(c.a0(), 400.0, epsilon = 1e-9);
        assert_relative_eq!(c.a1(), 20.0, epsilon = 1e-12);
        assert_relative_eq!(c.a2(), 40.0, epsilon = 1e-12);
        assert_relative_eq!(c.a3(), 1.0);
        assert_relative_eq!(c.a4(), 1.0);
        assert_relative_eq!(c.a5(), 0.0);
        assert_relative_eq!(c.a6(), 0.05);
        assert_relative_eq!(c.a7(), 0.05);
        assert_eq!(c.integration(), IntegrationCoefficients::new(c.a0(), c.a1(), 1.0));
    }

    #[test]
    fn test_validation() {
        assert!(NewmarkParameters::default().validate().is_ok());
        for bad in [
            NewmarkParameters::linear_acceleration(0.01, 1.0),
            NewmarkParameters::default().with_delta(0.4),
            NewmarkParameters::default().with_delta(0.6),
            NewmarkParameters::default().with_time_step(0.0),
            NewmarkParameters::default().with_time_step(f64::NAN),
            NewmarkParameters::default().with_total_time(-1.0),
        ] {
            assert!(matches!(
                NewmarkCoefficients::new(&bad),
                Err(FEAError::InvalidParameter(_))
            ));
        }
        // Numerical damping: delta = 0.6 needs alpha >= 0.3025
        let damped = NewmarkParameters::default().with_delta(0.6).with_alpha(0.31);
        assert!(damped.validate().is_ok());
    }

    #[test]
    fn test_num_steps() {
        assert_eq!(NewmarkParameters::average_acceleration(0.01, 1.0).num_steps(), 100);
        // 0.3 / 0.1 falls just short of 3 in floating point
        assert_eq!((0.3_f64 / 0.1).floor(), 2.0);
        assert_eq!(NewmarkParameters::average_acceleration(0.1, 0.3).num_steps(), 3);
        assert_eq!(NewmarkParameters::average_acceleration(0.1, 0.35).num_steps(), 3);
        assert_eq!(NewmarkParameters::average_acceleration(0.3, 1.0).num_steps(), 3);
        assert_eq!(NewmarkParameters::average_acceleration(2.0, 1.0).num_steps(), 0);
    }

    #[test]
    fn test_parameters_from_json() {
        let params: NewmarkParameters =
            serde_json::from_str(r#"{"time_step": 0.02, "total_time": 2.0}"#).unwrap();
        assert_eq!(params.alpha, 0.25);
        assert_eq!(params.delta, 0.5);
        assert_eq!(params.num_steps(), 100);
    }

    proptest! {
        #[test]
        fn coefficient_identities(
            dt in 1e-4f64..1.0,
            delta in 0.5f64..1.0,
            extra in 0.0f64..0.5,
        ) {
            let alpha = 0.25 * (0.5 + delta).powi(2) + extra;
            let params = NewmarkParameters::average_acceleration(dt, 10.0)
                .with_alpha(alpha)
                .with_delta(delta);
            let c = NewmarkCoefficients::new(&params).unwrap();

            let close = |a: f64, b: f64| (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0);
            prop_assert!(close(c.a2(), c.a0() * dt));
            prop_assert!(close(c.a1(), delta * c.a2()));
            prop_assert!(close(c.a4(), c.a1() * dt - 1.0));
            prop_assert!(close(c.a3(), c.a0() * dt * dt / 2.0 - 1.0));
            prop_assert!(close(c.a5(), dt / 2.0 * (c.a4() - 1.0)));
            prop_assert!(close(c.a6() + c.a7(), dt));
        }
    }
}
