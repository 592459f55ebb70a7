//! Damped single-degree-of-freedom oscillator under harmonic forcing,
//! started from rest, against the closed-form response.

use std::f64::consts::PI;

use approx::assert_relative_eq;
use fea_transient::math::sparse::csr_diagonal;
use fea_transient::math::Vec as FEVec;
use fea_transient::prelude::*;

const MASS: f64 = 1.0;
const OMEGA: f64 = 2.0 * PI;
const ZETA: f64 = 0.05;
const FORCE: f64 = 10.0;
const FORCING_FREQ: f64 = PI;
const DURATION: f64 = 2.0;

fn stiffness() -> f64 {
    MASS * OMEGA * OMEGA
}

fn damping() -> f64 {
    2.0 * ZETA * OMEGA * MASS
}

fn load(t: f64) -> f64 {
    FORCE * (FORCING_FREQ * t).sin()
}

/// Exact displacement, velocity and acceleration at time `t`
fn exact(t: f64) -> (f64, f64, f64) {
    let (k, c, w) = (stiffness(), damping(), FORCING_FREQ);
    let amplitude = FORCE / ((k - MASS * w * w).powi(2) + (c * w).powi(2)).sqrt();
    let phase = (c * w).atan2(k - MASS * w * w);

    let wd = OMEGA * (1.0 - ZETA * ZETA).sqrt();
    let a = amplitude * phase.sin();
    let b = (ZETA * OMEGA * a - amplitude * w * phase.cos()) / wd;
    let decay = (-ZETA * OMEGA * t).exp();

    let x_p = amplitude * (w * t - phase).sin();
    let v_p = amplitude * w * (w * t - phase).cos();
    let x_h = decay * (a * (wd * t).cos() + b * (wd * t).sin());
    let v_h = decay
        * ((-ZETA * OMEGA * a + wd * b) * (wd * t).cos()
            + (-ZETA * OMEGA * b - wd * a) * (wd * t).sin());

    let x = x_p + x_h;
    let v = v_p + v_h;
    let acc = (load(t) - c * v - k * x) / MASS;
    (x, v, acc)
}

struct Run {
    displacements: Vec<f64>,
    final_state: (f64, f64, f64),
}

fn run<S: DirectSolver>(solver: S, dt: f64) -> Run {
    let mut model = FEModel::new();
    let id = model.add_subdomain("SDOF", 1).unwrap();

    let params = NewmarkParameters::average_acceleration(dt, DURATION);
    let magnitudes = (0..params.num_steps())
        .map(|i| load((i + 1) as f64 * dt))
        .collect();

    let mut problem = StructuralProblem::new();
    problem
        .add_subdomain(id, csr_diagonal(&[MASS]), csr_diagonal(&[stiffness()]))
        .unwrap();
    problem
        .set_damping_matrix(id, csr_diagonal(&[damping()]))
        .unwrap();
    problem
        .add_time_history_load(id, FEVec::from_element(1, 1.0), magnitudes)
        .unwrap();

    let child = LinearAnalyzer::new().with_watch(id, vec![0]);
    let mut analyzer =
        NewmarkDynamicAnalyzer::new(model, solver, problem, Some(child), params).unwrap();
    analyzer.register_result_storage(id, TimeHistoryLog::new());
    analyzer.initialize().unwrap();
    analyzer.solve().unwrap();

    let state = analyzer.state(id).unwrap();
    Run {
        displacements: analyzer.result_storage(id).unwrap().series(0),
        final_state: (state.v[0], state.v1[0], state.v2[0]),
    }
}

fn skyline_with_sdof() -> SkylineSolver {
    SkylineSolver::default()
        .with_system(LinearSystem::new(SubdomainId(0), 1))
        .unwrap()
}

fn max_displacement_error(run: &Run, dt: f64) -> f64 {
    run.displacements
        .iter()
        .enumerate()
        .map(|(i, &x)| (x - exact((i + 1) as f64 * dt).0).abs())
        .fold(0.0, f64::max)
}

#[test]
fn test_response_tracks_closed_form() {
    let dt = 0.005;
    let result = run(skyline_with_sdof(), dt);
    assert_eq!(result.displacements.len(), 400);

    let peak = (1..=400)
        .map(|i| exact(i as f64 * dt).0.abs())
        .fold(0.0, f64::max);
    assert!(max_displacement_error(&result, dt) < 0.01 * peak);

    let (x, v, a) = exact(DURATION);
    let (xn, vn, an) = result.final_state;
    assert_relative_eq!(xn, x, epsilon = 0.01 * peak);
    assert_relative_eq!(vn, v, epsilon = 0.01 * peak * OMEGA);
    assert_relative_eq!(an, a, epsilon = 0.01 * peak * OMEGA * OMEGA);
}

#[test]
fn test_second_order_convergence() {
    let coarse = max_displacement_error(&run(skyline_with_sdof(), 0.01), 0.01);
    let fine = max_displacement_error(&run(skyline_with_sdof(), 0.005), 0.005);

    let ratio = coarse / fine;
    assert!(ratio > 3.0 && ratio < 5.0, "error ratio {}", ratio);
}

#[test]
fn test_solvers_give_same_history() {
    let skyline = run(skyline_with_sdof(), 0.01);
    let csc = run(
        CscLdlSolver::default()
            .with_system(LinearSystem::new(SubdomainId(0), 1))
            .unwrap(),
        0.01,
    );
    for (a, b) in skyline.displacements.iter().zip(&csc.displacements) {
        assert_relative_eq!(a, b, epsilon = 1e-14);
    }
}
