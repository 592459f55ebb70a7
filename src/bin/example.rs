//! FEA Transient Example - shear building under ground acceleration

use fea_transient::math::sparse::{csr_diagonal, SparseMatrixBuilder};
use fea_transient::math::Vec as FEVec;
use fea_transient::prelude::*;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    println!("=== FEA Transient Example: 5-Story Shear Building ===\n");

    // Lumped story masses (kg) and story stiffnesses (N/m)
    //
    //   m5 ── floor 5
    //   |k5
    //   m4 ── floor 4
    //   ...
    //   m1 ── floor 1
    //   |k1
    //  ///// ground
    //
    let stories = 5;
    let story_mass = 20_000.0;
    let story_stiffness = 4.0e7;

    let mut model = FEModel::new();
    let id = model.add_subdomain("Building", stories)?;
    // Constant wind load on the roof
    model.add_node_load("Building", NodeLoad::new(stories - 1, 5_000.0))?;

    let mass = csr_diagonal(&vec![story_mass; stories]);
    let mut kb = SparseMatrixBuilder::new(stories);
    kb.add(0, 0, story_stiffness);
    for i in 0..stories - 1 {
        kb.add_element_matrix(
            &[i, i + 1],
            &[
                [story_stiffness, -story_stiffness],
                [-story_stiffness, story_stiffness],
            ],
        );
    }
    let stiffness = kb.to_csr();

    let dt = 0.005;
    let duration = 4.0;
    let params = NewmarkParameters::average_acceleration(dt, duration);

    // Half-sine ground pulse, 0.3 g for 0.5 s
    let pulse: Vec<f64> = (0..params.num_steps())
        .map(|i| {
            let t = (i + 1) as f64 * dt;
            if t <= 0.5 {
                0.3 * 9.81 * (std::f64::consts::PI * t / 0.5).sin()
            } else {
                0.0
            }
        })
        .collect();

    let mut problem = StructuralProblem::new();
    problem.add_subdomain(id, mass, stiffness)?;
    problem.set_rayleigh_damping(id, 0.2, 0.002)?;
    problem.set_ground_motion(id, FEVec::from_element(stories, 1.0), pulse)?;

    let options = SolverOptions::default().with_reordering(Reordering::ReverseCuthillMcKee);
    let solver = SkylineSolver::new(options).with_system(LinearSystem::new(id, stories))?;
    let child = LinearAnalyzer::new().with_watch(id, (0..stories).collect());

    let mut analyzer = NewmarkDynamicAnalyzer::new(model, solver, problem, Some(child), params)?;
    analyzer.register_result_storage(id, TimeHistoryLog::new());
    analyzer.initialize()?;
    analyzer.solve()?;

    println!("Time step: {} s, steps: {}", dt, analyzer.num_steps());
    println!(
        "Factorizations: {}\n",
        analyzer.solver().factorization_count()
    );

    let storage = analyzer
        .result_storage(id)
        .ok_or_else(|| anyhow::anyhow!("no result storage for subdomain {}", id))?;

    println!("Peak floor displacements:");
    for floor in 0..stories {
        let series = storage.series(floor);
        let (step, peak) = series
            .iter()
            .enumerate()
            .fold((0, 0.0_f64), |(bi, bv), (i, &v)| {
                if v.abs() > bv.abs() {
                    (i, v)
                } else {
                    (bi, bv)
                }
            });
        println!(
            "  Floor {}: {:>10.3} mm at t = {:.3} s",
            floor + 1,
            peak * 1000.0,
            (step + 1) as f64 * dt
        );
    }

    let state = analyzer.state(id)?;
    println!("\nFinal roof state:");
    println!("  Displacement: {:.4} mm", state.displacement()[stories - 1] * 1000.0);
    println!("  Velocity:     {:.4} mm/s", state.velocity()[stories - 1] * 1000.0);
    println!("  Acceleration: {:.4} mm/s²", state.acceleration()[stories - 1] * 1000.0);

    println!("\nHistory as JSON: {} bytes", storage.to_json()?.len());

    Ok(())
}
