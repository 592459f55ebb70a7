//! FEA Transient HTTP Server

use axum::{
    extract::Json,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use nalgebra_sparse::CsrMatrix;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};

use fea_transient::error::FEAError;
use fea_transient::math::SparseMatrixBuilder;
use fea_transient::math::Vec as FEVec;
use fea_transient::prelude::*;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Debug, Deserialize)]
struct TransientRequest {
    model: TransientModelData,
    #[serde(default)]
    newmark: NewmarkParameters,
    #[serde(default)]
    solver: SolverData,
    /// Dofs to report, in the unconstrained numbering
    watch: Vec<usize>,
}

#[derive(Debug, Deserialize)]
struct TransientModelData {
    num_dofs: usize,
    /// `[row, col, value]`, both triangles
    mass: Vec<(usize, usize, f64)>,
    stiffness: Vec<(usize, usize, f64)>,
    #[serde(default)]
    damping: Option<Vec<(usize, usize, f64)>>,
    #[serde(default)]
    rayleigh: Option<RayleighData>,
    #[serde(default)]
    supports: Vec<usize>,
    #[serde(default)]
    node_loads: Vec<NodeLoad>,
    #[serde(default)]
    history_loads: Vec<HistoryLoadData>,
    #[serde(default)]
    ground_acceleration: Option<GroundMotionData>,
}

#[derive(Debug, Deserialize)]
struct RayleighData {
    alpha: f64,
    beta: f64,
}

#[derive(Debug, Deserialize)]
struct HistoryLoadData {
    dof: usize,
    /// One magnitude per step
    magnitudes: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct GroundMotionData {
    /// Dofs excited by the ground motion (direction cosine 1)
    dofs: Vec<usize>,
    accelerations: Vec<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum SolverKind {
    #[default]
    Skyline,
    Csc,
}

#[derive(Debug, Default, Deserialize)]
struct SolverData {
    #[serde(default)]
    kind: SolverKind,
    #[serde(default)]
    options: SolverOptions,
}

#[derive(Debug, Serialize)]
struct TransientResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    results: Option<TimeHistoryData>,
}

#[derive(Debug, Serialize)]
struct TimeHistoryData {
    num_steps: usize,
    time_step: f64,
    times: Vec<f64>,
    series: Vec<DofSeries>,
    solve_seconds: f64,
}

#[derive(Debug, Serialize)]
struct DofSeries {
    dof: usize,
    displacements: Vec<f64>,
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn analyze_transient(Json(request): Json<TransientRequest>) -> impl IntoResponse {
    match run_transient(request) {
        Ok(results) => (
            StatusCode::OK,
            Json(TransientResponse {
                success: true,
                error: None,
                results: Some(results),
            }),
        ),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(TransientResponse {
                success: false,
                error: Some(e.to_string()),
                results: None,
            }),
        ),
    }
}

/// Assemble triplets restricted to the free dofs
fn reduced_matrix(
    triplets: &[(usize, usize, f64)],
    equations: &[Option<usize>],
    size: usize,
) -> Result<CsrMatrix<f64>, FEAError> {
    let mut builder = SparseMatrixBuilder::new(size);
    for &(row, col, value) in triplets {
        let (Some(r), Some(c)) = (equations.get(row), equations.get(col)) else {
            return Err(FEAError::InvalidInput(format!(
                "matrix entry ({}, {}) out of range",
                row, col
            )));
        };
        if let (Some(r), Some(c)) = (r, c) {
            builder.add(*r, *c, value);
        }
    }
    Ok(builder.to_csr())
}

fn run_transient(request: TransientRequest) -> Result<TimeHistoryData, FEAError> {
    let data = request.model;

    let mut model = FEModel::new();
    let id = model.add_subdomain("Structure", data.num_dofs)?;
    for &dof in &data.supports {
        model.add_support("Structure", dof)?;
    }
    for load in &data.node_loads {
        model.add_node_load("Structure", *load)?;
    }

    // Number the free dofs up front to reduce the operators
    model.connect_data_structures()?;
    model.order_dofs()?;
    let size = model.num_free_dofs(id)?;
    let equations: Vec<Option<usize>> = (0..data.num_dofs)
        .map(|dof| model.equation_number(id, dof))
        .collect();
    let free = |dof: usize| -> Result<Option<usize>, FEAError> {
        equations
            .get(dof)
            .copied()
            .ok_or_else(|| FEAError::InvalidInput(format!("dof {} out of range", dof)))
    };

    let mut problem = StructuralProblem::new();
    problem.add_subdomain(
        id,
        reduced_matrix(&data.mass, &equations, size)?,
        reduced_matrix(&data.stiffness, &equations, size)?,
    )?;
    if let Some(damping) = &data.damping {
        problem.set_damping_matrix(id, reduced_matrix(damping, &equations, size)?)?;
    } else if let Some(r) = &data.rayleigh {
        problem.set_rayleigh_damping(id, r.alpha, r.beta)?;
    }
    for load in &data.history_loads {
        if let Some(eq) = free(load.dof)? {
            let mut pattern = FEVec::zeros(size);
            pattern[eq] = 1.0;
            problem.add_time_history_load(id, pattern, load.magnitudes.clone())?;
        }
    }
    if let Some(ground) = &data.ground_acceleration {
        let mut influence = FEVec::zeros(size);
        for &dof in &ground.dofs {
            if let Some(eq) = free(dof)? {
                influence[eq] = 1.0;
            }
        }
        problem.set_ground_motion(id, influence, ground.accelerations.clone())?;
    }

    let mut watched = Vec::new();
    let mut watched_eqs = Vec::new();
    for &dof in &request.watch {
        match free(dof)? {
            Some(eq) => {
                watched.push(dof);
                watched_eqs.push(eq);
            }
            None => log::warn!("Watched dof {} is constrained and is not reported", dof),
        }
    }
    let child = LinearAnalyzer::new().with_watch(id, watched_eqs.clone());
    let system = LinearSystem::new(id, size);
    let options = request.solver.options;

    let storage = match request.solver.kind {
        SolverKind::Skyline => {
            let solver = SkylineSolver::new(options).with_system(system)?;
            run_analyzer(model, solver, problem, child, request.newmark, id)?
        }
        SolverKind::Csc => {
            let solver = CscLdlSolver::new(options).with_system(system)?;
            run_analyzer(model, solver, problem, child, request.newmark, id)?
        }
    };

    let dt = request.newmark.time_step;
    Ok(TimeHistoryData {
        num_steps: storage.len(),
        time_step: dt,
        times: (1..=storage.len()).map(|i| i as f64 * dt).collect(),
        series: watched
            .iter()
            .zip(&watched_eqs)
            .map(|(&dof, &eq)| DofSeries {
                dof,
                displacements: storage.series(eq),
            })
            .collect(),
        solve_seconds: storage.total_duration(),
    })
}

fn run_analyzer<S: DirectSolver>(
    model: FEModel,
    solver: S,
    problem: StructuralProblem,
    child: LinearAnalyzer,
    params: NewmarkParameters,
    id: SubdomainId,
) -> Result<TimeHistoryLog, FEAError> {
    let mut analyzer = NewmarkDynamicAnalyzer::new(model, solver, problem, Some(child), params)?;
    analyzer.register_result_storage(id, TimeHistoryLog::new());
    analyzer.initialize()?;
    analyzer.solve()?;
    analyzer
        .result_storage(id)
        .cloned()
        .ok_or(FEAError::SubdomainNotFound(id))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health))
        .route("/api/v1/analyze/transient", post(analyze_transient))
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], 8086));
    println!("FEA Transient Server listening on http://{}", addr);
    println!("  Health check: GET  /health");
    println!("  Transient:    POST /api/v1/analyze/transient");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
