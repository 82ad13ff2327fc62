use clarabel::{
    algebra::CscMatrix,
    solver::{
        DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus,
        SupportedConeT::{self, NonnegativeConeT, SecondOrderConeT, ZeroConeT},
    },
};
use na::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::problem::{ConeKind, QpProblem};
use crate::{error::SolverError, types::Float};

/// Worst-case work allowed for one solve. Running out is a solver failure.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolverBudget {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Wall-clock limit, in seconds
    #[serde(default = "default_time_limit")]
    pub time_limit: Float,
}

fn default_max_iterations() -> u32 {
    100
}

fn default_time_limit() -> Float {
    0.02
}

impl Default for SolverBudget {
    fn default() -> Self {
        SolverBudget {
            max_iterations: default_max_iterations(),
            time_limit: default_time_limit(),
        }
    }
}

/// Convex QP solver used by the controller each tick.
pub trait QpSolver {
    /// Whether second-order cone blocks are accepted.
    fn supports_second_order_cones(&self) -> bool;

    /// Primal solution x of the problem, within the given budget.
    fn solve(
        &mut self,
        problem: &QpProblem,
        budget: &SolverBudget,
    ) -> Result<DVector<Float>, SolverError>;
}

/// Interior-point solver backed by Clarabel. Supports second-order cones.
#[derive(Clone, Debug, Default)]
pub struct ClarabelSolver {}

impl ClarabelSolver {
    pub fn new() -> Self {
        ClarabelSolver {}
    }
}

impl QpSolver for ClarabelSolver {
    fn supports_second_order_cones(&self) -> bool {
        true
    }

    fn solve(
        &mut self,
        problem: &QpProblem,
        budget: &SolverBudget,
    ) -> Result<DVector<Float>, SolverError> {
        let P = dmatrix_to_csc_upper_tri(&problem.P);
        let A = dmatrix_to_csc(&problem.A);
        let cones: Vec<SupportedConeT<Float>> = problem
            .cones
            .iter()
            .map(|cone| match cone.kind {
                ConeKind::Zero => ZeroConeT(cone.dim),
                ConeKind::Nonnegative => NonnegativeConeT(cone.dim),
                ConeKind::SecondOrder => SecondOrderConeT(cone.dim),
            })
            .collect();

        let settings = DefaultSettingsBuilder::default()
            .max_iter(budget.max_iterations)
            .time_limit(budget.time_limit)
            .verbose(false)
            .build()
            .map_err(|e| SolverError::Settings(format!("{:?}", e)))?;

        let mut solver = DefaultSolver::new(
            &P,
            problem.q.as_slice(),
            &A,
            problem.b.as_slice(),
            &cones,
            settings,
        )
        .map_err(|e| SolverError::Setup(format!("{:?}", e)))?;

        solver.solve();
        match solver.solution.status {
            SolverStatus::Solved | SolverStatus::AlmostSolved => {}
            status => {
                return Err(SolverError::NotConverged {
                    status: format!("{:?}", status),
                })
            }
        }

        let x = DVector::from_column_slice(&solver.solution.x);
        if !x.iter().all(|v| v.is_finite()) {
            return Err(SolverError::NonFinite);
        }
        Ok(x)
    }
}

fn dmatrix_to_csc(m: &DMatrix<Float>) -> CscMatrix<Float> {
    let (nrows, ncols) = m.shape();
    let mut colptr = vec![0usize; ncols + 1];
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();

    for j in 0..ncols {
        for i in 0..nrows {
            let v = m[(i, j)];
            if v != 0. {
                rowval.push(i);
                nzval.push(v);
            }
        }
        colptr[j + 1] = rowval.len();
    }

    CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}

/// Upper triangle of a symmetric matrix, as Clarabel expects for P.
fn dmatrix_to_csc_upper_tri(m: &DMatrix<Float>) -> CscMatrix<Float> {
    let (nrows, ncols) = m.shape();
    let mut colptr = vec![0usize; ncols + 1];
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();

    for j in 0..ncols {
        for i in 0..=j.min(nrows.saturating_sub(1)) {
            let v = m[(i, j)];
            if v != 0. {
                rowval.push(i);
                nzval.push(v);
            }
        }
        colptr[j + 1] = rowval.len();
    }

    CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}
