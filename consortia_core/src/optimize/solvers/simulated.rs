//! Deterministic stand in for a real solver
//!
//! Every variable is pushed to the bound favoured by its objective coefficient, and constraints
//! are ignored. The numbers are an optimistic bound estimate, not a flux distribution, and any
//! result produced here is tagged as [`Source::Simulated`](crate::optimize::solvers::Source).
use indexmap::IndexMap;
use tracing::warn;

use crate::optimize::objective::ObjectiveSense;
use crate::optimize::problem::Problem;
use crate::optimize::solvers::{Solver, SolverError};
use crate::optimize::{OptimizationStatus, ProblemSolution};

/// Bound relaxation estimate used when no solver library is available
#[derive(Debug, Clone, Default)]
pub struct SimulatedSolver {}

impl SimulatedSolver {
    pub fn new() -> Self {
        SimulatedSolver {}
    }

    /// Value of a variable with the given bounds and (sense adjusted) objective coefficient
    fn pick(lower: f64, upper: f64, direction: f64) -> f64 {
        let preferred = if direction > 0. {
            upper
        } else if direction < 0. {
            lower
        } else {
            0.
        };
        if preferred.is_finite() {
            preferred.clamp(lower, upper)
        } else {
            0f64.clamp(lower, upper)
        }
    }
}

impl Solver for SimulatedSolver {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn supports_integer_variables(&self) -> bool {
        true
    }

    fn solve(&self, problem: &Problem) -> Result<ProblemSolution, SolverError> {
        let sign = match problem.objective().sense() {
            ObjectiveSense::Maximize => 1.,
            ObjectiveSense::Minimize => -1.,
        };
        let mut direction: IndexMap<&str, f64> = IndexMap::new();
        for term in problem.objective().terms() {
            *direction.entry(term.variable.as_str()).or_insert(0.) += sign * term.coefficient;
        }
        let variable_values: IndexMap<String, f64> = problem
            .variables()
            .values()
            .map(|var| {
                let dir = direction.get(var.id.as_str()).copied().unwrap_or(0.);
                (
                    var.id.clone(),
                    SimulatedSolver::pick(var.lower_bound, var.upper_bound, dir),
                )
            })
            .collect();
        warn!(
            variables = problem.num_variables(),
            "using simulated solver, constraints are not enforced"
        );
        Ok(ProblemSolution {
            status: OptimizationStatus::Optimal,
            objective_value: Some(problem.evaluate_objective(&variable_values)),
            variable_values: Some(variable_values),
            dual_values: None,
            iterations: 0,
        })
    }
}
