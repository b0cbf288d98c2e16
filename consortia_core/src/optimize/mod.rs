//! Module for constructing and solving optimization problems

pub mod constraint;
pub mod fba;
pub mod objective;
pub mod problem;
pub mod solvers;
pub mod strategy;
pub mod variable;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Struct representing the solution to an optimization problem
#[derive(Debug, Clone, PartialEq)]
pub struct ProblemSolution {
    /// The status of the optimization problem, representing if the optimization was
    /// completed successfully
    pub status: OptimizationStatus,
    /// Optimized value of the objective
    ///
    /// Some(f64) if the optimization was completed successfully, None otherwise
    pub objective_value: Option<f64>,
    /// Values of the variables at the optimum,
    ///
    /// Some(IndexMap), keyed by variable id, with values corresponding to variable
    /// values at optimum if the problem could be solved, None otherwise
    pub variable_values: Option<IndexMap<String, f64>>,
    /// Values of the dual variables at the optimum
    ///
    /// Some(IndexMap), keyed by constraint id, with values corresponding to dual
    /// variable values at optimum if the problem could be solved, and the solver
    /// supports retrieving the dual values, None otherwise
    pub dual_values: Option<IndexMap<String, f64>>,
    /// Number of iterations the solver needed
    pub iterations: u32,
}

impl ProblemSolution {
    /// A solution carrying only a status, for problems which couldn't be solved
    pub fn without_values(status: OptimizationStatus, iterations: u32) -> Self {
        ProblemSolution {
            status,
            objective_value: None,
            variable_values: None,
            dual_values: None,
            iterations,
        }
    }

    /// Value of a variable at the optimum
    pub fn value(&self, variable_id: &str) -> Option<f64> {
        self.variable_values
            .as_ref()
            .and_then(|values| values.get(variable_id).copied())
    }
}

/// Status of an optimization problem
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizationStatus {
    /// Problem has not yet attempted to be optimized
    Unoptimized,
    /// Problem has been optimized
    Optimal,
    /// Problem can't be optimized because objective value is not bounded
    Unbounded,
    /// Problem can't be solved because it is infeasible (conflicting constraints)
    Infeasible,
    /// An approximate solution has been found
    AlmostOptimal,
    /// A numerical error occurred during solving
    NumericalError,
    /// The solver hit the maximum allowed iterations, or max time, or made insufficient progress
    SolverHalted,
}

impl OptimizationStatus {
    /// Whether the solver produced a usable point
    pub fn has_solution(&self) -> bool {
        matches!(
            self,
            OptimizationStatus::Optimal | OptimizationStatus::AlmostOptimal
        )
    }

    /// Whether the solver came to a definite conclusion about the problem, either a solution
    /// or a certificate that none exists
    pub fn is_conclusive(&self) -> bool {
        matches!(
            self,
            OptimizationStatus::Optimal
                | OptimizationStatus::AlmostOptimal
                | OptimizationStatus::Infeasible
                | OptimizationStatus::Unbounded
        )
    }
}

/// Treat values with magnitude below `threshold` as exactly zero
pub fn clean_value(value: f64, threshold: f64) -> f64 {
    if value.abs() < threshold {
        0.
    } else {
        value
    }
}
