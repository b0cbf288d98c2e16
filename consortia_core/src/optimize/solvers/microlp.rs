//! Implements a solver interface for microlp, which also handles integer variables
use indexmap::IndexMap;
use microlp::{ComparisonOp, OptimizationDirection};
use tracing::debug;

use crate::optimize::constraint::Constraint;
use crate::optimize::objective::ObjectiveSense;
use crate::optimize::problem::Problem;
use crate::optimize::solvers::{Solver, SolverError};
use crate::optimize::variable::VariableType;
use crate::optimize::{OptimizationStatus, ProblemSolution};

/// microlp simplex and branch and bound solver
#[derive(Debug, Clone, Default)]
pub struct MicrolpSolver {}

impl MicrolpSolver {
    pub fn new() -> Self {
        MicrolpSolver {}
    }
}

fn integer_bound(value: f64) -> i32 {
    value.clamp(i32::MIN as f64, i32::MAX as f64).round() as i32
}

impl Solver for MicrolpSolver {
    fn name(&self) -> &'static str {
        "microlp"
    }

    fn supports_integer_variables(&self) -> bool {
        true
    }

    fn solve(&self, problem: &Problem) -> Result<ProblemSolution, SolverError> {
        let direction = match problem.objective().sense() {
            ObjectiveSense::Maximize => OptimizationDirection::Maximize,
            ObjectiveSense::Minimize => OptimizationDirection::Minimize,
        };
        let mut lp = microlp::Problem::new(direction);

        let mut objective = vec![0.; problem.num_variables()];
        for term in problem.objective().terms() {
            let index = problem.variable_index(&term.variable).ok_or_else(|| {
                SolverError::InvalidProblem(format!(
                    "objective uses unknown variable {}",
                    term.variable
                ))
            })?;
            objective[index] += term.coefficient;
        }

        let vars: Vec<microlp::Variable> = problem
            .variables()
            .values()
            .zip(&objective)
            .map(|(var, coef)| match var.variable_type {
                VariableType::Continuous => lp.add_var(*coef, (var.lower_bound, var.upper_bound)),
                VariableType::Integer => lp.add_integer_var(
                    *coef,
                    (integer_bound(var.lower_bound), integer_bound(var.upper_bound)),
                ),
                VariableType::Binary => lp.add_binary_var(*coef),
            })
            .collect();

        for constraint in problem.constraints().values() {
            let mut expr = Vec::with_capacity(constraint.get_terms().len());
            for term in constraint.get_terms() {
                let index = problem.variable_index(&term.variable).ok_or_else(|| {
                    SolverError::InvalidProblem(format!(
                        "constraint {} uses unknown variable {}",
                        constraint.get_id(),
                        term.variable
                    ))
                })?;
                expr.push((vars[index], term.coefficient));
            }
            match constraint {
                Constraint::Equality { equals, .. } => {
                    lp.add_constraint(expr.as_slice(), ComparisonOp::Eq, *equals)
                }
                Constraint::Inequality {
                    lower_bound,
                    upper_bound,
                    ..
                } => {
                    if lower_bound == upper_bound {
                        lp.add_constraint(expr.as_slice(), ComparisonOp::Eq, *upper_bound);
                        continue;
                    }
                    if upper_bound.is_finite() {
                        lp.add_constraint(expr.as_slice(), ComparisonOp::Le, *upper_bound);
                    }
                    if lower_bound.is_finite() {
                        lp.add_constraint(expr.as_slice(), ComparisonOp::Ge, *lower_bound);
                    }
                }
            }
        }

        let solution = match lp.solve() {
            Ok(solution) => solution,
            Err(microlp::Error::Infeasible) => {
                return Ok(ProblemSolution::without_values(
                    OptimizationStatus::Infeasible,
                    0,
                ))
            }
            Err(microlp::Error::Unbounded) => {
                return Ok(ProblemSolution::without_values(
                    OptimizationStatus::Unbounded,
                    0,
                ))
            }
            Err(err) => return Err(SolverError::SolverFailure(err.to_string())),
        };
        let variable_values: IndexMap<String, f64> = problem
            .variables()
            .keys()
            .zip(&vars)
            .map(|(id, var)| (id.clone(), solution[*var]))
            .collect();
        debug!(solver = self.name(), objective = solution.objective(), "microlp finished");
        Ok(ProblemSolution {
            status: OptimizationStatus::Optimal,
            objective_value: Some(solution.objective()),
            variable_values: Some(variable_values),
            dual_values: None,
            iterations: 0,
        })
    }
}
