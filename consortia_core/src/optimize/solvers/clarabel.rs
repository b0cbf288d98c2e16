//! Implements a solver interface for Clarabel
//!
//! Clarabel solves `min 1/2 x'Px + q'x` subject to `Ax + s = b, s in K`. Equality constraints
//! go into a zero cone, everything else (inequality constraints and finite variable bounds)
//! is written as `a'x <= b` rows of a nonnegative cone.
use ::clarabel::algebra::*;
use ::clarabel::solver::*;
use indexmap::IndexMap;
use tracing::debug;

use crate::optimize::constraint::Constraint;
use crate::optimize::objective::ObjectiveSense;
use crate::optimize::problem::Problem;
use crate::optimize::solvers::{Solver, SolverError};
use crate::optimize::{OptimizationStatus, ProblemSolution};

/// Clarabel interior point solver
#[derive(Debug, Clone)]
pub struct ClarabelSolver {
    /// Maximum number of interior point iterations
    pub max_iter: u32,
}

impl ClarabelSolver {
    pub fn new() -> Self {
        ClarabelSolver { max_iter: 200 }
    }
}

impl Default for ClarabelSolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Sparse rows of the constraint matrix, split by cone
#[derive(Default)]
struct ConicRows {
    equality: Vec<(Vec<(usize, f64)>, f64)>,
    inequality: Vec<(Vec<(usize, f64)>, f64)>,
}

impl ConicRows {
    fn from_problem(problem: &Problem) -> Result<Self, SolverError> {
        let mut rows = ConicRows::default();
        for constraint in problem.constraints().values() {
            let mut coefficients = Vec::with_capacity(constraint.get_terms().len());
            for term in constraint.get_terms() {
                let index = problem.variable_index(&term.variable).ok_or_else(|| {
                    SolverError::InvalidProblem(format!(
                        "constraint {} uses unknown variable {}",
                        constraint.get_id(),
                        term.variable
                    ))
                })?;
                coefficients.push((index, term.coefficient));
            }
            match constraint {
                Constraint::Equality { equals, .. } => rows.equality.push((coefficients, *equals)),
                Constraint::Inequality {
                    lower_bound,
                    upper_bound,
                    ..
                } => rows.push_range(coefficients, *lower_bound, *upper_bound),
            }
        }
        for (index, variable) in problem.variables().values().enumerate() {
            rows.push_range(
                vec![(index, 1.)],
                variable.lower_bound,
                variable.upper_bound,
            );
        }
        Ok(rows)
    }

    /// Add `lower <= a'x <= upper`, skipping infinite sides
    fn push_range(&mut self, coefficients: Vec<(usize, f64)>, lower: f64, upper: f64) {
        if lower == upper {
            self.equality.push((coefficients, upper));
            return;
        }
        if upper.is_finite() {
            self.inequality.push((coefficients.clone(), upper));
        }
        if lower.is_finite() {
            let negated = coefficients.into_iter().map(|(i, c)| (i, -c)).collect();
            self.inequality.push((negated, -lower));
        }
    }

    fn into_matrices(self, num_variables: usize) -> (CscMatrix<f64>, Vec<f64>, Vec<SupportedConeT<f64>>) {
        let num_equality = self.equality.len();
        let num_inequality = self.inequality.len();
        let num_rows = num_equality + num_inequality;
        let mut coo = nalgebra_sparse::CooMatrix::new(num_rows, num_variables);
        let mut b = Vec::with_capacity(num_rows);
        for (row, (coefficients, rhs)) in self
            .equality
            .into_iter()
            .chain(self.inequality)
            .enumerate()
        {
            for (col, value) in coefficients {
                coo.push(row, col, value);
            }
            b.push(rhs);
        }
        let csc = nalgebra_sparse::CscMatrix::from(&coo);
        let (col_offsets, row_indices, values) = csc.disassemble();
        let a = CscMatrix::new(num_rows, num_variables, col_offsets, row_indices, values);

        let mut cones = Vec::new();
        if num_equality > 0 {
            cones.push(ZeroConeT(num_equality));
        }
        if num_inequality > 0 {
            cones.push(NonnegativeConeT(num_inequality));
        }
        (a, b, cones)
    }
}

impl Solver for ClarabelSolver {
    fn name(&self) -> &'static str {
        "clarabel"
    }

    fn supports_integer_variables(&self) -> bool {
        false
    }

    fn solve(&self, problem: &Problem) -> Result<ProblemSolution, SolverError> {
        if problem.has_integer_variables() {
            return Err(SolverError::UnsupportedProblemType {
                solver: self.name(),
                problem_type: problem.problem_type(),
            });
        }
        let n = problem.num_variables();
        if n == 0 {
            return Err(SolverError::InvalidProblem(
                "problem has no variables".to_string(),
            ));
        }

        // Clarabel always minimizes, so flip the sign of a maximization objective
        let sign = match problem.objective().sense() {
            ObjectiveSense::Maximize => -1.,
            ObjectiveSense::Minimize => 1.,
        };
        let mut q = vec![0.; n];
        for term in problem.objective().terms() {
            let index = problem.variable_index(&term.variable).ok_or_else(|| {
                SolverError::InvalidProblem(format!(
                    "objective uses unknown variable {}",
                    term.variable
                ))
            })?;
            q[index] += sign * term.coefficient;
        }
        let p = CscMatrix::new(n, n, vec![0; n + 1], vec![], vec![]);

        let (a, b, cones) = ConicRows::from_problem(problem)?.into_matrices(n);

        let settings = DefaultSettings::<f64> {
            verbose: false,
            max_iter: self.max_iter,
            ..DefaultSettings::default()
        };
        let mut solver = DefaultSolver::new(&p, &q, &a, &b, &cones, settings);
        solver.solve();

        let status = match solver.solution.status {
            SolverStatus::Solved => OptimizationStatus::Optimal,
            SolverStatus::AlmostSolved => OptimizationStatus::AlmostOptimal,
            SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => {
                OptimizationStatus::Infeasible
            }
            SolverStatus::DualInfeasible | SolverStatus::AlmostDualInfeasible => {
                OptimizationStatus::Unbounded
            }
            SolverStatus::NumericalError => OptimizationStatus::NumericalError,
            _ => OptimizationStatus::SolverHalted,
        };
        let iterations = solver.solution.iterations;
        debug!(
            solver = self.name(),
            ?status,
            iterations,
            variables = n,
            rows = b.len(),
            "clarabel finished"
        );
        if !status.has_solution() {
            return Ok(ProblemSolution::without_values(status, iterations));
        }

        let variable_values: IndexMap<String, f64> = problem
            .variables()
            .keys()
            .cloned()
            .zip(solver.solution.x.iter().copied())
            .collect();
        Ok(ProblemSolution {
            status,
            objective_value: Some(problem.evaluate_objective(&variable_values)),
            variable_values: Some(variable_values),
            dual_values: None,
            iterations,
        })
    }
}

#[cfg(test)]
mod clarabel_tests {
    use super::*;
    use crate::optimize::variable::VariableType;

    #[test]
    fn small_lp() {
        // max x + y st x + 2y <= 4, x <= 3, y >= 0
        let mut problem = Problem::new_maximization();
        problem
            .add_new_variable("x", None, VariableType::Continuous, 0., 3.)
            .unwrap();
        problem
            .add_new_variable("y", None, VariableType::Continuous, 0., f64::INFINITY)
            .unwrap();
        problem
            .add_new_inequality_constraint_by_id("c1", &["x", "y"], &[1., 2.], f64::NEG_INFINITY, 4.)
            .unwrap();
        problem
            .set_objective_by_id(ObjectiveSense::Maximize, &["x", "y"], &[1., 1.])
            .unwrap();
        let solution = ClarabelSolver::new().solve(&problem).unwrap();
        assert_eq!(solution.status, OptimizationStatus::Optimal);
        assert!((solution.objective_value.unwrap() - 3.5).abs() < 1e-6);
        assert!((solution.value("x").unwrap() - 3.).abs() < 1e-6);
        assert!((solution.value("y").unwrap() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn equality_and_minimize() {
        // min x - y st x + y = 2, 0 <= x, y <= 5
        let mut problem = Problem::new_minimization();
        problem
            .add_new_variable("x", None, VariableType::Continuous, 0., 5.)
            .unwrap();
        problem
            .add_new_variable("y", None, VariableType::Continuous, 0., 5.)
            .unwrap();
        problem
            .add_new_equality_constraint_by_id("sum", &["x", "y"], &[1., 1.], 2.)
            .unwrap();
        problem
            .set_objective_by_id(ObjectiveSense::Minimize, &["x", "y"], &[1., -1.])
            .unwrap();
        let solution = ClarabelSolver::new().solve(&problem).unwrap();
        assert!((solution.objective_value.unwrap() + 2.).abs() < 1e-6);
    }

    #[test]
    fn infeasible_lp() {
        let mut problem = Problem::new_maximization();
        problem
            .add_new_variable("x", None, VariableType::Continuous, 0., 1.)
            .unwrap();
        problem
            .add_new_inequality_constraint_by_id("c", &["x"], &[1.], 2., 3.)
            .unwrap();
        problem
            .set_objective_by_id(ObjectiveSense::Maximize, &["x"], &[1.])
            .unwrap();
        let solution = ClarabelSolver::new().solve(&problem).unwrap();
        assert_eq!(solution.status, OptimizationStatus::Infeasible);
        assert!(solution.variable_values.is_none());
    }

    #[test]
    fn rejects_integer_variables() {
        let mut problem = Problem::new_maximization();
        problem
            .add_new_variable("b", None, VariableType::Binary, 0., 1.)
            .unwrap();
        assert!(matches!(
            ClarabelSolver::new().solve(&problem),
            Err(SolverError::UnsupportedProblemType { .. })
        ));
    }
}
