//! Ordered list of solver backends with a single selection rule
//!
//! Backends are tried in order and the first one which reaches a conclusive status (optimal,
//! almost optimal, infeasible or unbounded) wins. An infeasible answer is a valid answer, so
//! it is never retried on a later backend.
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::optimize::problem::Problem;
use crate::optimize::solvers::{Backend, SolverError, Source};
use crate::optimize::ProblemSolution;

/// A solution together with the backend which produced it
#[derive(Debug, Clone, PartialEq)]
pub struct StrategySolution {
    pub solution: ProblemSolution,
    pub backend: Backend,
    pub source: Source,
}

/// Ordered backends to solve problems with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveStrategy {
    backends: Vec<Backend>,
}

impl SolveStrategy {
    /// Create a new strategy trying `backends` in order
    pub fn new(backends: Vec<Backend>) -> Self {
        SolveStrategy { backends }
    }

    /// Strategy using only the simulated backend
    pub fn simulated() -> Self {
        SolveStrategy::new(vec![Backend::Simulated])
    }

    pub fn backends(&self) -> &[Backend] {
        &self.backends
    }

    /// Whether any backend can solve mixed integer problems
    pub fn supports_integer_variables(&self) -> bool {
        self.backends.iter().any(|backend| {
            backend
                .solver()
                .is_ok_and(|solver| solver.supports_integer_variables())
        })
    }

    /// Solve the problem with the first backend that gives a conclusive answer
    pub fn solve(&self, problem: &Problem) -> Result<StrategySolution, SolverError> {
        if self.backends.is_empty() {
            return Err(SolverError::NoBackends);
        }
        let mut failures = Vec::new();
        for backend in &self.backends {
            let solver = match backend.solver() {
                Ok(solver) => solver,
                Err(err) => {
                    failures.push(err.to_string());
                    continue;
                }
            };
            if problem.has_integer_variables() && !solver.supports_integer_variables() {
                failures.push(format!("{} does not support integer variables", solver.name()));
                continue;
            }
            match solver.solve(problem) {
                Ok(solution) if solution.status.is_conclusive() => {
                    debug!(backend = solver.name(), status = ?solution.status, "backend accepted");
                    if backend.source().is_simulated() {
                        warn!("result produced by the simulated backend");
                    }
                    return Ok(StrategySolution {
                        solution,
                        backend: *backend,
                        source: backend.source(),
                    });
                }
                Ok(solution) => {
                    failures.push(format!("{} ended with {:?}", solver.name(), solution.status))
                }
                Err(err) => failures.push(format!("{}: {}", solver.name(), err)),
            }
        }
        Err(SolverError::AllBackendsFailed(failures))
    }
}

impl Default for SolveStrategy {
    fn default() -> Self {
        SolveStrategy::new(vec![Backend::default()])
    }
}
