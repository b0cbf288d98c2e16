//! Interfaces to the solvers used for optimization problems
//!
//! Real solvers wrap an external library, the simulated solver produces a deterministic
//! estimate for when no library can be used. Which one produced a result is always carried
//! alongside the result as a [`Source`].
pub mod clarabel;
#[cfg(feature = "minilp")]
pub mod microlp;
pub mod simulated;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::optimize::problem::{Problem, ProblemType};
use crate::optimize::ProblemSolution;

/// A solver able to solve [`Problem`]s
pub trait Solver: Send + Sync {
    /// Short name used in log messages
    fn name(&self) -> &'static str;

    /// Whether the solver handles integer and binary variables
    fn supports_integer_variables(&self) -> bool;

    /// Solve the problem
    ///
    /// # Returns
    /// `Ok` with the solution (which may carry an infeasible or unbounded status) or `Err` if
    /// the solver couldn't handle the problem at all
    fn solve(&self, problem: &Problem) -> Result<ProblemSolution, SolverError>;
}

/// Real solver libraries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    /// Clarabel interior point solver, continuous problems only
    Clarabel,
    /// microlp simplex / branch and bound solver, requires the minilp feature
    Microlp,
}

impl SolverKind {
    /// Solver used when nothing else is configured
    pub fn default_continuous() -> Self {
        SolverKind::Clarabel
    }

    /// Solver able to handle integer variables, if one was compiled in
    pub fn default_mixed_integer() -> Option<Self> {
        mixed_integer_solver_kind()
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "minilp")] {
        fn mixed_integer_solver_kind() -> Option<SolverKind> {
            Some(SolverKind::Microlp)
        }

        fn microlp_solver() -> Result<Box<dyn Solver>, SolverError> {
            Ok(Box::new(microlp::MicrolpSolver::new()))
        }
    } else {
        fn mixed_integer_solver_kind() -> Option<SolverKind> {
            None
        }

        fn microlp_solver() -> Result<Box<dyn Solver>, SolverError> {
            Err(SolverError::BackendUnavailable(
                "microlp (enable the minilp feature)".to_string(),
            ))
        }
    }
}

/// Where a solver result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// A real solver library produced the result
    Real,
    /// The simulated backend estimated the result
    Simulated,
}

impl Source {
    /// Combine the sources of two results used together, simulated wins
    pub fn combine(self, other: Source) -> Source {
        match (self, other) {
            (Source::Real, Source::Real) => Source::Real,
            _ => Source::Simulated,
        }
    }

    pub fn is_simulated(&self) -> bool {
        *self == Source::Simulated
    }
}

/// A backend which can be asked to solve problems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// A real solver library
    Real(SolverKind),
    /// The deterministic bound based estimate, see [`simulated::SimulatedSolver`]
    Simulated,
}

impl Backend {
    /// Source tag carried by results from this backend
    pub fn source(&self) -> Source {
        match self {
            Backend::Real(_) => Source::Real,
            Backend::Simulated => Source::Simulated,
        }
    }

    /// Create the solver for this backend
    pub fn solver(&self) -> Result<Box<dyn Solver>, SolverError> {
        match self {
            Backend::Real(SolverKind::Clarabel) => Ok(Box::new(clarabel::ClarabelSolver::new())),
            Backend::Real(SolverKind::Microlp) => microlp_solver(),
            Backend::Simulated => Ok(Box::new(simulated::SimulatedSolver::new())),
        }
    }
}

impl Default for Backend {
    fn default() -> Self {
        Backend::Real(SolverKind::default_continuous())
    }
}

/// Errors raised while handing a problem to a solver
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("Solver {solver} can't solve problems of type {problem_type:?}")]
    UnsupportedProblemType {
        solver: &'static str,
        problem_type: ProblemType,
    },
    #[error("Solver backend {0} is not available")]
    BackendUnavailable(String),
    #[error("Problem can't be handed to the solver: {0}")]
    InvalidProblem(String),
    #[error("Solver failed: {0}")]
    SolverFailure(String),
    #[error("No solver backends were configured")]
    NoBackends,
    #[error("Every solver backend failed: {}", .0.join("; "))]
    AllBackendsFailed(Vec<String>),
}
