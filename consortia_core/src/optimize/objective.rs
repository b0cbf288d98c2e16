//! Provides struct for representing an optimization problem's objective
use serde::{Deserialize, Serialize};

/// Represents the (linear) Objective of an optimization problem
#[derive(Debug, Clone, PartialEq)]
pub struct Objective {
    /// Terms included in the objective (See [`ObjectiveTerm`])
    pub(crate) terms: Vec<ObjectiveTerm>,
    /// Sense of the objective (maximize, or minimize), see [`ObjectiveSense`]
    pub(crate) sense: ObjectiveSense,
}

impl Objective {
    /// Create a new empty objective, with a given sense
    pub fn new(sense: ObjectiveSense) -> Self {
        Self {
            terms: Vec::new(),
            sense,
        }
    }

    /// Create a new empty maximization objective
    pub fn new_maximize() -> Self {
        Self::new(ObjectiveSense::Maximize)
    }

    /// Create a new empty minimization objective
    pub fn new_minimize() -> Self {
        Self::new(ObjectiveSense::Minimize)
    }

    /// Change the sense of the objective
    pub fn set_sense(&mut self, sense: ObjectiveSense) {
        self.sense = sense;
    }

    /// Sense of the objective
    pub fn sense(&self) -> ObjectiveSense {
        self.sense
    }

    /// Terms of the objective
    pub fn terms(&self) -> &[ObjectiveTerm] {
        &self.terms
    }

    /// Add a new linear term to the objective
    pub fn add_linear_term(&mut self, variable: &str, coefficient: f64) {
        self.terms.push(ObjectiveTerm {
            variable: variable.to_string(),
            coefficient,
        });
    }

    /// Remove any terms which include the variable
    pub fn remove_terms_with_variable(&mut self, variable_id: &str) {
        self.terms.retain(|t| t.variable != variable_id);
    }

    /// Remove all terms from the objective
    pub fn remove_all_terms(&mut self) {
        self.terms.clear();
    }
}

/// A linear term of the objective, `coefficient * variable`
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectiveTerm {
    /// Id of the variable
    pub variable: String,
    /// Coefficient of the variable
    pub coefficient: f64,
}

/// Whether to maximize or minimize the objective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveSense {
    /// Maximize the objective
    Maximize,
    /// Minimize the objective
    Minimize,
}
