//! Module providing representation of optimization problem variables
use std::fmt::{Display, Formatter};

use derive_builder::Builder;

/// A decision variable of an optimization problem
#[derive(Builder, Debug, Clone, PartialEq)]
#[builder(setter(into))]
pub struct Variable {
    /// Used to identify the variable (must be unique within a problem)
    pub id: String,
    /// Human readable name
    #[builder(setter(into, strip_option), default = "None")]
    pub name: Option<String>,
    /// Type of the variable, see [`VariableType`]
    #[builder(default = "VariableType::Continuous")]
    pub variable_type: VariableType,
    /// Lowest value the variable can take
    #[builder(default = "f64::NEG_INFINITY")]
    pub lower_bound: f64,
    /// Highest value the variable can take
    #[builder(default = "f64::INFINITY")]
    pub upper_bound: f64,
    /// Position of the variable in the problem
    #[builder(setter(skip), default = "0")]
    pub(crate) index: usize,
}

impl Variable {
    /// Position of the variable within its problem
    pub fn index(&self) -> usize {
        self.index
    }
}

impl Display for Variable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}:{}", name, self.variable_type),
            None => write!(f, "{}:{}", self.id, self.variable_type),
        }
    }
}

/// Represents the type of variable in an optimization problem
///
/// # Notes:
/// Not all variable types are supported for all solvers, currently Clarabel only supports
/// Continuous variables, while microlp supports all types
#[derive(Debug, PartialEq, Clone, Copy, Hash, Eq)]
pub enum VariableType {
    /// Continuous variable
    Continuous,
    /// Integer variable
    Integer,
    /// Binary Variable
    Binary,
}

impl Display for VariableType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            VariableType::Continuous => write!(f, "CONTINUOUS"),
            VariableType::Integer => write!(f, "INTEGER"),
            VariableType::Binary => write!(f, "BINARY"),
        }
    }
}

#[cfg(test)]
mod variable_tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let x = VariableBuilder::default().id("x").build().unwrap();
        assert_eq!(x.variable_type, VariableType::Continuous);
        assert!(x.lower_bound.is_infinite() && x.lower_bound < 0.);
        assert!(x.upper_bound.is_infinite() && x.upper_bound > 0.);
        assert_eq!(format!("{}", x), "x:CONTINUOUS");
        let y = VariableBuilder::default()
            .id("y")
            .name("use_y")
            .variable_type(VariableType::Binary)
            .build()
            .unwrap();
        assert_eq!(format!("{}", y), "use_y:BINARY");
    }
}
