//! Provides struct representing an optimization problem
use crate::optimize::constraint::Constraint;
use crate::optimize::objective::{Objective, ObjectiveSense};
use crate::optimize::variable::{Variable, VariableBuilder, VariableType};
use indexmap::IndexMap;
use thiserror::Error;

/// An optimization problem
#[derive(Debug, Clone, PartialEq)]
pub struct Problem {
    /// Objective to optimize
    objective: Objective,
    /// Variables of the optimization problem
    variables: IndexMap<String, Variable>,
    /// Constraints of the optimization problem
    constraints: IndexMap<String, Constraint>,
    /// Type of problem
    problem_type: ProblemType,
}

impl Problem {
    // region Creation Functions
    /// Create a new optimization problem
    pub fn new(objective_sense: ObjectiveSense) -> Self {
        Self {
            objective: Objective::new(objective_sense),
            variables: IndexMap::new(),
            constraints: IndexMap::new(),
            problem_type: ProblemType::LinearContinuous,
        }
    }

    /// Create a new maximization problem
    pub fn new_maximization() -> Self {
        Self::new(ObjectiveSense::Maximize)
    }

    /// Create a new minimization problem
    pub fn new_minimization() -> Self {
        Self::new(ObjectiveSense::Minimize)
    }

    // endregion Creation Functions

    // region Accessors
    /// Objective of the problem
    pub fn objective(&self) -> &Objective {
        &self.objective
    }

    /// Variables of the problem, in index order
    pub fn variables(&self) -> &IndexMap<String, Variable> {
        &self.variables
    }

    /// Constraints of the problem
    pub fn constraints(&self) -> &IndexMap<String, Constraint> {
        &self.constraints
    }

    /// Get a variable by id
    pub fn get_variable(&self, id: &str) -> Option<&Variable> {
        self.variables.get(id)
    }

    /// Index of a variable, used when converting the problem into solver matrices
    pub fn variable_index(&self, id: &str) -> Option<usize> {
        self.variables.get_index_of(id)
    }

    /// Current number of variables
    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    /// Current number of constraints
    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    /// Type of the problem, see [`ProblemType`]
    pub fn problem_type(&self) -> ProblemType {
        self.problem_type
    }

    /// Evaluate the objective at the provided variable values (missing variables count as 0)
    pub fn evaluate_objective(&self, values: &IndexMap<String, f64>) -> f64 {
        self.objective
            .terms()
            .iter()
            .map(|t| t.coefficient * values.get(&t.variable).copied().unwrap_or(0.))
            .sum()
    }
    // endregion Accessors

    // region Update Objective
    /// Update the objective sense of the problem
    pub fn update_objective_sense(&mut self, sense: ObjectiveSense) {
        self.objective.set_sense(sense);
    }

    /// Replace the objective with new linear terms and sense
    pub fn set_objective_by_id(
        &mut self,
        sense: ObjectiveSense,
        variables: &[&str],
        coefficients: &[f64],
    ) -> Result<(), ProblemError> {
        self.remove_all_objective_terms();
        self.update_objective_sense(sense);
        for (var, coef) in variables.iter().zip(coefficients) {
            self.add_new_linear_objective_term_by_id(var, *coef)?;
        }
        Ok(())
    }
    // endregion Update Objective

    // region Adding Variables
    /// Add a variable to the optimization problem
    pub fn add_variable(&mut self, mut variable: Variable) -> Result<(), ProblemError> {
        // Validate that the variable can in fact be added to the problem
        self.validate_variable(&variable)?;
        variable.index = self.variables.len();
        if matches!(
            variable.variable_type,
            VariableType::Integer | VariableType::Binary
        ) {
            self.problem_type = ProblemType::LinearMixedInteger;
        }
        self.variables.insert(variable.id.clone(), variable);
        Ok(())
    }

    /// Create a new variable and add it to the optimization problem
    pub fn add_new_variable(
        &mut self,
        id: &str,
        name: Option<&str>,
        variable_type: VariableType,
        lower_bound: f64,
        upper_bound: f64,
    ) -> Result<(), ProblemError> {
        let mut builder = VariableBuilder::default();
        builder
            .id(id)
            .variable_type(variable_type)
            .lower_bound(lower_bound)
            .upper_bound(upper_bound);
        if let Some(name) = name {
            builder.name(name);
        }
        let new_var = builder
            .build()
            .map_err(|err| ProblemError::InvalidVariable(err.to_string()))?;
        self.add_variable(new_var)
    }
    // endregion Adding Variables

    // region Adding Constraints
    /// Add a constraint to the problem
    pub fn add_constraint(&mut self, constraint: Constraint) -> Result<(), ProblemError> {
        self.validate_constraint(&constraint)?;
        self.constraints
            .insert(constraint.get_id().to_string(), constraint);
        Ok(())
    }

    /// Create a new equality constraint using variable ids, and add it to the model
    pub fn add_new_equality_constraint_by_id(
        &mut self,
        id: &str,
        variables: &[&str],
        coefficients: &[f64],
        equals: f64,
    ) -> Result<(), ProblemError> {
        self.add_constraint(Constraint::new_equality(
            id,
            variables,
            coefficients,
            equals,
        ))
    }

    /// Create a new inequality constraint using variable ids, and add it to the model
    pub fn add_new_inequality_constraint_by_id(
        &mut self,
        id: &str,
        variables: &[&str],
        coefficients: &[f64],
        lower_bound: f64,
        upper_bound: f64,
    ) -> Result<(), ProblemError> {
        self.add_constraint(Constraint::new_inequality(
            id,
            variables,
            coefficients,
            lower_bound,
            upper_bound,
        ))
    }
    // endregion Adding Constraints

    // region Adding Objective Terms
    /// Add a new linear term to the objective using the variable id
    pub fn add_new_linear_objective_term_by_id(
        &mut self,
        variable_id: &str,
        coefficient: f64,
    ) -> Result<(), ProblemError> {
        if !self.variables.contains_key(variable_id) {
            return Err(ProblemError::NonExistentVariablesInObjective(
                variable_id.to_string(),
            ));
        }
        self.objective.add_linear_term(variable_id, coefficient);
        Ok(())
    }
    // endregion Adding Objective Terms

    // region update variable bounds
    /// Update the bounds of a variable
    pub fn update_variable_bounds(
        &mut self,
        id: &str,
        lower_bound: f64,
        upper_bound: f64,
    ) -> Result<(), ProblemError> {
        if lower_bound > upper_bound {
            return Err(ProblemError::InvalidVariableBounds(id.to_string()));
        }
        match self.variables.get_mut(id) {
            Some(var) => {
                var.lower_bound = lower_bound;
                var.upper_bound = upper_bound;
            }
            None => return Err(ProblemError::NonExistentVariable(id.to_string())),
        };
        Ok(())
    }
    // endregion update variable bounds

    // region Remove Variables
    /// Remove a variable from the problem, will also remove it as a term from all constraints
    /// and any terms in the objective that include this variable
    pub fn delete_variable(&mut self, variable_id: &str) -> Result<(), ProblemError> {
        if !self.variables.contains_key(variable_id) {
            return Err(ProblemError::NonExistentVariable(variable_id.to_string()));
        }
        self.objective.remove_terms_with_variable(variable_id);
        self.constraints
            .values_mut()
            .for_each(|cons| cons.remove_variable(variable_id));
        self.variables.shift_remove(variable_id);
        self.fix_variable_indices();
        self.fix_problem_type();
        Ok(())
    }
    // endregion Remove Variables

    // region Remove Constraints
    /// Remove a constraint (by id) from the model
    pub fn remove_constraint(&mut self, constraint_id: &str) -> Option<Constraint> {
        self.constraints.shift_remove(constraint_id)
    }
    // endregion Remove Constraints

    // region Remove Objective Terms
    /// Remove all terms from the objective
    pub fn remove_all_objective_terms(&mut self) {
        self.objective.remove_all_terms();
    }
    // endregion Remove Objective Terms

    // region Validation Functions
    /// Check that a variable to be added is valid to add to this problem
    fn validate_variable(&self, variable: &Variable) -> Result<(), ProblemError> {
        if self.variables.contains_key(&variable.id) {
            return Err(ProblemError::VariableIdAlreadyExists(variable.id.clone()));
        };
        if variable.lower_bound > variable.upper_bound || variable.lower_bound.is_nan() {
            return Err(ProblemError::InvalidVariableBounds(variable.id.clone()));
        }
        Ok(())
    }

    /// Check that a constraint to be added is valid to add to this Problem
    fn validate_constraint(&self, constraint: &Constraint) -> Result<(), ProblemError> {
        if self.constraints.contains_key(constraint.get_id()) {
            return Err(ProblemError::ConstraintAlreadyExists(
                constraint.get_id().to_string(),
            ));
        }
        if let Constraint::Inequality {
            lower_bound,
            upper_bound,
            ..
        } = constraint
        {
            if lower_bound > upper_bound {
                return Err(ProblemError::InvalidConstraintBounds(
                    constraint.get_id().to_string(),
                ));
            }
        }
        for var in constraint.get_variables() {
            if !self.variables.contains_key(var) {
                return Err(ProblemError::NonExistentVariablesInConstraint(
                    var.to_string(),
                ));
            }
        }
        Ok(())
    }
    // endregion Validation Functions

    // region Fix Problem Functions
    fn fix_variable_indices(&mut self) {
        self.variables
            .values_mut()
            .enumerate()
            .for_each(|(ind, var)| var.index = ind);
    }

    fn fix_problem_type(&mut self) {
        self.problem_type = if self.has_integer_variables() {
            ProblemType::LinearMixedInteger
        } else {
            ProblemType::LinearContinuous
        };
    }
    // endregion Fix Problem Functions

    // region Check Problem
    /// Whether any integer or binary variables are present
    pub fn has_integer_variables(&self) -> bool {
        self.variables.values().any(|var| {
            matches!(
                var.variable_type,
                VariableType::Integer | VariableType::Binary
            )
        })
    }
    // endregion Check Problem
}

/// Types of optimization problems
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProblemType {
    /// Problem with linear objectives and constraints, and continuous variables
    LinearContinuous,
    /// Problem with linear objective and constraints, with integer and continuous variables
    LinearMixedInteger,
}

/// Errors associated with the Problem
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProblemError {
    /// Error when trying to add a variable with the same id as an existing variable
    #[error("Tried to add variable {0} with the same id as an existing variable")]
    VariableIdAlreadyExists(String),
    /// Error when trying to add variable with invalid bounds
    #[error("Tried to give variable {0} a lower_bound>upper_bound")]
    InvalidVariableBounds(String),
    /// Error when a variable couldn't be built
    #[error("Unable to build variable: {0}")]
    InvalidVariable(String),
    /// Error when trying to add a constraint with the same id as an existing constraint
    #[error("Tried to add constraint {0} with the same id as an existing constraint")]
    ConstraintAlreadyExists(String),
    /// Error when trying to add a constraint with invalid bounds
    #[error("Tried to add inequality constraint {0} with lower_bound > upper_bound")]
    InvalidConstraintBounds(String),
    /// Error when trying to add a constraint that contains variables not in the model
    #[error("Tried to add a constraint with variable {0} which is not in the problem")]
    NonExistentVariablesInConstraint(String),
    /// Error when trying to add an objective term which includes variables not in the model
    #[error("Tried adding an objective term with variable {0} which is not in the problem")]
    NonExistentVariablesInObjective(String),
    /// Error when trying to perform an update or drop on a variable that doesn't exist
    #[error("Tried to access variable {0} which doesn't exist")]
    NonExistentVariable(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn new_problem() {
        // Check that the specific creation functions work
        let max_problem = Problem::new_maximization();
        assert_eq!(max_problem.objective.sense, ObjectiveSense::Maximize);

        let min_problem = Problem::new_minimization();
        assert_eq!(min_problem.objective.sense, ObjectiveSense::Minimize);
    }

    #[test]
    fn update_objective_sense() {
        let mut problem = Problem::new(ObjectiveSense::Maximize);
        problem.update_objective_sense(ObjectiveSense::Minimize);
        assert_eq!(problem.objective.sense, ObjectiveSense::Minimize);
        problem.update_objective_sense(ObjectiveSense::Maximize);
        assert_eq!(problem.objective.sense, ObjectiveSense::Maximize);
    }

    #[test]
    fn add_variables() {
        let mut problem = Problem::new(ObjectiveSense::Maximize);

        // Add a single variable
        problem
            .add_new_variable("x", None, VariableType::Continuous, 64., 100.)
            .unwrap();
        // Check that the variable is in fact added
        if let Some(var) = problem.variables.get("x") {
            assert_eq!(var.variable_type, VariableType::Continuous);
            assert_eq!(var.index, 0);
            assert!(
                (var.lower_bound - 64.0).abs() < 1e-25,
                "Variable added with incorrect lower bound"
            );
            assert!(
                (var.upper_bound - 100.0).abs() < 1e-25,
                "Variable added with incorrect upper bound"
            );
        } else {
            panic!("Variable not added to model")
        }
        // Check that the problem has the correct type
        assert_eq!(problem.problem_type, ProblemType::LinearContinuous);

        // Add another variable, this time an integer variable
        problem
            .add_new_variable("y", Some("y_int"), VariableType::Integer, 64., 100.)
            .unwrap();
        if let Some(var) = problem.variables.get("y") {
            assert_eq!(var.variable_type, VariableType::Integer);
            assert_eq!(var.index, 1);
            assert_eq!(var.name.as_deref(), Some("y_int"));
        } else {
            panic!("Variable not added to model")
        }
        // Check that the problem has updated its type
        assert_eq!(problem.problem_type, ProblemType::LinearMixedInteger);

        // Removing the integer variable demotes the problem again
        problem.delete_variable("y").unwrap();
        assert_eq!(problem.problem_type, ProblemType::LinearContinuous);
    }

    #[test]
    fn add_bad_variable() {
        let mut problem = Problem::new(ObjectiveSense::Maximize);

        // Add a variable with bad bounds
        let res = problem.add_new_variable("x", None, VariableType::Continuous, 100., 64.);
        if let Err(ProblemError::InvalidVariableBounds(_)) = res {
            // Intentionally blank
        } else {
            panic!("Invalid variable bounds not caught")
        }
    }

    #[test]
    fn add_constraint() {
        let mut problem = Problem::new(ObjectiveSense::Maximize);

        // Add some variables
        problem
            .add_new_variable("x", None, VariableType::Continuous, 64., 100.)
            .unwrap();
        problem
            .add_new_variable("y", None, VariableType::Continuous, 64., 100.)
            .unwrap();

        // Add an equality constraint
        problem
            .add_new_equality_constraint_by_id("test_constraint", &["x", "y"], &[2., 3.], 200.)
            .unwrap();

        // Check that the constraint was correctly added
        match problem.constraints.get("test_constraint").unwrap() {
            Constraint::Equality { equals, .. } => {
                assert!((equals - 200.).abs() < 1e-25)
            }
            Constraint::Inequality { .. } => panic!("Incorrect constraint type added"),
        }

        // Adding a second constraint with the same id fails
        let res = problem.add_new_inequality_constraint_by_id(
            "test_constraint",
            &["x", "y"],
            &[2., 3.],
            100.,
            200.,
        );
        assert_eq!(
            res,
            Err(ProblemError::ConstraintAlreadyExists(
                "test_constraint".to_string()
            ))
        );

        // Add an inequality constraint
        problem
            .add_new_inequality_constraint_by_id("ineq", &["x", "y"], &[2., 3.], 100., 200.)
            .unwrap();
        match problem.constraints.get("ineq").unwrap() {
            Constraint::Inequality {
                lower_bound,
                upper_bound,
                ..
            } => {
                assert!((lower_bound - 100.).abs() < 1e-25);
                assert!((upper_bound - 200.).abs() < 1e-25);
            }
            Constraint::Equality { .. } => panic!("Incorrect constraint type added"),
        }
    }

    #[test]
    fn add_bad_constraint() {
        let mut problem = Problem::new(ObjectiveSense::Maximize);

        problem
            .add_new_variable("x", None, VariableType::Continuous, 64., 100.)
            .unwrap();

        if let Err(ProblemError::InvalidConstraintBounds(_)) = problem
            .add_new_inequality_constraint_by_id("bad_constraint", &["x"], &[2.], 200., 100.)
        {
        } else {
            panic!("Invalid constraint bounds not caught")
        }

        if let Err(ProblemError::NonExistentVariablesInConstraint(var)) =
            problem.add_new_equality_constraint_by_id("missing", &["x", "z"], &[1., 1.], 0.)
        {
            assert_eq!(var, "z");
        } else {
            panic!("Missing variable not caught")
        }
    }

    #[test]
    fn objective_terms() {
        let mut problem = Problem::new_maximization();
        problem
            .add_new_variable("x", None, VariableType::Continuous, 0., 1.)
            .unwrap();
        problem
            .add_new_variable("y", None, VariableType::Continuous, 0., 1.)
            .unwrap();
        problem
            .set_objective_by_id(ObjectiveSense::Minimize, &["x", "y"], &[1., 2.])
            .unwrap();
        let values = IndexMap::from([("x".to_string(), 0.5), ("y".to_string(), 1.)]);
        assert!((problem.evaluate_objective(&values) - 2.5).abs() < 1e-12);
        assert!(problem
            .add_new_linear_objective_term_by_id("w", 1.)
            .is_err());
    }
}
