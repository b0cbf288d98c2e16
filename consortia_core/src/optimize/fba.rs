//! Flux balance analysis of a single model
//!
//! [`add_model_to_problem`] writes a model's flux variables and steady state mass balances
//! into a [`Problem`]; the community solver reuses it with one namespace per member.
use indexmap::IndexMap;
use thiserror::Error;
use tracing::debug;

use crate::configuration::Configuration;
use crate::metabolic_model::model::Model;
use crate::metabolic_model::reaction::flux_variable_id;
use crate::optimize::objective::ObjectiveSense;
use crate::optimize::problem::{Problem, ProblemError};
use crate::optimize::solvers::{SolverError, Source};
use crate::optimize::strategy::SolveStrategy;
use crate::optimize::variable::VariableType;
use crate::optimize::{clean_value, OptimizationStatus};

/// Id of the mass balance constraint for a metabolite
pub fn mass_balance_id(metabolite_id: &str, namespace: Option<&str>) -> String {
    match namespace {
        Some(ns) => format!("mass_balance__{}__{}", metabolite_id, ns),
        None => format!("mass_balance__{}", metabolite_id),
    }
}

/// Add the flux variables and mass balance constraints of `model` to `problem`
///
/// # Parameters
/// - `problem`: Problem to extend
/// - `model`: Model whose reactions become flux variables
/// - `namespace`: Suffix appended to every id, used to keep community members apart
/// - `config`: Supplies the bounds for reactions without them
///
/// # Returns
/// Map of reaction id to the id of its flux variable
pub fn add_model_to_problem(
    problem: &mut Problem,
    model: &Model,
    namespace: Option<&str>,
    config: &Configuration,
) -> Result<IndexMap<String, String>, ProblemError> {
    let mut flux_variables = IndexMap::with_capacity(model.reactions.len());
    let mut balances: IndexMap<&str, (Vec<String>, Vec<f64>)> = IndexMap::new();

    for rxn in model.reactions.values() {
        let var_id = flux_variable_id(&rxn.id, namespace);
        problem.add_new_variable(
            &var_id,
            rxn.name.as_deref(),
            VariableType::Continuous,
            rxn.lower_bound_or(config.lower_bound),
            rxn.upper_bound_or(config.upper_bound),
        )?;
        for (met, coef) in &rxn.metabolites {
            let entry = balances.entry(met.as_str()).or_default();
            entry.0.push(var_id.clone());
            entry.1.push(*coef);
        }
        flux_variables.insert(rxn.id.clone(), var_id);
    }

    for (met, (vars, coefs)) in balances {
        let vars: Vec<&str> = vars.iter().map(String::as_str).collect();
        problem.add_new_equality_constraint_by_id(
            &mass_balance_id(met, namespace),
            &vars,
            &coefs,
            0.,
        )?;
    }
    Ok(flux_variables)
}

/// Result of optimizing a single model
#[derive(Debug, Clone, PartialEq)]
pub struct FbaSolution {
    /// Objective value at the optimum
    pub objective_value: f64,
    /// Flux of every reaction, values below the zero threshold are reported as zero
    pub fluxes: IndexMap<String, f64>,
    /// Whether a real solver produced the result
    pub source: Source,
    /// Solver iterations
    pub iterations: u32,
}

/// Maximize (or minimize) the model objective
///
/// # Parameters
/// - `model`: Model to optimize, its objective must be non-empty
/// - `sense`: Direction of the optimization
/// - `strategy`: Backends to solve with
/// - `config`: Default bounds and zero threshold
pub fn optimize_model(
    model: &Model,
    sense: ObjectiveSense,
    strategy: &SolveStrategy,
    config: &Configuration,
) -> Result<FbaSolution, FbaError> {
    if !model.has_objective() {
        return Err(FbaError::MissingObjective);
    }
    let mut problem = Problem::new(sense);
    let flux_variables = add_model_to_problem(&mut problem, model, None, config)?;
    for (rxn, coef) in &model.objective {
        let var = flux_variables
            .get(rxn)
            .ok_or_else(|| FbaError::UnknownObjectiveReaction(rxn.clone()))?;
        problem.add_new_linear_objective_term_by_id(var, *coef)?;
    }

    let result = strategy.solve(&problem)?;
    match result.solution.status {
        OptimizationStatus::Infeasible => return Err(FbaError::Infeasible),
        OptimizationStatus::Unbounded => return Err(FbaError::Unbounded),
        _ => {}
    }
    let values = result
        .solution
        .variable_values
        .as_ref()
        .ok_or(FbaError::Infeasible)?;
    let fluxes: IndexMap<String, f64> = flux_variables
        .iter()
        .map(|(rxn, var)| {
            let flux = values.get(var).copied().unwrap_or(0.);
            (rxn.clone(), clean_value(flux, config.zero_threshold))
        })
        .collect();
    let objective_value = clean_value(
        result.solution.objective_value.unwrap_or(0.),
        config.zero_threshold,
    );
    debug!(model = ?model.id, objective_value, "fba solved");
    Ok(FbaSolution {
        objective_value,
        fluxes,
        source: result.source,
        iterations: result.solution.iterations,
    })
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FbaError {
    #[error("Model has no objective")]
    MissingObjective,
    #[error("Objective references reaction {0} which is not in the model")]
    UnknownObjectiveReaction(String),
    #[error("Model has no feasible flux distribution")]
    Infeasible,
    #[error("Model objective is unbounded")]
    Unbounded,
    #[error("Unable to build the optimization problem")]
    Problem(#[from] ProblemError),
    #[error("Unable to solve the optimization problem")]
    Solver(#[from] SolverError),
}

#[cfg(test)]
mod fba_tests {
    use super::*;
    use crate::test_utils::{assert_close, auxotroph_model, cross_feeder_model, degrader_model};

    #[test]
    fn degrader_growth() {
        let config = Configuration::default();
        let solution = optimize_model(
            &degrader_model(),
            ObjectiveSense::Maximize,
            &config.strategy(),
            &config,
        )
        .unwrap();
        // dbp import caps growth at 10, glucose need is only 5
        assert_close(solution.objective_value, 10., 1e-5);
        assert_close(solution.fluxes["DBPH"], 10., 1e-5);
        assert_close(solution.fluxes["EX_glc_e"], -5., 1e-5);
        assert_eq!(solution.source, Source::Real);
    }

    #[test]
    fn cross_feeder_growth() {
        let config = Configuration::default();
        let solution = optimize_model(
            &cross_feeder_model(),
            ObjectiveSense::Maximize,
            &config.strategy(),
            &config,
        )
        .unwrap();
        assert_close(solution.objective_value, 10., 1e-5);
    }

    #[test]
    fn infeasible_model() {
        let config = Configuration::default();
        let mut model = auxotroph_model();
        model.reactions["EX_vit_e"].lower_bound = Some(0.);
        let result = optimize_model(&model, ObjectiveSense::Maximize, &config.strategy(), &config);
        assert_eq!(result, Err(FbaError::Infeasible));
    }

    #[test]
    fn missing_objective() {
        let config = Configuration::default();
        let mut model = degrader_model();
        model.objective.clear();
        let result = optimize_model(&model, ObjectiveSense::Maximize, &config.strategy(), &config);
        assert_eq!(result, Err(FbaError::MissingObjective));
    }

    #[test]
    fn namespaced_problem() {
        let mut problem = Problem::new_maximization();
        let config = Configuration::default();
        let vars =
            add_model_to_problem(&mut problem, &degrader_model(), Some("A"), &config).unwrap();
        assert_eq!(vars["DBPH"], "DBPH__A");
        assert!(problem.constraints().contains_key("mass_balance__dbp_c__A"));
        assert_eq!(problem.num_variables(), 8);
        assert_eq!(problem.num_constraints(), 7);
    }
}
