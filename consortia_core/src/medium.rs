//! Recommending a shared growth medium for a set of models
//!
//! Each model is solved on its own: with every exchange opened for import it must reach
//! `min_growth`, then the cheapest set of imports supporting `min(target_growth, g_max)` is
//! found. The per model import tables are merged into one medium by taking the 75th
//! percentile of each exchange's requirement and rounding it up to a coarse tier.
use std::cmp::Ordering;

use indexmap::IndexMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::configuration::{Configuration, MediumConfig, MediumObjective};
use crate::metabolic_model::model::Model;
use crate::optimize::fba::{add_model_to_problem, optimize_model, FbaError};
use crate::optimize::objective::ObjectiveSense;
use crate::optimize::problem::{Problem, ProblemError};
use crate::optimize::solvers::{SolverError, Source};
use crate::optimize::variable::VariableType;
use crate::optimize::{clean_value, OptimizationStatus};

/// Weight of the summed import when the number of imported components is minimized, keeps
/// the reported fluxes minimal among the cheapest component sets
const COMPONENT_FLUX_WEIGHT: f64 = 1e-4;

/// Import requirements of a single model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelMedium {
    pub model_id: String,
    /// Growth reached with every exchange open
    pub max_growth: f64,
    /// Growth the imports were chosen to support
    pub required_growth: f64,
    /// Exchange id to import flux, only positive imports are listed
    pub imports: IndexMap<String, f64>,
    pub source: Source,
}

/// One exchange of the recommended medium
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediumRow {
    pub reaction: String,
    /// Tiered import bound to put into the shared medium
    pub suggested_upper_bound: f64,
    /// How many models import through this exchange
    pub models_with_need: usize,
    pub p75: f64,
    pub max: f64,
    pub mean: f64,
}

/// A medium recommended for a batch of models
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediumRecommendation {
    /// Sorted by number of models, then p75, then mean, all descending
    pub rows: Vec<MediumRow>,
    pub per_model: Vec<ModelMedium>,
    /// Models left out of the recommendation, with the reason
    pub excluded: Vec<(String, String)>,
    pub source: Source,
}

impl MediumRecommendation {
    /// Exchange id to import bound, the form [`crate::community::Community`] takes a medium in
    pub fn as_medium(&self) -> IndexMap<String, f64> {
        self.rows
            .iter()
            .map(|row| (row.reaction.clone(), row.suggested_upper_bound))
            .collect()
    }
}

/// Round an import requirement up to its tier, capped at `max_import`
///
/// | requirement | tier |
/// |-------------|------|
/// | below 0.01 | 0.01 |
/// | 0.01 to 0.1 | 0.1 |
/// | 0.1 to 1 | 1 |
/// | 1 to 10 | 10 |
/// | 10 and above | the requirement |
pub fn tier(flux: f64, max_import: f64) -> f64 {
    let tiered = if flux >= 10. {
        flux
    } else if flux >= 1. {
        10.
    } else if flux >= 0.1 {
        1.
    } else if flux >= 0.01 {
        0.1
    } else {
        0.01
    };
    tiered.min(max_import)
}

/// Percentile with linear interpolation between the closest ranks
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let position = (sorted.len() - 1) as f64 * q.clamp(0., 1.);
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * (position - lower as f64))
}

/// Import bound of an exchange while the medium is being searched for
fn import_cap(reaction_id: &str, config: &MediumConfig) -> f64 {
    config
        .candidate_exchanges
        .get(reaction_id)
        .copied()
        .unwrap_or(config.max_import)
        .min(config.max_import)
}

/// Copy of `model` with every exchange importable up to its cap
fn open_exchanges(model: &Model, config: &MediumConfig) -> Model {
    let mut opened = model.clone();
    let exchanges: Vec<(String, f64)> = model
        .exchanges()
        .filter_map(|rxn| {
            rxn.metabolites
                .values()
                .next()
                .map(|coef| (rxn.id.clone(), *coef))
        })
        .collect();
    for (id, coef) in exchanges {
        let cap = import_cap(&id, config);
        if let Some(rxn) = opened.reactions.get_mut(&id) {
            // Import runs against the sign of the metabolite's coefficient
            if coef < 0. {
                rxn.lower_bound = Some(-cap / coef.abs());
            } else {
                rxn.upper_bound = Some(cap / coef);
            }
        }
    }
    opened
}

/// Find the imports one model needs
///
/// # Parameters
/// - `model`: Model with an objective representing growth
/// - `config`: Growth targets, import caps and objective mode
/// - `solver`: Default bounds, zero threshold and backends
pub fn solve_model_medium(
    model: &Model,
    config: &MediumConfig,
    solver: &Configuration,
) -> Result<ModelMedium, MediumError> {
    let model_id = model.id.clone().unwrap_or_else(|| "unnamed".to_string());
    let strategy = solver.strategy();
    let opened = open_exchanges(model, config);

    let open_growth = match optimize_model(&opened, ObjectiveSense::Maximize, &strategy, solver) {
        Ok(solution) => solution,
        Err(FbaError::Infeasible) => {
            return Err(MediumError::InsufficientGrowth {
                model: model_id,
                growth: 0.,
                min_growth: config.min_growth,
            })
        }
        Err(FbaError::MissingObjective) => return Err(MediumError::MissingObjective(model_id)),
        Err(err) => return Err(err.into()),
    };
    if open_growth.objective_value < config.min_growth {
        return Err(MediumError::InsufficientGrowth {
            model: model_id,
            growth: open_growth.objective_value,
            min_growth: config.min_growth,
        });
    }
    let required_growth = config.target_growth.min(
        open_growth.objective_value - solver.relaxation_for(open_growth.objective_value),
    );

    let mut problem = Problem::new_minimization();
    let fluxes = add_model_to_problem(&mut problem, &opened, None, solver)?;
    let (growth_vars, growth_coefs): (Vec<&str>, Vec<f64>) = opened
        .objective
        .iter()
        .filter_map(|(rxn, coef)| fluxes.get(rxn).map(|var| (var.as_str(), *coef)))
        .unzip();
    problem.add_new_inequality_constraint_by_id(
        "required_growth",
        &growth_vars,
        &growth_coefs,
        required_growth,
        f64::INFINITY,
    )?;

    let count_components = match config.objective {
        MediumObjective::MinimizeComponents if strategy.supports_integer_variables() => true,
        MediumObjective::MinimizeComponents => {
            warn!(
                model = %model_id,
                "no integer capable backend, minimizing total import instead of components"
            );
            false
        }
        MediumObjective::MinimizeTotalImport => false,
    };

    let mut exchanges: Vec<(String, String, f64)> = Vec::new();
    for rxn in opened.exchanges() {
        let Some(coef) = rxn.metabolites.values().next().copied() else {
            continue;
        };
        let flux_var = &fluxes[&rxn.id];
        let import_var = format!("import__{}", rxn.id);
        let cap = import_cap(&rxn.id, config);
        problem.add_new_variable(&import_var, None, VariableType::Continuous, 0., cap)?;
        // import >= coef * v, tight at the optimum because imports are minimized
        problem.add_new_inequality_constraint_by_id(
            &format!("import_definition__{}", rxn.id),
            &[import_var.as_str(), flux_var.as_str()],
            &[1., -coef],
            0.,
            f64::INFINITY,
        )?;
        if count_components {
            let uses_var = format!("uses__{}", rxn.id);
            problem.add_new_variable(&uses_var, None, VariableType::Binary, 0., 1.)?;
            problem.add_new_inequality_constraint_by_id(
                &format!("import_switch__{}", rxn.id),
                &[import_var.as_str(), uses_var.as_str()],
                &[1., -cap],
                f64::NEG_INFINITY,
                0.,
            )?;
            problem.add_new_linear_objective_term_by_id(&uses_var, 1.)?;
            problem.add_new_linear_objective_term_by_id(&import_var, COMPONENT_FLUX_WEIGHT)?;
        } else {
            problem.add_new_linear_objective_term_by_id(&import_var, 1.)?;
        }
        exchanges.push((rxn.id.clone(), flux_var.clone(), coef));
    }

    let result = strategy.solve(&problem)?;
    if result.solution.status == OptimizationStatus::Infeasible {
        return Err(MediumError::InsufficientGrowth {
            model: model_id,
            growth: open_growth.objective_value,
            min_growth: config.min_growth,
        });
    }
    let mut imports = IndexMap::new();
    for (rxn, flux_var, coef) in exchanges {
        let flux = result.solution.value(&flux_var).unwrap_or(0.);
        let import = clean_value(coef * flux, solver.zero_threshold);
        if import > 0. {
            imports.insert(rxn, import);
        }
    }
    debug!(model = %model_id, required_growth, imports = imports.len(), "model medium solved");
    Ok(ModelMedium {
        model_id,
        max_growth: open_growth.objective_value,
        required_growth,
        imports,
        source: open_growth.source.combine(result.source),
    })
}

/// Merge per model import tables into tiered medium rows
///
/// # Parameters
/// - `tables`: One map of exchange id to required import per model
/// - `max_import`: Cap on every suggested bound
///
/// # Returns
/// Rows sorted by number of models, then p75, then mean, all descending. Fails with
/// [`MediumError::NoFeasibleMedium`] when no table has a positive requirement.
pub fn aggregate_requirements<'a, I>(tables: I, max_import: f64) -> Result<Vec<MediumRow>, MediumError>
where
    I: IntoIterator<Item = &'a IndexMap<String, f64>>,
{
    let mut needs: IndexMap<&str, Vec<f64>> = IndexMap::new();
    for table in tables {
        for (reaction, flux) in table {
            if *flux > 0. {
                needs.entry(reaction.as_str()).or_default().push(*flux);
            }
        }
    }
    if needs.is_empty() {
        return Err(MediumError::NoFeasibleMedium);
    }

    let mut rows: Vec<MediumRow> = needs
        .into_iter()
        .filter_map(|(reaction, fluxes)| {
            let p75 = percentile(&fluxes, 0.75)?;
            let max = fluxes.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let mean = fluxes.iter().sum::<f64>() / fluxes.len() as f64;
            Some(MediumRow {
                reaction: reaction.to_string(),
                suggested_upper_bound: tier(p75, max_import),
                models_with_need: fluxes.len(),
                p75,
                max,
                mean,
            })
        })
        .collect();
    rows.sort_by(|a, b| {
        b.models_with_need
            .cmp(&a.models_with_need)
            .then_with(|| b.p75.total_cmp(&a.p75))
            .then_with(|| b.mean.partial_cmp(&a.mean).unwrap_or(Ordering::Equal))
    });
    Ok(rows)
}

/// Recommend one shared medium for a batch of models
///
/// Models are solved in parallel. A model which can't reach `min_growth` is left out with a
/// warning, the rest still contribute.
pub fn recommend_medium(
    models: &[Model],
    config: &MediumConfig,
    solver: &Configuration,
) -> Result<MediumRecommendation, MediumError> {
    let results: Vec<Result<ModelMedium, MediumError>> = models
        .par_iter()
        .map(|model| solve_model_medium(model, config, solver))
        .collect();

    let mut per_model = Vec::new();
    let mut excluded = Vec::new();
    for (model, result) in models.iter().zip(results) {
        match result {
            Ok(medium) => per_model.push(medium),
            Err(err) => {
                let id = model.id.clone().unwrap_or_else(|| "unnamed".to_string());
                warn!(model = %id, %err, "model excluded from medium recommendation");
                excluded.push((id, err.to_string()));
            }
        }
    }

    let rows = aggregate_requirements(per_model.iter().map(|m| &m.imports), config.max_import)?;
    let source = per_model
        .iter()
        .fold(Source::Real, |source, medium| source.combine(medium.source));
    info!(exchanges = rows.len(), models = per_model.len(), "medium recommended");
    Ok(MediumRecommendation {
        rows,
        per_model,
        excluded,
        source,
    })
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MediumError {
    #[error("No model reported a positive import requirement, widen the candidate exchanges")]
    NoFeasibleMedium,
    #[error("Model {model} reaches growth {growth}, below the minimum {min_growth}")]
    InsufficientGrowth {
        model: String,
        growth: f64,
        min_growth: f64,
    },
    #[error("Model {0} has no objective")]
    MissingObjective(String),
    #[error("Unable to optimize the model")]
    Fba(#[from] FbaError),
    #[error("Unable to build the medium problem")]
    Problem(#[from] ProblemError),
    #[error("Unable to solve the medium problem")]
    Solver(#[from] SolverError),
}
