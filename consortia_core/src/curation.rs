//! Augmenting models with externally supplied reactions, and repairing structural defects
//!
//! The curator never mutates its input: [`add_reactions`] and [`repair`] return a new
//! version of the model together with a report of everything they changed.
use std::collections::HashSet;

use derive_builder::Builder;
use indexmap::IndexMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::configuration::{DEFAULT_LOWER_BOUND, DEFAULT_UPPER_BOUND};
use crate::io::equation_parse::{parse_equation, Direction, EquationParseError};
use crate::metabolic_model::metabolite::{
    split_compartment_suffix, Metabolite, DEFAULT_COMPARTMENT, EXTRACELLULAR,
};
use crate::metabolic_model::model::Model;
use crate::metabolic_model::reaction::{Reaction, ReactionBuilder, ReactionBuilderError};

// region Reaction Specs
/// A reaction to add to a model
///
/// Reactant and product coefficients are given as magnitudes, the sign comes from the side.
#[derive(Builder, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[builder(setter(into))]
pub struct ReactionSpec {
    /// Reaction id, a `RXN_00001` style id is generated when missing
    #[builder(default = "None")]
    #[serde(default)]
    pub id: Option<String>,
    #[builder(default = "None")]
    #[serde(default)]
    pub name: Option<String>,
    #[builder(default = "None")]
    #[serde(default)]
    pub subsystem: Option<String>,
    #[builder(default = "None")]
    #[serde(default)]
    pub lower_bound: Option<f64>,
    #[builder(default = "None")]
    #[serde(default)]
    pub upper_bound: Option<f64>,
    /// Irreversible reactions default to a lower bound of 0
    #[builder(default = "true")]
    #[serde(default = "default_reversible")]
    pub reversible: bool,
    #[builder(default = "Vec::new()")]
    #[serde(default)]
    pub reactants: Vec<(String, f64)>,
    #[builder(default = "Vec::new()")]
    #[serde(default)]
    pub products: Vec<(String, f64)>,
}

fn default_reversible() -> bool {
    true
}

impl ReactionSpec {
    /// Create a spec from a reaction equation such as `"dbp_c + 2 h2o_c -> pht_c"`
    ///
    /// `->` gives an irreversible reaction, `<->` and `<=>` a reversible one. A `<-` equation
    /// is rewritten left to right so the reaction stays irreversible in the forward direction.
    ///
    /// # Examples
    /// ```rust
    /// use consortia_core::curation::ReactionSpec;
    /// let spec = ReactionSpec::from_equation("PHTH", "pht_c + o2_c -> pht_diol_c").unwrap();
    /// assert!(!spec.reversible);
    /// assert_eq!(spec.reactants.len(), 2);
    /// ```
    pub fn from_equation(id: &str, equation: &str) -> Result<ReactionSpec, CurationError> {
        let parsed = parse_equation(equation)?;
        let mut reactants = Vec::new();
        let mut products = Vec::new();
        for (met, coef) in parsed.stoichiometry {
            let coef = match parsed.direction {
                Direction::Backward => -coef,
                _ => coef,
            };
            if coef < 0. {
                reactants.push((met, -coef));
            } else {
                products.push((met, coef));
            }
        }
        Ok(ReactionSpec {
            id: Some(id.to_string()),
            name: None,
            subsystem: None,
            lower_bound: None,
            upper_bound: None,
            reversible: parsed.direction == Direction::Reversible,
            reactants,
            products,
        })
    }

    /// Net signed stoichiometry, reactants negative
    pub fn stoichiometry(&self) -> IndexMap<String, f64> {
        let mut stoichiometry: IndexMap<String, f64> = IndexMap::new();
        for (met, coef) in &self.reactants {
            *stoichiometry.entry(met.clone()).or_insert(0.) -= coef.abs();
        }
        for (met, coef) in &self.products {
            *stoichiometry.entry(met.clone()).or_insert(0.) += coef.abs();
        }
        stoichiometry.retain(|_, coef| *coef != 0.);
        stoichiometry
    }

    /// Flux bounds, filling each missing side from the defaults
    pub fn bounds(&self, options: &CurationOptions) -> (f64, f64) {
        let lower = self.lower_bound.unwrap_or(if self.reversible {
            options.lower_bound
        } else {
            0.
        });
        let upper = self.upper_bound.unwrap_or(options.upper_bound);
        (lower, upper)
    }
}
// endregion Reaction Specs

// region Options and Reports
/// Which metabolites receive generated transport and exchange reactions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtransScope {
    /// Every intracellular metabolite base name in the model
    #[default]
    AllMetabolites,
    /// Only metabolites referenced by the applied specs
    CuratedOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurationOptions {
    /// Generate missing transport and exchange reactions
    pub auto_extrans: bool,
    pub extrans_scope: ExtransScope,
    /// Lower bound for reversible reactions without one
    pub lower_bound: f64,
    /// Upper bound for reactions without one
    pub upper_bound: f64,
}

impl Default for CurationOptions {
    fn default() -> Self {
        CurationOptions {
            auto_extrans: false,
            extrans_scope: ExtransScope::default(),
            lower_bound: DEFAULT_LOWER_BOUND,
            upper_bound: DEFAULT_UPPER_BOUND,
        }
    }
}

/// Everything [`add_reactions`] changed
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CurationReport {
    /// Ids of reactions new to the model
    pub added: Vec<String>,
    /// Ids of reactions which replaced an existing reaction
    pub replaced: Vec<String>,
    /// Metabolites created because a spec referenced them
    pub created_metabolites: Vec<String>,
    pub generated_transports: Vec<String>,
    pub generated_exchanges: Vec<String>,
    /// Reaction chosen as objective because the model had none
    pub objective_fallback: Option<String>,
    pub caveats: Vec<String>,
}

impl CurationReport {
    /// Ids of every applied spec, new reactions first
    pub fn applied(&self) -> impl Iterator<Item = &str> {
        self.added.iter().chain(&self.replaced).map(String::as_str)
    }
}
// endregion Options and Reports

/// Add reactions to a copy of `model`
///
/// # Parameters
/// - `model`: Model to augment
/// - `specs`: Reactions to add, a spec whose id already exists replaces that reaction
/// - `options`: Default bounds and transport/exchange generation
///
/// # Returns
/// The augmented model and a report. Fails with [`CurationError::EmptyModel`] if the result
/// still has no reactions or no metabolites.
pub fn add_reactions(
    model: &Model,
    specs: &[ReactionSpec],
    options: &CurationOptions,
) -> Result<(Model, CurationReport), CurationError> {
    let mut model = model.clone();
    let mut report = CurationReport::default();
    let mut touched: Vec<String> = Vec::new();
    let mut first_applied: Option<String> = None;
    let mut next_generated = 1usize;

    for spec in specs {
        let id = match &spec.id {
            Some(id) => id.clone(),
            None => next_reaction_id(&model, &mut next_generated),
        };
        let stoichiometry = spec.stoichiometry();
        if stoichiometry.is_empty() {
            return Err(CurationError::EmptySpec(id));
        }
        let (lower, upper) = spec.bounds(options);
        if lower > upper {
            return Err(CurationError::InvalidBounds {
                reaction: id,
                lower,
                upper,
            });
        }

        for met in stoichiometry.keys() {
            if !model.metabolites.contains_key(met) {
                model.add_metabolite(Metabolite::new(met, &inferred_compartment(met)));
                report.created_metabolites.push(met.clone());
            }
            if !touched.contains(met) {
                touched.push(met.clone());
            }
        }

        let reaction = ReactionBuilder::default()
            .id(id.clone())
            .name(spec.name.clone())
            .subsystem(spec.subsystem.clone())
            .metabolites(stoichiometry)
            .lower_bound(Some(lower))
            .upper_bound(Some(upper))
            .build()?;
        if model.add_reaction(reaction).is_some() {
            report.replaced.push(id.clone());
        } else {
            report.added.push(id.clone());
        }
        first_applied.get_or_insert(id);
    }

    if options.auto_extrans {
        let scope: Vec<String> = match options.extrans_scope {
            ExtransScope::AllMetabolites => model
                .metabolites
                .values()
                .filter(|m| !m.is_extracellular())
                .map(|m| m.id.clone())
                .collect(),
            ExtransScope::CuratedOnly => touched
                .iter()
                .filter(|m| !model.is_extracellular(m))
                .cloned()
                .collect(),
        };
        add_transport_and_exchanges(&mut model, &scope, options, &mut report);
    }

    if !model.has_objective() {
        let fallback = model
            .biomass_reaction()
            .map(|rxn| rxn.id.clone())
            .or(first_applied);
        if let Some(reaction) = fallback {
            warn!(model = ?model.id, %reaction, "model had no objective, using fallback");
            report.caveats.push(format!(
                "model had no objective, maximizing {} as a placeholder",
                reaction
            ));
            model.set_objective(&reaction);
            report.objective_fallback = Some(reaction);
        }
    }

    if model.reactions.is_empty() || model.metabolites.is_empty() {
        return Err(CurationError::EmptyModel(model.id.clone()));
    }
    debug!(
        model = ?model.id,
        added = report.added.len(),
        replaced = report.replaced.len(),
        "curation finished"
    );
    Ok((model, report))
}

/// Apply the same specs to many models in parallel
///
/// Each model succeeds or fails on its own, a failing model doesn't stop the batch.
pub fn curate_batch(
    models: &[Model],
    specs: &[ReactionSpec],
    options: &CurationOptions,
) -> Vec<Result<(Model, CurationReport), CurationError>> {
    models
        .par_iter()
        .map(|model| {
            let result = add_reactions(model, specs, options);
            if let Err(err) = &result {
                warn!(model = ?model.id, %err, "curation failed");
            }
            result
        })
        .collect()
}

/// Compartment of a new metabolite, taken from its id suffix
fn inferred_compartment(metabolite_id: &str) -> String {
    split_compartment_suffix(metabolite_id)
        .1
        .unwrap_or(DEFAULT_COMPARTMENT)
        .to_string()
}

fn next_reaction_id(model: &Model, counter: &mut usize) -> String {
    loop {
        let id = format!("RXN_{:05}", counter);
        *counter += 1;
        if !model.reactions.contains_key(&id) {
            return id;
        }
    }
}

/// Generate `TRANS_{base}` and `EX_{base}_e` for every metabolite in `scope` lacking them
fn add_transport_and_exchanges(
    model: &mut Model,
    scope: &[String],
    options: &CurationOptions,
    report: &mut CurationReport,
) {
    let mut seen: HashSet<String> = HashSet::new();
    for met_id in scope {
        let Some(met) = model.metabolites.get(met_id) else {
            continue;
        };
        let base = met.base_name().to_string();
        if !seen.insert(base.clone()) {
            continue;
        }
        let external_id = format!("{}_{}", base, EXTRACELLULAR);
        if !model.metabolites.contains_key(&external_id) {
            model.add_metabolite(Metabolite::new(&external_id, EXTRACELLULAR));
            report.created_metabolites.push(external_id.clone());
        }

        let has_transport = model.reactions.values().any(|rxn| {
            rxn.metabolites.contains_key(met_id) && rxn.metabolites.contains_key(&external_id)
        });
        if !has_transport {
            let id = format!("TRANS_{}", base);
            model.add_reaction(boundary_reaction(
                &id,
                &[(met_id.as_str(), -1.), (external_id.as_str(), 1.)],
                options,
            ));
            report.generated_transports.push(id);
        }

        if model.exchange_for(&external_id).is_none() {
            let id = format!("EX_{}", external_id);
            model.add_reaction(boundary_reaction(&id, &[(external_id.as_str(), -1.)], options));
            report.generated_exchanges.push(id);
        }
    }
}

fn boundary_reaction(id: &str, stoichiometry: &[(&str, f64)], options: &CurationOptions) -> Reaction {
    Reaction {
        id: id.to_string(),
        metabolites: stoichiometry
            .iter()
            .map(|(met, coef)| (met.to_string(), *coef))
            .collect(),
        name: None,
        lower_bound: Some(options.lower_bound),
        upper_bound: Some(options.upper_bound),
        subsystem: None,
        gene_reaction_rule: None,
        notes: None,
        annotation: None,
    }
}

// region Repair
/// A change made by [`repair`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RepairAction {
    ClearedDuplicates { count: usize },
    DroppedEmptyReaction { reaction: String },
    FilledBounds { reaction: String },
    SwappedBounds { reaction: String },
    CreatedMetabolite { metabolite: String },
    NormalizedCompartments { count: usize },
    AssignedCompartments { count: usize },
    DroppedObjectiveTerm { reaction: String },
    SetObjective { reaction: String },
}

/// Fix every issue [`Model::validate`] reports which has a mechanical repair
///
/// Duplicate ids keep their last occurrence, empty reactions are dropped, missing bounds
/// come from `options`, inverted bounds are swapped, unknown metabolites are created,
/// compartments are normalized and defaulted to `c`, and an absent objective falls back to
/// the biomass reaction (or the first reaction).
pub fn repair(
    model: &Model,
    options: &CurationOptions,
) -> Result<(Model, Vec<RepairAction>), CurationError> {
    let mut model = model.clone();
    let mut actions = Vec::new();

    if !model.duplicate_ids.is_empty() {
        actions.push(RepairAction::ClearedDuplicates {
            count: model.duplicate_ids.len(),
        });
        model.duplicate_ids.clear();
    }

    let empty: Vec<String> = model
        .reactions
        .values()
        .filter(|rxn| rxn.metabolites.is_empty())
        .map(|rxn| rxn.id.clone())
        .collect();
    for reaction in empty {
        model.remove_reaction(&reaction);
        actions.push(RepairAction::DroppedEmptyReaction { reaction });
    }

    let mut missing_metabolites = Vec::new();
    for rxn in model.reactions.values_mut() {
        if !rxn.has_bounds() {
            rxn.lower_bound.get_or_insert(options.lower_bound);
            rxn.upper_bound.get_or_insert(options.upper_bound);
            actions.push(RepairAction::FilledBounds {
                reaction: rxn.id.clone(),
            });
        }
        if let (Some(lower), Some(upper)) = (rxn.lower_bound, rxn.upper_bound) {
            if lower > upper {
                rxn.lower_bound = Some(upper);
                rxn.upper_bound = Some(lower);
                actions.push(RepairAction::SwappedBounds {
                    reaction: rxn.id.clone(),
                });
            }
        }
        for met in rxn.metabolites.keys() {
            if !missing_metabolites.contains(met) {
                missing_metabolites.push(met.clone());
            }
        }
    }
    missing_metabolites.retain(|met| !model.metabolites.contains_key(met));
    for metabolite in missing_metabolites {
        model.add_metabolite(Metabolite::new(&metabolite, &inferred_compartment(&metabolite)));
        actions.push(RepairAction::CreatedMetabolite { metabolite });
    }

    let normalized = model.normalize_external_compartments();
    if normalized > 0 {
        actions.push(RepairAction::NormalizedCompartments { count: normalized });
    }
    let assigned = model.assign_default_compartments();
    if assigned > 0 {
        actions.push(RepairAction::AssignedCompartments { count: assigned });
    }

    let unknown: Vec<String> = model
        .objective
        .keys()
        .filter(|rxn| !model.reactions.contains_key(*rxn))
        .cloned()
        .collect();
    for reaction in unknown {
        model.objective.shift_remove(&reaction);
        actions.push(RepairAction::DroppedObjectiveTerm { reaction });
    }
    if !model.has_objective() {
        let fallback = model
            .biomass_reaction()
            .or_else(|| model.reactions.values().next())
            .map(|rxn| rxn.id.clone());
        if let Some(reaction) = fallback {
            warn!(model = ?model.id, %reaction, "model had no objective, using fallback");
            model.set_objective(&reaction);
            actions.push(RepairAction::SetObjective { reaction });
        }
    }

    if model.reactions.is_empty() || model.metabolites.is_empty() {
        return Err(CurationError::EmptyModel(model.id.clone()));
    }
    Ok((model, actions))
}
// endregion Repair

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CurationError {
    #[error("Model {0:?} has no reactions or no metabolites after curation")]
    EmptyModel(Option<String>),
    #[error("Reaction spec {0} has no metabolites")]
    EmptySpec(String),
    #[error("Reaction spec {reaction} has lower bound {lower} above upper bound {upper}")]
    InvalidBounds {
        reaction: String,
        lower: f64,
        upper: f64,
    },
    #[error("Unable to parse reaction equation")]
    Equation(#[from] EquationParseError),
    #[error("Unable to build reaction: {0}")]
    Builder(String),
}

impl From<ReactionBuilderError> for CurationError {
    fn from(err: ReactionBuilderError) -> Self {
        CurationError::Builder(err.to_string())
    }
}
