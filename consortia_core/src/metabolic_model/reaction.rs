//! This module provides a struct for representing reactions
use derive_builder::Builder;
use indexmap::IndexMap;

/// Represents a reaction in the metabolic model
///
/// Flux bounds are optional so that a model read from an incomplete file can report
/// which reactions lack a bound instead of silently receiving one.
#[derive(Builder, Debug, Clone, PartialEq)]
#[builder(setter(into))]
pub struct Reaction {
    /// Used to identify the reaction
    pub id: String,
    /// Metabolite stoichiometry of the reaction, negative coefficients are consumed
    #[builder(default = "IndexMap::new()")]
    pub metabolites: IndexMap<String, f64>,
    /// Human-readable reaction name
    #[builder(default = "None")]
    pub name: Option<String>,
    /// Lower flux bound
    #[builder(default = "None")]
    pub lower_bound: Option<f64>,
    /// Upper flux bound
    #[builder(default = "None")]
    pub upper_bound: Option<f64>,
    /// Reaction subsystem
    #[builder(default = "None")]
    pub subsystem: Option<String>,
    /// Gene reaction rule, kept as text
    #[builder(default = "None")]
    pub gene_reaction_rule: Option<String>,
    /// Notes about the reaction
    #[builder(default = "None")]
    pub notes: Option<String>,
    /// Reaction Annotations
    #[builder(default = "None")]
    pub annotation: Option<String>,
}

impl Reaction {
    /// Lower bound, or `default` if the reaction has none
    pub fn lower_bound_or(&self, default: f64) -> f64 {
        self.lower_bound.unwrap_or(default)
    }

    /// Upper bound, or `default` if the reaction has none
    pub fn upper_bound_or(&self, default: f64) -> f64 {
        self.upper_bound.unwrap_or(default)
    }

    /// Whether both flux bounds are present
    pub fn has_bounds(&self) -> bool {
        self.lower_bound.is_some() && self.upper_bound.is_some()
    }

    /// Whether the reaction can carry flux in both directions
    pub fn is_reversible(&self) -> bool {
        self.lower_bound.is_some_and(|lb| lb < 0.) && self.upper_bound.is_some_and(|ub| ub > 0.)
    }

    /// Whether the reaction has a single metabolite, i.e. it exchanges matter with
    /// something outside the model (exchange, demand or sink)
    pub fn is_boundary(&self) -> bool {
        self.metabolites.len() == 1
    }

    /// Ids of the consumed metabolites
    pub fn reactants(&self) -> impl Iterator<Item = &str> {
        self.metabolites
            .iter()
            .filter(|(_, coef)| **coef < 0.)
            .map(|(id, _)| id.as_str())
    }

    /// Ids of the produced metabolites
    pub fn products(&self) -> impl Iterator<Item = &str> {
        self.metabolites
            .iter()
            .filter(|(_, coef)| **coef > 0.)
            .map(|(id, _)| id.as_str())
    }

    /// Whether the id or name marks this as a biomass / growth reaction
    pub fn looks_like_biomass(&self) -> bool {
        let matches = |s: &str| {
            let lower = s.to_lowercase();
            lower.contains("biomass") || lower.contains("growth")
        };
        matches(&self.id) || self.name.as_deref().is_some_and(matches)
    }

    /// Id of the optimization variable carrying this reaction's flux
    ///
    /// # Note:
    /// Reactions of a community member are namespaced as "{reaction_id}__{member_id}"
    pub fn variable_id(&self, namespace: Option<&str>) -> String {
        flux_variable_id(&self.id, namespace)
    }
}

/// Id of the flux variable for `reaction_id`, optionally namespaced by a community member
pub fn flux_variable_id(reaction_id: &str, namespace: Option<&str>) -> String {
    match namespace {
        Some(ns) => format!("{}__{}", reaction_id, ns),
        None => reaction_id.to_string(),
    }
}
