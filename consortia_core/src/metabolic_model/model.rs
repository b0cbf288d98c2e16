//! This module provides the Model struct for representing an entire metabolic model
use crate::metabolic_model::metabolite::{
    normalize_compartment, Metabolite, DEFAULT_COMPARTMENT, EXTRACELLULAR,
};
use crate::metabolic_model::reaction::Reaction;
use crate::metabolic_model::validation::{validate, Issue};

use indexmap::IndexMap;

/// Represents a Genome Scale Metabolic Model
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Model {
    /// Map of reaction ids to Reaction Objects
    pub reactions: IndexMap<String, Reaction>,
    /// Map of metabolite ids to Metabolite Objects
    pub metabolites: IndexMap<String, Metabolite>,
    /// Map of reaction ids to objective function coefficients
    pub objective: IndexMap<String, f64>,
    /// Id associated with the Model
    pub id: Option<String>,
    /// Compartments in the model
    ///
    /// An IndexMap<String, String> of {short name: long name}
    pub compartments: Option<IndexMap<String, String>>,
    /// A version identifier for the Model, stored as a string
    pub version: Option<String>,
    /// Identifiers which appeared more than once when the model was read, only the last
    /// occurrence is kept in the maps above
    pub(crate) duplicate_ids: Vec<DuplicateId>,
}

/// An identifier seen more than once while loading a model
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DuplicateId {
    Reaction(String),
    Metabolite(String),
}

impl Model {
    pub fn new_empty() -> Self {
        Model::default()
    }

    /// Add a reaction to the model, replacing (and returning) any reaction with the same id
    ///
    /// # Parameters
    /// - reaction: Reaction to add
    ///
    /// # Examples
    /// ```rust
    /// use consortia_core::metabolic_model::model::Model;
    /// use consortia_core::metabolic_model::reaction::ReactionBuilder;
    /// let mut model = Model::new_empty();
    /// let new_reaction = ReactionBuilder::default().id("new_reaction").build().unwrap();
    /// assert!(model.add_reaction(new_reaction.clone()).is_none());
    /// assert!(model.add_reaction(new_reaction).is_some());
    /// assert_eq!(model.reactions.len(), 1);
    /// ```
    pub fn add_reaction(&mut self, reaction: Reaction) -> Option<Reaction> {
        let id = reaction.id.clone();
        self.reactions.insert(id, reaction)
    }

    /// Add a metabolite to the model, replacing (and returning) any metabolite with the same id
    pub fn add_metabolite(&mut self, metabolite: Metabolite) -> Option<Metabolite> {
        let id = metabolite.id.clone();
        self.metabolites.insert(id, metabolite)
    }

    /// Remove a reaction (and its objective coefficient) from the model
    pub fn remove_reaction(&mut self, reaction_id: &str) -> Option<Reaction> {
        self.objective.shift_remove(reaction_id);
        self.reactions.shift_remove(reaction_id)
    }

    /// Replace the objective with maximizing the flux of a single reaction
    pub fn set_objective(&mut self, reaction_id: &str) {
        self.objective.clear();
        self.objective.insert(reaction_id.to_string(), 1.0);
    }

    /// Whether the objective puts a non-zero coefficient on a reaction of the model
    pub fn has_objective(&self) -> bool {
        self.objective
            .iter()
            .any(|(rxn, coef)| *coef != 0. && self.reactions.contains_key(rxn))
    }

    /// Identifiers which were duplicated in the source the model was read from
    pub fn duplicate_ids(&self) -> &[DuplicateId] {
        &self.duplicate_ids
    }

    pub(crate) fn record_duplicate(&mut self, duplicate: DuplicateId) {
        self.duplicate_ids.push(duplicate);
    }

    /// Whether the metabolite with this id is in the extracellular compartment
    pub fn is_extracellular(&self, metabolite_id: &str) -> bool {
        self.metabolites
            .get(metabolite_id)
            .is_some_and(|m| m.is_extracellular())
    }

    /// Exchange reactions: single metabolite boundary reactions on an extracellular metabolite
    pub fn exchanges(&self) -> impl Iterator<Item = &Reaction> {
        self.reactions.values().filter(|rxn| {
            rxn.is_boundary()
                && rxn
                    .metabolites
                    .keys()
                    .next()
                    .is_some_and(|met| self.is_extracellular(met))
        })
    }

    /// The exchange reaction for an extracellular metabolite, if the model has one
    pub fn exchange_for(&self, metabolite_id: &str) -> Option<&Reaction> {
        self.exchanges()
            .find(|rxn| rxn.metabolites.contains_key(metabolite_id))
    }

    /// Find the reaction representing growth
    ///
    /// Objective reactions named like a biomass reaction are preferred, then any reaction
    /// whose id or name contains "biomass" or "growth".
    pub fn biomass_reaction(&self) -> Option<&Reaction> {
        self.objective
            .keys()
            .filter_map(|id| self.reactions.get(id))
            .find(|rxn| rxn.looks_like_biomass())
            .or_else(|| self.reactions.values().find(|rxn| rxn.looks_like_biomass()))
    }

    /// Fold extracellular compartment synonyms (`ext`, `extracellular`, ...) into `e`
    ///
    /// # Returns
    /// The number of metabolites whose compartment changed
    pub fn normalize_external_compartments(&mut self) -> usize {
        let mut changed = 0;
        for met in self.metabolites.values_mut() {
            if let Some(compartment) = &met.compartment {
                let normalized = normalize_compartment(compartment);
                if &normalized != compartment {
                    met.compartment = Some(normalized);
                    changed += 1;
                }
            }
        }
        if let Some(compartments) = &mut self.compartments {
            let renamed: IndexMap<String, String> = compartments
                .drain(..)
                .map(|(short, long)| (normalize_compartment(&short), long))
                .collect();
            *compartments = renamed;
        }
        changed
    }

    /// Give every metabolite without a compartment the default compartment `c`
    ///
    /// # Returns
    /// The number of metabolites updated
    pub fn assign_default_compartments(&mut self) -> usize {
        let mut changed = 0;
        for met in self.metabolites.values_mut() {
            let missing = match &met.compartment {
                Some(c) => c.trim().is_empty(),
                None => true,
            };
            if missing {
                met.compartment = Some(DEFAULT_COMPARTMENT.to_string());
                changed += 1;
            }
        }
        changed
    }

    /// Ids of all extracellular metabolites
    pub fn extracellular_metabolites(&self) -> impl Iterator<Item = &str> {
        self.metabolites
            .values()
            .filter(|m| m.compartment.as_deref() == Some(EXTRACELLULAR))
            .map(|m| m.id.as_str())
    }

    /// Check the model for structural problems, see [`Issue`]
    pub fn validate(&self) -> Vec<Issue> {
        validate(self)
    }

    /// Whether validation reports no issues at all
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}
