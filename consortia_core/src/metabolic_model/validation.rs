//! Structural validation of metabolic models
use thiserror::Error;

use crate::metabolic_model::model::{DuplicateId, Model};

/// A structural problem found in a model
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Issue {
    #[error("Reaction id {0} appears more than once")]
    DuplicateReaction(String),
    #[error("Metabolite id {0} appears more than once")]
    DuplicateMetabolite(String),
    #[error("Reaction {0} has an empty stoichiometry")]
    EmptyStoichiometry(String),
    #[error("Reaction {reaction} is missing a flux bound (lower missing: {missing_lower}, upper missing: {missing_upper})")]
    MissingBounds {
        reaction: String,
        missing_lower: bool,
        missing_upper: bool,
    },
    #[error("Reaction {reaction} has lower bound {lower} above upper bound {upper}")]
    InvertedBounds {
        reaction: String,
        lower: f64,
        upper: f64,
    },
    #[error("Reaction {reaction} references metabolite {metabolite} which is not in the model")]
    UnknownMetabolite { reaction: String, metabolite: String },
    #[error("Model has no objective")]
    MissingObjective,
    #[error("Objective references reaction {0} which is not in the model")]
    ObjectiveUnknownReaction(String),
    #[error("Metabolite {0} has no compartment")]
    MissingCompartment(String),
    #[error("Model has no reactions or no metabolites")]
    EmptyModel,
}

/// How serious an [`Issue`] is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    /// The model can still be solved, a default was assumed
    Warning,
    /// The model can't be used until the issue is repaired
    Error,
}

impl Issue {
    pub fn severity(&self) -> IssueSeverity {
        match self {
            Issue::MissingCompartment(_) => IssueSeverity::Warning,
            _ => IssueSeverity::Error,
        }
    }
}

/// Check a model for structural problems
///
/// # Parameters
/// - `model`: The model to check
///
/// # Returns
/// Every issue found, in the order reactions and metabolites appear in the model. An empty
/// list means the model is valid.
pub fn validate(model: &Model) -> Vec<Issue> {
    let mut issues = Vec::new();

    if model.reactions.is_empty() || model.metabolites.is_empty() {
        issues.push(Issue::EmptyModel);
    }

    for duplicate in model.duplicate_ids() {
        issues.push(match duplicate {
            DuplicateId::Reaction(id) => Issue::DuplicateReaction(id.clone()),
            DuplicateId::Metabolite(id) => Issue::DuplicateMetabolite(id.clone()),
        });
    }

    for rxn in model.reactions.values() {
        if rxn.metabolites.is_empty() {
            issues.push(Issue::EmptyStoichiometry(rxn.id.clone()));
        }
        match (rxn.lower_bound, rxn.upper_bound) {
            (Some(lower), Some(upper)) => {
                if lower > upper {
                    issues.push(Issue::InvertedBounds {
                        reaction: rxn.id.clone(),
                        lower,
                        upper,
                    });
                }
            }
            (lower, upper) => issues.push(Issue::MissingBounds {
                reaction: rxn.id.clone(),
                missing_lower: lower.is_none(),
                missing_upper: upper.is_none(),
            }),
        }
        for met in rxn.metabolites.keys() {
            if !model.metabolites.contains_key(met) {
                issues.push(Issue::UnknownMetabolite {
                    reaction: rxn.id.clone(),
                    metabolite: met.clone(),
                });
            }
        }
    }

    if !model.has_objective() {
        issues.push(Issue::MissingObjective);
    }
    for rxn_id in model.objective.keys() {
        if !model.reactions.contains_key(rxn_id) {
            issues.push(Issue::ObjectiveUnknownReaction(rxn_id.clone()));
        }
    }

    for met in model.metabolites.values() {
        if met.compartment.as_deref().map_or(true, |c| c.trim().is_empty()) {
            issues.push(Issue::MissingCompartment(met.id.clone()));
        }
    }

    issues
}

#[cfg(test)]
mod validation_tests {
    use super::*;
    use crate::metabolic_model::reaction::ReactionBuilder;
    use crate::test_utils::{cross_feeder_model, degrader_model};

    #[test]
    fn valid_models_have_no_issues() {
        assert!(degrader_model().validate().is_empty());
        assert!(cross_feeder_model().validate().is_empty());
    }

    #[test]
    fn reports_each_defect() {
        let mut model = degrader_model();
        model.add_reaction(ReactionBuilder::default().id("EMPTY").build().unwrap());
        model.reactions["DBPt"].lower_bound = Some(10.);
        model.reactions["DBPt"].upper_bound = Some(0.);
        model.reactions["GLCt"]
            .metabolites
            .insert("mystery_c".to_string(), 1.);
        model.metabolites["bp_c"].compartment = None;
        model.objective.clear();
        model.objective.insert("NOPE".to_string(), 1.);
        model.record_duplicate(DuplicateId::Reaction("ACt".to_string()));

        let issues = model.validate();
        assert!(issues.contains(&Issue::DuplicateReaction("ACt".to_string())));
        assert!(issues.contains(&Issue::EmptyStoichiometry("EMPTY".to_string())));
        assert!(issues.contains(&Issue::MissingBounds {
            reaction: "EMPTY".to_string(),
            missing_lower: true,
            missing_upper: true
        }));
        assert!(issues.contains(&Issue::InvertedBounds {
            reaction: "DBPt".to_string(),
            lower: 10.,
            upper: 0.
        }));
        assert!(issues.contains(&Issue::UnknownMetabolite {
            reaction: "GLCt".to_string(),
            metabolite: "mystery_c".to_string()
        }));
        assert!(issues.contains(&Issue::MissingObjective));
        assert!(issues.contains(&Issue::ObjectiveUnknownReaction("NOPE".to_string())));
        assert!(issues.contains(&Issue::MissingCompartment("bp_c".to_string())));
        assert_eq!(
            Issue::MissingCompartment("bp_c".to_string()).severity(),
            IssueSeverity::Warning
        );
    }

    #[test]
    fn empty_model() {
        let issues = Model::new_empty().validate();
        assert_eq!(issues, vec![Issue::EmptyModel, Issue::MissingObjective]);
    }
}
