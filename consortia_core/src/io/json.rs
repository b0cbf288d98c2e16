//! Module providing JSON IO for Models (COBRA json layout)
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::metabolic_model::metabolite::Metabolite;
use crate::metabolic_model::model::{DuplicateId, Model};
use crate::metabolic_model::reaction::{Reaction, ReactionBuilder, ReactionBuilderError};

// region JSON Model
/// Represents a JSON serialized model, used for reading and writing models in json format
#[derive(Serialize, Deserialize)]
struct JsonModel {
    metabolites: Vec<JsonMetabolite>,
    reactions: Vec<JsonReaction>,
    #[serde(default, skip_serializing)]
    genes: Vec<Value>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    compartments: Option<IndexMap<String, String>>,
    #[serde(default)]
    version: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct JsonMetabolite {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    compartment: Option<String>,
    #[serde(default)]
    charge: Option<i32>,
    #[serde(default)]
    formula: Option<String>,
    #[serde(default)]
    notes: Option<Value>,
    #[serde(default)]
    annotation: Option<Value>,
}

#[derive(Serialize, Deserialize)]
struct JsonReaction {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    metabolites: IndexMap<String, f64>,
    #[serde(default)]
    lower_bound: Option<f64>,
    #[serde(default)]
    upper_bound: Option<f64>,
    #[serde(default)]
    gene_reaction_rule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    objective_coefficient: Option<f64>,
    #[serde(default)]
    subsystem: Option<String>,
    #[serde(default)]
    notes: Option<Value>,
    #[serde(default)]
    annotation: Option<Value>,
}
// endregion JSON Model

// region Conversions
/// Free form json is kept as its string representation
fn value_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Inverse of [`value_to_string`]
fn string_to_value(s: &str) -> Value {
    serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.to_string()))
}

impl From<JsonMetabolite> for Metabolite {
    fn from(m: JsonMetabolite) -> Self {
        Self {
            id: m.id,
            name: m.name,
            compartment: m.compartment,
            charge: m.charge.unwrap_or_default(),
            formula: m.formula,
            notes: m.notes.map(value_to_string),
            annotation: m.annotation.map(value_to_string),
        }
    }
}

impl From<&Metabolite> for JsonMetabolite {
    fn from(m: &Metabolite) -> Self {
        Self {
            id: m.id.clone(),
            name: m.name.clone(),
            compartment: m.compartment.clone(),
            charge: Some(m.charge),
            formula: m.formula.clone(),
            notes: m.notes.as_deref().map(string_to_value),
            annotation: m.annotation.as_deref().map(string_to_value),
        }
    }
}

impl Model {
    /// Read a model from a COBRA json file
    ///
    /// Identifiers which appear more than once are recorded and reported by
    /// [`Model::validate`], the last occurrence wins.
    pub fn read_json<P: AsRef<Path>>(path: P) -> Result<Model, ModelParseError> {
        let path = path.as_ref();
        let model_str = fs::read_to_string(path).map_err(|err| {
            ModelParseError::UnableToRead(format!("{}: {}", path.display(), err))
        })?;
        Model::from_json_str(&model_str)
    }

    /// Parse a model from a COBRA json string
    pub fn from_json_str(model_str: &str) -> Result<Model, ModelParseError> {
        let json_model = serde_json::from_str::<JsonModel>(model_str)
            .map_err(|err| ModelParseError::UnableToParse(err.to_string()))?;
        Model::from_json(json_model)
    }

    /// Write the model to a COBRA json file
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<(), ModelParseError> {
        let model_string = self.to_json_string()?;
        fs::write(path, model_string)?;
        Ok(())
    }

    /// Serialize the model to a COBRA json string
    pub fn to_json_string(&self) -> Result<String, ModelParseError> {
        Ok(serde_json::to_string_pretty(&self.to_json())?)
    }

    fn from_json(json_model: JsonModel) -> Result<Self, ModelParseError> {
        let mut model = Model::new_empty();
        model.id = json_model.id;
        model.compartments = json_model.compartments;
        model.version = json_model.version;

        for met in json_model.metabolites {
            if model.metabolites.contains_key(&met.id) {
                model.record_duplicate(DuplicateId::Metabolite(met.id.clone()));
            }
            model.add_metabolite(Metabolite::from(met));
        }
        for rxn in json_model.reactions {
            if let Some(coef) = rxn.objective_coefficient {
                if coef != 0. {
                    model.objective.insert(rxn.id.clone(), coef);
                }
            }
            let new_reaction: Reaction = ReactionBuilder::default()
                .id(rxn.id.clone())
                .metabolites(rxn.metabolites)
                .name(rxn.name)
                .lower_bound(rxn.lower_bound)
                .upper_bound(rxn.upper_bound)
                .subsystem(rxn.subsystem)
                .gene_reaction_rule(rxn.gene_reaction_rule.filter(|r| !r.is_empty()))
                .notes(rxn.notes.map(value_to_string))
                .annotation(rxn.annotation.map(value_to_string))
                .build()?;
            if model.add_reaction(new_reaction).is_some() {
                model.record_duplicate(DuplicateId::Reaction(rxn.id));
            }
        }
        Ok(model)
    }

    fn to_json(&self) -> JsonModel {
        let metabolites = self.metabolites.values().map(JsonMetabolite::from).collect();
        let reactions = self
            .reactions
            .values()
            .map(|r| JsonReaction {
                id: r.id.clone(),
                name: r.name.clone(),
                metabolites: r.metabolites.clone(),
                lower_bound: r.lower_bound,
                upper_bound: r.upper_bound,
                gene_reaction_rule: Some(r.gene_reaction_rule.clone().unwrap_or_default()),
                objective_coefficient: self.objective.get(&r.id).copied(),
                subsystem: r.subsystem.clone(),
                notes: r.notes.as_deref().map(string_to_value),
                annotation: r.annotation.as_deref().map(string_to_value),
            })
            .collect();
        JsonModel {
            metabolites,
            reactions,
            genes: Vec::new(),
            id: self.id.clone(),
            compartments: self.compartments.clone(),
            version: self.version.clone(),
        }
    }
}

/// A model file couldn't be read or written
#[derive(Error, Debug)]
pub enum ModelParseError {
    #[error("Unable to read model file {0}")]
    UnableToRead(String),
    #[error("Unable to parse json model: {0}")]
    UnableToParse(String),
    #[error("Unable to build reaction")]
    UnableToBuildReaction(#[from] ReactionBuilderError),
    #[error("Serde json error")]
    SerdeJsonError(#[from] serde_json::Error),
    #[error("Unable to write to file")]
    UnableToWrite(#[from] std::io::Error),
}

// endregion Conversions
