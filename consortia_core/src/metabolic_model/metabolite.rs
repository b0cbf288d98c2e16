//! This module provides the metabolite struct representing a metabolite

use std::hash::Hash;

use derive_builder::Builder;

/// Compartment tag used for the shared extracellular space
pub const EXTRACELLULAR: &str = "e";
/// Compartment assigned to metabolites which don't declare one
pub const DEFAULT_COMPARTMENT: &str = "c";
/// Compartment suffixes recognized when inferring a compartment from an id
pub const KNOWN_COMPARTMENT_SUFFIXES: [&str; 4] = ["c", "e", "p", "m"];
/// Alternate spellings of the extracellular compartment found in model files
pub const EXTRACELLULAR_SYNONYMS: [&str; 4] = ["C_e", "ext", "external", "extracellular"];

/// Represents a metabolite
#[derive(Builder, Debug, Clone, PartialEq)]
#[builder(setter(into))]
pub struct Metabolite {
    /// Used to identify the metabolite (must be unique)
    pub id: String,
    /// Human Readable name of the metabolite
    #[builder(default = "None")]
    pub name: Option<String>,
    /// Which compartment the metabolite is in
    #[builder(default = "None")]
    pub compartment: Option<String>,
    /// Electrical charge of the Metabolite
    #[builder(default = "0")]
    pub charge: i32,
    /// Chemical Formula of the metabolite
    #[builder(default = "None")]
    pub formula: Option<String>,
    /// Notes about the metabolite
    #[builder(default = "None")]
    pub notes: Option<String>,
    /// Metabolite annotations
    #[builder(default = "None")]
    pub annotation: Option<String>,
}

impl Metabolite {
    /// Create a metabolite with only an id and a compartment
    pub fn new(id: &str, compartment: &str) -> Self {
        Metabolite {
            id: id.to_string(),
            name: None,
            compartment: Some(compartment.to_string()),
            charge: 0,
            formula: None,
            notes: None,
            annotation: None,
        }
    }

    /// Whether the metabolite lives in the extracellular compartment
    pub fn is_extracellular(&self) -> bool {
        self.compartment.as_deref() == Some(EXTRACELLULAR)
    }

    /// Id with the compartment suffix removed, used to compare metabolites across
    /// compartments and across organisms
    ///
    /// # Examples
    /// ```rust
    /// use consortia_core::metabolic_model::metabolite::Metabolite;
    /// let glc = Metabolite::new("glc__D_e", "e");
    /// assert_eq!(glc.base_name(), "glc__D");
    /// ```
    pub fn base_name(&self) -> &str {
        if let Some(compartment) = &self.compartment {
            if let Some(stripped) = self
                .id
                .strip_suffix(compartment.as_str())
                .and_then(|s| s.strip_suffix('_'))
            {
                return stripped;
            }
        }
        split_compartment_suffix(&self.id).0
    }
}

impl Hash for Metabolite {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state); // Hash by id
                             // If the metabolite has an associated compartment, also hash by that
        if let Some(ref compartment) = self.compartment {
            compartment.hash(state)
        };
    }
}

/// Split a metabolite id into its base name and a recognized compartment suffix
///
/// Only the suffixes in [`KNOWN_COMPARTMENT_SUFFIXES`] are recognized, so `"nad"` is
/// returned unchanged with no compartment.
pub fn split_compartment_suffix(id: &str) -> (&str, Option<&str>) {
    if let Some((base, suffix)) = id.rsplit_once('_') {
        if !base.is_empty() && KNOWN_COMPARTMENT_SUFFIXES.contains(&suffix) {
            return (base, Some(suffix));
        }
    }
    (id, None)
}

/// Map a compartment tag onto its canonical form, folding extracellular synonyms into `e`
pub fn normalize_compartment(tag: &str) -> String {
    let trimmed = tag.trim();
    if EXTRACELLULAR_SYNONYMS
        .iter()
        .any(|syn| syn.eq_ignore_ascii_case(trimmed))
    {
        EXTRACELLULAR.to_string()
    } else {
        trimmed.to_string()
    }
}
