//! Candidate species, their scores, and the search for the best consortium
//!
//! Species enter as [`Species`] records carrying the numbers external providers supply:
//! kcat values, enzyme counts, environmental tolerances and optionally a metabolic profile.
//! [`scoring`] turns them into single species scores and consortium scores, [`search`]
//! ranks candidate subsets.
pub mod environment;
pub mod interaction;
pub mod profile;
pub mod scoring;
pub mod search;

use derive_builder::Builder;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consortium::environment::EnvironmentTolerance;
use crate::consortium::profile::MetabolicProfile;

/// Whether a species carries the degradation pathway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Degrades the target pollutant
    Functional,
    /// Supports the functional species
    Complementary,
}

/// A candidate species and everything known about it
#[derive(Builder, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[builder(setter(into))]
pub struct Species {
    pub id: String,
    pub role: Role,
    /// Highest kcat of the species' degradation enzymes, 1/s
    #[builder(default = "None")]
    #[serde(default)]
    pub kcat_max: Option<f64>,
    /// Number of distinct degradation enzymes
    #[builder(default = "None")]
    #[serde(default)]
    pub enzyme_diversity: Option<f64>,
    #[builder(default)]
    #[serde(default)]
    pub environment: EnvironmentTolerance,
    #[builder(default = "None")]
    #[serde(default)]
    pub profile: Option<MetabolicProfile>,
}

/// kcat values per enzyme as reported by a kinetics provider
///
/// Enzyme names are matched case insensitively, an enzyme reported more than once takes the
/// median of its values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KcatTable {
    values: IndexMap<String, f64>,
}

fn enzyme_key(enzyme: &str) -> String {
    enzyme.trim().to_lowercase()
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.
    } else {
        values[mid]
    }
}

impl KcatTable {
    pub fn new<S: AsRef<str>>(entries: &[(S, f64)]) -> Self {
        let mut grouped: IndexMap<String, Vec<f64>> = IndexMap::new();
        for (enzyme, kcat) in entries {
            if kcat.is_finite() {
                grouped.entry(enzyme_key(enzyme.as_ref())).or_default().push(*kcat);
            }
        }
        let values = grouped
            .into_iter()
            .map(|(enzyme, mut kcats)| (enzyme, median(&mut kcats)))
            .collect();
        KcatTable { values }
    }

    pub fn get(&self, enzyme: &str) -> Option<f64> {
        self.values.get(&enzyme_key(enzyme)).copied()
    }

    /// Highest known kcat among `enzymes` and the number of distinct enzymes
    pub fn summarize<S: AsRef<str>>(&self, enzymes: &[S]) -> (Option<f64>, f64) {
        let distinct: indexmap::IndexSet<String> =
            enzymes.iter().map(|e| enzyme_key(e.as_ref())).filter(|e| !e.is_empty()).collect();
        let kcat_max = distinct
            .iter()
            .filter_map(|e| self.values.get(e).copied())
            .reduce(f64::max);
        (kcat_max, distinct.len() as f64)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoringError {
    #[error("No species to score")]
    EmptyPool,
    #[error("Species {0} appears more than once")]
    DuplicateSpecies(String),
    #[error("Species {0} is not in the scored pool")]
    UnknownSpecies(String),
    #[error("Subset sizes {kmin}..={kmax} are invalid")]
    InvalidSubsetSize { kmin: usize, kmax: usize },
    #[error("Pool of {pool} species is smaller than the minimum subset size {kmin}")]
    PoolTooSmall { pool: usize, kmin: usize },
    #[error("Exhaustive search would score {count} subsets, more than the cap of {cap}")]
    TooManySubsets { count: usize, cap: usize },
}
