//! Pairwise competition and complementarity between species
use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::consortium::profile::MetabolicProfile;

/// Where an interaction row came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionSource {
    /// Supplied by an external complementarity provider
    Provided,
    /// Computed from seed and production sets
    Computed,
}

/// Interaction indices of one species pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRow {
    pub species_a: String,
    pub species_b: String,
    pub competition: f64,
    pub complementarity: f64,
    pub delta: f64,
    pub source: InteractionSource,
}

impl InteractionRow {
    pub fn new(species_a: &str, species_b: &str, competition: f64, complementarity: f64, source: InteractionSource) -> Self {
        InteractionRow {
            species_a: species_a.to_string(),
            species_b: species_b.to_string(),
            competition,
            complementarity,
            delta: complementarity - competition,
            source,
        }
    }

    /// Compute the row from two profiles
    pub fn compute(species_a: &str, a: &MetabolicProfile, species_b: &str, b: &MetabolicProfile) -> Self {
        InteractionRow::new(
            species_a,
            species_b,
            competition(a, b),
            complementarity(a, b),
            InteractionSource::Computed,
        )
    }
}

/// Jaccard overlap of the seed sets, 0 when both are empty
pub fn competition(a: &MetabolicProfile, b: &MetabolicProfile) -> f64 {
    let union = a.seeds.union(&b.seeds).count();
    if union == 0 {
        return 0.;
    }
    a.seeds.intersection(&b.seeds).count() as f64 / union as f64
}

/// Share of both species' productions which the partner doesn't have to take up itself
///
/// `NonSeed(X)` is every compound outside `Seed(X)`, so `Production(A) ∩ NonSeed(B)` is
/// `Production(A) \ Seed(B)`. 0 when neither species produces anything.
pub fn complementarity(a: &MetabolicProfile, b: &MetabolicProfile) -> f64 {
    let total = a.productions.len() + b.productions.len();
    if total == 0 {
        return 0.;
    }
    let a_to_b = a.productions.difference(&b.seeds).count();
    let b_to_a = b.productions.difference(&a.seeds).count();
    (a_to_b + b_to_a) as f64 / total as f64
}

fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Symmetric pair lookup
///
/// Provided rows take precedence over computed ones. A pair provided more than once has its
/// indices averaged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InteractionLookup {
    rows: IndexMap<(String, String), InteractionRow>,
}

impl InteractionLookup {
    pub fn new() -> Self {
        InteractionLookup::default()
    }

    /// Build the lookup from externally supplied rows
    pub fn from_provided(rows: &[InteractionRow]) -> Self {
        let mut grouped: IndexMap<(String, String), Vec<&InteractionRow>> = IndexMap::new();
        for row in rows {
            grouped
                .entry(pair_key(&row.species_a, &row.species_b))
                .or_default()
                .push(row);
        }
        let rows = grouped
            .into_iter()
            .map(|(key, group)| {
                let n = group.len() as f64;
                let competition = group.iter().map(|r| r.competition).sum::<f64>() / n;
                let complementarity = group.iter().map(|r| r.complementarity).sum::<f64>() / n;
                let delta = group.iter().map(|r| r.delta).sum::<f64>() / n;
                let first = group[0];
                let row = InteractionRow {
                    species_a: first.species_a.clone(),
                    species_b: first.species_b.clone(),
                    competition,
                    complementarity,
                    delta,
                    source: InteractionSource::Provided,
                };
                (key, row)
            })
            .collect();
        InteractionLookup { rows }
    }

    /// Compute every pair of `profiles` not already in the lookup
    pub fn fill_computed<'a, I>(&mut self, profiles: I)
    where
        I: IntoIterator<Item = (&'a str, &'a MetabolicProfile)>,
    {
        let profiles: Vec<(&str, &MetabolicProfile)> = profiles.into_iter().collect();
        for (i, (a, profile_a)) in profiles.iter().enumerate() {
            for (b, profile_b) in &profiles[i + 1..] {
                let key = pair_key(a, b);
                if !self.rows.contains_key(&key) {
                    self.rows
                        .insert(key, InteractionRow::compute(a, profile_a, b, profile_b));
                }
            }
        }
    }

    /// Interaction of a pair, in either order
    pub fn get(&self, a: &str, b: &str) -> Option<&InteractionRow> {
        self.rows.get(&pair_key(a, b))
    }

    pub fn rows(&self) -> impl Iterator<Item = &InteractionRow> {
        self.rows.values()
    }

    /// Rows between members of `members`
    pub fn rows_for(&self, members: &[&str]) -> Vec<InteractionRow> {
        let wanted: BTreeSet<&str> = members.iter().copied().collect();
        self.rows
            .values()
            .filter(|row| wanted.contains(row.species_a.as_str()) && wanted.contains(row.species_b.as_str()))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
