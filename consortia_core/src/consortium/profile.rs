//! Seed and production sets of a species
//!
//! Seeds are the external compounds a species has to take up, productions the external
//! compounds it makes and can release. Both are kept as compartment free base names so the
//! sets of different models can be compared.
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::configuration::Configuration;
use crate::metabolic_model::metabolite::split_compartment_suffix;
use crate::metabolic_model::model::Model;
use crate::optimize::fba::{optimize_model, FbaError};
use crate::optimize::objective::ObjectiveSense;

/// Seed and production sets of one species
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetabolicProfile {
    pub seeds: BTreeSet<String>,
    pub productions: BTreeSet<String>,
}

fn base_name(metabolite_id: &str) -> String {
    split_compartment_suffix(metabolite_id).0.to_string()
}

impl MetabolicProfile {
    pub fn new<S: AsRef<str>>(seeds: &[S], productions: &[S]) -> Self {
        MetabolicProfile {
            seeds: seeds.iter().map(|s| s.as_ref().to_string()).collect(),
            productions: productions.iter().map(|s| s.as_ref().to_string()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty() && self.productions.is_empty()
    }

    /// Derive the profile from a model's structure
    ///
    /// A seed is an extracellular metabolite whose exchange allows uptake and which some
    /// internal reaction consumes. A production is an extracellular metabolite some internal
    /// reaction produces and whose exchange allows release.
    pub fn from_model(model: &Model, config: &Configuration) -> Self {
        let mut profile = MetabolicProfile::default();
        for met in model.extracellular_metabolites() {
            let Some(exchange) = model.exchange_for(met) else {
                continue;
            };
            let coef = exchange.metabolites[met];
            let (lower, upper) = (
                exchange.lower_bound_or(config.lower_bound),
                exchange.upper_bound_or(config.upper_bound),
            );
            // Flux v moves coef * v of the metabolite into the extracellular compartment
            let (max_in, max_out) = if coef < 0. {
                (-lower, upper)
            } else {
                (upper, -lower)
            };
            let internal = model
                .reactions
                .values()
                .filter(|rxn| rxn.id != exchange.id)
                .filter_map(|rxn| rxn.metabolites.get(met).map(|c| (rxn, *c)));
            let mut consumed = false;
            let mut produced = false;
            for (rxn, c) in internal {
                let (lo, hi) = (rxn.lower_bound_or(config.lower_bound), rxn.upper_bound_or(config.upper_bound));
                // A reaction can remove the metabolite if c * v < 0 for some allowed v
                consumed |= (c < 0. && hi > 0.) || (c > 0. && lo < 0.);
                produced |= (c > 0. && hi > 0.) || (c < 0. && lo < 0.);
            }
            if consumed && max_in > 0. {
                profile.seeds.insert(base_name(met));
            }
            if produced && max_out > 0. {
                profile.productions.insert(base_name(met));
            }
        }
        profile
    }

    /// Keep only the seeds whose uptake the model can't grow without
    ///
    /// Each seed's exchange is closed for uptake in turn and the model re-optimized. A seed is
    /// essential if growth drops below `min_growth` or the model becomes infeasible.
    pub fn essential_seeds(
        &self,
        model: &Model,
        min_growth: f64,
        config: &Configuration,
    ) -> Result<MetabolicProfile, FbaError> {
        let strategy = config.strategy();
        let mut essential = BTreeSet::new();
        for seed in &self.seeds {
            let mut blocked = model.clone();
            let exchanges: Vec<String> = blocked
                .exchanges()
                .filter(|rxn| rxn.metabolites.keys().any(|met| base_name(met) == *seed))
                .map(|rxn| rxn.id.clone())
                .collect();
            for id in exchanges {
                if let Some(rxn) = blocked.reactions.get_mut(&id) {
                    let coef = rxn.metabolites.values().next().copied().unwrap_or(-1.);
                    if coef < 0. {
                        rxn.lower_bound = Some(0.);
                    } else {
                        rxn.upper_bound = Some(0.);
                    }
                }
            }
            let growth = match optimize_model(&blocked, ObjectiveSense::Maximize, &strategy, config) {
                Ok(solution) => solution.objective_value,
                Err(FbaError::Infeasible) => 0.,
                Err(err) => return Err(err),
            };
            debug!(seed = %seed, growth, "seed blocked");
            if growth < min_growth {
                essential.insert(seed.clone());
            }
        }
        Ok(MetabolicProfile {
            seeds: essential,
            productions: self.productions.clone(),
        })
    }
}

#[cfg(test)]
mod profile_tests {
    use super::*;
    use crate::test_utils::{cross_feeder_model, degrader_model};

    #[test]
    fn degrader_profile() {
        let profile = MetabolicProfile::from_model(&degrader_model(), &Configuration::default());
        assert_eq!(profile, MetabolicProfile::new(&["dbp", "glc"], &["ac"]));
    }

    #[test]
    fn cross_feeder_profile() {
        let profile = MetabolicProfile::from_model(&cross_feeder_model(), &Configuration::default());
        assert_eq!(profile.seeds, BTreeSet::from(["ac".to_string(), "glc".to_string()]));
        assert!(profile.productions.is_empty());
    }

    #[test]
    fn essential_seed_refinement() {
        let mut model = degrader_model();
        // Glucose becomes optional
        model.reactions["BIOMASS_A"].metabolites.shift_remove("glc_c");
        let config = Configuration::default();
        let profile = MetabolicProfile::from_model(&model, &config);
        let essential = profile.essential_seeds(&model, 1e-6, &config).unwrap();
        assert_eq!(essential.seeds, BTreeSet::from(["dbp".to_string()]));
        assert_eq!(essential.productions, profile.productions);
    }
}
