//! Greedy and exhaustive search over candidate consortia
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};

use indexmap::IndexMap;
use itertools::Itertools;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::configuration::{ScoringWeights, SearchConfig, SearchMode};
use crate::consortium::interaction::InteractionLookup;
use crate::consortium::scoring::{rank_order, score_consortium, ConsortiumScore, SpeciesScore};
use crate::consortium::{Role, ScoringError};

/// Ranked consortia and search statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    /// Best consortia first, at most `top_k`
    pub ranked: Vec<ConsortiumScore>,
    /// Number of subsets scored
    pub evaluated: usize,
    /// Species which entered the search, best single species score first
    pub pool: Vec<String>,
    /// Whether an exhaustive search stopped before enumerating every subset
    pub stopped_early: bool,
}

fn has_functional(members: &[&SpeciesScore]) -> bool {
    members.iter().any(|m| m.role == Role::Functional)
}

/// Number of subsets with a size in `kmin..=kmax` drawn from `n` species
///
/// Saturates at `usize::MAX` when the count doesn't fit.
pub fn subset_count(n: usize, kmin: usize, kmax: usize) -> usize {
    (kmin..=kmax.min(n))
        .map(|k| {
            // acc is C(n, i) at every step, so the division is exact
            (0..k)
                .try_fold(1usize, |acc, i| Some(acc.checked_mul(n - i)? / (i + 1)))
                .unwrap_or(usize::MAX)
        })
        .fold(0usize, |acc, c| acc.saturating_add(c))
}

/// Species entering the search: those passing the environmental filter, best `top_n` by
/// single species score
fn search_pool<'a>(scores: &'a [SpeciesScore], config: &SearchConfig) -> Vec<&'a SpeciesScore> {
    let mut pool: Vec<&SpeciesScore> = scores
        .iter()
        .filter(|s| {
            if !s.pass_filter {
                warn!(species = %s.species, "excluded by environmental filter");
            }
            s.pass_filter
        })
        .collect();
    pool.sort_by(|a, b| b.s_microbe.total_cmp(&a.s_microbe));
    pool.truncate(config.top_n);
    pool
}

/// Rank candidate consortia drawn from `scores`
pub fn search(
    scores: &[SpeciesScore],
    lookup: &InteractionLookup,
    config: &SearchConfig,
    weights: &ScoringWeights,
) -> Result<SearchOutcome, ScoringError> {
    search_with_cancel(scores, lookup, config, weights, &AtomicBool::new(false))
}

/// [`search`] which returns what it has found so far once `cancel` is set
pub fn search_with_cancel(
    scores: &[SpeciesScore],
    lookup: &InteractionLookup,
    config: &SearchConfig,
    weights: &ScoringWeights,
    cancel: &AtomicBool,
) -> Result<SearchOutcome, ScoringError> {
    if config.kmin == 0 || config.kmin > config.kmax {
        return Err(ScoringError::InvalidSubsetSize {
            kmin: config.kmin,
            kmax: config.kmax,
        });
    }
    let pool = search_pool(scores, config);
    if pool.len() < config.kmin {
        return Err(ScoringError::PoolTooSmall {
            pool: pool.len(),
            kmin: config.kmin,
        });
    }
    let (mut ranked, evaluated, stopped_early) = match config.mode {
        SearchMode::Greedy => {
            let (ranked, evaluated) = greedy(&pool, lookup, config, weights);
            (ranked, evaluated, false)
        }
        SearchMode::Exhaustive => exhaustive(&pool, lookup, config, weights, cancel)?,
    };
    ranked.sort_by(rank_order);
    ranked.truncate(config.top_k);
    info!(
        mode = ?config.mode,
        pool = pool.len(),
        evaluated,
        stopped_early,
        best = ?ranked.first().map(|c| c.s_consort),
        "consortium search finished"
    );
    Ok(SearchOutcome {
        ranked,
        evaluated,
        pool: pool.iter().map(|s| s.species.clone()).collect(),
        stopped_early,
    })
}

/// Multi start greedy search
///
/// From every species in turn, repeatedly add the member giving the best score. Once the
/// consortium has `kmin` members, growth stops as soon as no addition improves the score.
/// Every distinct consortium reached with a size in range is a candidate.
fn greedy(
    pool: &[&SpeciesScore],
    lookup: &InteractionLookup,
    config: &SearchConfig,
    weights: &ScoringWeights,
) -> (Vec<ConsortiumScore>, usize) {
    let allowed = |members: &[&SpeciesScore]| !config.require_functional || has_functional(members);
    let mut candidates: IndexMap<BTreeSet<String>, ConsortiumScore> = IndexMap::new();
    let mut evaluated = 0;
    let mut record = |score: ConsortiumScore| {
        let key: BTreeSet<String> = score.members.iter().cloned().collect();
        candidates.entry(key).or_insert(score);
    };

    for start in pool {
        let mut current = vec![*start];
        let mut current_score = None;
        if config.kmin <= 1 && allowed(&current) {
            let score = score_consortium(&current, lookup, weights);
            evaluated += 1;
            current_score = Some(score.s_consort);
            record(score);
        }
        while current.len() < config.kmax {
            let mut best: Option<(ConsortiumScore, &SpeciesScore)> = None;
            for candidate in pool.iter().filter(|s| !current.iter().any(|c| c.species == s.species)) {
                let mut trial = current.clone();
                trial.push(*candidate);
                if !allowed(&trial) {
                    continue;
                }
                let score = score_consortium(&trial, lookup, weights);
                evaluated += 1;
                if best
                    .as_ref()
                    .map_or(true, |(b, _)| score.s_consort > b.s_consort)
                {
                    best = Some((score, *candidate));
                }
            }
            let Some((score, next)) = best else {
                break;
            };
            if current.len() >= config.kmin && current_score.is_some_and(|s| score.s_consort <= s) {
                break;
            }
            current.push(next);
            current_score = Some(score.s_consort);
            if current.len() >= config.kmin {
                record(score);
            }
        }
    }
    debug!(candidates = candidates.len(), evaluated, "greedy search");
    (candidates.into_values().collect(), evaluated)
}

/// Score every allowed subset with a size in range, in parallel
fn exhaustive(
    pool: &[&SpeciesScore],
    lookup: &InteractionLookup,
    config: &SearchConfig,
    weights: &ScoringWeights,
    cancel: &AtomicBool,
) -> Result<(Vec<ConsortiumScore>, usize, bool), ScoringError> {
    let count = subset_count(pool.len(), config.kmin, config.kmax);
    if count > config.hard_cap {
        return Err(ScoringError::TooManySubsets {
            count,
            cap: config.hard_cap,
        });
    }
    let early_stop = AtomicBool::new(false);
    let evaluated = AtomicUsize::new(0);
    let stop = || cancel.load(AtomicOrdering::Relaxed) || early_stop.load(AtomicOrdering::Relaxed);

    let mut ranked = Vec::new();
    for k in config.kmin..=config.kmax.min(pool.len()) {
        if stop() {
            break;
        }
        let scored: Vec<ConsortiumScore> = pool
            .iter()
            .copied()
            .combinations(k)
            .par_bridge()
            .filter_map(|members| {
                if stop() {
                    return None;
                }
                if config.require_functional && !has_functional(&members) {
                    return None;
                }
                let score = score_consortium(&members, lookup, weights);
                evaluated.fetch_add(1, AtomicOrdering::Relaxed);
                if k == config.kmax
                    && config
                        .early_stop_score
                        .is_some_and(|target| score.s_consort >= target)
                {
                    early_stop.store(true, AtomicOrdering::Relaxed);
                }
                Some(score)
            })
            .collect();
        ranked.extend(scored);
    }
    let stopped_early = stop();
    if stopped_early {
        debug!("exhaustive search stopped early");
    }
    Ok((ranked, evaluated.into_inner(), stopped_early))
}

#[cfg(test)]
mod search_tests {
    use super::*;
    use crate::configuration::{EnvironmentWeights, MicrobeWeights};
    use crate::consortium::scoring::score_species;
    use crate::test_utils::{provided_lookup, species_pool, tolerant_site};

    fn scores() -> Vec<SpeciesScore> {
        score_species(
            &species_pool(),
            &tolerant_site(),
            &MicrobeWeights::default(),
            &EnvironmentWeights::default(),
        )
        .unwrap()
    }

    fn pairs_only(mode: SearchMode) -> SearchConfig {
        SearchConfig {
            mode,
            kmin: 2,
            kmax: 2,
            require_functional: false,
            ..SearchConfig::default()
        }
    }

    #[test]
    fn exhaustive_pairs() {
        let outcome = search(
            &scores(),
            &provided_lookup(),
            &pairs_only(SearchMode::Exhaustive),
            &ScoringWeights::default(),
        )
        .unwrap();
        assert_eq!(outcome.evaluated, 3);
        assert_eq!(outcome.ranked.len(), 3);
        assert!(!outcome.stopped_early);
        for pair in outcome.ranked.windows(2) {
            assert!(pair[0].s_consort >= pair[1].s_consort);
        }
        let mut sets: Vec<Vec<String>> = outcome
            .ranked
            .iter()
            .map(|c| c.members.iter().cloned().sorted().collect())
            .collect();
        sets.sort();
        assert_eq!(
            sets,
            vec![
                vec!["A".to_string(), "B".to_string()],
                vec!["A".to_string(), "C".to_string()],
                vec!["B".to_string(), "C".to_string()],
            ]
        );
        // A carries the high kcat and pairs well with C
        assert_eq!(outcome.ranked[0].members, vec!["A".to_string(), "C".to_string()]);
    }

    #[test]
    fn functional_member_required() {
        let config = SearchConfig {
            require_functional: true,
            ..pairs_only(SearchMode::Exhaustive)
        };
        let mut scores = scores();
        scores[1].role = Role::Complementary;
        let outcome = search(&scores, &provided_lookup(), &config, &ScoringWeights::default()).unwrap();
        // B and C are both helpers now
        assert_eq!(outcome.evaluated, 2);
        assert!(outcome
            .ranked
            .iter()
            .all(|c| c.members.contains(&"A".to_string())));
    }

    #[test]
    fn greedy_finds_the_best_pair() {
        let outcome = search(
            &scores(),
            &provided_lookup(),
            &pairs_only(SearchMode::Greedy),
            &ScoringWeights::default(),
        )
        .unwrap();
        let mut members = outcome.ranked[0].members.clone();
        members.sort();
        assert_eq!(members, vec!["A".to_string(), "C".to_string()]);
        assert!(outcome.ranked.len() <= 3);
    }

    #[test]
    fn greedy_stops_without_improvement() {
        let config = SearchConfig {
            kmin: 1,
            kmax: 3,
            ..pairs_only(SearchMode::Greedy)
        };
        let weights = ScoringWeights {
            mu: 0.2,
            ..ScoringWeights::default()
        };
        let outcome = search(&scores(), &provided_lookup(), &config, &weights).unwrap();
        // With a steep size penalty no start grows into a triple
        assert!(outcome.ranked.iter().all(|c| c.size < 3));
        assert_eq!(outcome.ranked[0].members, vec!["A".to_string()]);
    }

    #[test]
    fn limits_and_cancellation() {
        let weights = ScoringWeights::default();
        let capped = SearchConfig {
            hard_cap: 2,
            ..pairs_only(SearchMode::Exhaustive)
        };
        assert_eq!(
            search(&scores(), &provided_lookup(), &capped, &weights),
            Err(ScoringError::TooManySubsets { count: 3, cap: 2 })
        );
        let inverted = SearchConfig {
            kmin: 3,
            kmax: 2,
            ..SearchConfig::default()
        };
        assert!(matches!(
            search(&scores(), &provided_lookup(), &inverted, &weights),
            Err(ScoringError::InvalidSubsetSize { .. })
        ));

        let cancelled = AtomicBool::new(true);
        let outcome = search_with_cancel(
            &scores(),
            &provided_lookup(),
            &pairs_only(SearchMode::Exhaustive),
            &weights,
            &cancelled,
        )
        .unwrap();
        assert!(outcome.stopped_early);
        assert_eq!(outcome.evaluated, 0);

        let early = SearchConfig {
            early_stop_score: Some(f64::NEG_INFINITY),
            kmin: 1,
            ..pairs_only(SearchMode::Exhaustive)
        };
        let outcome = search(&scores(), &provided_lookup(), &early, &weights).unwrap();
        assert!(outcome.stopped_early);
        assert!(outcome.evaluated >= 4);
    }

    #[test]
    fn huge_search_space_hits_the_cap() {
        let template = scores().into_iter().find(|s| s.pass_filter).unwrap();
        let pool: Vec<SpeciesScore> = (0..200)
            .map(|i| SpeciesScore {
                species: format!("S{}", i),
                ..template.clone()
            })
            .collect();
        let config = SearchConfig {
            mode: SearchMode::Exhaustive,
            kmin: 2,
            kmax: 60,
            top_n: 200,
            require_functional: false,
            hard_cap: usize::MAX - 1,
            early_stop_score: None,
            ..SearchConfig::default()
        };
        assert_eq!(
            search(&pool, &provided_lookup(), &config, &ScoringWeights::default()),
            Err(ScoringError::TooManySubsets {
                count: usize::MAX,
                cap: usize::MAX - 1
            })
        );
    }

    #[test]
    fn counting_subsets() {
        assert_eq!(subset_count(3, 2, 2), 3);
        assert_eq!(subset_count(5, 1, 5), 31);
        assert_eq!(subset_count(2, 3, 4), 0);
        assert_eq!(subset_count(60, 30, 30), 118_264_581_564_861_424);
    }

    #[test]
    fn large_pools_saturate_subset_count() {
        assert_eq!(subset_count(200, 2, 60), usize::MAX);
        assert_eq!(subset_count(200, 60, 60), usize::MAX);
        // Counts past the first overflowing size still saturate
        assert_eq!(subset_count(300, 1, 300), usize::MAX);
    }
}
