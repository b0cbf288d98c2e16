//! Single species scores and composite consortium scores
use std::cmp::Ordering;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::configuration::{EnvironmentWeights, MicrobeWeights, ScoringWeights};
use crate::consortium::environment::{assess, SiteConditions};
use crate::consortium::interaction::InteractionLookup;
use crate::consortium::{Role, ScoringError, Species};

/// Single species score with its inputs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeciesScore {
    pub species: String,
    pub role: Role,
    pub kcat_max: Option<f64>,
    pub env_soft_score: f64,
    pub pass_filter: bool,
    pub enzyme_diversity: Option<f64>,
    #[serde(rename = "S_microbe")]
    pub s_microbe: f64,
}

/// Rescale `value` into [0, 1] using the range observed across the pool
///
/// A degenerate range maps positive values to 1 and everything else to 0.
pub fn norm01(value: f64, min: f64, max: f64) -> f64 {
    if (max - min).abs() < f64::EPSILON {
        return if value > 0. { 1. } else { 0. };
    }
    ((value - min) / (max - min)).clamp(0., 1.)
}

fn observed_range(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values.fold(None, |range, v| match range {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

/// Score every species of the pool
///
/// `S_microbe = w_kcat * Norm01(kcat_max) + w_env * env + w_div * Norm01(enzyme_diversity)`.
/// The normalization ranges come from the functional species of this pool. Complementary
/// species only earn the environmental term.
pub fn score_species(
    pool: &[Species],
    site: &SiteConditions,
    microbe: &MicrobeWeights,
    environment: &EnvironmentWeights,
) -> Result<Vec<SpeciesScore>, ScoringError> {
    if pool.is_empty() {
        return Err(ScoringError::EmptyPool);
    }
    let mut seen = indexmap::IndexSet::new();
    for species in pool {
        if !seen.insert(species.id.as_str()) {
            return Err(ScoringError::DuplicateSpecies(species.id.clone()));
        }
    }
    let functional = || pool.iter().filter(|s| s.role == Role::Functional);
    let kcat_range = observed_range(functional().filter_map(|s| s.kcat_max));
    let diversity_range = observed_range(functional().filter_map(|s| s.enzyme_diversity));

    let scores = pool
        .iter()
        .map(|species| {
            let assessment = assess(&species.environment, site, environment);
            let (kcat_term, diversity_term) = match species.role {
                Role::Functional => (
                    species
                        .kcat_max
                        .zip(kcat_range)
                        .map_or(0., |(v, (lo, hi))| norm01(v, lo, hi)),
                    species
                        .enzyme_diversity
                        .zip(diversity_range)
                        .map_or(0., |(v, (lo, hi))| norm01(v, lo, hi)),
                ),
                Role::Complementary => (0., 0.),
            };
            SpeciesScore {
                species: species.id.clone(),
                role: species.role,
                kcat_max: species.kcat_max,
                env_soft_score: assessment.soft_score,
                pass_filter: assessment.pass_filter,
                enzyme_diversity: species.enzyme_diversity,
                s_microbe: microbe.kcat * kcat_term
                    + microbe.environment * assessment.soft_score
                    + microbe.enzyme_diversity * diversity_term,
            }
        })
        .collect();
    Ok(scores)
}

/// Composite score of a candidate consortium
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsortiumScore {
    /// Members in the order they were chosen
    pub members: Vec<String>,
    pub s_consort: f64,
    pub avg_s_microbe: f64,
    /// Mean kcat_max of the members which have one
    pub avg_kcat: f64,
    /// Mean of the positive pair deltas
    pub avg_delta: f64,
    /// Mean of the positive pair competitions
    pub avg_competition: f64,
    pub size: usize,
    /// Member pairs with interaction data
    pub used_pairs: usize,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// `S = a * avg(S_microbe) + b * avg(delta+) - g * avg(competition+) + l * avg(kcat_max) - m * size`
///
/// Pairs without interaction data, and pairs whose value isn't positive, are left out of the
/// pair averages rather than counted as zero.
pub fn score_consortium(members: &[&SpeciesScore], lookup: &InteractionLookup, weights: &ScoringWeights) -> ConsortiumScore {
    let avg_s_microbe = mean(&members.iter().map(|m| m.s_microbe).collect::<Vec<_>>());
    let avg_kcat = mean(&members.iter().filter_map(|m| m.kcat_max).collect::<Vec<_>>());
    let mut deltas = Vec::new();
    let mut competitions = Vec::new();
    let mut used_pairs = 0;
    for (i, a) in members.iter().enumerate() {
        for b in &members[i + 1..] {
            let Some(row) = lookup.get(&a.species, &b.species) else {
                continue;
            };
            used_pairs += 1;
            if row.delta > 0. {
                deltas.push(row.delta);
            }
            if row.competition > 0. {
                competitions.push(row.competition);
            }
        }
    }
    let avg_delta = mean(&deltas);
    let avg_competition = mean(&competitions);
    let size = members.len();
    let s_consort = weights.alpha * avg_s_microbe + weights.beta * avg_delta - weights.gamma * avg_competition
        + weights.lambda * avg_kcat
        - weights.mu * size as f64;
    ConsortiumScore {
        members: members.iter().map(|m| m.species.clone()).collect(),
        s_consort,
        avg_s_microbe,
        avg_kcat,
        avg_delta,
        avg_competition,
        size,
        used_pairs,
    }
}

/// Resolve member ids against the scored pool and score them
pub fn score_members(
    members: &[&str],
    scores: &[SpeciesScore],
    lookup: &InteractionLookup,
    weights: &ScoringWeights,
) -> Result<ConsortiumScore, ScoringError> {
    let resolved = resolve(members, scores)?;
    Ok(score_consortium(&resolved, lookup, weights))
}

fn resolve<'a>(members: &[&str], scores: &'a [SpeciesScore]) -> Result<Vec<&'a SpeciesScore>, ScoringError> {
    let by_id: IndexMap<&str, &SpeciesScore> = scores.iter().map(|s| (s.species.as_str(), s)).collect();
    members
        .iter()
        .map(|id| {
            by_id
                .get(id)
                .copied()
                .ok_or_else(|| ScoringError::UnknownSpecies(id.to_string()))
        })
        .collect()
}

/// Ranking order: higher score first, then the smaller consortium, then the higher average
/// single species score, then member ids
pub fn rank_order(a: &ConsortiumScore, b: &ConsortiumScore) -> Ordering {
    b.s_consort
        .total_cmp(&a.s_consort)
        .then(a.size.cmp(&b.size))
        .then(b.avg_s_microbe.total_cmp(&a.avg_s_microbe))
        .then_with(|| a.members.cmp(&b.members))
}

/// Share of a consortium's score attributable to one member
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberContribution {
    pub species: String,
    /// Score of the consortium minus the score without this member
    pub marginal_score_contribution: f64,
    /// 1 for the largest contribution
    pub rank: usize,
}

/// Rank members by one at a time marginal removal
///
/// The score of an empty consortium is taken as 0.
pub fn member_contributions(
    consortium: &ConsortiumScore,
    scores: &[SpeciesScore],
    lookup: &InteractionLookup,
    weights: &ScoringWeights,
) -> Result<Vec<MemberContribution>, ScoringError> {
    let ids: Vec<&str> = consortium.members.iter().map(String::as_str).collect();
    let members = resolve(&ids, scores)?;
    let full = score_consortium(&members, lookup, weights).s_consort;
    let mut contributions: Vec<MemberContribution> = members
        .iter()
        .enumerate()
        .map(|(i, member)| {
            let rest: Vec<&SpeciesScore> = members
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, m)| *m)
                .collect();
            let without = if rest.is_empty() {
                0.
            } else {
                score_consortium(&rest, lookup, weights).s_consort
            };
            MemberContribution {
                species: member.species.clone(),
                marginal_score_contribution: full - without,
                rank: 0,
            }
        })
        .collect();
    contributions.sort_by(|a, b| {
        b.marginal_score_contribution
            .total_cmp(&a.marginal_score_contribution)
            .then_with(|| a.species.cmp(&b.species))
    });
    for (i, contribution) in contributions.iter_mut().enumerate() {
        contribution.rank = i + 1;
    }
    Ok(contributions)
}

#[cfg(test)]
mod scoring_tests {
    use super::*;
    use crate::test_utils::{assert_close, provided_lookup as lookup, species_pool as pool, tolerant_site as site};

    #[test]
    fn normalization() {
        assert_close(norm01(5., 0., 10.), 0.5, 1e-12);
        assert_eq!(norm01(3., 3., 3.), 1.);
        assert_eq!(norm01(0., 0., 0.), 0.);
        assert_eq!(norm01(12., 0., 10.), 1.);
    }

    #[test]
    fn single_species_scores() {
        let scores = score_species(&pool(), &site(), &MicrobeWeights::default(), &EnvironmentWeights::default()).unwrap();
        // Perfect environment for everyone, A tops both normalized terms
        assert_close(scores[0].s_microbe, 0.5 + 0.4 + 0.1, 1e-12);
        assert_close(scores[1].s_microbe, 0.4, 1e-12);
        assert_close(scores[2].s_microbe, 0.4, 1e-12);
        assert!(scores.iter().all(|s| s.pass_filter));

        let mut duplicated = pool();
        duplicated.push(duplicated[0].clone());
        assert_eq!(
            score_species(&duplicated, &site(), &MicrobeWeights::default(), &EnvironmentWeights::default()),
            Err(ScoringError::DuplicateSpecies("A".to_string()))
        );
        assert_eq!(
            score_species(&[], &site(), &MicrobeWeights::default(), &EnvironmentWeights::default()),
            Err(ScoringError::EmptyPool)
        );
    }

    #[test]
    fn consortium_score() {
        let scores = score_species(&pool(), &site(), &MicrobeWeights::default(), &EnvironmentWeights::default()).unwrap();
        let weights = ScoringWeights::default();
        let ac = score_members(&["A", "C"], &scores, &lookup(), &weights).unwrap();
        assert_close(ac.avg_s_microbe, 0.7, 1e-12);
        assert_close(ac.avg_kcat, 10., 1e-12);
        assert_close(ac.avg_delta, 0.6, 1e-12);
        assert_close(ac.avg_competition, 0.1, 1e-12);
        assert_close(ac.s_consort, 0.2 * 0.7 + 0.2 * 0.6 - 0.1 * 0.1 + 0.35 * 10. - 0.05 * 2., 1e-12);
        assert_eq!(ac.used_pairs, 1);

        // A - B has a negative delta which is left out, not averaged in
        let ab = score_members(&["A", "B"], &scores, &lookup(), &weights).unwrap();
        assert_eq!(ab.avg_delta, 0.);
        assert_close(ab.avg_competition, 0.5, 1e-12);

        assert_eq!(
            score_members(&["A", "Z"], &scores, &lookup(), &weights),
            Err(ScoringError::UnknownSpecies("Z".to_string()))
        );
    }

    #[test]
    fn contributions() {
        let scores = score_species(&pool(), &site(), &MicrobeWeights::default(), &EnvironmentWeights::default()).unwrap();
        let weights = ScoringWeights::default();
        let abc = score_members(&["A", "B", "C"], &scores, &lookup(), &weights).unwrap();
        let ranking = member_contributions(&abc, &scores, &lookup(), &weights).unwrap();
        assert_eq!(ranking.len(), 3);
        assert_eq!(ranking[0].species, "A");
        assert_eq!(ranking[0].rank, 1);
        assert_eq!(ranking[2].rank, 3);
        let without_a = score_members(&["B", "C"], &scores, &lookup(), &weights).unwrap();
        assert_close(ranking[0].marginal_score_contribution, abc.s_consort - without_a.s_consort, 1e-12);
    }

    #[test]
    fn ranking_breaks_ties() {
        let base = ConsortiumScore {
            members: vec!["A".to_string(), "B".to_string()],
            s_consort: 1.,
            avg_s_microbe: 0.5,
            avg_kcat: 0.,
            avg_delta: 0.,
            avg_competition: 0.,
            size: 2,
            used_pairs: 1,
        };
        let larger = ConsortiumScore {
            members: vec!["A".to_string(), "B".to_string(), "C".to_string()],
            size: 3,
            avg_s_microbe: 0.9,
            ..base.clone()
        };
        let weaker = ConsortiumScore {
            members: vec!["A".to_string(), "C".to_string()],
            avg_s_microbe: 0.4,
            ..base.clone()
        };
        let mut ranked = vec![larger.clone(), weaker.clone(), base.clone()];
        ranked.sort_by(rank_order);
        assert_eq!(ranked, vec![base, weaker, larger]);
    }
}
