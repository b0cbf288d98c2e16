//! Ecological stability of a solved community
//!
//! Four groups of indices are computed from a baseline [`CommunitySolution`]:
//! - community stability, the mean Pianka complementarity `1 - O` over member pairs
//! - structural stability `I_KO`, the mean growth ratio after removing each member
//! - pathway blockage recovery, the degradation ratio after blocking a critical reaction
//! - diversity of the member abundances
//!
//! Nothing is computed for a community without a feasible baseline.
use indexmap::IndexMap;
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::community::{BuiltCommunity, CommunityError, CommunitySolution, Fingerprint};
use crate::configuration::{Configuration, StabilityConfig};
use crate::consortium::profile::MetabolicProfile;
use crate::metabolic_model::metabolite::split_compartment_suffix;
use crate::optimize::solvers::Source;
use crate::utils::hashing::float_key;

/// Resource vectors the overlap of a pair was computed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapBasis {
    /// Import fluxes of the community solution
    ImportFlux,
    /// Seed sets, used when a member imports nothing
    SeedSet,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairOverlap {
    pub species_a: String,
    pub species_b: String,
    /// Pianka niche overlap
    pub overlap: f64,
    /// `1 - overlap`
    pub complementarity: f64,
    pub basis: OverlapBasis,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnockoutResult {
    /// Member removed
    pub member: String,
    /// Community growth without the member, 0 if the rest is infeasible
    pub community_growth: f64,
    /// Growth relative to the baseline, clamped to [0, 1]
    pub ratio: f64,
    pub feasible: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveryMetrics {
    pub reaction: String,
    /// Member the reaction was blocked in
    pub member: String,
    pub pre_target_flux: f64,
    pub post_target_flux: f64,
    /// `post / pre`
    pub ratio: f64,
    pub recovered: bool,
    /// Supplied proxy, or solver iterations of the blocked solve
    pub recovery_time: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DiversityIndices {
    pub shannon: f64,
    /// `H / ln n`, 0 for fewer than two members
    pub evenness: f64,
    /// Largest abundance fraction
    pub dominance: f64,
    pub richness: usize,
}

/// Stability indices of one community configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StabilityReport {
    pub community_stability: f64,
    pub structural_stability: f64,
    pub pairwise: Vec<PairOverlap>,
    pub knockouts: Vec<KnockoutResult>,
    pub recovery: Option<RecoveryMetrics>,
    pub diversity: DiversityIndices,
    pub baseline_growth: f64,
    pub degradation_rate: f64,
    pub source: Source,
    /// Fingerprint of the baseline solution
    pub fingerprint: Fingerprint,
}

/// Pianka overlap of two resource vectors, 0 if either is all zero
pub fn pianka_overlap(a: &IndexMap<String, f64>, b: &IndexMap<String, f64>) -> f64 {
    let dot: f64 = a
        .iter()
        .filter_map(|(k, x)| b.get(k).map(|y| x * y))
        .sum();
    let norm_a: f64 = a.values().map(|x| x * x).sum();
    let norm_b: f64 = b.values().map(|y| y * y).sum();
    if norm_a <= 0. || norm_b <= 0. {
        return 0.;
    }
    (dot / (norm_a * norm_b).sqrt()).clamp(0., 1.)
}

/// Shannon diversity and friends over abundance values, which need not sum to one
pub fn diversity(abundances: &[f64]) -> DiversityIndices {
    let total: f64 = abundances.iter().filter(|a| **a > 0.).sum();
    let fractions: Vec<f64> = if total > 0. {
        abundances.iter().filter(|a| **a > 0.).map(|a| a / total).collect()
    } else {
        Vec::new()
    };
    let shannon = -fractions.iter().map(|p| p * p.ln()).sum::<f64>();
    let richness = fractions.len();
    let evenness = if richness > 1 {
        shannon / (richness as f64).ln()
    } else {
        0.
    };
    DiversityIndices {
        shannon,
        evenness,
        dominance: fractions.iter().copied().fold(0., f64::max),
        richness,
    }
}

fn imports_by_base_name(solution: &CommunitySolution, member: &str) -> IndexMap<String, f64> {
    solution
        .member(member)
        .map(|m| {
            m.imports()
                .map(|(met, rate)| (split_compartment_suffix(met).0.to_string(), rate))
                .collect()
        })
        .unwrap_or_default()
}

fn seed_vector(profile: &MetabolicProfile) -> IndexMap<String, f64> {
    profile.seeds.iter().map(|s| (s.clone(), 1.)).collect()
}

/// Pairwise Pianka complementarity of the members
pub fn niche_complementarity(
    community: &BuiltCommunity,
    baseline: &CommunitySolution,
    config: &Configuration,
) -> Vec<PairOverlap> {
    let members: Vec<(&str, IndexMap<String, f64>)> = community
        .member_ids()
        .map(|id| (id, imports_by_base_name(baseline, id)))
        .collect();
    let mut profiles: IndexMap<&str, MetabolicProfile> = IndexMap::new();
    let mut pairs = Vec::new();
    for (i, (a, imports_a)) in members.iter().enumerate() {
        for (b, imports_b) in &members[i + 1..] {
            let (overlap, basis) = if !imports_a.is_empty() && !imports_b.is_empty() {
                (pianka_overlap(imports_a, imports_b), OverlapBasis::ImportFlux)
            } else {
                for id in [*a, *b] {
                    if !profiles.contains_key(id) {
                        let profile = community
                            .member(id)
                            .map(|m| MetabolicProfile::from_model(&m.model, config))
                            .unwrap_or_default();
                        profiles.insert(id, profile);
                    }
                }
                (
                    pianka_overlap(&seed_vector(&profiles[*a]), &seed_vector(&profiles[*b])),
                    OverlapBasis::SeedSet,
                )
            };
            pairs.push(PairOverlap {
                species_a: a.to_string(),
                species_b: b.to_string(),
                overlap,
                complementarity: 1. - overlap,
                basis,
            });
        }
    }
    pairs
}

/// Remove each member in turn and compare community growth with the baseline
///
/// # Returns
/// `I_KO` and the individual knockouts. A community with a single member has no knockout
/// index and is rejected.
pub fn knockout_index(
    community: &BuiltCommunity,
    baseline: &CommunitySolution,
    config: &Configuration,
) -> Result<(f64, Vec<KnockoutResult>, Source), StabilityError> {
    let ids: Vec<&str> = community.member_ids().collect();
    if ids.len() < 2 {
        return Err(StabilityError::SingleMember(
            ids.first().map(|id| id.to_string()).unwrap_or_default(),
        ));
    }
    let baseline_growth = baseline.community_growth;
    if baseline_growth <= config.zero_threshold {
        warn!("baseline community growth is zero, knockout ratios are reported as 0");
    }
    let results: Vec<(KnockoutResult, Source)> = ids
        .par_iter()
        .map(|id| {
            let reduced = community.without_member(id)?;
            let (growth, feasible, source) = match reduced.solve_with_tradeoff(baseline.tradeoff, config) {
                Ok(solution) => (solution.community_growth, true, solution.source),
                Err(CommunityError::Infeasible { backend: source, .. }) => (0., false, source),
                Err(err) => return Err(StabilityError::Community(err)),
            };
            let ratio = if baseline_growth > config.zero_threshold {
                (growth / baseline_growth).clamp(0., 1.)
            } else {
                0.
            };
            debug!(member = %id, growth, ratio, "knockout solved");
            Ok((
                KnockoutResult {
                    member: id.to_string(),
                    community_growth: growth,
                    ratio,
                    feasible,
                },
                source,
            ))
        })
        .collect::<Result<_, StabilityError>>()?;
    let source = results
        .iter()
        .fold(Source::Real, |acc, (_, source)| acc.combine(*source));
    let knockouts: Vec<KnockoutResult> = results.into_iter().map(|(ko, _)| ko).collect();
    let index = knockouts.iter().map(|ko| ko.ratio).sum::<f64>() / knockouts.len() as f64;
    Ok((index, knockouts, source))
}

/// Block the critical reaction in the member carrying most of its flux and re-solve
///
/// # Returns
/// `None` if there is no critical reaction, no member carries it, or the baseline doesn't
/// degrade anything to recover.
pub fn pathway_recovery(
    community: &BuiltCommunity,
    baseline: &CommunitySolution,
    stability: &StabilityConfig,
    config: &Configuration,
) -> Result<(Option<RecoveryMetrics>, Source), StabilityError> {
    let Some(reaction) = stability
        .critical_reaction
        .as_deref()
        .or(community.target_reaction())
    else {
        return Ok((None, Source::Real));
    };
    let carrier = community
        .members()
        .iter()
        .filter(|m| m.model.reactions.contains_key(reaction))
        .map(|m| {
            let flux = baseline
                .fluxes
                .get(&format!("{}__{}", reaction, m.id))
                .copied()
                .unwrap_or(0.);
            (m.id.as_str(), flux.abs())
        })
        .fold(None, |best: Option<(&str, f64)>, (id, flux)| match best {
            Some((_, top)) if top >= flux => best,
            _ => Some((id, flux)),
        });
    let Some((member, _)) = carrier else {
        warn!(reaction, "no member carries the critical reaction");
        return Ok((None, Source::Real));
    };
    let pre = baseline.target_flux;
    if pre <= config.zero_threshold {
        warn!("baseline degrades nothing, recovery is not measured");
        return Ok((None, Source::Real));
    }

    let blocked = community.with_blocked_reaction(Some(member), reaction)?;
    let (post, iterations, source) = match blocked.solve_with_tradeoff(baseline.tradeoff, config) {
        Ok(solution) => (solution.target_flux, Some(solution.iterations), solution.source),
        Err(CommunityError::Infeasible { backend: source, .. }) => (0., None, source),
        Err(err) => return Err(StabilityError::Community(err)),
    };
    let ratio = (post / pre).max(0.);
    let recovery_time = stability
        .recovery_time_proxy
        .or(iterations.map(|i| i as f64));
    Ok((
        Some(RecoveryMetrics {
            reaction: reaction.to_string(),
            member: member.to_string(),
            pre_target_flux: pre,
            post_target_flux: post,
            ratio,
            recovered: ratio >= stability.recovery_floor,
            recovery_time,
        }),
        source,
    ))
}

/// Every stability index of a community, given its baseline solution
///
/// The baseline must have been solved from this exact community configuration.
pub fn evaluate_stability(
    community: &BuiltCommunity,
    baseline: &CommunitySolution,
    stability: &StabilityConfig,
    config: &Configuration,
) -> Result<StabilityReport, StabilityError> {
    let expected = Fingerprint::of(&(community.fingerprint(), float_key(baseline.tradeoff)));
    if expected != baseline.fingerprint {
        return Err(StabilityError::FingerprintMismatch {
            community: expected,
            solution: baseline.fingerprint.clone(),
        });
    }
    let (structural_stability, knockouts, ko_source) = knockout_index(community, baseline, config)?;
    let pairwise = niche_complementarity(community, baseline, config);
    let community_stability = if pairwise.is_empty() {
        0.
    } else {
        pairwise.iter().map(|p| p.complementarity).sum::<f64>() / pairwise.len() as f64
    };
    let (recovery, recovery_source) = pathway_recovery(community, baseline, stability, config)?;
    let abundances: Vec<f64> = community.members().iter().map(|m| m.abundance).collect();

    Ok(StabilityReport {
        community_stability,
        structural_stability,
        pairwise,
        knockouts,
        recovery,
        diversity: diversity(&abundances),
        baseline_growth: baseline.community_growth,
        degradation_rate: baseline.degradation_rate,
        source: baseline.source.combine(ko_source).combine(recovery_source),
        fingerprint: baseline.fingerprint.clone(),
    })
}

/// Solve the baseline and evaluate its stability, an infeasible baseline is passed on
pub fn solve_and_evaluate(
    community: &BuiltCommunity,
    stability: &StabilityConfig,
    config: &Configuration,
) -> Result<(CommunitySolution, StabilityReport), StabilityError> {
    let baseline = community.solve(config)?;
    let report = evaluate_stability(community, &baseline, stability, config)?;
    Ok((baseline, report))
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StabilityError {
    #[error("Knockout analysis needs at least two members, only {0:?} is present")]
    SingleMember(String),
    #[error("Solution {solution} was not computed from community configuration {community}")]
    FingerprintMismatch {
        community: Fingerprint,
        solution: Fingerprint,
    },
    #[error("Community solve failed")]
    Community(#[from] CommunityError),
}

#[cfg(test)]
mod stability_tests {
    use super::*;
    use crate::community::source::InMemoryModelSource;
    use crate::community::Community;
    use crate::test_utils::{assert_close, auxotroph_model, cross_feeder_model, degrader_model, pair_medium};

    fn pair() -> BuiltCommunity {
        Community::new(&[("A", 0.6), ("B", 0.4)])
            .with_target("DBPH")
            .with_medium(pair_medium())
            .build(&InMemoryModelSource::from_models([degrader_model(), cross_feeder_model()]))
            .unwrap()
    }

    #[test]
    fn pianka() {
        let a = IndexMap::from([("glc".to_string(), 1.), ("dbp".to_string(), 2.)]);
        let b = IndexMap::from([("glc".to_string(), 2.), ("dbp".to_string(), 4.)]);
        let c = IndexMap::from([("ac".to_string(), 1.)]);
        assert_close(pianka_overlap(&a, &b), 1., 1e-12);
        assert_eq!(pianka_overlap(&a, &c), 0.);
        assert_eq!(pianka_overlap(&a, &IndexMap::new()), 0.);
    }

    #[test]
    fn diversity_indices() {
        let even = diversity(&[1., 1., 1., 1.]);
        assert_close(even.shannon, 4f64.ln(), 1e-12);
        assert_close(even.evenness, 1., 1e-12);
        assert_close(even.dominance, 0.25, 1e-12);
        assert_eq!(even.richness, 4);

        let skewed = diversity(&[0.6, 0.4]);
        assert_close(skewed.shannon, -(0.6f64 * 0.6f64.ln() + 0.4 * 0.4f64.ln()), 1e-12);
        assert!(skewed.evenness < 1.);
        let single = diversity(&[3.]);
        assert_eq!(single.shannon, 0.);
        assert_eq!(single.evenness, 0.);
    }

    #[test]
    fn pair_stability() {
        let config = Configuration::default();
        let community = pair();
        let (baseline, report) = solve_and_evaluate(&community, &StabilityConfig::default(), &config).unwrap();

        // A imports dbp and glucose at 2:1, B acetate and glucose at 1:1
        assert_eq!(report.pairwise.len(), 1);
        assert_eq!(report.pairwise[0].basis, OverlapBasis::ImportFlux);
        assert_close(report.community_stability, 1. - 1. / 10f64.sqrt(), 1e-4);

        // Without B, A grows faster than the baseline, without A, B has no acetate
        assert_close(report.knockouts[0].ratio, 0., 1e-6);
        assert!(!report.knockouts[0].feasible || report.knockouts[0].community_growth < 1e-6);
        assert_close(report.knockouts[1].ratio, 1., 1e-9);
        assert_close(report.structural_stability, 0.5, 1e-6);
        assert!((0. ..=1.).contains(&report.structural_stability));

        // A is the only degrader, blocking it leaves nothing to reroute through
        let recovery = report.recovery.unwrap();
        assert_eq!(recovery.member, "A");
        assert_close(recovery.ratio, 0., 1e-6);
        assert!(!recovery.recovered);

        assert_eq!(report.fingerprint, baseline.fingerprint);
        assert_eq!(report.source, Source::Real);
        assert_close(report.degradation_rate, baseline.degradation_rate, 1e-12);
        assert_eq!(report.diversity.richness, 2);
    }

    #[test]
    fn single_member_is_rejected() {
        let config = Configuration::default();
        let alone = pair().without_member("B").unwrap();
        let baseline = alone.solve(&config).unwrap();
        assert_eq!(
            evaluate_stability(&alone, &baseline, &StabilityConfig::default(), &config),
            Err(StabilityError::SingleMember("A".to_string()))
        );
    }

    #[test]
    fn mismatched_baseline_is_rejected() {
        let config = Configuration::default();
        let community = pair();
        let other = community.with_blocked_reaction(Some("A"), "DBPH").unwrap();
        let baseline = other.solve(&config).unwrap();
        assert!(matches!(
            evaluate_stability(&community, &baseline, &StabilityConfig::default(), &config),
            Err(StabilityError::FingerprintMismatch { .. })
        ));
    }

    #[test]
    fn infeasible_recovery_keeps_the_solver_source() {
        let mut medium = pair_medium();
        medium.insert("EX_vit_e".to_string(), 1.);
        let community = Community::new(&[("A", 0.5), ("C", 0.5)])
            .with_target("DBPH")
            .with_medium(medium)
            .build(&InMemoryModelSource::from_models([degrader_model(), auxotroph_model()]))
            .unwrap();
        let config = Configuration::default();
        let baseline = community.solve(&config).unwrap();
        assert!(baseline.target_flux > 0.);

        // C must grow and can't without its vitamin transporter
        let stability = StabilityConfig {
            critical_reaction: Some("VITt".to_string()),
            ..StabilityConfig::default()
        };
        let (recovery, source) = pathway_recovery(&community, &baseline, &stability, &config).unwrap();
        let recovery = recovery.unwrap();
        assert_eq!(recovery.member, "C");
        assert_eq!(recovery.post_target_flux, 0.);
        assert_eq!(recovery.recovery_time, None);
        assert!(!recovery.recovered);
        assert_eq!(source, Source::Real);

        let blocked = community.with_blocked_reaction(Some("C"), "VITt").unwrap();
        assert!(matches!(
            blocked.solve(&config),
            Err(CommunityError::Infeasible { backend: Source::Real, .. })
        ));
    }

    #[test]
    fn infeasible_baseline_propagates() {
        let source = InMemoryModelSource::from_models([degrader_model(), auxotroph_model()]);
        let community = Community::new(&[("A", 1.), ("C", 1.)])
            .with_medium(pair_medium())
            .build(&source)
            .unwrap();
        assert_eq!(
            solve_and_evaluate(&community, &StabilityConfig::default(), &Configuration::default()),
            Err(StabilityError::Community(CommunityError::Infeasible {
                members: vec!["C".to_string()],
                backend: Source::Real,
            }))
        );
    }
}
