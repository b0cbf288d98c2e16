//! Accept or redesign a consortium
//!
//! Community stability and structural stability are mandatory standards. A consortium failing
//! either is sent back for redesign whatever its other qualities. One passing both is accepted,
//! with caveats when any of the remaining dimensions falls short.
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::community::{CommunitySolution, Fingerprint};
use crate::configuration::GateThresholds;
use crate::consortium::scoring::ConsortiumScore;
use crate::optimize::solvers::Source;
use crate::stability::StabilityReport;

pub const COMMUNITY_STABILITY: &str = "community_stability";
pub const STRUCTURAL_STABILITY: &str = "structural_stability";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verdict {
    Accept,
    AcceptWithCaveats,
    Redesign,
}

/// A mandatory standard which was not met
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailingStandard {
    pub name: String,
    pub value: f64,
    pub threshold: f64,
}

/// One evaluated dimension, scored out of 10
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimensionScore {
    pub dimension: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub verdict: Verdict,
    pub failing_standards: Vec<FailingStandard>,
    pub dimensions: Vec<DimensionScore>,
    pub caveats: Vec<String>,
    pub community_stability: f64,
    pub structural_stability: f64,
    pub degradation_rate: f64,
    /// Simulated if any input was
    pub source: Source,
    pub fingerprint: Fingerprint,
}

impl Decision {
    pub fn failing_standard_names(&self) -> Vec<&str> {
        self.failing_standards.iter().map(|f| f.name.as_str()).collect()
    }
}

fn dimension(name: &str, score: f64) -> DimensionScore {
    DimensionScore {
        dimension: name.to_string(),
        score: score.clamp(0., 10.),
    }
}

/// Gate a consortium
///
/// # Parameters
/// - `report`: Stability report of the community
/// - `solution`: Baseline solution the report was computed from
/// - `consortium`: Score of the consortium, supplies interaction quality when present
/// - `thresholds`: Thresholds of the mandatory standards and the caveats
pub fn decide(
    report: &StabilityReport,
    solution: &CommunitySolution,
    consortium: Option<&ConsortiumScore>,
    thresholds: &GateThresholds,
) -> Result<Decision, DecisionError> {
    if report.fingerprint != solution.fingerprint {
        return Err(DecisionError::FingerprintMismatch {
            report: report.fingerprint.clone(),
            solution: solution.fingerprint.clone(),
        });
    }
    if let Some(consortium) = consortium {
        let mut scored: Vec<&str> = consortium.members.iter().map(String::as_str).collect();
        let mut solved: Vec<&str> = solution.members.iter().map(|m| m.id.as_str()).collect();
        scored.sort_unstable();
        solved.sort_unstable();
        if scored != solved {
            return Err(DecisionError::MembershipMismatch {
                scored: consortium.members.clone(),
                solved: solution.members.iter().map(|m| m.id.clone()).collect(),
            });
        }
    }

    let source = report.source.combine(solution.source);
    let mut caveats = Vec::new();
    if source.is_simulated() {
        caveats.push("inputs were produced by the simulated solver backend".to_string());
    }

    let mut failing_standards = Vec::new();
    for (name, value, threshold) in [
        (COMMUNITY_STABILITY, report.community_stability, thresholds.community_stability),
        (STRUCTURAL_STABILITY, report.structural_stability, thresholds.structural_stability),
    ] {
        if value < threshold {
            failing_standards.push(FailingStandard {
                name: name.to_string(),
                value,
                threshold,
            });
        }
    }
    let mut dimensions = vec![
        dimension(COMMUNITY_STABILITY, 10. * report.community_stability),
        dimension(STRUCTURAL_STABILITY, 10. * report.structural_stability),
    ];

    let verdict = if !failing_standards.is_empty() {
        Verdict::Redesign
    } else {
        let rate = solution.degradation_rate;
        let degradation = match thresholds.degradation_target {
            Some(target) if target > 0. => {
                if rate < target {
                    caveats.push(format!("degradation rate {rate:.4} is below the target {target:.4}"));
                }
                10. * (rate / target).min(1.)
            }
            _ => {
                caveats.push("no degradation target is configured".to_string());
                if rate > 0. {
                    10.
                } else {
                    0.
                }
            }
        };
        dimensions.push(dimension("degradation", degradation));

        let evenness = report.diversity.evenness;
        if evenness < thresholds.min_evenness {
            caveats.push(format!("abundance evenness {evenness:.3} is low"));
        }
        dimensions.push(dimension("diversity", 10. * evenness));

        if let Some(consortium) = consortium {
            if consortium.avg_delta <= 0. {
                caveats.push("no member pair has a positive interaction delta".to_string());
            }
            dimensions.push(dimension("interaction", 5. * (consortium.avg_delta + 1.)));
        }

        if caveats.is_empty() {
            Verdict::Accept
        } else {
            Verdict::AcceptWithCaveats
        }
    };

    info!(?verdict, failing = failing_standards.len(), caveats = caveats.len(), "consortium gated");
    Ok(Decision {
        verdict,
        failing_standards,
        dimensions,
        caveats,
        community_stability: report.community_stability,
        structural_stability: report.structural_stability,
        degradation_rate: solution.degradation_rate,
        source,
        fingerprint: report.fingerprint.clone(),
    })
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecisionError {
    #[error("Stability report {report} and solution {solution} come from different configurations")]
    FingerprintMismatch {
        report: Fingerprint,
        solution: Fingerprint,
    },
    #[error("Scored members {scored:?} differ from solved members {solved:?}")]
    MembershipMismatch {
        scored: Vec<String>,
        solved: Vec<String>,
    },
}

#[cfg(test)]
mod decision_tests {
    use super::*;
    use crate::community::MemberSolution;
    use crate::stability::DiversityIndices;
    use indexmap::IndexMap;

    fn solution(degradation_rate: f64) -> CommunitySolution {
        let member = |id: &str| MemberSolution {
            id: id.to_string(),
            abundance: 0.5,
            growth_rate: 1.,
            target_flux: None,
            exchange_fluxes: IndexMap::new(),
        };
        CommunitySolution {
            tradeoff: 0.5,
            community_growth: 1.,
            members: vec![member("A"), member("B")],
            target_flux: degradation_rate,
            degradation_rate,
            medium_fluxes: IndexMap::new(),
            fluxes: IndexMap::new(),
            iterations: 12,
            source: Source::Real,
            dropped: Vec::new(),
            fingerprint: Fingerprint::of(&"pair"),
        }
    }

    fn report(community_stability: f64, structural_stability: f64) -> StabilityReport {
        StabilityReport {
            community_stability,
            structural_stability,
            pairwise: Vec::new(),
            knockouts: Vec::new(),
            recovery: None,
            diversity: DiversityIndices {
                shannon: 2f64.ln(),
                evenness: 1.,
                dominance: 0.5,
                richness: 2,
            },
            baseline_growth: 1.,
            degradation_rate: 100.,
            source: Source::Real,
            fingerprint: Fingerprint::of(&"pair"),
        }
    }

    fn thresholds() -> GateThresholds {
        GateThresholds {
            degradation_target: Some(1.),
            ..GateThresholds::default()
        }
    }

    #[test]
    fn failing_structural_stability_forces_redesign() {
        let decision = decide(&report(0.9, 0.3), &solution(100.), None, &thresholds()).unwrap();
        assert_eq!(decision.verdict, Verdict::Redesign);
        assert_eq!(decision.failing_standard_names(), vec!["structural_stability"]);
        assert_eq!(decision.failing_standards[0].threshold, 0.5);
        assert_eq!(decision.dimensions.len(), 2);
    }

    #[test]
    fn both_standards_can_fail() {
        let decision = decide(&report(0.1, 0.3), &solution(1.), None, &thresholds()).unwrap();
        assert_eq!(
            decision.failing_standard_names(),
            vec!["community_stability", "structural_stability"]
        );
    }

    #[test]
    fn accept_and_caveats() {
        let decision = decide(&report(0.8, 0.9), &solution(2.), None, &thresholds()).unwrap();
        assert_eq!(decision.verdict, Verdict::Accept);
        assert!(decision.caveats.is_empty());
        assert_eq!(decision.dimensions.len(), 4);

        let slow = decide(&report(0.8, 0.9), &solution(0.5), None, &thresholds()).unwrap();
        assert_eq!(slow.verdict, Verdict::AcceptWithCaveats);
        assert_eq!(slow.caveats.len(), 1);

        let untargeted = decide(&report(0.8, 0.9), &solution(2.), None, &GateThresholds::default()).unwrap();
        assert_eq!(untargeted.verdict, Verdict::AcceptWithCaveats);

        let mut simulated = solution(2.);
        simulated.source = Source::Simulated;
        let decision = decide(&report(0.8, 0.9), &simulated, None, &thresholds()).unwrap();
        assert_eq!(decision.verdict, Verdict::AcceptWithCaveats);
        assert_eq!(decision.source, Source::Simulated);
    }

    #[test]
    fn interaction_dimension() {
        let consortium = ConsortiumScore {
            members: vec!["B".to_string(), "A".to_string()],
            s_consort: 1.,
            avg_s_microbe: 0.5,
            avg_kcat: 1.,
            avg_delta: 0.,
            avg_competition: 0.2,
            size: 2,
            used_pairs: 1,
        };
        let decision = decide(&report(0.8, 0.9), &solution(2.), Some(&consortium), &thresholds()).unwrap();
        assert_eq!(decision.verdict, Verdict::AcceptWithCaveats);
        assert_eq!(decision.dimensions.last().unwrap().score, 5.);

        let stranger = ConsortiumScore {
            members: vec!["A".to_string(), "Z".to_string()],
            ..consortium
        };
        assert!(matches!(
            decide(&report(0.8, 0.9), &solution(2.), Some(&stranger), &thresholds()),
            Err(DecisionError::MembershipMismatch { .. })
        ));
    }

    #[test]
    fn mismatched_fingerprints() {
        let mut other = solution(2.);
        other.fingerprint = Fingerprint::of(&"other");
        assert!(matches!(
            decide(&report(0.9, 0.9), &other, None, &thresholds()),
            Err(DecisionError::FingerprintMismatch { .. })
        ));
    }

    #[test]
    fn verdict_names() {
        assert_eq!(serde_json::to_string(&Verdict::AcceptWithCaveats).unwrap(), "\"accept-with-caveats\"");
        assert_eq!(serde_json::to_string(&Verdict::Redesign).unwrap(), "\"redesign\"");
    }
}
