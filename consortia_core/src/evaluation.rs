//! End to end evaluation of one candidate consortium
//!
//! Build the community, solve it, evaluate its stability, and gate it. Every stage reuses the
//! same built community, so the report, the solution and the decision share one fingerprint.
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::community::source::ModelSource;
use crate::community::{Community, CommunityError, CommunitySolution, DroppedMember, Fingerprint};
use crate::configuration::EvaluationConfig;
use crate::consortium::scoring::ConsortiumScore;
use crate::decision::{decide, Decision, DecisionError};
use crate::optimize::solvers::Source;
use crate::stability::{evaluate_stability, StabilityError, StabilityReport};

/// Everything learned about a consortium in one evaluation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsortiumEvaluation {
    /// Members which made it into the community
    pub members: Vec<String>,
    pub dropped: Vec<DroppedMember>,
    pub solution: CommunitySolution,
    pub stability: StabilityReport,
    pub decision: Decision,
    /// Simulated if any stage used the simulated backend
    pub source: Source,
    pub fingerprint: Fingerprint,
}

/// Evaluate a consortium
///
/// # Parameters
/// - `community`: Members, abundances, target reaction and medium
/// - `models`: Where the member models are loaded from
/// - `consortium`: Score of the consortium from the scorer, if it was scored
/// - `config`: Solver settings, stability settings and gate thresholds
///
/// # Returns
/// The evaluation, or an error if fewer than two members remain after building or any stage
/// fails. An infeasible community reports the members which can't grow.
pub fn evaluate_consortium(
    community: &Community,
    models: &dyn ModelSource,
    consortium: Option<&ConsortiumScore>,
    config: &EvaluationConfig,
) -> Result<ConsortiumEvaluation, EvaluationError> {
    let built = community.build(models)?;
    let members: Vec<String> = built.member_ids().map(String::from).collect();
    if members.len() < 2 {
        return Err(EvaluationError::TooFewMembers {
            members,
            dropped: built.dropped().to_vec(),
        });
    }

    let solution = built.solve(&config.solver)?;
    let stability = evaluate_stability(&built, &solution, &config.stability, &config.solver)?;
    let decision = decide(&stability, &solution, consortium, &config.gate)?;
    if decision.source.is_simulated() {
        warn!(fingerprint = %decision.fingerprint, "evaluation relied on the simulated backend");
    }
    info!(
        members = members.len(),
        verdict = ?decision.verdict,
        growth = solution.community_growth,
        "consortium evaluated"
    );
    Ok(ConsortiumEvaluation {
        members,
        dropped: built.dropped().to_vec(),
        source: decision.source,
        fingerprint: decision.fingerprint.clone(),
        solution,
        stability,
        decision,
    })
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("A consortium needs at least two members, only {members:?} remain")]
    TooFewMembers {
        members: Vec<String>,
        dropped: Vec<DroppedMember>,
    },
    #[error("Community evaluation failed")]
    Community(#[from] CommunityError),
    #[error("Stability evaluation failed")]
    Stability(#[from] StabilityError),
    #[error("Decision gate failed")]
    Decision(#[from] DecisionError),
}

#[cfg(test)]
mod evaluation_tests {
    use super::*;
    use crate::community::source::InMemoryModelSource;
    use crate::configuration::GateThresholds;
    use crate::decision::Verdict;
    use crate::optimize::solvers::Backend;
    use crate::test_utils::{assert_close, auxotroph_model, cross_feeder_model, degrader_model, pair_medium};

    fn models() -> InMemoryModelSource {
        InMemoryModelSource::from_models([degrader_model(), cross_feeder_model(), auxotroph_model()])
    }

    fn pair() -> Community {
        Community::new(&[("A", 0.6), ("B", 0.4)])
            .with_target("DBPH")
            .with_medium(pair_medium())
    }

    #[test]
    fn pair_is_accepted_with_caveats() {
        let evaluation = evaluate_consortium(&pair(), &models(), None, &EvaluationConfig::default()).unwrap();
        assert_eq!(evaluation.members, vec!["A", "B"]);
        assert_close(evaluation.solution.community_growth, 50. / 7., 1e-4);
        assert_close(evaluation.stability.structural_stability, 0.5, 1e-4);
        // no degradation target is configured
        assert_eq!(evaluation.decision.verdict, Verdict::AcceptWithCaveats);
        assert_eq!(evaluation.source, Source::Real);
        assert_eq!(evaluation.fingerprint, evaluation.solution.fingerprint);
        assert_eq!(evaluation.fingerprint, evaluation.stability.fingerprint);
    }

    #[test]
    fn strict_gate_sends_back_for_redesign() {
        let config = EvaluationConfig {
            gate: GateThresholds {
                structural_stability: 0.9,
                ..GateThresholds::default()
            },
            ..EvaluationConfig::default()
        };
        let evaluation = evaluate_consortium(&pair(), &models(), None, &config).unwrap();
        assert_eq!(evaluation.decision.verdict, Verdict::Redesign);
        assert_eq!(evaluation.decision.failing_standard_names(), vec!["structural_stability"]);
    }

    #[test]
    fn dropped_members_can_leave_too_few() {
        let community = Community::new(&[("A", 1.), ("Missing", 1.)]).with_medium(pair_medium());
        match evaluate_consortium(&community, &models(), None, &EvaluationConfig::default()) {
            Err(EvaluationError::TooFewMembers { members, dropped }) => {
                assert_eq!(members, vec!["A"]);
                assert_eq!(dropped[0].id, "Missing");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn infeasible_community_names_the_culprit() {
        let community = Community::new(&[("A", 1.), ("C", 1.)])
            .with_target("DBPH")
            .with_medium(pair_medium());
        assert_eq!(
            evaluate_consortium(&community, &models(), None, &EvaluationConfig::default()),
            Err(EvaluationError::Community(CommunityError::Infeasible {
                members: vec!["C".to_string()],
                backend: Source::Real,
            }))
        );
    }

    #[test]
    fn simulated_backend_is_flagged() {
        let mut config = EvaluationConfig::default();
        config.solver.backends = vec![Backend::Simulated];
        let evaluation = evaluate_consortium(&pair(), &models(), None, &config).unwrap();
        assert_eq!(evaluation.source, Source::Simulated);
        assert_ne!(evaluation.decision.verdict, Verdict::Accept);
        assert!(evaluation.decision.caveats.iter().any(|c| c.contains("simulated")));
    }
}
