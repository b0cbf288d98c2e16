//! Typed operations for callers driving the engine with JSON
//!
//! Each operation names one component entry point and carries its parameters:
//!
//! ```json
//! {"operation": "solve_community", "model_dir": "models", "community": {"members": [...]}}
//! ```
//!
//! Unknown operation names are rejected when the operation is deserialized.
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::community::source::DirectoryModelSource;
use crate::community::{Community, CommunityError, CommunitySolution};
use crate::configuration::{EvaluationConfig, MediumConfig};
use crate::consortium::environment::SiteConditions;
use crate::consortium::interaction::{InteractionLookup, InteractionRow};
use crate::consortium::scoring::{member_contributions, score_species, ConsortiumScore, MemberContribution, SpeciesScore};
use crate::consortium::search::{search, SearchOutcome};
use crate::consortium::{ScoringError, Species};
use crate::curation::{add_reactions, CurationError, CurationOptions, CurationReport, ReactionSpec};
use crate::evaluation::{evaluate_consortium, ConsortiumEvaluation, EvaluationError};
use crate::io::json::ModelParseError;
use crate::io::tables::{
    read_interaction_table, write_candidate_table, write_consortium_table, write_contribution_table,
    write_interaction_table, write_medium_table, write_species_score_table, TableError,
};
use crate::medium::{recommend_medium, MediumError, MediumRecommendation};
use crate::metabolic_model::model::Model;
use crate::metabolic_model::validation::IssueSeverity;
use crate::stability::{solve_and_evaluate, StabilityError, StabilityReport};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidateModelParams {
    pub model: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddReactionsParams {
    pub model: PathBuf,
    #[serde(default)]
    pub reactions: Vec<ReactionSpec>,
    /// Reaction id to equation, parsed into further specs
    #[serde(default)]
    pub equations: IndexMap<String, String>,
    #[serde(default)]
    pub options: CurationOptions,
    /// Where to write the curated model
    #[serde(default)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendMediumParams {
    pub models: Vec<PathBuf>,
    /// Replaces the medium section of the evaluation configuration
    #[serde(default)]
    pub medium: Option<MediumConfig>,
    /// Where to write the medium table
    #[serde(default)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveCommunityParams {
    /// Directory holding `<member id>.json` models
    pub model_dir: PathBuf,
    pub community: Community,
    /// Overrides the community's own trade-off coefficient
    #[serde(default)]
    pub tradeoff: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreConsortiaParams {
    pub species: Vec<Species>,
    #[serde(default)]
    pub site: SiteConditions,
    /// Interactions supplied by a provider
    #[serde(default)]
    pub interactions: Vec<InteractionRow>,
    /// Interaction table in the artifact layout, read in addition to `interactions`
    #[serde(default)]
    pub interaction_table: Option<PathBuf>,
    /// Directory the scoring tables are written to
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluateStabilityParams {
    pub model_dir: PathBuf,
    pub community: Community,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluateConsortiumParams {
    pub model_dir: PathBuf,
    pub community: Community,
    /// Score from an earlier `score_consortia` run
    #[serde(default)]
    pub consortium: Option<ConsortiumScore>,
}

/// One request to the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Operation {
    ValidateModel(ValidateModelParams),
    AddReactions(AddReactionsParams),
    RecommendMedium(RecommendMediumParams),
    SolveCommunity(SolveCommunityParams),
    ScoreConsortia(ScoreConsortiaParams),
    EvaluateStability(EvaluateStabilityParams),
    EvaluateConsortium(EvaluateConsortiumParams),
}

/// Result of an [`Operation`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum OperationOutput {
    ValidateModel {
        model_id: Option<String>,
        errors: Vec<String>,
        warnings: Vec<String>,
    },
    AddReactions {
        report: CurationReport,
        written: Option<PathBuf>,
    },
    RecommendMedium {
        recommendation: MediumRecommendation,
    },
    SolveCommunity {
        solution: CommunitySolution,
    },
    ScoreConsortia {
        species: Vec<SpeciesScore>,
        interactions: Vec<InteractionRow>,
        search: SearchOutcome,
        contributions: Vec<MemberContribution>,
    },
    EvaluateStability {
        solution: CommunitySolution,
        report: StabilityReport,
    },
    EvaluateConsortium {
        evaluation: ConsortiumEvaluation,
    },
}

impl Operation {
    pub fn from_json_str(data: &str) -> Result<Operation, OperationError> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn read_json<P: AsRef<Path>>(path: P) -> Result<Operation, OperationError> {
        let data = fs::read_to_string(path)?;
        Operation::from_json_str(&data)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::ValidateModel(_) => "validate_model",
            Operation::AddReactions(_) => "add_reactions",
            Operation::RecommendMedium(_) => "recommend_medium",
            Operation::SolveCommunity(_) => "solve_community",
            Operation::ScoreConsortia(_) => "score_consortia",
            Operation::EvaluateStability(_) => "evaluate_stability",
            Operation::EvaluateConsortium(_) => "evaluate_consortium",
        }
    }
}

/// Run an operation with the given configuration
pub fn execute(operation: &Operation, config: &EvaluationConfig) -> Result<OperationOutput, OperationError> {
    info!(operation = operation.name(), "executing operation");
    match operation {
        Operation::ValidateModel(params) => {
            let model = Model::read_json(&params.model)?;
            let (errors, warnings): (Vec<_>, Vec<_>) = model
                .validate()
                .into_iter()
                .partition(|issue| issue.severity() == IssueSeverity::Error);
            Ok(OperationOutput::ValidateModel {
                model_id: model.id.clone(),
                errors: errors.iter().map(ToString::to_string).collect(),
                warnings: warnings.iter().map(ToString::to_string).collect(),
            })
        }
        Operation::AddReactions(params) => {
            let model = Model::read_json(&params.model)?;
            let mut specs = params.reactions.clone();
            for (id, equation) in &params.equations {
                specs.push(ReactionSpec::from_equation(id, equation)?);
            }
            let (curated, report) = add_reactions(&model, &specs, &params.options)?;
            if let Some(output) = &params.output {
                curated.write_json(output)?;
            }
            Ok(OperationOutput::AddReactions {
                report,
                written: params.output.clone(),
            })
        }
        Operation::RecommendMedium(params) => {
            let models = params
                .models
                .iter()
                .map(Model::read_json)
                .collect::<Result<Vec<_>, _>>()?;
            let medium = params.medium.as_ref().unwrap_or(&config.medium);
            let recommendation = recommend_medium(&models, medium, &config.solver)?;
            if let Some(output) = &params.output {
                write_medium_table(output, &recommendation.rows)?;
            }
            Ok(OperationOutput::RecommendMedium { recommendation })
        }
        Operation::SolveCommunity(params) => {
            let built = params
                .community
                .build(&DirectoryModelSource::new(&params.model_dir))?;
            let solution = match params.tradeoff {
                Some(tradeoff) => built.solve_with_tradeoff(tradeoff, &config.solver)?,
                None => built.solve(&config.solver)?,
            };
            Ok(OperationOutput::SolveCommunity { solution })
        }
        Operation::ScoreConsortia(params) => score_consortia(params, config),
        Operation::EvaluateStability(params) => {
            let built = params
                .community
                .build(&DirectoryModelSource::new(&params.model_dir))?;
            let (solution, report) = solve_and_evaluate(&built, &config.stability, &config.solver)?;
            Ok(OperationOutput::EvaluateStability { solution, report })
        }
        Operation::EvaluateConsortium(params) => {
            let evaluation = evaluate_consortium(
                &params.community,
                &DirectoryModelSource::new(&params.model_dir),
                params.consortium.as_ref(),
                config,
            )?;
            Ok(OperationOutput::EvaluateConsortium { evaluation })
        }
    }
}

fn score_consortia(params: &ScoreConsortiaParams, config: &EvaluationConfig) -> Result<OperationOutput, OperationError> {
    let species = score_species(&params.species, &params.site, &config.microbe, &config.environment)?;

    let mut provided = params.interactions.clone();
    if let Some(table) = &params.interaction_table {
        provided.extend(read_interaction_table(table)?);
    }
    let mut lookup = InteractionLookup::from_provided(&provided);
    lookup.fill_computed(
        params
            .species
            .iter()
            .filter_map(|s| s.profile.as_ref().map(|profile| (s.id.as_str(), profile))),
    );

    let outcome = search(&species, &lookup, &config.search, &config.scoring)?;
    let contributions = match outcome.ranked.first() {
        Some(best) => member_contributions(best, &species, &lookup, &config.scoring)?,
        None => Vec::new(),
    };
    let members: Vec<&str> = outcome
        .ranked
        .first()
        .map(|best| best.members.iter().map(String::as_str).collect())
        .unwrap_or_default();
    let interactions = lookup.rows_for(&members);

    if let Some(dir) = &params.output_dir {
        fs::create_dir_all(dir)?;
        write_candidate_table(dir.join("candidate_species.csv"), &species)?;
        write_species_score_table(dir.join("species_scores.csv"), &species)?;
        write_interaction_table(dir.join("pairwise_interactions.csv"), lookup.rows())?;
        write_consortium_table(dir.join("optimal_consortia.csv"), &outcome.ranked)?;
        write_contribution_table(dir.join("member_contributions.csv"), &contributions)?;
    }
    Ok(OperationOutput::ScoreConsortia {
        species,
        interactions,
        search: outcome,
        contributions,
    })
}

#[derive(Error, Debug)]
pub enum OperationError {
    #[error("Unable to parse operation")]
    Parse(#[from] serde_json::Error),
    #[error("Unable to read or write a file")]
    Io(#[from] std::io::Error),
    #[error("Unable to read or write a model")]
    Model(#[from] ModelParseError),
    #[error("Unable to write a table")]
    Table(#[from] TableError),
    #[error("Curation failed")]
    Curation(#[from] CurationError),
    #[error("Medium recommendation failed")]
    Medium(#[from] MediumError),
    #[error("Community solve failed")]
    Community(#[from] CommunityError),
    #[error("Consortium scoring failed")]
    Scoring(#[from] ScoringError),
    #[error("Stability evaluation failed")]
    Stability(#[from] StabilityError),
    #[error("Consortium evaluation failed")]
    Evaluation(#[from] EvaluationError),
}

#[cfg(test)]
mod operation_tests {
    use super::*;
    use crate::decision::Verdict;
    use crate::test_utils::{assert_close, cross_feeder_model, degrader_model};
    use tempfile::TempDir;

    fn model_dir() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        degrader_model().write_json(dir.path().join("A.json")).unwrap();
        cross_feeder_model().write_json(dir.path().join("B.json")).unwrap();
        dir
    }

    fn pair_request(operation: &str, dir: &Path) -> String {
        format!(
            r#"{{
                "operation": "{operation}",
                "model_dir": {dir:?},
                "community": {{
                    "members": [{{"id": "A", "abundance": 0.6}}, {{"id": "B", "abundance": 0.4}}],
                    "target_reaction": "DBPH",
                    "medium": {{"EX_glc_e": 5.0, "EX_dbp_e": 10.0}}
                }}
            }}"#
        )
    }

    #[test]
    fn unknown_operations_are_rejected() {
        assert!(matches!(
            Operation::from_json_str(r#"{"operation": "grow_faster"}"#),
            Err(OperationError::Parse(_))
        ));
    }

    #[test]
    fn solve_community_from_json() {
        let dir = model_dir();
        let operation = Operation::from_json_str(&pair_request("solve_community", dir.path())).unwrap();
        assert_eq!(operation.name(), "solve_community");
        match execute(&operation, &EvaluationConfig::default()).unwrap() {
            OperationOutput::SolveCommunity { solution } => {
                assert_close(solution.community_growth, 50. / 7., 1e-4);
            }
            other => panic!("unexpected output {other:?}"),
        }
    }

    #[test]
    fn evaluate_consortium_from_json() {
        let dir = model_dir();
        let operation = Operation::from_json_str(&pair_request("evaluate_consortium", dir.path())).unwrap();
        match execute(&operation, &EvaluationConfig::default()).unwrap() {
            OperationOutput::EvaluateConsortium { evaluation } => {
                assert_eq!(evaluation.decision.verdict, Verdict::AcceptWithCaveats);
            }
            other => panic!("unexpected output {other:?}"),
        }
    }

    #[test]
    fn validate_and_curate() {
        let dir = model_dir();
        let model = dir.path().join("A.json");
        let validate = Operation::ValidateModel(ValidateModelParams { model: model.clone() });
        match execute(&validate, &EvaluationConfig::default()).unwrap() {
            OperationOutput::ValidateModel { model_id, errors, .. } => {
                assert_eq!(model_id.as_deref(), Some("A"));
                assert!(errors.is_empty());
            }
            other => panic!("unexpected output {other:?}"),
        }

        let output = dir.path().join("A_curated.json");
        let curate = Operation::AddReactions(AddReactionsParams {
            model,
            reactions: Vec::new(),
            equations: IndexMap::from([("PHTH".to_string(), "bp_c -> pht_c".to_string())]),
            options: CurationOptions::default(),
            output: Some(output.clone()),
        });
        match execute(&curate, &EvaluationConfig::default()).unwrap() {
            OperationOutput::AddReactions { report, .. } => {
                assert_eq!(report.added, vec!["PHTH"]);
            }
            other => panic!("unexpected output {other:?}"),
        }
        let curated = Model::read_json(&output).unwrap();
        assert!(curated.reactions.contains_key("PHTH"));
    }

    #[test]
    fn score_consortia_writes_tables() {
        let dir = tempfile::tempdir().unwrap();
        let request = format!(
            r#"{{
                "operation": "score_consortia",
                "species": [
                    {{"id": "A", "role": "functional", "kcat_max": 10.0, "enzyme_diversity": 3.0}},
                    {{"id": "B", "role": "functional", "kcat_max": 2.0, "enzyme_diversity": 1.0}},
                    {{"id": "C", "role": "complementary"}}
                ],
                "interactions": [
                    {{"species_a": "A", "species_b": "C", "competition": 0.1, "complementarity": 0.7,
                      "delta": 0.6, "source": "provided"}}
                ],
                "output_dir": {:?}
            }}"#,
            dir.path()
        );
        let mut config = EvaluationConfig::default();
        config.search.kmax = 2;
        match execute(&Operation::from_json_str(&request).unwrap(), &config).unwrap() {
            OperationOutput::ScoreConsortia { search, contributions, .. } => {
                assert_eq!(search.ranked[0].members.len(), 2);
                assert_eq!(contributions.len(), 2);
            }
            other => panic!("unexpected output {other:?}"),
        }
        for table in [
            "candidate_species.csv",
            "species_scores.csv",
            "pairwise_interactions.csv",
            "optimal_consortia.csv",
            "member_contributions.csv",
        ] {
            assert!(dir.path().join(table).is_file(), "{table} missing");
        }
    }
}
