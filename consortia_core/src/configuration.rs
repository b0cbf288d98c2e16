//! Configuration values for the evaluation engine
//!
//! Nothing here is global: every component receives the configuration it needs as an
//! argument, so concurrent evaluations can run with different weights and thresholds.
//! All structs deserialize from partial JSON, missing fields take their defaults.
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::optimize::solvers::Backend;
use crate::optimize::strategy::SolveStrategy;

/// Default lower flux bound for reversible reactions
pub const DEFAULT_LOWER_BOUND: f64 = -1000.;
/// Default upper flux bound
pub const DEFAULT_UPPER_BOUND: f64 = 1000.;

/// Solver level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Lower bound assumed for reactions which don't have one
    pub lower_bound: f64,
    /// Upper bound assumed for reactions which don't have one
    pub upper_bound: f64,
    /// Tolerance for comparing floating point values
    pub tolerance: f64,
    /// Relative slack allowed when fixing an earlier optimum as a constraint
    pub objective_relaxation: f64,
    /// Values with a smaller magnitude are treated as zero
    pub zero_threshold: f64,
    /// Solver backends, tried in order
    pub backends: Vec<Backend>,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            lower_bound: DEFAULT_LOWER_BOUND,
            upper_bound: DEFAULT_UPPER_BOUND,
            tolerance: 1e-07,
            objective_relaxation: 1e-06,
            zero_threshold: 1e-9,
            backends: vec![Backend::default()],
        }
    }
}

impl Configuration {
    /// Strategy trying the configured backends in order
    pub fn strategy(&self) -> SolveStrategy {
        SolveStrategy::new(self.backends.clone())
    }

    /// Amount an optimum may be relaxed by when it is fixed as a constraint
    pub fn relaxation_for(&self, optimum: f64) -> f64 {
        self.objective_relaxation * optimum.abs().max(1.)
    }
}

/// Weights of the composite consortium score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Weight of the average single species score
    pub alpha: f64,
    /// Weight of the average positive delta
    pub beta: f64,
    /// Penalty on the average positive competition
    pub gamma: f64,
    /// Weight of the average kcat
    pub lambda: f64,
    /// Penalty per member
    pub mu: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        ScoringWeights {
            alpha: 0.2,
            beta: 0.2,
            gamma: 0.1,
            lambda: 0.35,
            mu: 0.05,
        }
    }
}

/// Weights of the single species score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MicrobeWeights {
    pub kcat: f64,
    pub environment: f64,
    pub enzyme_diversity: f64,
}

impl Default for MicrobeWeights {
    fn default() -> Self {
        MicrobeWeights {
            kcat: 0.5,
            environment: 0.4,
            enzyme_diversity: 0.1,
        }
    }
}

/// Weights of the environmental soft score dimensions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentWeights {
    pub temperature: f64,
    pub ph: f64,
    pub salinity: f64,
    pub oxygen: f64,
}

impl Default for EnvironmentWeights {
    fn default() -> Self {
        EnvironmentWeights {
            temperature: 0.35,
            ph: 0.35,
            salinity: 0.10,
            oxygen: 0.20,
        }
    }
}

/// How candidate subsets are searched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Add the best member one at a time, from every starting species
    Greedy,
    /// Score every subset with a size in range
    Exhaustive,
}

/// Parameters of the consortium search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub mode: SearchMode,
    /// Smallest subset size
    pub kmin: usize,
    /// Largest subset size
    pub kmax: usize,
    /// Number of ranked consortia to keep
    pub top_k: usize,
    /// Only the best `top_n` species by single species score enter the search
    pub top_n: usize,
    /// Every consortium must contain at least one functional (degrading) member
    pub require_functional: bool,
    /// Exhaustive search refuses to enumerate more subsets than this
    pub hard_cap: usize,
    /// Stop an exhaustive search once a size `kmax` subset reaches this score
    pub early_stop_score: Option<f64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            mode: SearchMode::Greedy,
            kmin: 2,
            kmax: 5,
            top_k: 20,
            top_n: 50,
            require_functional: true,
            hard_cap: 500_000,
            early_stop_score: None,
        }
    }
}

/// Thresholds of the decision gate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateThresholds {
    /// Minimum community stability index (mean Pianka complementarity)
    pub community_stability: f64,
    /// Minimum knockout index
    pub structural_stability: f64,
    /// Degradation rate expected from an acceptable consortium, if any
    pub degradation_target: Option<f64>,
    /// Evenness below this is raised as a caveat
    pub min_evenness: f64,
}

impl Default for GateThresholds {
    fn default() -> Self {
        GateThresholds {
            community_stability: 0.5,
            structural_stability: 0.5,
            degradation_target: None,
            min_evenness: 0.5,
        }
    }
}

/// Parameters of the stability evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
    /// Reaction blocked in the recovery test, the target reaction is used when unset
    pub critical_reaction: Option<String>,
    /// Recovery ratio needed to count as recovered
    pub recovery_floor: f64,
    /// Externally supplied recovery time, used instead of solver iterations when set
    pub recovery_time_proxy: Option<f64>,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        StabilityConfig {
            critical_reaction: None,
            recovery_floor: 0.5,
            recovery_time_proxy: None,
        }
    }
}

/// What the medium builder minimizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediumObjective {
    /// Minimize the summed import flux
    MinimizeTotalImport,
    /// Minimize the number of imported components, needs an integer capable backend
    MinimizeComponents,
}

/// Parameters of the medium builder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediumConfig {
    pub target_growth: f64,
    pub min_growth: f64,
    /// Upper limit on any single import flux
    pub max_import: f64,
    /// Exchanges which are always importable, with their import cap
    pub candidate_exchanges: IndexMap<String, f64>,
    pub objective: MediumObjective,
}

impl Default for MediumConfig {
    fn default() -> Self {
        MediumConfig {
            target_growth: 0.1,
            min_growth: 0.1,
            max_import: 20.,
            candidate_exchanges: IndexMap::from([
                ("EX_glc__D_e".to_string(), 10.),
                ("EX_o2_e".to_string(), 20.),
            ]),
            objective: MediumObjective::MinimizeTotalImport,
        }
    }
}

/// Everything a consortium evaluation needs
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub solver: Configuration,
    pub scoring: ScoringWeights,
    pub microbe: MicrobeWeights,
    pub environment: EnvironmentWeights,
    pub search: SearchConfig,
    pub gate: GateThresholds,
    pub stability: StabilityConfig,
    pub medium: MediumConfig,
}

/// Read a configuration struct from a JSON file
pub fn read_json_config<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T, ConfigurationError> {
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Unable to read configuration file")]
    UnableToRead(#[from] std::io::Error),
    #[error("Unable to parse configuration")]
    UnableToParse(#[from] serde_json::Error),
}
