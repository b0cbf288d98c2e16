//! Multi species communities and the cooperative trade-off flux balance solver
//!
//! A [`Community`] names its members and their abundances. [`Community::build`] loads the
//! member models from a [`ModelSource`](source::ModelSource), drops members which can't be
//! used, and returns a [`BuiltCommunity`] which can be solved at any trade-off coefficient.
pub mod ctfba;
pub mod source;

use std::fmt::{Display, Formatter};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::metabolic_model::model::Model;
use crate::metabolic_model::validation::IssueSeverity;
use crate::optimize::problem::ProblemError;
use crate::optimize::solvers::{SolverError, Source};
use crate::utils::hashing::{float_key, hash_as_hex_string};

pub use crate::community::ctfba::{CommunitySolution, MemberSolution};
use crate::community::source::ModelSource;

fn default_dosage() -> f64 {
    1.
}

fn default_tradeoff() -> f64 {
    0.5
}

/// A member of a community
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityMember {
    /// Id the member's model is looked up by
    pub id: String,
    /// Relative abundance, positive, need not sum to one across the community
    pub abundance: f64,
}

/// The configuration of a community, before any model is loaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Community {
    pub members: Vec<CommunityMember>,
    /// Reaction whose flux measures pollutant degradation
    #[serde(default)]
    pub target_reaction: Option<String>,
    /// Import bounds keyed by exchange id (`EX_glc_e`), exchanges missing from the map can't
    /// import. Without a medium the member models' own exchange bounds are used.
    #[serde(default)]
    pub medium: Option<IndexMap<String, f64>>,
    /// Applied consortium quantity, multiplies the target flux into a degradation rate
    #[serde(default = "default_dosage")]
    pub dosage: f64,
    /// Trade-off coefficient in `[0, 1]`
    #[serde(default = "default_tradeoff")]
    pub tradeoff: f64,
}

impl Community {
    /// Create a community from `(id, abundance)` pairs
    pub fn new(members: &[(&str, f64)]) -> Self {
        Community {
            members: members
                .iter()
                .map(|(id, abundance)| CommunityMember {
                    id: id.to_string(),
                    abundance: *abundance,
                })
                .collect(),
            target_reaction: None,
            medium: None,
            dosage: default_dosage(),
            tradeoff: default_tradeoff(),
        }
    }

    pub fn with_target(mut self, reaction: &str) -> Self {
        self.target_reaction = Some(reaction.to_string());
        self
    }

    pub fn with_medium(mut self, medium: IndexMap<String, f64>) -> Self {
        self.medium = Some(medium);
        self
    }

    pub fn with_dosage(mut self, dosage: f64) -> Self {
        self.dosage = dosage;
        self
    }

    pub fn with_tradeoff(mut self, tradeoff: f64) -> Self {
        self.tradeoff = tradeoff;
        self
    }

    pub fn member_ids(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.id.as_str())
    }

    /// Load and check every member model
    ///
    /// Members whose model can't be found, can't be parsed, or fails validation are dropped
    /// with a warning. Building fails only if no member remains.
    pub fn build(&self, source: &dyn ModelSource) -> Result<BuiltCommunity, CommunityError> {
        if !(0. ..=1.).contains(&self.tradeoff) {
            return Err(CommunityError::InvalidTradeoff(self.tradeoff));
        }
        let mut members = Vec::with_capacity(self.members.len());
        let mut dropped = Vec::new();
        for member in &self.members {
            if !(member.abundance.is_finite() && member.abundance > 0.) {
                return Err(CommunityError::InvalidAbundance {
                    member: member.id.clone(),
                    abundance: member.abundance,
                });
            }
            if members.iter().any(|m: &BuiltMember| m.id == member.id)
                || dropped.iter().any(|d: &DroppedMember| d.id == member.id)
            {
                return Err(CommunityError::DuplicateMember(member.id.clone()));
            }
            let mut model = match source.load(&member.id) {
                Ok(model) => model,
                Err(err) => {
                    warn!(member = %member.id, %err, "dropping community member");
                    dropped.push(DroppedMember {
                        id: member.id.clone(),
                        reason: err.to_string(),
                    });
                    continue;
                }
            };
            model.normalize_external_compartments();
            let errors: Vec<String> = model
                .validate()
                .into_iter()
                .filter(|issue| issue.severity() == IssueSeverity::Error)
                .map(|issue| issue.to_string())
                .collect();
            if !errors.is_empty() {
                warn!(member = %member.id, issues = errors.len(), "dropping invalid community member");
                dropped.push(DroppedMember {
                    id: member.id.clone(),
                    reason: errors.join("; "),
                });
                continue;
            }
            members.push(BuiltMember {
                id: member.id.clone(),
                abundance: member.abundance,
                model,
            });
        }
        if members.is_empty() {
            return Err(CommunityError::MemberModelMissing { dropped });
        }

        let built = BuiltCommunity::new(
            members,
            self.target_reaction.clone(),
            self.medium.clone(),
            self.dosage,
            self.tradeoff,
            dropped,
            Vec::new(),
        );
        if let Some(target) = &built.target_reaction {
            if !built
                .members
                .iter()
                .any(|m| m.model.reactions.contains_key(target))
            {
                warn!(target = %target, "target reaction is absent from every member");
            }
        }
        debug!(
            members = built.members.len(),
            dropped = built.dropped.len(),
            fingerprint = %built.fingerprint,
            "community built"
        );
        Ok(built)
    }
}

/// Identifies the exact configuration a result was computed from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub(crate) fn of<T: std::hash::Hash>(value: &T) -> Self {
        Fingerprint(hash_as_hex_string(value))
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A member left out of a built community
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedMember {
    pub id: String,
    pub reason: String,
}

/// A member whose model was loaded and validated
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltMember {
    pub id: String,
    /// Fraction of the community, abundances of a built community sum to one
    pub abundance: f64,
    pub model: Model,
}

/// A reaction held at zero flux
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockedReaction {
    /// Member the block applies to, every member when `None`
    pub member: Option<String>,
    pub reaction: String,
}

/// A community whose member models are loaded, ready to be solved
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltCommunity {
    members: Vec<BuiltMember>,
    target_reaction: Option<String>,
    medium: Option<IndexMap<String, f64>>,
    dosage: f64,
    tradeoff: f64,
    dropped: Vec<DroppedMember>,
    blocked: Vec<BlockedReaction>,
    fingerprint: Fingerprint,
}

impl BuiltCommunity {
    fn new(
        mut members: Vec<BuiltMember>,
        target_reaction: Option<String>,
        medium: Option<IndexMap<String, f64>>,
        dosage: f64,
        tradeoff: f64,
        dropped: Vec<DroppedMember>,
        blocked: Vec<BlockedReaction>,
    ) -> Self {
        let total: f64 = members.iter().map(|m| m.abundance).sum();
        for member in &mut members {
            member.abundance /= total;
        }
        let fingerprint = Fingerprint::of(&(
            members
                .iter()
                .map(|m| (m.id.as_str(), float_key(m.abundance)))
                .collect::<Vec<_>>(),
            target_reaction.as_deref(),
            medium.as_ref().map(|medium| {
                medium
                    .iter()
                    .map(|(rxn, bound)| (rxn.as_str(), float_key(*bound)))
                    .collect::<Vec<_>>()
            }),
            float_key(dosage),
            float_key(tradeoff),
            &blocked,
        ));
        BuiltCommunity {
            members,
            target_reaction,
            medium,
            dosage,
            tradeoff,
            dropped,
            blocked,
            fingerprint,
        }
    }

    pub fn members(&self) -> &[BuiltMember] {
        &self.members
    }

    pub fn member_ids(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.id.as_str())
    }

    pub fn member(&self, id: &str) -> Option<&BuiltMember> {
        self.members.iter().find(|m| m.id == id)
    }

    pub fn target_reaction(&self) -> Option<&str> {
        self.target_reaction.as_deref()
    }

    pub fn medium(&self) -> Option<&IndexMap<String, f64>> {
        self.medium.as_ref()
    }

    pub fn dosage(&self) -> f64 {
        self.dosage
    }

    pub fn tradeoff(&self) -> f64 {
        self.tradeoff
    }

    /// Members dropped while building
    pub fn dropped(&self) -> &[DroppedMember] {
        &self.dropped
    }

    pub fn blocked(&self) -> &[BlockedReaction] {
        &self.blocked
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// The same community without one member, remaining abundances are renormalized
    pub fn without_member(&self, id: &str) -> Result<BuiltCommunity, CommunityError> {
        if self.member(id).is_none() {
            return Err(CommunityError::UnknownMember(id.to_string()));
        }
        let members: Vec<BuiltMember> = self
            .members
            .iter()
            .filter(|m| m.id != id)
            .cloned()
            .collect();
        if members.is_empty() {
            return Err(CommunityError::MemberModelMissing {
                dropped: self.dropped.clone(),
            });
        }
        Ok(self.rebuilt(members, self.blocked.clone()))
    }

    /// Only the listed members, in community order
    pub fn restricted_to(&self, ids: &[&str]) -> Result<BuiltCommunity, CommunityError> {
        for id in ids {
            if self.member(id).is_none() {
                return Err(CommunityError::UnknownMember(id.to_string()));
            }
        }
        let members: Vec<BuiltMember> = self
            .members
            .iter()
            .filter(|m| ids.contains(&m.id.as_str()))
            .cloned()
            .collect();
        if members.is_empty() {
            return Err(CommunityError::MemberModelMissing {
                dropped: self.dropped.clone(),
            });
        }
        Ok(self.rebuilt(members, self.blocked.clone()))
    }

    /// The same community with a reaction held at zero flux
    ///
    /// # Parameters
    /// - `member`: Member to block the reaction in, or every member that has it when `None`
    /// - `reaction`: Id of the reaction to block
    pub fn with_blocked_reaction(
        &self,
        member: Option<&str>,
        reaction: &str,
    ) -> Result<BuiltCommunity, CommunityError> {
        if let Some(id) = member {
            if self.member(id).is_none() {
                return Err(CommunityError::UnknownMember(id.to_string()));
            }
        }
        let mut members = self.members.clone();
        for built in &mut members {
            if member.is_some_and(|id| id != built.id) {
                continue;
            }
            if let Some(rxn) = built.model.reactions.get_mut(reaction) {
                rxn.lower_bound = Some(0.);
                rxn.upper_bound = Some(0.);
            }
        }
        let mut blocked = self.blocked.clone();
        blocked.push(BlockedReaction {
            member: member.map(str::to_string),
            reaction: reaction.to_string(),
        });
        Ok(self.rebuilt(members, blocked))
    }

    fn rebuilt(&self, members: Vec<BuiltMember>, blocked: Vec<BlockedReaction>) -> BuiltCommunity {
        BuiltCommunity::new(
            members,
            self.target_reaction.clone(),
            self.medium.clone(),
            self.dosage,
            self.tradeoff,
            self.dropped.clone(),
            blocked,
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommunityError {
    #[error("No member model could be used ({} dropped)", .dropped.len())]
    MemberModelMissing { dropped: Vec<DroppedMember> },
    #[error("Community has no feasible flux distribution, unreconciled members: {}", .members.join(", "))]
    Infeasible {
        members: Vec<String>,
        /// Backend kind which reported the infeasibility
        backend: Source,
    },
    #[error("Community growth is unbounded")]
    Unbounded,
    #[error("Member {member} has invalid abundance {abundance}")]
    InvalidAbundance { member: String, abundance: f64 },
    #[error("Trade-off coefficient {0} is outside [0, 1]")]
    InvalidTradeoff(f64),
    #[error("Member {0} is listed more than once")]
    DuplicateMember(String),
    #[error("Member {0} is not part of the community")]
    UnknownMember(String),
    #[error("Unable to build the community problem")]
    Problem(#[from] ProblemError),
    #[error("Unable to solve the community problem")]
    Solver(#[from] SolverError),
}
