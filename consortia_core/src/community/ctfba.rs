//! Cooperative trade-off flux balance analysis
//!
//! Every member's reactions are namespaced by member id. A member's exchange reactions no
//! longer face the environment, they feed a shared pool with one balance per extracellular
//! metabolite:
//!
//! `sum_i a_i * secretion_i(m) - medium(m) = 0`
//!
//! where `a_i` is the member's abundance fraction and `medium(m)` is the flux of the pool's own
//! exchange `EX_{m}__medium` (negative when the medium supplies `m`).
//!
//! Solving takes three stages for a trade-off coefficient `t`:
//! 1. maximize community growth `G = sum_i a_i * mu_i`, giving `G*`
//! 2. holding `G >= t * G*`, maximize the smallest member growth rate `z`
//! 3. holding every `mu_i >= z*` as well, maximize `G` again
//!
//! At `t = 0` the result is the most even split of growth, at `t = 1` community growth is at
//! its optimum and only the slack it leaves is shared out.
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, warn};

use crate::community::{BuiltCommunity, CommunityError, DroppedMember, Fingerprint};
use crate::configuration::Configuration;
use crate::optimize::fba::add_model_to_problem;
use crate::optimize::objective::ObjectiveSense;
use crate::optimize::problem::Problem;
use crate::optimize::solvers::{SolverError, Source};
use crate::optimize::strategy::{SolveStrategy, StrategySolution};
use crate::optimize::variable::VariableType;
use crate::optimize::{clean_value, OptimizationStatus};
use crate::utils::hashing::float_key;

const MIN_GROWTH_VARIABLE: &str = "min_member_growth";

/// Result of solving one member inside the community
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberSolution {
    pub id: String,
    pub abundance: f64,
    pub growth_rate: f64,
    /// Flux through the target reaction, `None` if the member lacks it
    pub target_flux: Option<f64>,
    /// Net secretion into the shared pool keyed by metabolite, imports are negative
    pub exchange_fluxes: IndexMap<String, f64>,
}

impl MemberSolution {
    /// Metabolites the member takes from the pool, with positive import rates
    pub fn imports(&self) -> impl Iterator<Item = (&str, f64)> {
        self.exchange_fluxes
            .iter()
            .filter(|(_, flux)| **flux < 0.)
            .map(|(met, flux)| (met.as_str(), -flux))
    }
}

/// Result of a community solve
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommunitySolution {
    pub tradeoff: f64,
    /// Abundance weighted growth rate
    pub community_growth: f64,
    pub members: Vec<MemberSolution>,
    /// Abundance weighted flux through the target reaction
    pub target_flux: f64,
    /// `target_flux * dosage`
    pub degradation_rate: f64,
    /// Flux of each pool exchange, negative when the medium supplies the metabolite
    pub medium_fluxes: IndexMap<String, f64>,
    /// Every member flux keyed by namespaced reaction id
    pub fluxes: IndexMap<String, f64>,
    /// Solver iterations summed over the stages
    pub iterations: u32,
    pub source: Source,
    pub dropped: Vec<DroppedMember>,
    pub fingerprint: Fingerprint,
}

impl CommunitySolution {
    pub fn member(&self, id: &str) -> Option<&MemberSolution> {
        self.members.iter().find(|m| m.id == id)
    }

    /// Smallest member growth rate
    pub fn min_member_growth(&self) -> f64 {
        self.members
            .iter()
            .map(|m| m.growth_rate)
            .fold(f64::INFINITY, f64::min)
    }
}

/// Variable ids of an assembled community problem
struct CommunityLayout {
    problem: Problem,
    growth: Vec<String>,
    fluxes: Vec<IndexMap<String, String>>,
    /// Per member: metabolite -> (exchange variable, metabolite coefficient)
    exchanges: Vec<IndexMap<String, (String, f64)>>,
    medium: IndexMap<String, String>,
}

fn growth_variable_id(member: &str) -> String {
    format!("growth__{}", member)
}

fn medium_variable_id(metabolite: &str) -> String {
    format!("EX_{}__medium", metabolite)
}

impl BuiltCommunity {
    /// Solve at the community's own trade-off coefficient
    pub fn solve(&self, config: &Configuration) -> Result<CommunitySolution, CommunityError> {
        self.solve_with_tradeoff(self.tradeoff(), config)
    }

    /// Solve at trade-off coefficient `tradeoff`
    ///
    /// # Returns
    /// The stage three solution, or [`CommunityError::Infeasible`] naming the members which
    /// can't be reconciled. Nothing is estimated for an infeasible community.
    pub fn solve_with_tradeoff(
        &self,
        tradeoff: f64,
        config: &Configuration,
    ) -> Result<CommunitySolution, CommunityError> {
        if !(0. ..=1.).contains(&tradeoff) {
            return Err(CommunityError::InvalidTradeoff(tradeoff));
        }
        let strategy = config.strategy();
        let layout = self.assemble(config)?;
        let growth: Vec<&str> = layout.growth.iter().map(String::as_str).collect();
        let abundances: Vec<f64> = self.members().iter().map(|m| m.abundance).collect();

        // Stage 1
        let mut problem = layout.problem.clone();
        problem.set_objective_by_id(ObjectiveSense::Maximize, &growth, &abundances)?;
        let first = match self.run_stage(&strategy, &problem) {
            Err(CommunityError::Infeasible { backend: source, .. }) => {
                return Err(CommunityError::Infeasible {
                    members: self.unreconciled_members(config),
                    backend: source,
                })
            }
            other => other?,
        };
        let best_growth = first.solution.objective_value.unwrap_or(0.);

        // Stage 2
        problem.add_new_inequality_constraint_by_id(
            "community_growth_floor",
            &growth,
            &abundances,
            tradeoff * best_growth - config.relaxation_for(best_growth),
            f64::INFINITY,
        )?;
        let mut fair = problem.clone();
        fair.add_new_variable(
            MIN_GROWTH_VARIABLE,
            None,
            VariableType::Continuous,
            f64::NEG_INFINITY,
            f64::INFINITY,
        )?;
        for (member, var) in self.member_ids().zip(growth.iter().copied()) {
            fair.add_new_inequality_constraint_by_id(
                &format!("min_member_growth__{}", member),
                &[MIN_GROWTH_VARIABLE, var],
                &[1., -1.],
                f64::NEG_INFINITY,
                0.,
            )?;
        }
        fair.set_objective_by_id(ObjectiveSense::Maximize, &[MIN_GROWTH_VARIABLE], &[1.])?;
        let second = self.run_stage(&strategy, &fair)?;
        let fair_growth = second.solution.objective_value.unwrap_or(0.);

        // Stage 3, the stage 1 objective is still set on `problem`
        for (member, var) in self.member_ids().zip(growth.iter().copied()) {
            problem.add_new_inequality_constraint_by_id(
                &format!("member_growth_floor__{}", member),
                &[var],
                &[1.],
                fair_growth - config.relaxation_for(fair_growth),
                f64::INFINITY,
            )?;
        }
        let third = self.run_stage(&strategy, &problem)?;
        debug!(
            tradeoff,
            best_growth,
            fair_growth,
            final_growth = ?third.solution.objective_value,
            "community solved"
        );

        let iterations = first.solution.iterations + second.solution.iterations + third.solution.iterations;
        let source = first.source.combine(second.source).combine(third.source);
        Ok(self.read_solution(&layout, &third, tradeoff, iterations, source, config))
    }

    /// Write every member and the shared pool into one problem
    fn assemble(&self, config: &Configuration) -> Result<CommunityLayout, CommunityError> {
        let mut problem = Problem::new_maximization();
        let mut growth = Vec::with_capacity(self.members().len());
        let mut fluxes = Vec::with_capacity(self.members().len());
        let mut exchanges = Vec::with_capacity(self.members().len());
        // metabolite -> (variables, coefficients) of the pool balance, plus the loosest
        // member import bound
        let mut pool: IndexMap<String, (Vec<String>, Vec<f64>, f64)> = IndexMap::new();

        for member in self.members() {
            let model = &member.model;
            let member_fluxes = add_model_to_problem(&mut problem, model, Some(&member.id), config)?;

            let growth_var = growth_variable_id(&member.id);
            problem.add_new_variable(
                &growth_var,
                None,
                VariableType::Continuous,
                f64::NEG_INFINITY,
                f64::INFINITY,
            )?;
            let mut vars = vec![growth_var.as_str()];
            let mut coefs = vec![-1.];
            for (rxn, coef) in &model.objective {
                if let Some(var) = member_fluxes.get(rxn) {
                    vars.push(var.as_str());
                    coefs.push(*coef);
                }
            }
            problem.add_new_equality_constraint_by_id(
                &format!("growth_definition__{}", member.id),
                &vars,
                &coefs,
                0.,
            )?;

            let mut member_exchanges = IndexMap::new();
            for rxn in model.exchanges() {
                let Some((met, coef)) = rxn.metabolites.iter().next() else {
                    continue;
                };
                let var = member_fluxes[&rxn.id].clone();
                // A flux v changes the member's copy of `met` by coef * v, the pool gains
                // the opposite, scaled by abundance
                let entry = pool
                    .entry(met.clone())
                    .or_insert_with(|| (Vec::new(), Vec::new(), 0.));
                entry.0.push(var.clone());
                entry.1.push(-coef * member.abundance);
                let import_bound = if *coef < 0. {
                    rxn.lower_bound_or(config.lower_bound) * coef.abs()
                } else {
                    -rxn.upper_bound_or(config.upper_bound) * coef
                };
                entry.2 = entry.2.min(import_bound);
                member_exchanges.insert(met.clone(), (var, *coef));
            }

            growth.push(growth_var);
            fluxes.push(member_fluxes);
            exchanges.push(member_exchanges);
        }

        let mut medium = IndexMap::with_capacity(pool.len());
        for (met, (vars, coefs, loosest_import)) in pool {
            let medium_var = medium_variable_id(&met);
            let lower_bound = match self.medium() {
                Some(medium) => -medium.get(&format!("EX_{}", met)).copied().unwrap_or(0.),
                None => loosest_import,
            };
            problem.add_new_variable(
                &medium_var,
                None,
                VariableType::Continuous,
                lower_bound.min(config.upper_bound),
                config.upper_bound,
            )?;
            let mut vars: Vec<&str> = vars.iter().map(String::as_str).collect();
            let mut coefs = coefs;
            vars.push(medium_var.as_str());
            coefs.push(-1.);
            problem.add_new_equality_constraint_by_id(
                &format!("pool_balance__{}", met),
                &vars,
                &coefs,
                0.,
            )?;
            medium.insert(met, medium_var);
        }

        Ok(CommunityLayout {
            problem,
            growth,
            fluxes,
            exchanges,
            medium,
        })
    }

    fn run_stage(
        &self,
        strategy: &SolveStrategy,
        problem: &Problem,
    ) -> Result<StrategySolution, CommunityError> {
        let result = strategy.solve(problem)?;
        match result.solution.status {
            OptimizationStatus::Infeasible => Err(CommunityError::Infeasible {
                members: self.member_ids().map(str::to_string).collect(),
                backend: result.source,
            }),
            OptimizationStatus::Unbounded => Err(CommunityError::Unbounded),
            status if !status.has_solution() => Err(CommunityError::Solver(
                SolverError::SolverFailure(format!("community solve ended with {:?}", status)),
            )),
            _ => Ok(result),
        }
    }

    /// Members which are infeasible on their own in this community's medium, or every member
    /// if each is feasible alone
    fn unreconciled_members(&self, config: &Configuration) -> Vec<String> {
        let all: Vec<String> = self.member_ids().map(str::to_string).collect();
        if all.len() < 2 {
            return all;
        }
        let strategy = config.strategy();
        let culprits: Vec<String> = self
            .member_ids()
            .filter(|id| {
                let Ok(alone) = self.restricted_to(&[*id]) else {
                    return false;
                };
                let Ok(layout) = alone.assemble(config) else {
                    return false;
                };
                let mut problem = layout.problem;
                let growth: Vec<&str> = layout.growth.iter().map(String::as_str).collect();
                if problem
                    .set_objective_by_id(ObjectiveSense::Maximize, &growth, &[1.])
                    .is_err()
                {
                    return false;
                }
                matches!(
                    alone.run_stage(&strategy, &problem),
                    Err(CommunityError::Infeasible { .. })
                )
            })
            .map(str::to_string)
            .collect();
        warn!(members = ?culprits, "community is infeasible");
        if culprits.is_empty() {
            all
        } else {
            culprits
        }
    }

    fn read_solution(
        &self,
        layout: &CommunityLayout,
        result: &StrategySolution,
        tradeoff: f64,
        iterations: u32,
        source: Source,
        config: &Configuration,
    ) -> CommunitySolution {
        let value = |var: &str| clean_value(result.solution.value(var).unwrap_or(0.), config.zero_threshold);

        let mut members = Vec::with_capacity(self.members().len());
        let mut community_growth = 0.;
        let mut target_flux = 0.;
        let mut fluxes = IndexMap::new();
        for (i, member) in self.members().iter().enumerate() {
            let growth_rate = value(&layout.growth[i]);
            community_growth += member.abundance * growth_rate;
            let member_target = self
                .target_reaction()
                .and_then(|target| layout.fluxes[i].get(target))
                .map(|var| value(var));
            if let Some(flux) = member_target {
                target_flux += member.abundance * flux;
            }
            let exchange_fluxes = layout.exchanges[i]
                .iter()
                .map(|(met, (var, coef))| (met.clone(), clean_value(-coef * value(var), config.zero_threshold)))
                .collect();
            for var in layout.fluxes[i].values() {
                fluxes.insert(var.clone(), value(var));
            }
            members.push(MemberSolution {
                id: member.id.clone(),
                abundance: member.abundance,
                growth_rate,
                target_flux: member_target,
                exchange_fluxes,
            });
        }
        let medium_fluxes = layout
            .medium
            .values()
            .map(|var| (var.clone(), value(var)))
            .collect();
        let target_flux = clean_value(target_flux, config.zero_threshold);

        CommunitySolution {
            tradeoff,
            community_growth: clean_value(community_growth, config.zero_threshold),
            members,
            target_flux,
            degradation_rate: target_flux * self.dosage(),
            medium_fluxes,
            fluxes,
            iterations,
            source,
            dropped: self.dropped().to_vec(),
            fingerprint: Fingerprint::of(&(self.fingerprint(), float_key(tradeoff))),
        }
    }
}

#[cfg(test)]
mod ctfba_tests {
    use super::*;
    use crate::community::source::InMemoryModelSource;
    use crate::community::Community;
    use crate::test_utils::{assert_close, auxotroph_model, cross_feeder_model, degrader_model, pair_medium};

    fn source() -> InMemoryModelSource {
        InMemoryModelSource::from_models([degrader_model(), cross_feeder_model(), auxotroph_model()])
    }

    fn pair() -> BuiltCommunity {
        Community::new(&[("A", 0.6), ("B", 0.4)])
            .with_target("DBPH")
            .with_medium(pair_medium())
            .with_tradeoff(0.5)
            .build(&source())
            .unwrap()
    }

    #[test]
    fn pair_grows_and_degrades() {
        let solution = pair().solve(&Configuration::default()).unwrap();
        assert!(solution.community_growth > 0.);
        assert!(solution.members.iter().all(|m| m.growth_rate > 0.));
        assert!(solution.target_flux > 0.);
        // Glucose is shared evenly at low trade-off, both grow at 5 / 0.7
        assert_close(solution.community_growth, 50. / 7., 1e-4);
        assert_close(solution.member("A").unwrap().growth_rate, 50. / 7., 1e-4);
        assert_close(solution.member("B").unwrap().growth_rate, 50. / 7., 1e-4);
        assert_close(solution.target_flux, 0.6 * 50. / 7., 1e-4);
        assert_close(solution.degradation_rate, solution.target_flux, 1e-12);
        assert_eq!(solution.source, Source::Real);
        assert!(solution.member("B").unwrap().target_flux.is_none());
    }

    #[test]
    fn cross_feeding_through_the_pool() {
        let solution = pair().solve(&Configuration::default()).unwrap();
        let a = solution.member("A").unwrap();
        let b = solution.member("B").unwrap();
        // A secretes one acetate per dbp, B takes up what it needs from the pool
        assert_close(a.exchange_fluxes["ac_e"], a.growth_rate, 1e-4);
        assert_close(b.exchange_fluxes["ac_e"], -b.growth_rate, 1e-4);
        assert_eq!(b.imports().count(), 2);
        assert_close(solution.medium_fluxes["EX_glc_e__medium"], -5., 1e-4);
        assert!(solution.fluxes.contains_key("DBPH__A"));
    }

    #[test]
    fn tradeoff_is_monotone() {
        let built = pair();
        let config = Configuration::default();
        let mut last_growth = f64::NEG_INFINITY;
        let mut last_min = f64::INFINITY;
        for tradeoff in [0., 0.25, 0.5, 0.75, 0.95, 1.] {
            let solution = built.solve_with_tradeoff(tradeoff, &config).unwrap();
            assert!(solution.community_growth >= last_growth - 1e-5);
            assert!(solution.min_member_growth() <= last_min + 1e-5);
            last_growth = solution.community_growth;
            last_min = solution.min_member_growth();
        }
        let efficient = built.solve_with_tradeoff(1., &config).unwrap();
        assert_close(efficient.community_growth, 8., 1e-4);
        assert_close(efficient.member("A").unwrap().growth_rate, 10., 1e-4);
        assert_close(efficient.member("B").unwrap().growth_rate, 5., 1e-4);
        let between = built.solve_with_tradeoff(0.95, &config).unwrap();
        assert_close(between.community_growth, 7.6, 1e-4);
        assert_close(between.min_member_growth(), 6., 1e-4);
    }

    #[test]
    fn infeasible_names_the_culprit() {
        let built = Community::new(&[("A", 0.5), ("C", 0.5)])
            .with_medium(pair_medium())
            .build(&source())
            .unwrap();
        assert_eq!(
            built.solve(&Configuration::default()),
            Err(CommunityError::Infeasible {
                members: vec!["C".to_string()],
                backend: Source::Real,
            })
        );
    }

    #[test]
    fn knockout_and_blocking() {
        let built = pair();
        let config = Configuration::default();
        let alone = built.without_member("B").unwrap().solve(&config).unwrap();
        // A on its own is capped by its dbp uptake
        assert_close(alone.community_growth, 10., 1e-4);

        let blocked = built
            .with_blocked_reaction(Some("A"), "DBPH")
            .unwrap()
            .solve(&config)
            .unwrap();
        assert_close(blocked.community_growth, 0., 1e-5);
        assert_close(blocked.target_flux, 0., 1e-5);
        assert_ne!(blocked.fingerprint, alone.fingerprint);
    }

    #[test]
    fn simulated_results_are_tagged() {
        let config = Configuration {
            backends: vec![crate::optimize::solvers::Backend::Simulated],
            ..Configuration::default()
        };
        let solution = pair().solve(&config).unwrap();
        assert_eq!(solution.source, Source::Simulated);
    }

    #[test]
    fn fingerprint_tracks_tradeoff() {
        let built = pair();
        let config = Configuration::default();
        let low = built.solve_with_tradeoff(0.2, &config).unwrap();
        let again = built.solve_with_tradeoff(0.2, &config).unwrap();
        let high = built.solve_with_tradeoff(0.8, &config).unwrap();
        assert_eq!(low.fingerprint, again.fingerprint);
        assert_ne!(low.fingerprint, high.fingerprint);
        assert!(matches!(
            built.solve_with_tradeoff(-0.1, &config),
            Err(CommunityError::InvalidTradeoff(_))
        ));
    }
}
