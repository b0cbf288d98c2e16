//! Small hand built models shared by the unit tests
//!
//! The degrader takes up dibutyl phthalate (`dbp`), cleaves it into a biomass precursor and
//! acetate, and secretes the acetate. The cross feeder grows on acetate plus glucose, so the
//! pair forms a simple commensal community.
use indexmap::IndexMap;

use crate::consortium::environment::{EnvironmentTolerance, OxygenTolerance, SiteConditions, ToleranceRange};
use crate::consortium::interaction::{InteractionLookup, InteractionRow, InteractionSource};
use crate::consortium::{Role, Species, SpeciesBuilder};
use crate::metabolic_model::metabolite::Metabolite;
use crate::metabolic_model::model::Model;
use crate::metabolic_model::reaction::{Reaction, ReactionBuilder};

pub(crate) fn reaction(id: &str, stoichiometry: &[(&str, f64)], lb: f64, ub: f64) -> Reaction {
    ReactionBuilder::default()
        .id(id)
        .metabolites(
            stoichiometry
                .iter()
                .map(|(met, coef)| (met.to_string(), *coef))
                .collect::<IndexMap<String, f64>>(),
        )
        .lower_bound(Some(lb))
        .upper_bound(Some(ub))
        .build()
        .unwrap()
}

pub(crate) fn model_from(id: &str, metabolites: &[(&str, &str)], reactions: Vec<Reaction>, objective: &str) -> Model {
    let mut model = Model::new_empty();
    model.id = Some(id.to_string());
    for (met, compartment) in metabolites {
        model.add_metabolite(Metabolite::new(met, compartment));
    }
    for rxn in reactions {
        model.add_reaction(rxn);
    }
    model.set_objective(objective);
    model
}

/// Degrades dbp through `DBPH`, growth needs one precursor and half a glucose
pub(crate) fn degrader_model() -> Model {
    model_from(
        "A",
        &[
            ("dbp_e", "e"),
            ("dbp_c", "c"),
            ("glc_e", "e"),
            ("glc_c", "c"),
            ("bp_c", "c"),
            ("ac_c", "c"),
            ("ac_e", "e"),
        ],
        vec![
            reaction("EX_dbp_e", &[("dbp_e", -1.)], -10., 1000.),
            reaction("EX_glc_e", &[("glc_e", -1.)], -10., 1000.),
            reaction("EX_ac_e", &[("ac_e", -1.)], 0., 1000.),
            reaction("DBPt", &[("dbp_e", -1.), ("dbp_c", 1.)], 0., 1000.),
            reaction("GLCt", &[("glc_e", -1.), ("glc_c", 1.)], 0., 1000.),
            reaction("DBPH", &[("dbp_c", -1.), ("bp_c", 1.), ("ac_c", 1.)], 0., 1000.),
            reaction("ACt", &[("ac_c", -1.), ("ac_e", 1.)], 0., 1000.),
            reaction("BIOMASS_A", &[("bp_c", -1.), ("glc_c", -0.5)], 0., 1000.),
        ],
        "BIOMASS_A",
    )
}

/// Grows on acetate and glucose in equal parts
pub(crate) fn cross_feeder_model() -> Model {
    model_from(
        "B",
        &[("ac_e", "e"), ("ac_c", "c"), ("glc_e", "e"), ("glc_c", "c")],
        vec![
            reaction("EX_ac_e", &[("ac_e", -1.)], -10., 1000.),
            reaction("EX_glc_e", &[("glc_e", -1.)], -10., 1000.),
            reaction("ACt2r", &[("ac_e", -1.), ("ac_c", 1.)], 0., 1000.),
            reaction("GLCt", &[("glc_e", -1.), ("glc_c", 1.)], 0., 1000.),
            reaction("BIOMASS_B", &[("ac_c", -1.), ("glc_c", -1.)], 0., 1000.),
        ],
        "BIOMASS_B",
    )
}

/// Like the cross feeder, but is forced to grow and needs a vitamin nobody supplies
pub(crate) fn auxotroph_model() -> Model {
    model_from(
        "C",
        &[("glc_e", "e"), ("glc_c", "c"), ("vit_e", "e"), ("vit_c", "c")],
        vec![
            reaction("EX_glc_e", &[("glc_e", -1.)], -10., 1000.),
            reaction("EX_vit_e", &[("vit_e", -1.)], -10., 1000.),
            reaction("GLCt", &[("glc_e", -1.), ("glc_c", 1.)], 0., 1000.),
            reaction("VITt", &[("vit_e", -1.), ("vit_c", 1.)], 0., 1000.),
            reaction("BIOMASS_C", &[("glc_c", -1.), ("vit_c", -0.1)], 1., 1000.),
        ],
        "BIOMASS_C",
    )
}

/// Medium for the degrader / cross feeder pair, glucose is the limiting nutrient
pub(crate) fn pair_medium() -> IndexMap<String, f64> {
    IndexMap::from([("EX_glc_e".to_string(), 5.), ("EX_dbp_e".to_string(), 10.)])
}

/// Two functional species and one helper, all comfortable at [`tolerant_site`]
pub(crate) fn species_pool() -> Vec<Species> {
    let tolerant = EnvironmentTolerance {
        temperature: Some(ToleranceRange::new(20., 40., Some(30.))),
        oxygen: Some(OxygenTolerance::Tolerant),
        ..EnvironmentTolerance::default()
    };
    vec![
        SpeciesBuilder::default()
            .id("A")
            .role(Role::Functional)
            .kcat_max(Some(10.))
            .enzyme_diversity(Some(3.))
            .environment(tolerant.clone())
            .build()
            .unwrap(),
        SpeciesBuilder::default()
            .id("B")
            .role(Role::Functional)
            .kcat_max(Some(2.))
            .enzyme_diversity(Some(1.))
            .environment(tolerant.clone())
            .build()
            .unwrap(),
        SpeciesBuilder::default()
            .id("C")
            .role(Role::Complementary)
            .environment(tolerant)
            .build()
            .unwrap(),
    ]
}

pub(crate) fn tolerant_site() -> SiteConditions {
    SiteConditions {
        temperature: Some(30.),
        oxygen: Some(OxygenTolerance::Tolerant),
        ..SiteConditions::default()
    }
}

pub(crate) fn provided_lookup() -> InteractionLookup {
    InteractionLookup::from_provided(&[
        InteractionRow::new("A", "B", 0.5, 0.2, InteractionSource::Provided),
        InteractionRow::new("A", "C", 0.1, 0.7, InteractionSource::Provided),
        InteractionRow::new("B", "C", 0.2, 0.6, InteractionSource::Provided),
    ])
}

pub(crate) fn assert_close(actual: f64, expected: f64, tolerance: f64) {
    assert!(
        (actual - expected).abs() < tolerance,
        "expected {expected}, got {actual}"
    );
}
