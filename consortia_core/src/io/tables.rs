//! CSV artifact tables
//!
//! Column names are fixed, downstream consumers read these files by header. Every table writes
//! its header even when it has no rows. Ordered member lists are joined with `;`.
use std::path::Path;

use csv::{ReaderBuilder, Writer, WriterBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consortium::interaction::{InteractionRow, InteractionSource};
use crate::consortium::scoring::{ConsortiumScore, MemberContribution, SpeciesScore};
use crate::consortium::Role;
use crate::medium::MediumRow;

const MEMBER_SEPARATOR: &str = ";";

/// A row type of one artifact table
trait TableRow: Serialize {
    const HEADER: &'static [&'static str];
}

#[derive(Serialize)]
struct CandidateRow<'a> {
    species: &'a str,
    role: Role,
    env_soft_score: f64,
    pass_filter: bool,
}

impl TableRow for CandidateRow<'_> {
    const HEADER: &'static [&'static str] = &["species", "role", "env_soft_score", "pass_filter"];
}

#[derive(Serialize)]
struct SpeciesScoreRow<'a> {
    species: &'a str,
    kcat_max: Option<f64>,
    env_soft_score: f64,
    enzyme_diversity: Option<f64>,
    #[serde(rename = "S_microbe")]
    s_microbe: f64,
}

impl TableRow for SpeciesScoreRow<'_> {
    const HEADER: &'static [&'static str] = &["species", "kcat_max", "env_soft_score", "enzyme_diversity", "S_microbe"];
}

#[derive(Serialize, Deserialize)]
struct InteractionTableRow {
    #[serde(rename = "species_A")]
    species_a: String,
    #[serde(rename = "species_B")]
    species_b: String,
    competition: f64,
    complementarity: f64,
    #[serde(default)]
    delta: Option<f64>,
    #[serde(default)]
    source: Option<InteractionSource>,
}

impl TableRow for InteractionTableRow {
    const HEADER: &'static [&'static str] = &[
        "species_A",
        "species_B",
        "competition",
        "complementarity",
        "delta",
        "source",
    ];
}

#[derive(Serialize)]
struct ConsortiumRow {
    members: String,
    #[serde(rename = "S_consort")]
    s_consort: f64,
    avg_kcat: f64,
    avg_delta: f64,
    avg_competition: f64,
    size: usize,
}

impl TableRow for ConsortiumRow {
    const HEADER: &'static [&'static str] = &["members", "S_consort", "avg_kcat", "avg_delta", "avg_competition", "size"];
}

#[derive(Serialize)]
struct ContributionRow<'a> {
    species: &'a str,
    marginal_score_contribution: f64,
    rank: usize,
}

impl TableRow for ContributionRow<'_> {
    const HEADER: &'static [&'static str] = &["species", "marginal_score_contribution", "rank"];
}

#[derive(Serialize)]
struct MediumTableRow<'a> {
    reaction: &'a str,
    flux: f64,
}

impl TableRow for MediumTableRow<'_> {
    const HEADER: &'static [&'static str] = &["reaction", "flux"];
}

fn open_writer(path: &Path) -> Result<Writer<std::fs::File>, TableError> {
    WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|err| TableError::CsvError(path.display().to_string(), err))
}

fn write_rows<T, I>(path: &Path, rows: I) -> Result<(), TableError>
where
    T: TableRow,
    I: IntoIterator<Item = T>,
{
    let context = || path.display().to_string();
    let mut writer = open_writer(path)?;
    writer
        .write_record(T::HEADER)
        .map_err(|err| TableError::CsvError(context(), err))?;
    for row in rows {
        writer.serialize(row).map_err(|err| TableError::CsvError(context(), err))?;
    }
    writer.flush().map_err(|err| TableError::FileIO(context(), err))?;
    Ok(())
}

/// Write the candidate species table: `species, role, env_soft_score, pass_filter`
pub fn write_candidate_table<P: AsRef<Path>>(path: P, scores: &[SpeciesScore]) -> Result<(), TableError> {
    write_rows(
        path.as_ref(),
        scores.iter().map(|s| CandidateRow {
            species: &s.species,
            role: s.role,
            env_soft_score: s.env_soft_score,
            pass_filter: s.pass_filter,
        }),
    )
}

/// Write the single species score table: `species, kcat_max, env_soft_score, enzyme_diversity, S_microbe`
pub fn write_species_score_table<P: AsRef<Path>>(path: P, scores: &[SpeciesScore]) -> Result<(), TableError> {
    write_rows(
        path.as_ref(),
        scores.iter().map(|s| SpeciesScoreRow {
            species: &s.species,
            kcat_max: s.kcat_max,
            env_soft_score: s.env_soft_score,
            enzyme_diversity: s.enzyme_diversity,
            s_microbe: s.s_microbe,
        }),
    )
}

/// Write the pairwise interaction table
pub fn write_interaction_table<'a, P, I>(path: P, rows: I) -> Result<(), TableError>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = &'a InteractionRow>,
{
    write_rows(
        path.as_ref(),
        rows.into_iter().map(|r| InteractionTableRow {
            species_a: r.species_a.clone(),
            species_b: r.species_b.clone(),
            competition: r.competition,
            complementarity: r.complementarity,
            delta: Some(r.delta),
            source: Some(r.source),
        }),
    )
}

/// Read a pairwise interaction table
///
/// `delta` is recomputed from the two scores and rows without a `source` are taken as
/// provided.
pub fn read_interaction_table<P: AsRef<Path>>(path: P) -> Result<Vec<InteractionRow>, TableError> {
    let path = path.as_ref();
    let context = || path.display().to_string();
    let mut reader = ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|err| TableError::CsvError(context(), err))?;
    reader
        .deserialize::<InteractionTableRow>()
        .map(|row| {
            let row = row.map_err(|err| TableError::CsvError(context(), err))?;
            Ok(InteractionRow::new(
                &row.species_a,
                &row.species_b,
                row.competition,
                row.complementarity,
                row.source.unwrap_or(InteractionSource::Provided),
            ))
        })
        .collect()
}

/// Write the optimal consortium table, best consortium first
pub fn write_consortium_table<P: AsRef<Path>>(path: P, ranked: &[ConsortiumScore]) -> Result<(), TableError> {
    write_rows(
        path.as_ref(),
        ranked.iter().map(|c| ConsortiumRow {
            members: c.members.join(MEMBER_SEPARATOR),
            s_consort: c.s_consort,
            avg_kcat: c.avg_kcat,
            avg_delta: c.avg_delta,
            avg_competition: c.avg_competition,
            size: c.size,
        }),
    )
}

/// Write the member contribution ranking
pub fn write_contribution_table<P: AsRef<Path>>(path: P, contributions: &[MemberContribution]) -> Result<(), TableError> {
    write_rows(
        path.as_ref(),
        contributions.iter().map(|c| ContributionRow {
            species: &c.species,
            marginal_score_contribution: c.marginal_score_contribution,
            rank: c.rank,
        }),
    )
}

/// Write the recommended medium, the flux column is the suggested import bound
pub fn write_medium_table<P: AsRef<Path>>(path: P, rows: &[MediumRow]) -> Result<(), TableError> {
    write_rows(
        path.as_ref(),
        rows.iter().map(|r| MediumTableRow {
            reaction: &r.reaction,
            flux: r.suggested_upper_bound,
        }),
    )
}

#[derive(Error, Debug)]
pub enum TableError {
    #[error("Failed to process CSV file '{0}': {1}")]
    CsvError(String, #[source] csv::Error),
    #[error("I/O error for file '{0}': {1}")]
    FileIO(String, #[source] std::io::Error),
}

#[cfg(test)]
mod tables_tests {
    use super::*;
    use crate::configuration::{EnvironmentWeights, MicrobeWeights, ScoringWeights};
    use crate::consortium::scoring::{score_members, score_species};
    use crate::test_utils::{assert_close, provided_lookup, species_pool, tolerant_site};
    use std::fs;

    fn lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path).unwrap().lines().map(String::from).collect()
    }

    #[test]
    fn species_tables() {
        let dir = tempfile::tempdir().unwrap();
        let scores = score_species(
            &species_pool(),
            &tolerant_site(),
            &MicrobeWeights::default(),
            &EnvironmentWeights::default(),
        )
        .unwrap();

        let candidates = dir.path().join("candidates.csv");
        write_candidate_table(&candidates, &scores).unwrap();
        let candidates = lines(&candidates);
        assert_eq!(candidates[0], "species,role,env_soft_score,pass_filter");
        assert_eq!(candidates.len(), 4);
        assert!(candidates[1].starts_with("A,functional,"));
        assert!(candidates[3].starts_with("C,complementary,"));
        assert!(candidates[1].ends_with(",true"));

        let species = dir.path().join("species.csv");
        write_species_score_table(&species, &scores).unwrap();
        let species = lines(&species);
        assert_eq!(species[0], "species,kcat_max,env_soft_score,enzyme_diversity,S_microbe");
        // complementary species carry no kinetics
        assert!(species[3].starts_with("C,,"));
    }

    #[test]
    fn consortium_tables() {
        let dir = tempfile::tempdir().unwrap();
        let scores = score_species(
            &species_pool(),
            &tolerant_site(),
            &MicrobeWeights::default(),
            &EnvironmentWeights::default(),
        )
        .unwrap();
        let lookup = provided_lookup();
        let best = score_members(&["A", "C"], &scores, &lookup, &ScoringWeights::default()).unwrap();

        let consortia = dir.path().join("consortia.csv");
        write_consortium_table(&consortia, &[best]).unwrap();
        let consortia = lines(&consortia);
        assert_eq!(consortia[0], "members,S_consort,avg_kcat,avg_delta,avg_competition,size");
        assert!(consortia[1].starts_with("A;C,"));
        assert!(consortia[1].ends_with(",2"));

        let contributions = dir.path().join("contributions.csv");
        write_contribution_table(
            &contributions,
            &[MemberContribution {
                species: "A".to_string(),
                marginal_score_contribution: 0.75,
                rank: 1,
            }],
        )
        .unwrap();
        assert_eq!(lines(&contributions), vec!["species,marginal_score_contribution,rank", "A,0.75,1"]);
    }

    #[test]
    fn interaction_table_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("interactions.csv");
        let lookup = provided_lookup();
        write_interaction_table(&path, lookup.rows()).unwrap();
        assert_eq!(
            lines(&path)[0],
            "species_A,species_B,competition,complementarity,delta,source"
        );

        let rows = read_interaction_table(&path).unwrap();
        assert_eq!(rows.len(), lookup.len());
        let ac = rows.iter().find(|r| r.species_a == "A" && r.species_b == "C").unwrap();
        assert_close(ac.delta, 0.6, 1e-12);
        assert_eq!(ac.source, InteractionSource::Provided);
    }

    #[test]
    fn provider_interaction_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("provider.csv");
        fs::write(&path, "species_A, species_B, competition, complementarity\nX, Y, 0.25, 0.5\n").unwrap();
        let rows = read_interaction_table(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_close(rows[0].delta, 0.25, 1e-12);

        assert!(matches!(
            read_interaction_table(dir.path().join("missing.csv")),
            Err(TableError::CsvError(_, _))
        ));
    }

    #[test]
    fn empty_tables_keep_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("medium.csv");
        write_medium_table(&path, &[]).unwrap();
        assert_eq!(lines(&path), vec!["reaction,flux"]);

        write_medium_table(
            &path,
            &[MediumRow {
                reaction: "EX_glc__D_e".to_string(),
                suggested_upper_bound: 10.,
                models_with_need: 2,
                p75: 4.5,
                max: 5.,
                mean: 4.,
            }],
        )
        .unwrap();
        assert_eq!(lines(&path), vec!["reaction,flux", "EX_glc__D_e,10.0"]);
    }
}
