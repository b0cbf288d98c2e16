//! Metabolic model evaluation and consortium scoring for pollutant degrading microbial consortia.
//!
//! The engine curates genome scale models, recommends a shared growth medium, solves
//! communities with cooperative trade-off flux balance analysis, scores candidate consortia,
//! evaluates their ecological stability, and gates them into accept or redesign verdicts.
//! [`evaluation::evaluate_consortium`] runs the whole pipeline for one consortium,
//! [`operation::execute`] drives any single component from a JSON request.

pub mod community;
pub mod configuration;
pub mod consortium;
pub mod curation;
pub mod decision;
pub mod evaluation;
pub mod io;
pub mod medium;
pub mod metabolic_model;
pub mod operation;
pub mod optimize;
pub mod stability;
mod utils;

#[cfg(test)]
mod test_utils;
