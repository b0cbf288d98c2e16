//! Module for reading and writing Models and evaluation artifacts
pub mod equation_parse;
pub mod json;
pub mod tables;
