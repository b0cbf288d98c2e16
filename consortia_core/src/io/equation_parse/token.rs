//! Module providing Token struct for lexing

/// Represents Tokens in a reaction equation
#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    Identifier(String),
    Number(f64),
    Plus,
    Arrow(Direction),
    Eof,
}

/// Which way a reaction equation may run
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum Direction {
    /// `->`, `-->` or `=>`, left to right only
    Forward,
    /// `<-`, `<--` or `<=`, right to left only
    Backward,
    /// `<->`, `<=>` or `<-->`
    Reversible,
}
