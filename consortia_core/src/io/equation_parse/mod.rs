//! Module for parsing reaction equation strings such as `"2 a_c + b_c -> c_c"`

use thiserror::Error;

use crate::io::equation_parse::lexer::LexerError;
use crate::io::equation_parse::parser::ParseError;
pub use crate::io::equation_parse::parser::ParsedEquation;
pub use crate::io::equation_parse::token::Direction;

mod lexer;
pub mod parser;
mod token;

/// Parse a reaction equation into a stoichiometry and a direction
///
/// # Parameters
/// - `input`: &str representing the reaction, e.g. `"dbp_c + 2 h2o_c -> pht_c + 2 butoh_c"`
///
/// # Returns
/// Parse result which is
/// - `Ok`: The net stoichiometry (negative for reactants) and the arrow direction
/// - `Err`: The EquationParseError describing the issue with the equation
///
/// # Examples
/// ```rust
/// use consortia_core::io::equation_parse::{parse_equation, Direction};
/// let parsed = parse_equation("2 a_c + b_c <=> c_c").unwrap();
/// assert_eq!(parsed.stoichiometry["a_c"], -2.0);
/// assert_eq!(parsed.direction, Direction::Reversible);
/// ```
pub fn parse_equation(input: &str) -> Result<ParsedEquation, EquationParseError> {
    let tokens = lexer::Lexer::new(input).lex()?;
    let mut parser = parser::EquationParser::new(tokens);
    Ok(parser.parse()?)
}

/// Enum representing possible lex and parse errors
#[derive(Debug, Error, PartialEq, Clone)]
pub enum EquationParseError {
    /// Lexing Error
    #[error("Error occurred during lexing of the equation: {0}")]
    LexingError(#[from] LexerError),
    /// Parsing Error
    #[error("Error occurred during parsing of the equation: {0}")]
    ParsingError(#[from] ParseError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_equation() {
        let parsed = parse_equation("dbp_c + 2 h2o_c -> pht_c + 2 butoh_c").unwrap();
        assert_eq!(parsed.direction, Direction::Forward);
        assert_eq!(parsed.stoichiometry.len(), 4);
        assert_eq!(parsed.stoichiometry["dbp_c"], -1.);
        assert_eq!(parsed.stoichiometry["h2o_c"], -2.);
        assert_eq!(parsed.stoichiometry["butoh_c"], 2.);
    }

    #[test]
    fn test_one_sided_and_net() {
        let parsed = parse_equation("pht_e <-> ").unwrap();
        assert_eq!(parsed.direction, Direction::Reversible);
        assert_eq!(parsed.stoichiometry["pht_e"], -1.);

        // h_c on both sides nets out to one produced
        let parsed = parse_equation("h_c + a_c <- 2 h_c + b_c").unwrap();
        assert_eq!(parsed.direction, Direction::Backward);
        assert_eq!(parsed.stoichiometry["h_c"], 1.);
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            parse_equation("a_c + b_c"),
            Err(EquationParseError::ParsingError(ParseError::MissingArrow))
        );
        assert_eq!(
            parse_equation("a_c -> a_c"),
            Err(EquationParseError::ParsingError(ParseError::EmptyEquation))
        );
        assert!(matches!(
            parse_equation("a_c + -> b_c"),
            Err(EquationParseError::ParsingError(ParseError::ExpectedMetabolite(_)))
        ));
        assert!(matches!(
            parse_equation("0 a_c -> b_c"),
            Err(EquationParseError::ParsingError(ParseError::NonPositiveCoefficient(_)))
        ));
        assert!(matches!(
            parse_equation("a_c -> b_c c_c"),
            Err(EquationParseError::ParsingError(ParseError::EarlyTermination))
        ));
    }
}
