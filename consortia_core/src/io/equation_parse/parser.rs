use indexmap::IndexMap;
use thiserror::Error;

use crate::io::equation_parse::token::{Direction, Token};

/*
Equation Grammar:
equation -> side ARROW side
side -> (term ("+" term)*)? ;
term -> NUMBER? IDENTIFIER ;

e.g. 2 h2o_c + dbp_c -> pht_c + 2 butoh_c
 */

/// A parsed reaction equation
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEquation {
    /// Net stoichiometry, negative for consumed metabolites
    pub stoichiometry: IndexMap<String, f64>,
    /// Direction given by the arrow
    pub direction: Direction,
}

/// Reaction equation parser
pub struct EquationParser {
    /// Vector of tokens from the equation string
    tokens: Vec<Token>,
    /// Current token being processed
    current: usize,
}

impl EquationParser {
    /// Create a new EquationParser
    pub fn new(tokens: Vec<Token>) -> EquationParser {
        EquationParser { tokens, current: 0 }
    }

    // region Parsing Functions

    /// Parse the token vector into an equation
    pub fn parse(&mut self) -> Result<ParsedEquation, ParseError> {
        let mut stoichiometry = IndexMap::new();
        self.side(-1., &mut stoichiometry)?;
        let direction = match self.advance() {
            Token::Arrow(direction) => direction,
            _ => return Err(ParseError::MissingArrow),
        };
        self.side(1., &mut stoichiometry)?;
        if !self.is_at_end() {
            // If entire expression has not been parsed, an error has occurred
            return Err(ParseError::EarlyTermination);
        }
        stoichiometry.retain(|_, coef| *coef != 0.);
        if stoichiometry.is_empty() {
            return Err(ParseError::EmptyEquation);
        }
        Ok(ParsedEquation {
            stoichiometry,
            direction,
        })
    }

    fn side(&mut self, sign: f64, stoichiometry: &mut IndexMap<String, f64>) -> Result<(), ParseError> {
        if self.is_at_end() || matches!(self.peek(), Token::Arrow(_)) {
            return Ok(());
        }
        loop {
            let (metabolite, coefficient) = self.term()?;
            *stoichiometry.entry(metabolite).or_insert(0.) += sign * coefficient;
            if !self.match_token(Token::Plus) {
                return Ok(());
            }
        }
    }

    fn term(&mut self) -> Result<(String, f64), ParseError> {
        let coefficient = match self.peek() {
            Token::Number(n) => {
                self.advance();
                if n <= 0. {
                    return Err(ParseError::NonPositiveCoefficient(n));
                }
                n
            }
            _ => 1.,
        };
        match self.advance() {
            Token::Identifier(id) => Ok((id, coefficient)),
            other => Err(ParseError::ExpectedMetabolite(format!("{:?}", other))),
        }
    }

    // endregion Parsing Functions

    // region parsing helper functions

    /// Check whether the token at the current position matches `token`,
    /// if it does advance [`self.current`] and return true, otherwise return false
    fn match_token(&mut self, token: Token) -> bool {
        if !self.is_at_end() && self.peek() == token {
            self.advance();
            return true;
        }
        false
    }

    /// Advance `self.current` one position unless at end of the token Vec, then return the
    /// previous token.
    fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            self.current += 1;
            return self.tokens[self.current - 1].clone();
        }
        Token::Eof
    }

    /// Check whether the parser is at the end of the source Vec
    fn is_at_end(&self) -> bool {
        self.peek() == Token::Eof
    }

    /// Get a copy of the current token
    fn peek(&self) -> Token {
        self.tokens.get(self.current).cloned().unwrap_or(Token::Eof)
    }

    // endregion parsing helper functions
}

/// Enum representing possible parse errors
#[derive(Debug, Error, PartialEq, Clone)]
pub enum ParseError {
    #[error("Equation has no reaction arrow")]
    MissingArrow,
    #[error("Expected a metabolite, found {0}")]
    ExpectedMetabolite(String),
    #[error("Stoichiometric coefficient {0} must be positive")]
    NonPositiveCoefficient(f64),
    #[error("Equation has no metabolites")]
    EmptyEquation,
    #[error("Tokens remain after the end of the equation")]
    EarlyTermination,
}
