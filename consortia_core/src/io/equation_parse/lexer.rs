//! Lex a reaction equation string into a series of tokens for later parsing
use thiserror::Error;

use crate::io::equation_parse::token::{Direction, Token};

pub struct Lexer {
    source: Vec<char>,
    tokens: Vec<Token>,
    start: usize,
    current: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            source: source.chars().collect(),
            tokens: Vec::new(),
            start: 0,
            current: 0,
        }
    }

    pub fn lex(mut self) -> Result<Vec<Token>, LexerError> {
        while !self.is_at_end() {
            self.start = self.current;
            self.scan_token()?;
        }

        self.tokens.push(Token::Eof);
        Ok(self.tokens)
    }

    fn scan_token(&mut self) -> Result<(), LexerError> {
        let c: char = self.advance();
        match c {
            '+' => self.add_token(Token::Plus),
            '-' | '=' | '<' => self.read_arrow()?,
            // Identifiers and coefficients, ids like 10fthf_c start with a digit
            c if Lexer::is_identifier_char(c) => self.read_word(),
            // Whitespace
            ' ' | '\r' | '\n' | '\t' => {}
            _ => return Err(LexerError::InvalidCharacter(c, self.start)),
        };
        Ok(())
    }

    fn advance(&mut self) -> char {
        let char_at_current = self.source[self.current];
        self.current += 1;
        char_at_current
    }

    fn read_arrow(&mut self) -> Result<(), LexerError> {
        while matches!(self.peek(), '-' | '=' | '<' | '>') {
            self.advance();
        }
        let text: String = self.source[self.start..self.current].iter().collect();
        let direction = match text.as_str() {
            "->" | "-->" | "=>" => Direction::Forward,
            "<-" | "<--" | "<=" => Direction::Backward,
            "<->" | "<=>" | "<-->" => Direction::Reversible,
            _ => return Err(LexerError::InvalidArrow(text)),
        };
        self.add_token(Token::Arrow(direction));
        Ok(())
    }

    fn read_word(&mut self) {
        while Lexer::is_identifier_char(self.peek()) {
            self.advance();
        }

        let text: String = self.source[self.start..self.current].iter().collect();
        match text.parse::<f64>() {
            Ok(number) => self.add_token(Token::Number(number)),
            Err(_) => self.add_token(Token::Identifier(text)),
        }
    }

    fn is_identifier_char(c: char) -> bool {
        c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '[' | ']' | '(' | ')' | ':')
    }

    fn peek(&self) -> char {
        if self.is_at_end() {
            return '\0';
        }
        self.source[self.current]
    }

    fn add_token(&mut self, token: Token) {
        self.tokens.push(token);
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }
}

#[derive(Debug, Error, PartialEq, Clone)]
pub enum LexerError {
    #[error("Invalid character {0:?} at position {1}")]
    InvalidCharacter(char, usize),
    #[error("Invalid reaction arrow {0:?}")]
    InvalidArrow(String),
}
