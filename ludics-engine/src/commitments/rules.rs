//! Rule mini-language
//!
//! ```text
//! rule    := conj ARROW literal
//! conj    := literal (AND literal)*
//! literal := NOT* atom
//! atom    := WORD+
//! ```
//!
//! `ARROW` is `->`, `=>` or `→`; `AND` is `&`, `&&`, `,`, `∧` or the word
//! `and`; `NOT` is `!`, `¬` or the word `not`. Atoms may span several words.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rule parsing failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("empty input")]
    Empty,

    #[error("missing implication arrow")]
    MissingArrow,

    #[error("more than one implication arrow")]
    ExtraArrow,

    #[error("expected an atom {0}")]
    ExpectedAtom(&'static str),

    #[error("unexpected {0}")]
    Unexpected(String),
}

/// A possibly negated atom
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Literal {
    pub atom: String,
    pub negated: bool,
}

impl Literal {
    pub fn positive(atom: impl Into<String>) -> Self {
        Self {
            atom: atom.into(),
            negated: false,
        }
    }

    pub fn negative(atom: impl Into<String>) -> Self {
        Self {
            atom: atom.into(),
            negated: true,
        }
    }

    pub fn complement(&self) -> Self {
        Self {
            atom: self.atom.clone(),
            negated: !self.negated,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "not {}", self.atom)
        } else {
            f.write_str(&self.atom)
        }
    }
}

/// Conjunction of literals implying a literal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub antecedent: Vec<Literal>,
    pub consequent: Literal,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lhs: Vec<String> = self.antecedent.iter().map(ToString::to_string).collect();
        write!(f, "{} -> {}", lhs.join(" & "), self.consequent)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Arrow,
    And,
    Not,
    Word(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Arrow => f.write_str("'->'"),
            Token::And => f.write_str("conjunction"),
            Token::Not => f.write_str("negation"),
            Token::Word(w) => write!(f, "'{w}'"),
        }
    }
}

fn is_symbol(c: char) -> bool {
    matches!(c, '&' | ',' | '∧' | '¬' | '!' | '→')
}

fn tokenize(src: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = src.chars().peekable();
    let mut word = String::new();

    let flush = |word: &mut String, tokens: &mut Vec<Token>| {
        if word.is_empty() {
            return;
        }
        let tok = match word.to_lowercase().as_str() {
            "and" => Token::And,
            "not" => Token::Not,
            _ => Token::Word(word.clone()),
        };
        tokens.push(tok);
        word.clear();
    };

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => flush(&mut word, &mut tokens),
            '-' | '=' if chars.peek() == Some(&'>') => {
                chars.next();
                flush(&mut word, &mut tokens);
                tokens.push(Token::Arrow);
            }
            c if is_symbol(c) => {
                flush(&mut word, &mut tokens);
                match c {
                    '→' => tokens.push(Token::Arrow),
                    '¬' | '!' => tokens.push(Token::Not),
                    '&' => {
                        if chars.peek() == Some(&'&') {
                            chars.next();
                        }
                        tokens.push(Token::And);
                    }
                    _ => tokens.push(Token::And),
                }
            }
            c => word.push(c),
        }
    }
    flush(&mut word, &mut tokens);
    tokens
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self, tok: &Token) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn literal(&mut self, context: &'static str) -> Result<Literal, RuleError> {
        let mut negated = false;
        while self.eat(&Token::Not) {
            negated = !negated;
        }
        let mut words = Vec::new();
        while let Some(Token::Word(w)) = self.peek() {
            words.push(w.clone());
            self.pos += 1;
        }
        if words.is_empty() {
            return Err(RuleError::ExpectedAtom(context));
        }
        Ok(Literal {
            atom: words.join(" "),
            negated,
        })
    }

    fn conjunction(&mut self) -> Result<Vec<Literal>, RuleError> {
        let mut lits = vec![self.literal("before the arrow")?];
        while self.eat(&Token::And) {
            lits.push(self.literal("after a conjunction")?);
        }
        Ok(lits)
    }

    fn finish(&self) -> Result<(), RuleError> {
        match self.peek() {
            None => Ok(()),
            Some(Token::Arrow) => Err(RuleError::ExtraArrow),
            Some(tok) => Err(RuleError::Unexpected(tok.to_string())),
        }
    }
}

/// Parse `antecedent -> consequent`
pub fn parse_rule(src: &str) -> Result<Rule, RuleError> {
    let tokens = tokenize(src);
    if tokens.is_empty() {
        return Err(RuleError::Empty);
    }
    if !tokens.contains(&Token::Arrow) {
        return Err(RuleError::MissingArrow);
    }

    let mut parser = Parser { tokens, pos: 0 };
    let antecedent = parser.conjunction()?;
    if !parser.eat(&Token::Arrow) {
        return Err(match parser.peek() {
            Some(tok) => RuleError::Unexpected(tok.to_string()),
            None => RuleError::MissingArrow,
        });
    }
    let consequent = parser.literal("after the arrow")?;
    parser.finish()?;
    Ok(Rule {
        antecedent,
        consequent,
    })
}

/// Parse a single fact label such as `not traffic_good`
pub fn parse_literal(src: &str) -> Result<Literal, RuleError> {
    let tokens = tokenize(src);
    if tokens.is_empty() {
        return Err(RuleError::Empty);
    }
    let mut parser = Parser { tokens, pos: 0 };
    let lit = parser.literal("in fact")?;
    parser.finish()?;
    Ok(lit)
}
