//! Restricted arithmetic evaluator.
//!
//! Accepts numeric literals, `+ - * /`, exponentiation (`^` or `**`), unary
//! signs and parentheses. There are no names, calls or member access in the
//! grammar, so crafted input can only ever produce a number or a `CalcError`.
//!
//! ```text
//! expression := term (('+' | '-') term)*
//! term       := unary (('*' | '/') unary)*
//! unary      := ('+' | '-') unary | power
//! power      := primary (('^' | '**') unary)?
//! primary    := number | '(' expression ')'
//! ```
//!
//! Exponentiation binds tighter than a leading sign and is right associative,
//! so `-2^2 == -4` and `2^3^2 == 512`.

use std::fmt;

use thiserror::Error;

use crate::errors::AgentError;

pub const MAX_EXPRESSION_CHARS: usize = 1_000;
const MAX_NESTING_DEPTH: usize = 64;
const TOOL_NAME: &str = "calculator";

#[derive(Clone, Debug, Error, PartialEq)]
pub enum CalcError {
    #[error("expression is empty")]
    Empty,
    #[error("expression exceeds {0} characters")]
    TooLong(usize),
    #[error("names are not allowed in expressions (found `{0}`)")]
    Identifier(String),
    #[error("{0} is not allowed in expressions")]
    Forbidden(&'static str),
    #[error("unexpected character `{ch}` at position {position}")]
    UnexpectedCharacter { ch: char, position: usize },
    #[error("invalid number literal `{0}`")]
    InvalidNumber(String),
    #[error("unexpected {found} at position {position}")]
    UnexpectedToken { found: String, position: usize },
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unbalanced parentheses")]
    UnbalancedParentheses,
    #[error("expression is nested too deeply")]
    TooDeep,
    #[error("division by zero")]
    DivisionByZero,
    #[error("result is not a finite number")]
    NonFinite,
}

impl CalcError {
    /// Input that tries to step outside the arithmetic grammar, as opposed to
    /// well-intentioned arithmetic that cannot be computed.
    pub fn is_rejected_input(&self) -> bool {
        matches!(
            self,
            Self::Empty
                | Self::TooLong(_)
                | Self::Identifier(_)
                | Self::Forbidden(_)
                | Self::UnexpectedCharacter { .. }
                | Self::TooDeep
        )
    }
}

impl From<CalcError> for AgentError {
    fn from(error: CalcError) -> Self {
        if error.is_rejected_input() {
            AgentError::Validation(error.to_string())
        } else {
            AgentError::ToolExecution { tool: TOOL_NAME.to_string(), message: error.to_string() }
        }
    }
}

pub fn evaluate(expression: &str) -> Result<f64, CalcError> {
    let trimmed = expression.trim();
    if trimmed.is_empty() {
        return Err(CalcError::Empty);
    }
    if trimmed.chars().count() > MAX_EXPRESSION_CHARS {
        return Err(CalcError::TooLong(MAX_EXPRESSION_CHARS));
    }

    let tokens = tokenize(trimmed)?;
    let mut parser = Parser { tokens: &tokens, position: 0, depth: 0 };
    let value = parser.expression()?;

    match parser.peek() {
        None => Ok(value),
        Some(Token { kind: TokenKind::RightParen, .. }) => Err(CalcError::UnbalancedParentheses),
        Some(token) => {
            Err(CalcError::UnexpectedToken { found: token.kind.to_string(), position: token.position })
        }
    }
}

/// Renders integral results without a trailing `.0`.
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum TokenKind {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LeftParen,
    RightParen,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(f, "number `{}`", format_number(*value)),
            Self::Plus => f.write_str("`+`"),
            Self::Minus => f.write_str("`-`"),
            Self::Star => f.write_str("`*`"),
            Self::Slash => f.write_str("`/`"),
            Self::Caret => f.write_str("`^`"),
            Self::LeftParen => f.write_str("`(`"),
            Self::RightParen => f.write_str("`)`"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Token {
    kind: TokenKind,
    position: usize,
}

fn tokenize(input: &str) -> Result<Vec<Token>, CalcError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut index = 0;

    while index < chars.len() {
        let ch = chars[index];
        let position = index;

        if ch.is_whitespace() {
            index += 1;
            continue;
        }

        if ch.is_ascii_digit() || ch == '.' {
            if ch == '.' && !chars.get(index + 1).is_some_and(char::is_ascii_digit) {
                return Err(CalcError::Forbidden("attribute access"));
            }
            let (value, next) = lex_number(&chars, index)?;
            tokens.push(Token { kind: TokenKind::Number(value), position });
            index = next;
            continue;
        }

        if ch.is_alphabetic() || ch == '_' {
            let mut end = index;
            while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
                end += 1;
            }
            return Err(CalcError::Identifier(chars[index..end].iter().collect()));
        }

        let kind = match ch {
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' if chars.get(index + 1) == Some(&'*') => {
                index += 1;
                TokenKind::Caret
            }
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '^' => TokenKind::Caret,
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '[' | ']' => return Err(CalcError::Forbidden("indexing")),
            ',' => return Err(CalcError::Forbidden("argument lists")),
            '=' | ';' => return Err(CalcError::Forbidden("statements")),
            '\'' | '"' => return Err(CalcError::Forbidden("string literals")),
            other => return Err(CalcError::UnexpectedCharacter { ch: other, position }),
        };
        tokens.push(Token { kind, position });
        index += 1;
    }

    Ok(tokens)
}

fn lex_number(chars: &[char], start: usize) -> Result<(f64, usize), CalcError> {
    let mut end = start;
    let mut seen_dot = false;

    while end < chars.len() {
        match chars[end] {
            '0'..='9' => end += 1,
            '.' if !seen_dot => {
                seen_dot = true;
                end += 1;
            }
            _ => break,
        }
    }

    if end < chars.len() && matches!(chars[end], 'e' | 'E') {
        let mut exponent_end = end + 1;
        if exponent_end < chars.len() && matches!(chars[exponent_end], '+' | '-') {
            exponent_end += 1;
        }
        let digits_start = exponent_end;
        while exponent_end < chars.len() && chars[exponent_end].is_ascii_digit() {
            exponent_end += 1;
        }
        if exponent_end > digits_start {
            end = exponent_end;
        }
    }

    let literal: String = chars[start..end].iter().collect();
    if end < chars.len() && chars[end] == '.' {
        if chars.get(end + 1).is_some_and(|next| next.is_alphabetic() || *next == '_') {
            return Err(CalcError::Forbidden("attribute access"));
        }
        let mut tail = end;
        while tail < chars.len() && (chars[tail] == '.' || chars[tail].is_ascii_digit()) {
            tail += 1;
        }
        return Err(CalcError::InvalidNumber(chars[start..tail].iter().collect()));
    }

    literal
        .parse::<f64>()
        .map(|value| (value, end))
        .map_err(|_| CalcError::InvalidNumber(literal))
}

struct Parser<'a> {
    tokens: &'a [Token],
    position: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.position).copied()
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.peek();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn descend(&mut self) -> Result<(), CalcError> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(CalcError::TooDeep);
        }
        Ok(())
    }

    fn expression(&mut self) -> Result<f64, CalcError> {
        let mut value = self.term()?;
        while let Some(token) = self.peek() {
            match token.kind {
                TokenKind::Plus => {
                    self.next();
                    value = finite(value + self.term()?)?;
                }
                TokenKind::Minus => {
                    self.next();
                    value = finite(value - self.term()?)?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, CalcError> {
        let mut value = self.unary()?;
        while let Some(token) = self.peek() {
            match token.kind {
                TokenKind::Star => {
                    self.next();
                    value = finite(value * self.unary()?)?;
                }
                TokenKind::Slash => {
                    self.next();
                    let divisor = self.unary()?;
                    if divisor == 0.0 {
                        return Err(CalcError::DivisionByZero);
                    }
                    value = finite(value / divisor)?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<f64, CalcError> {
        match self.peek().map(|token| token.kind) {
            Some(TokenKind::Plus) => {
                self.next();
                self.descend()?;
                let value = self.unary();
                self.depth -= 1;
                value
            }
            Some(TokenKind::Minus) => {
                self.next();
                self.descend()?;
                let value = self.unary().map(|value| -value);
                self.depth -= 1;
                value
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<f64, CalcError> {
        let base = self.primary()?;
        if matches!(self.peek().map(|token| token.kind), Some(TokenKind::Caret)) {
            self.next();
            self.descend()?;
            let exponent = self.unary();
            self.depth -= 1;
            return finite(base.powf(exponent?));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<f64, CalcError> {
        let token = self.next().ok_or(CalcError::UnexpectedEnd)?;
        match token.kind {
            TokenKind::Number(value) => Ok(value),
            TokenKind::LeftParen => {
                self.descend()?;
                let value = self.expression()?;
                self.depth -= 1;
                match self.next() {
                    Some(Token { kind: TokenKind::RightParen, .. }) => Ok(value),
                    Some(token) => Err(CalcError::UnexpectedToken {
                        found: token.kind.to_string(),
                        position: token.position,
                    }),
                    None => Err(CalcError::UnbalancedParentheses),
                }
            }
            TokenKind::RightParen if self.position == 1 => Err(CalcError::UnbalancedParentheses),
            other => {
                Err(CalcError::UnexpectedToken { found: other.to_string(), position: token.position })
            }
        }
    }
}

fn finite(value: f64) -> Result<f64, CalcError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(CalcError::NonFinite)
    }
}
