//! Token types for set and map notation.
//!
//! This module defines all token types produced by the lexer.

use crate::utils::location::Span;
use std::fmt;

/// A token in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// The kind of token
    pub kind: TokenKind,
    /// The source span
    pub span: Span,
    /// The lexeme (raw text)
    pub lexeme: String,
}

impl Token {
    /// Create a new token.
    pub fn new(kind: TokenKind, span: Span, lexeme: String) -> Self {
        Self { kind, span, lexeme }
    }

    /// Check if this is an EOF token.
    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }

    /// Check if this token is a comparison operator.
    pub fn is_comparison(&self) -> bool {
        self.kind.is_comparison()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_eof() {
            write!(f, "end of input")
        } else {
            write!(f, "'{}'", self.lexeme)
        }
    }
}

/// The kind of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Integer literal
    Integer,
    /// Identifier (tuple name, dimension, parameter)
    Identifier,

    /// `and` keyword
    And,
    /// `or` keyword
    Or,

    /// `[`
    LeftBracket,
    /// `]`
    RightBracket,
    /// `{`
    LeftBrace,
    /// `}`
    RightBrace,
    /// `(`
    LeftParen,
    /// `)`
    RightParen,
    /// `,`
    Comma,
    /// `:`
    Colon,
    /// `->`
    Arrow,

    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,

    /// `<`
    Less,
    /// `<=`
    LessEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterEqual,
    /// `=` or `==`
    Equal,

    /// End of input
    Eof,
}

impl TokenKind {
    /// Look up a keyword.
    pub fn keyword(word: &str) -> Option<TokenKind> {
        match word {
            "and" => Some(TokenKind::And),
            "or" => Some(TokenKind::Or),
            _ => None,
        }
    }

    /// Check if this kind is a comparison operator.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            TokenKind::Less
                | TokenKind::LessEqual
                | TokenKind::Greater
                | TokenKind::GreaterEqual
                | TokenKind::Equal
        )
    }

    /// Human-readable description used in error messages.
    pub fn describe(&self) -> &'static str {
        match self {
            TokenKind::Integer => "integer",
            TokenKind::Identifier => "identifier",
            TokenKind::And => "'and'",
            TokenKind::Or => "'or'",
            TokenKind::LeftBracket => "'['",
            TokenKind::RightBracket => "']'",
            TokenKind::LeftBrace => "'{'",
            TokenKind::RightBrace => "'}'",
            TokenKind::LeftParen => "'('",
            TokenKind::RightParen => "')'",
            TokenKind::Comma => "','",
            TokenKind::Colon => "':'",
            TokenKind::Arrow => "'->'",
            TokenKind::Plus => "'+'",
            TokenKind::Minus => "'-'",
            TokenKind::Star => "'*'",
            TokenKind::Less => "'<'",
            TokenKind::LessEqual => "'<='",
            TokenKind::Greater => "'>'",
            TokenKind::GreaterEqual => "'>='",
            TokenKind::Equal => "'='",
            TokenKind::Eof => "end of input",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords() {
        assert_eq!(TokenKind::keyword("and"), Some(TokenKind::And));
        assert_eq!(TokenKind::keyword("or"), Some(TokenKind::Or));
        assert_eq!(TokenKind::keyword("i"), None);
    }

    #[test]
    fn test_comparisons() {
        assert!(TokenKind::LessEqual.is_comparison());
        assert!(TokenKind::Equal.is_comparison());
        assert!(!TokenKind::Arrow.is_comparison());
    }
}
