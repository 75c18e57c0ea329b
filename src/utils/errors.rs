//! Error types for the scheduling engine.
//!
//! This module defines all error types used throughout the crate,
//! organized by the phase that produces them:
//! - notation errors (`LexError`, `ParseError`) carry a source span
//! - `ModelError` rejects a malformed region description
//! - `DependenceError` rejects a model whose dependences are ill-defined
//! - `TreeError` reports an internal-consistency failure of the tree builder

use thiserror::Error;
use crate::utils::location::Span;
use std::fmt;

/// Top-level error type for the engine.
#[derive(Error, Debug)]
pub enum PolyError {
    /// Error while tokenizing set or map notation
    #[error("Lexer error: {0}")]
    Lex(#[from] LexError),

    /// Error while parsing set or map notation
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Malformed model
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Dependence analysis failed
    #[error("Dependence analysis error: {0}")]
    Dependence(#[from] DependenceError),

    /// Schedule tree construction failed
    #[error("Schedule tree error: {0}")]
    Tree(#[from] TreeError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error during lexical analysis of set or map notation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    /// The error message
    pub message: String,
    /// Location in source
    pub span: Span,
    /// The kind of lexer error
    pub kind: LexErrorKind,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.message, self.span)
    }
}

/// Kinds of lexer errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexErrorKind {
    /// Character outside the notation
    UnexpectedChar,
    /// Integer literal out of range
    InvalidNumber,
}

/// Error during parsing of set or map notation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// The error message
    pub message: String,
    /// Location in source
    pub span: Span,
    /// The kind of parse error
    pub kind: ParseErrorKind,
    /// Expected tokens (if applicable)
    pub expected: Vec<String>,
    /// What was found
    pub found: Option<String>,
}

impl ParseError {
    /// Create a parse error without expectation details.
    pub fn new(kind: ParseErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            kind,
            expected: Vec::new(),
            found: None,
        }
    }

    /// True for errors that mean the text is well-formed but not affine.
    pub fn is_non_affine(&self) -> bool {
        matches!(self.kind, ParseErrorKind::NonAffine | ParseErrorKind::UnknownIdentifier)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.message, self.span)?;
        if !self.expected.is_empty() {
            write!(f, " (expected: {})", self.expected.join(", "))?;
        }
        if let Some(ref found) = self.found {
            write!(f, " (found: {})", found)?;
        }
        Ok(())
    }
}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> Self {
        ParseError::new(ParseErrorKind::InvalidSyntax, err.message, err.span)
    }
}

/// Kinds of parse errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Unexpected token
    UnexpectedToken,
    /// Expected a specific token
    ExpectedToken,
    /// Expected an expression
    ExpectedExpression,
    /// Expected an identifier
    ExpectedIdentifier,
    /// Invalid syntax
    InvalidSyntax,
    /// Unexpected end of input
    UnexpectedEof,
    /// Product of two non-constant terms, or division by a non-constant
    NonAffine,
    /// Identifier that is neither a tuple dimension nor a parameter
    UnknownIdentifier,
    /// Coefficient or constant outside the 64-bit range
    Overflow,
}

/// Malformed input model. Fatal to the request; no partial model is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A domain cannot be expressed as a finite union of affine polyhedra
    #[error("domain of {statement} is not affine: {reason}")]
    NonAffineDomain {
        /// Statement name
        statement: String,
        /// What made it non-affine
        reason: String,
    },

    /// A dimensionality disagrees with the owning statement
    #[error("{what} of {statement} has {found} dimensions, expected {expected}")]
    DimensionMismatch {
        /// Statement name
        statement: String,
        /// Which part disagrees (domain, an access)
        what: String,
        /// Dimensionality of the statement
        expected: usize,
        /// Dimensionality found
        found: usize,
    },

    /// Two accesses disagree on an array's rank
    #[error("array {array} accessed with rank {found}, expected {expected}")]
    ArrayRankMismatch {
        /// Array name
        array: String,
        /// Rank of the first access
        expected: usize,
        /// Rank of the offending access
        found: usize,
    },

    /// Two statements share a name
    #[error("duplicate statement {0}")]
    DuplicateStatement(String),

    /// An explicit position vector has the wrong length
    #[error("position of {statement} has {found} entries, expected {expected}")]
    InvalidPosition {
        /// Statement name
        statement: String,
        /// Depth plus one
        expected: usize,
        /// Entries found
        found: usize,
    },

    /// Notation could not be parsed
    #[error("in {statement}: {source}")]
    Parse {
        /// Statement name
        statement: String,
        /// Underlying parse error
        #[source]
        source: ParseError,
    },
}

/// The model does not admit exact dependence computation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DependenceError {
    /// A domain is not bounded in some iterator, even with parameter bounds
    #[error("domain of {statement} is unbounded in {iterator}")]
    UnboundedDomain {
        /// Statement name
        statement: String,
        /// Iterator name
        iterator: String,
    },
}

/// Schedule tree construction failed its completeness check.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// Leaf instance sets do not exactly cover the statement domains
    #[error("schedule tree incomplete for {statement}: {reason}")]
    Incomplete {
        /// Statement name
        statement: String,
        /// What is missing or duplicated
        reason: String,
    },
}

/// Result type using PolyError.
pub type PolyResult<T> = Result<T, PolyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = ParseError {
            message: "Unexpected token".to_string(),
            span: Span::new(1, 5, 1, 10),
            kind: ParseErrorKind::UnexpectedToken,
            expected: vec!["identifier".to_string()],
            found: Some("number".to_string()),
        };
        let s = format!("{}", err);
        assert!(s.contains("Unexpected token"));
        assert!(s.contains("identifier"));
        assert!(!err.is_non_affine());
    }

    #[test]
    fn test_model_error_display() {
        let err = ModelError::DimensionMismatch {
            statement: "S1".to_string(),
            what: "access to A".to_string(),
            expected: 2,
            found: 1,
        };
        assert_eq!(err.to_string(), "access to A of S1 has 1 dimensions, expected 2");
    }

    #[test]
    fn test_conversion_to_poly_error() {
        let err: PolyError = DependenceError::UnboundedDomain {
            statement: "S".to_string(),
            iterator: "i".to_string(),
        }
        .into();
        assert!(matches!(err, PolyError::Dependence(_)));
    }
}
