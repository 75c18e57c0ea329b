//! Frontend: lexer and parser for set and map notation.
//!
//! Iteration domains and access relations are handed over as text in the
//! usual polyhedral notation:
//!
//! ```text
//! [N, M] -> { S0[i, j] : 0 <= i < N and 0 <= j < M }
//! [N, M] -> { S0[i, j] -> C[i, j] }
//! ```

pub mod token;
pub mod lexer;
pub mod parser;

// Re-exports
pub use lexer::Lexer;
pub use parser::{parse_map, parse_set, Parser};
pub use token::{Token, TokenKind};
pub use crate::utils::errors::ParseError;
