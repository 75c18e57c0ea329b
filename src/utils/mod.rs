//! Utility modules for the scheduling engine.
//!
//! This module contains common utilities used throughout the codebase:
//! - Error types
//! - Source location tracking
//! - Pretty printing of trees and reports

pub mod errors;
pub mod location;
pub mod pretty;
pub mod poly_print;

// Re-exports
pub use errors::*;
pub use location::{SourceLocation, Span};
pub use poly_print::{print_domain, print_map, print_program, PolyPrinter};
