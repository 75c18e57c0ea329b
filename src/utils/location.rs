//! Source location tracking for notation errors.
//!
//! Domains and access relations arrive as short pieces of set/map notation;
//! these types point error messages at the offending characters.

use std::fmt;
use serde::{Serialize, Deserialize};

/// A position in source text (line and column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (1-indexed)
    pub column: usize,
    /// Byte offset from start of text
    pub offset: usize,
}

impl SourceLocation {
    /// Create a new source location.
    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        Self { line, column, offset }
    }

    /// Location of the first character.
    pub fn start() -> Self {
        Self { line: 1, column: 1, offset: 0 }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A span in source text (start and end positions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    /// Start line (1-indexed)
    pub start_line: usize,
    /// Start column (1-indexed)
    pub start_column: usize,
    /// End line (1-indexed)
    pub end_line: usize,
    /// End column (1-indexed)
    pub end_column: usize,
    /// Byte offset of start
    pub start_offset: usize,
    /// Byte offset of end
    pub end_offset: usize,
}

impl Span {
    /// Create a new span.
    pub fn new(start_line: usize, start_column: usize, end_line: usize, end_column: usize) -> Self {
        Self {
            start_line,
            start_column,
            end_line,
            end_column,
            start_offset: 0,
            end_offset: 0,
        }
    }

    /// Create a span from start and end locations.
    pub fn from_locations(start: SourceLocation, end: SourceLocation) -> Self {
        Self {
            start_line: start.line,
            start_column: start.column,
            end_line: end.line,
            end_column: end.column,
            start_offset: start.offset,
            end_offset: end.offset,
        }
    }

    /// Merge two spans to create a span covering both.
    pub fn merge(&self, other: &Span) -> Span {
        let (start, end) = if self.start_offset <= other.start_offset { (self, other) } else { (other, self) };
        let last = if end.end_offset >= start.end_offset { end } else { start };
        Span {
            start_line: start.start_line,
            start_column: start.start_column,
            end_line: last.end_line,
            end_column: last.end_column,
            start_offset: start.start_offset,
            end_offset: last.end_offset,
        }
    }

    /// Length of this span in bytes.
    pub fn len(&self) -> usize {
        self.end_offset.saturating_sub(self.start_offset)
    }

    /// Check if the span is empty.
    pub fn is_empty(&self) -> bool {
        self.start_offset == self.end_offset
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start_line == self.end_line {
            write!(f, "{}:{}-{}", self.start_line, self.start_column, self.end_column)
        } else {
            write!(
                f,
                "{}:{}-{}:{}",
                self.start_line, self.start_column, self.end_line, self.end_column
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_display() {
        assert_eq!(format!("{}", Span::new(1, 5, 1, 10)), "1:5-10");
        assert_eq!(format!("{}", Span::new(1, 5, 3, 10)), "1:5-3:10");
    }

    #[test]
    fn test_span_merge() {
        let a = Span::from_locations(SourceLocation::new(1, 1, 0), SourceLocation::new(1, 5, 4));
        let b = Span::from_locations(SourceLocation::new(1, 10, 9), SourceLocation::new(1, 15, 14));
        let merged = b.merge(&a);
        assert_eq!(merged.start_column, 1);
        assert_eq!(merged.end_column, 15);
        assert_eq!(merged.len(), 14);
    }
}
