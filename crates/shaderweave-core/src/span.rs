//! Source location tracking for error reporting.
//!
//! Provides [`Span`] to track where tokens, declarations and errors occur
//! in fragment source code.

use std::fmt;

/// A span of source code.
///
/// Tracks the line:column where a token starts for human-readable output,
/// plus the byte offset and length so diagnostics can report exact byte
/// ranges to tools.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    /// Line number (1-indexed).
    pub line: u32,
    /// Column number (1-indexed, byte-based).
    pub col: u32,
    /// Byte offset from the start of the source unit.
    pub offset: u32,
    /// Length in bytes.
    pub len: u32,
}

impl Span {
    /// Create a new span from a line, column, byte offset and length.
    #[inline]
    pub fn new(line: u32, col: u32, offset: u32, len: u32) -> Self {
        Self { line, col, offset, len }
    }

    /// Create a zero-length span at a position.
    #[inline]
    pub fn point(line: u32, col: u32, offset: u32) -> Self {
        Self { line, col, offset, len: 0 }
    }

    /// Whether this span is empty (zero length).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The length of this span in bytes.
    #[inline]
    pub fn len(&self) -> u32 {
        self.len
    }

    /// Byte offset one past the end of this span.
    #[inline]
    pub fn end(&self) -> u32 {
        self.offset + self.len
    }

    /// The half-open byte range covered by this span.
    #[inline]
    pub fn byte_range(&self) -> std::ops::Range<u32> {
        self.offset..self.end()
    }

    /// Merge two spans into one covering both.
    ///
    /// The line/column of the result is taken from whichever span starts first.
    #[inline]
    pub fn merge(self, other: Span) -> Span {
        let first = if other.offset < self.offset { other } else { self };
        let end = self.end().max(other.end());
        Span {
            line: first.line,
            col: first.col,
            offset: first.offset,
            len: end - first.offset,
        }
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_basics() {
        let span = Span::new(1, 5, 4, 10);
        assert_eq!(span.len(), 10);
        assert_eq!(span.end(), 14);
        assert!(!span.is_empty());

        let empty = Span::point(1, 5, 4);
        assert!(empty.is_empty());
    }

    #[test]
    fn span_display() {
        let span = Span::new(3, 15, 40, 5);
        assert_eq!(format!("{}", span), "3:15");
    }

    #[test]
    fn span_merge_same_line() {
        let span1 = Span::new(1, 5, 4, 3);
        let span2 = Span::new(1, 10, 9, 3);
        let merged = span1.merge(span2);

        assert_eq!(merged.line, 1);
        assert_eq!(merged.col, 5);
        assert_eq!(merged.offset, 4);
        assert_eq!(merged.len, 8);
    }

    #[test]
    fn span_merge_reverse_order() {
        let span1 = Span::new(2, 3, 20, 3);
        let span2 = Span::new(1, 5, 4, 3);
        let merged = span1.merge(span2);

        assert_eq!(merged.line, 1);
        assert_eq!(merged.col, 5);
        assert_eq!(merged.byte_range(), 4..23);
    }

    #[test]
    fn span_merge_overlapping() {
        let span1 = Span::new(1, 5, 4, 5);
        let span2 = Span::new(1, 8, 7, 4);
        let merged = span1.merge(span2);
        assert_eq!(merged.len, 7);
    }
}
