/*!
Source locations and spans.

Frontends report positions as 1-based (line, column) pairs, where the column counts bytes.
A [`LineIndex`] is built once per file and maps those pairs to byte offsets.
*/

use std::ops::Range;

/// Errors.
pub mod error {
    use super::SourceLocation;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
    pub enum SpanError {
        /// The location is not within the text.
        #[error("location {location} is out of bounds")]
        OutOfBounds { location: SourceLocation },
        /// The end of a span precedes its beginning.
        #[error("span end {end} precedes begin {begin}")]
        Reversed {
            begin: SourceLocation,
            end: SourceLocation,
        },
    }
}
use error::SpanError;

/// A 1-based line and byte column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
#[display(fmt = "{}:{}", line, column)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// Byte offsets of the start of every line of a text.
#[derive(Clone, Debug)]
pub struct LineIndex {
    line_starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(
                text.bytes()
                    .enumerate()
                    .filter(|(_, b)| *b == b'\n')
                    .map(|(i, _)| i + 1),
            )
            .collect();
        Self {
            line_starts,
            len: text.len(),
        }
    }
    /// The number of lines, a trailing newline starts an empty last line.
    pub fn lines(&self) -> usize {
        self.line_starts.len()
    }
    /// The byte offset of `location`.
    ///
    /// The column may not run past the end of the text, but is not checked against the end of its line.
    pub fn offset(&self, location: SourceLocation) -> Result<usize, SpanError> {
        let SourceLocation { line, column } = location;
        if line == 0 || column == 0 {
            return Err(SpanError::OutOfBounds { location });
        }
        let offset = self
            .line_starts
            .get(line - 1)
            .map(|start| start + column - 1)
            .filter(|offset| *offset < self.len);
        offset.ok_or(SpanError::OutOfBounds { location })
    }
    /// The location of the byte at `offset`.
    pub fn location(&self, offset: usize) -> Option<SourceLocation> {
        if offset >= self.len {
            return None;
        }
        let line = self.line_starts.partition_point(|start| *start <= offset);
        let column = offset - self.line_starts[line - 1] + 1;
        Some(SourceLocation { line, column })
    }
    /// Resolves `begin` and `end` (inclusive) to a [`SourceSpan`].
    pub fn span(
        &self,
        begin: SourceLocation,
        end: SourceLocation,
    ) -> Result<SourceSpan, SpanError> {
        let span = SourceSpan {
            begin: self.offset(begin)?,
            end: self.offset(end)?,
        };
        if span.end < span.begin {
            return Err(SpanError::Reversed { begin, end });
        }
        Ok(span)
    }
}

/// A byte range of a text, inclusive of `end`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceSpan {
    pub begin: usize,
    pub end: usize,
}

impl SourceSpan {
    pub fn range(&self) -> Range<usize> {
        self.begin..self.end + 1
    }
    pub fn len(&self) -> usize {
        self.end + 1 - self.begin
    }
    /// Spans cover at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }
    /// The spanned text.
    ///
    /// **panics**
    ///
    /// If the span is not in `text` or does not fall on char boundaries.
    pub fn slice<'a>(&self, text: &'a str) -> &'a str {
        &text[self.range()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "int x;\n__kernel void f(int a)\n{\n}\nint y;\n";

    #[test]
    fn offsets() {
        let index = LineIndex::new(TEXT);
        assert_eq!(index.lines(), 6);
        assert_eq!(index.offset(SourceLocation::new(1, 1)), Ok(0));
        assert_eq!(index.offset(SourceLocation::new(2, 1)), Ok(7));
        assert_eq!(index.offset(SourceLocation::new(4, 1)), Ok(32));
        assert!(index.offset(SourceLocation::new(0, 1)).is_err());
        assert!(index.offset(SourceLocation::new(6, 1)).is_err());
        assert!(index.offset(SourceLocation::new(9, 1)).is_err());
    }

    #[test]
    fn locations() {
        let index = LineIndex::new(TEXT);
        for offset in 0..TEXT.len() {
            let location = index.location(offset).unwrap();
            assert_eq!(index.offset(location), Ok(offset));
        }
        assert_eq!(index.location(TEXT.len()), None);
    }

    #[test]
    fn span() {
        let index = LineIndex::new(TEXT);
        let span = index
            .span(SourceLocation::new(2, 1), SourceLocation::new(4, 1))
            .unwrap();
        assert_eq!(span.slice(TEXT), "__kernel void f(int a)\n{\n}");
        assert_eq!(span.len(), 26);
        assert_eq!(
            index.span(SourceLocation::new(4, 1), SourceLocation::new(2, 1)),
            Err(SpanError::Reversed {
                begin: SourceLocation::new(4, 1),
                end: SourceLocation::new(2, 1),
            })
        );
    }

    #[test]
    fn no_trailing_newline() {
        let text = "a\nbc";
        let index = LineIndex::new(text);
        assert_eq!(index.offset(SourceLocation::new(2, 2)), Ok(3));
        assert!(index.offset(SourceLocation::new(2, 3)).is_err());
    }
}
