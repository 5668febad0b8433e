//! A data structure for tracking source positions in language implementations,
//! heavily adapted from [codemap](https://crates.io/crates/codemap).

use peg::str::LineCol;
use serde::Serialize;

/// A range of text within a string.
#[derive(Copy, Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Span {
    /// The position in the codemap representing the first byte of the span.
    pub start: usize,

    /// The position after the last byte of the span.
    pub end: usize,
}

impl Span {
    /// Creates a new span.
    #[inline]
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    /// Returns true if this span is empty.
    #[inline]
    pub fn is_empty(self) -> bool {
        self.start >= self.end
    }

    /// The length of the span, in bytes.
    #[inline]
    pub fn len(self) -> usize {
        self.end - self.start
    }

    /// Returns true if `other` lies entirely within this span.
    #[inline]
    pub fn contains(self, other: Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Creates a span that encloses both `self` and `other`.
    #[inline]
    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    #[inline]
    /// Converts the span into a range that can be used for string indexing.
    // This is not just using `From<core::ops::Range<usize>` because type
    // resolution fails in common use with `.into()` which eliminates any
    // benefit of using a standard conversion trait
    pub fn into_range(self) -> core::ops::Range<usize> {
        self.start..self.end
    }
}

/// Associate a Span with a value of arbitrary type (e.g. an AST node).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Spanned<T> {
    /// The value.
    pub node: T,
    /// The span.
    pub span: Span,
}

impl<T> Spanned<T> {
    /// Creates a new [`Spanned`].
    #[inline]
    pub fn new(node: T, start: usize, end: usize) -> Self {
        Self {
            node,
            span: Span { start, end },
        }
    }
}

impl<T> core::ops::Deref for Spanned<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.node
    }
}

/// A record of a source file’s lines.
#[derive(Clone)]
pub struct FileMap<'a> {
    /// The source file.
    source: &'a str,

    /// Byte positions of line beginnings.
    lines: Vec<usize>,
}

impl core::fmt::Debug for FileMap<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut limit = 100.min(self.source.len());
        while !self.source.is_char_boundary(limit) {
            limit += 1;
        }

        f.debug_struct("FileMap")
            .field(
                "source",
                &format!(
                    "{}{}",
                    &self.source[..limit],
                    if self.source.len() > limit { "…" } else { "" }
                ),
            )
            .finish()
    }
}

impl core::ops::Deref for FileMap<'_> {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.source
    }
}

impl<'a> FileMap<'a> {
    /// Creates a new line map for the given source.
    pub fn new(source: &'a str) -> Self {
        let lines = core::iter::once(0)
            .chain(memchr::memchr_iter(b'\n', source.as_bytes()).map(|p| p + 1))
            .collect();

        Self { source, lines }
    }

    /// Gets the line and column of a byte offset.
    ///
    /// Offsets past the end of the source are clamped to the end, and offsets
    /// in the middle of a UTF-8 character count the partial character as one
    /// column.
    pub fn find_line_col(&self, pos: usize) -> LineCol {
        let pos = pos.min(self.source.len());
        let line = self.find_line(pos);
        let line_start = self.lines[line];
        let column = String::from_utf8_lossy(&self.source.as_bytes()[line_start..pos])
            .chars()
            .count();
        LineCol {
            line: line + 1,
            column: column + 1,
            offset: pos,
        }
    }

    /// Gets the span representing a line by line number.
    ///
    /// The line number is 1-indexed, to match [`LineCol`]. The returned span
    /// excludes the line terminator.
    pub fn line_span(&self, line: usize) -> Option<Span> {
        let start = *self.lines.get(line.checked_sub(1)?)?;
        let end = self
            .lines
            .get(line)
            .map_or(self.source.len(), |next| next - 1);
        Some(Span::new(start, end))
    }

    /// Gets the 0-indexed line number of a byte offset.
    fn find_line(&self, pos: usize) -> usize {
        match self.lines.binary_search(&pos) {
            Ok(i) => i,
            Err(i) => i - 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_col() {
        let map = FileMap::new("ab\ncdé\n\nx");
        let lc = map.find_line_col(0);
        assert_eq!((lc.line, lc.column), (1, 1));
        let lc = map.find_line_col(3);
        assert_eq!((lc.line, lc.column), (2, 1));
        let lc = map.find_line_col(7);
        assert_eq!((lc.line, lc.column, lc.offset), (2, 4, 7));
        let lc = map.find_line_col(9);
        assert_eq!((lc.line, lc.column), (4, 1));
        let lc = map.find_line_col(1000);
        assert_eq!((lc.line, lc.column, lc.offset), (4, 2, 10));
    }

    #[test]
    fn line_spans() {
        let map = FileMap::new("ab\ncd\n");
        assert_eq!(map.line_span(1), Some(Span::new(0, 2)));
        assert_eq!(map.line_span(2), Some(Span::new(3, 5)));
        assert_eq!(map.line_span(3), Some(Span::new(6, 6)));
        assert_eq!(map.line_span(0), None);
        assert_eq!(map.line_span(4), None);
    }

    #[test]
    fn spans() {
        let a = Span::new(2, 5);
        assert_eq!(a.len(), 3);
        assert!(a.contains(Span::new(3, 5)));
        assert!(!a.contains(Span::new(1, 3)));
        assert_eq!(a.merge(Span::new(7, 9)), Span::new(2, 9));
        assert!(Span::new(4, 4).is_empty());
    }
}
