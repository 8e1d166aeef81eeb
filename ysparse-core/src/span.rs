//! Byte spans and source locations.
//!
//! Spans are 32-bit because they cross the wire as `i32` cells. Sources
//! longer than `i32::MAX` bytes are rejected before parsing starts.

use memchr::memchr_iter;

/// Half-open byte range `[start, end)` into a source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    #[inline]
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Self { start: start as u32, end: end as u32 }
    }

    /// The payload of empty scalars that have no text to point at.
    #[inline]
    pub const fn empty() -> Self {
        Self { start: 0, end: 0 }
    }

    #[inline]
    pub fn len(&self) -> usize {
        (self.end - self.start) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Slice `src` by this span, `None` if it lies outside the buffer.
    #[inline]
    pub fn slice<'s>(&self, src: &'s [u8]) -> Option<&'s [u8]> {
        src.get(self.start as usize..self.end as usize)
    }
}

/// A point in the source: byte offset (0-based), line and column (1-based).
///
/// Columns count bytes, not characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    pub offset: u32,
    pub line: u32,
    pub column: u32,
}

/// Start offsets of every line, built once before the source is filtered.
#[derive(Debug, Clone, Default)]
pub struct LineIndex {
    starts: Vec<u32>,
}

impl LineIndex {
    pub fn new(src: &[u8]) -> Self {
        let mut starts = Vec::with_capacity(src.len() / 32 + 1);
        starts.push(0);
        starts.extend(memchr_iter(b'\n', src).map(|nl| (nl + 1) as u32));
        Self { starts }
    }

    /// Number of lines (a trailing newline opens an empty last line).
    pub fn len(&self) -> usize {
        self.starts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    /// Index (0-based) of the line containing `offset`.
    #[inline]
    pub fn line_of(&self, offset: usize) -> usize {
        let offset = offset as u32;
        match self.starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next.saturating_sub(1),
        }
    }

    /// Byte offset where the line containing `offset` begins.
    #[inline]
    pub fn line_start(&self, offset: usize) -> usize {
        self.starts.get(self.line_of(offset)).copied().unwrap_or(0) as usize
    }

    pub fn locate(&self, offset: usize) -> Location {
        let line = self.line_of(offset);
        let start = self.starts.get(line).copied().unwrap_or(0);
        Location {
            offset: offset as u32,
            line: line as u32 + 1,
            column: offset as u32 - start + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_slice() {
        let src = b"say: 2 + 2";
        assert_eq!(Span::new(5, 10).slice(src), Some(&b"2 + 2"[..]));
        assert_eq!(Span::new(5, 11).slice(src), None);
        assert!(Span::empty().is_empty());
    }

    #[test]
    fn test_locate_first_line() {
        let index = LineIndex::new(b": : : :");
        assert_eq!(index.locate(2), Location { offset: 2, line: 1, column: 3 });
    }

    #[test]
    fn test_locate_multiline() {
        let index = LineIndex::new(b"a: 1\nbb: 2\n\nc");
        assert_eq!(index.len(), 4);
        assert_eq!(index.locate(0), Location { offset: 0, line: 1, column: 1 });
        assert_eq!(index.locate(5), Location { offset: 5, line: 2, column: 1 });
        assert_eq!(index.locate(8), Location { offset: 8, line: 2, column: 4 });
        assert_eq!(index.locate(11), Location { offset: 11, line: 3, column: 1 });
        assert_eq!(index.locate(12), Location { offset: 12, line: 4, column: 1 });
        assert_eq!(index.line_start(9), 5);
    }

    #[test]
    fn test_locate_past_end() {
        let index = LineIndex::new(b"ab\ncd");
        assert_eq!(index.locate(5), Location { offset: 5, line: 2, column: 3 });
    }
}
