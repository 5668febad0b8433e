//! The immutable input buffer.

use crate::codemap::Span;

/// An owned, immutable copy of the source text.
///
/// The backing store carries one extra NUL byte past the end of the text so
/// that reads at the end-of-input position never go out of bounds. The
/// sentinel is never reported as input: [`Buffer::peek`] returns `None` there.
#[derive(Clone)]
pub(crate) struct Buffer {
    /// The source bytes followed by the sentinel.
    bytes: Box<[u8]>,
}

impl Buffer {
    /// Copies `source` into a new buffer.
    pub fn new(source: &str) -> Self {
        let mut bytes = Vec::with_capacity(source.len() + 1);
        bytes.extend_from_slice(source.as_bytes());
        bytes.push(0);
        Self {
            bytes: bytes.into_boxed_slice(),
        }
    }

    /// The length of the source text, excluding the sentinel.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len() - 1
    }

    /// Returns true if the source text is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the byte at `offset`, or `None` at or past the end of input.
    #[inline]
    pub fn peek(&self, offset: usize) -> Option<u8> {
        if offset < self.len() {
            Some(self.bytes[offset])
        } else {
            None
        }
    }

    /// Returns the source bytes starting at `offset`, without the sentinel.
    #[inline]
    pub fn rest(&self, offset: usize) -> &[u8] {
        &self.bytes[offset.min(self.len())..self.len()]
    }

    /// Returns the source bytes covered by `span`, clamped to the input.
    #[inline]
    pub fn slice(&self, span: Span) -> &[u8] {
        let end = span.end.min(self.len());
        &self.bytes[span.start.min(end)..end]
    }
}

impl core::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Buffer").field("len", &self.len()).finish()
    }
}
