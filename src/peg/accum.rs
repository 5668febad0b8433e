//! Tokens and the accumulator stack that assembles them into a tree.

use crate::codemap::Span;
use serde::Serialize;
use std::collections::TryReserveError;

/// A token in the output tree.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
pub struct Tk<K> {
    /// The construct this token represents.
    pub kind: K,
    /// The source range covered by the token, including any delimiters.
    pub span: Span,
    /// Child tokens, ordered and non-overlapping, within `span`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Tk<K>>,
}

impl<K> Tk<K> {
    /// Creates a token with no children.
    #[inline]
    pub fn leaf(kind: K, span: Span) -> Self {
        Self {
            kind,
            span,
            children: Vec::new(),
        }
    }

    /// Creates a composite token.
    #[inline]
    pub fn node(kind: K, span: Span, children: Vec<Tk<K>>) -> Self {
        Self {
            kind,
            span,
            children,
        }
    }
}

/// One open token sequence.
#[derive(Debug)]
struct Scope<K> {
    /// Where the scope opened.
    start: usize,
    /// Tokens appended so far.
    tokens: Vec<Tk<K>>,
}

/// A stack of token sequences, one per open container rule.
///
/// The bottom sequence is the root and is never closed; it collects the
/// top-level tokens of the document.
#[derive(Debug)]
pub(crate) struct Accumulator<K> {
    /// The open scopes, root first.
    scopes: Vec<Scope<K>>,
}

impl<K> Accumulator<K> {
    /// Creates an accumulator holding only the root scope.
    pub fn with_capacity(capacity: usize) -> Result<Self, TryReserveError> {
        let mut scopes = Vec::new();
        scopes.try_reserve(capacity.max(1))?;
        scopes.push(Scope {
            start: 0,
            tokens: Vec::new(),
        });
        Ok(Self { scopes })
    }

    /// The number of open scopes, including the root.
    #[inline]
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Pushes a new empty sequence which starts at `start`.
    pub fn open_scope(&mut self, start: usize) -> Result<(), TryReserveError> {
        self.scopes.try_reserve(1)?;
        self.scopes.push(Scope {
            start,
            tokens: Vec::new(),
        });
        Ok(())
    }

    /// Appends a token to the top sequence.
    #[inline]
    pub fn append(&mut self, token: Tk<K>) {
        self.top_mut().push(token);
    }

    /// Pops the top sequence and wraps it in a token of the given `kind`
    /// spanning from the start of the scope to `end`.
    ///
    /// Returns `None` if only the root scope is open.
    pub fn close_scope(&mut self, kind: K, end: usize) -> Option<Tk<K>> {
        if self.scopes.len() < 2 {
            return None;
        }
        let Scope { start, tokens } = self.scopes.pop()?;
        let span = Span::new(start, end.max(start));
        debug_assert!(
            tokens.iter().all(|child| span.contains(child.span)),
            "child token escapes its parent {span:?}"
        );
        Some(Tk::node(kind, span, tokens))
    }

    /// Pops the top sequence and splices its tokens into the new top.
    ///
    /// Returns false if only the root scope is open.
    pub fn close_scope_flatten(&mut self) -> bool {
        if self.scopes.len() < 2 {
            return false;
        }
        if let Some(Scope { tokens, .. }) = self.scopes.pop() {
            self.top_mut().extend(tokens);
        }
        true
    }

    /// The top sequence.
    #[inline]
    pub fn top(&self) -> &[Tk<K>] {
        self.scopes.last().map_or(&[], |scope| &scope.tokens)
    }

    /// The top sequence, mutably.
    #[inline]
    pub fn top_mut(&mut self) -> &mut Vec<Tk<K>> {
        // The root scope is never popped.
        let last = self.scopes.len() - 1;
        &mut self.scopes[last].tokens
    }

    /// Takes the tokens collected in the root scope, leaving it empty.
    pub fn take_root(&mut self) -> Vec<Tk<K>> {
        debug_assert_eq!(self.scopes.len(), 1, "unbalanced accumulator scopes");
        self.scopes.truncate(1);
        core::mem::take(&mut self.scopes[0].tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_scopes() {
        let mut acc = Accumulator::with_capacity(0).unwrap();
        acc.open_scope(0).unwrap();
        acc.append(Tk::leaf('t', Span::new(3, 7)));
        let bold = acc.close_scope('b', 10).unwrap();
        acc.append(bold);
        acc.append(Tk::leaf('t', Span::new(10, 16)));
        assert_eq!(
            acc.take_root(),
            [
                Tk::node('b', Span::new(0, 10), vec![Tk::leaf('t', Span::new(3, 7))]),
                Tk::leaf('t', Span::new(10, 16)),
            ]
        );
    }

    #[test]
    fn flatten_splices_into_parent() {
        let mut acc = Accumulator::with_capacity(4).unwrap();
        acc.append(Tk::leaf(1, Span::new(0, 1)));
        acc.open_scope(1).unwrap();
        acc.append(Tk::leaf(2, Span::new(1, 2)));
        acc.append(Tk::leaf(3, Span::new(2, 3)));
        assert!(acc.close_scope_flatten());
        assert_eq!(acc.depth(), 1);
        let kinds = acc.take_root().into_iter().map(|t| t.kind).collect::<Vec<_>>();
        assert_eq!(kinds, [1, 2, 3]);
    }

    #[test]
    fn root_is_never_closed() {
        let mut acc = Accumulator::<u8>::with_capacity(1).unwrap();
        assert!(acc.close_scope(0, 0).is_none());
        assert!(!acc.close_scope_flatten());
        acc.open_scope(0).unwrap();
        acc.append(Tk::leaf(9, Span::new(0, 0)));
        assert_eq!(acc.depth(), 2);
        assert!(acc.close_scope_flatten());
        assert_eq!(acc.top().len(), 1);
        assert!(!acc.close_scope_flatten());
    }
}
