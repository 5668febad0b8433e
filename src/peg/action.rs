//! The interface between replayed thunks and grammar semantic actions.

use super::{
    accum::{Accumulator, Tk},
    buffer::Buffer,
    values::ValueStack,
};
use crate::codemap::Span;
use std::borrow::Cow;

/// A semantic action function.
///
/// Actions run only while a successful parse is being committed, once each,
/// in the order their expressions matched.
pub type ActionFn<K, V> = fn(&mut ActionContext<'_, K, V>) -> Result<(), ActionError>;

/// An error raised by a semantic action.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct ActionError(pub Cow<'static, str>);

impl From<&'static str> for ActionError {
    fn from(value: &'static str) -> Self {
        Self(Cow::Borrowed(value))
    }
}

impl From<String> for ActionError {
    fn from(value: String) -> Self {
        Self(Cow::Owned(value))
    }
}

/// The state visible to a semantic action.
pub struct ActionContext<'a, K, V> {
    /// The input.
    pub(super) buffer: &'a Buffer,
    /// The text matched by the expression the action is attached to.
    pub(super) capture: Span,
    /// The base slot of the frame of the rule which owns the action.
    pub(super) frame: usize,
    /// The value stack.
    pub(super) values: &'a mut ValueStack<V>,
    /// The token accumulator.
    pub(super) accum: &'a mut Accumulator<K>,
}

impl<K, V: Default> ActionContext<'_, K, V> {
    /// The source range matched by the expression.
    #[inline]
    pub fn span(&self) -> Span {
        self.capture
    }

    /// The bytes matched by the expression.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        self.buffer.slice(self.capture)
    }

    /// The text matched by the expression.
    #[inline]
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.bytes())
    }

    /// The current result value of the owning rule.
    #[inline]
    pub fn value(&self) -> Option<&V> {
        self.values.get(self.frame)
    }

    /// The current result value of the owning rule, mutably.
    #[inline]
    pub fn value_mut(&mut self) -> Option<&mut V> {
        self.values.get_mut(self.frame)
    }

    /// Sets the result value of the owning rule.
    #[inline]
    pub fn set_value(&mut self, value: V) {
        self.values.set(self.frame, value);
    }

    /// The value bound to `label` in the owning rule.
    #[inline]
    pub fn label(&self, label: u16) -> Option<&V> {
        self.values.get(self.frame + 1 + usize::from(label))
    }

    /// Moves the value bound to `label` out of the owning rule’s frame.
    #[inline]
    pub fn take_label(&mut self, label: u16) -> V {
        self.values.take(self.frame + 1 + usize::from(label))
    }

    /// The tokens accumulated so far in the innermost open scope.
    #[inline]
    pub fn tokens(&self) -> &[Tk<K>] {
        self.accum.top()
    }

    /// The tokens accumulated so far in the innermost open scope, mutably.
    #[inline]
    pub fn tokens_mut(&mut self) -> &mut Vec<Tk<K>> {
        self.accum.top_mut()
    }

    /// Appends a leaf token to the innermost open scope.
    #[inline]
    pub fn emit(&mut self, kind: K, span: Span) {
        self.accum.append(Tk::leaf(kind, span));
    }

    /// Replaces the tokens of the innermost open scope which start inside the
    /// capture with a single composite token of the given `kind` which spans
    /// the capture and holds the replaced tokens as children. Earlier
    /// siblings are left in place.
    pub fn fold(&mut self, kind: K) {
        let capture = self.capture;
        let tokens = self.accum.top_mut();
        let first = tokens.partition_point(|token| token.span.start < capture.start);
        let children = tokens.split_off(first);
        self.accum.append(Tk::node(kind, capture, children));
    }
}
