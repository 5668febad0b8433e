//! A table-driven PEG runtime which turns text into a tree of tokens.
//!
//! A [`Grammar`] is data: rules built with [`GrammarBuilder`] or loaded from
//! text with [`notation`]. The runtime interprets it over one input with
//! ordered choice, unlimited backtracking, lookahead and optional packrat
//! memoization. Semantic actions and token construction are deferred until
//! the parse is known to succeed, so no work done by an abandoned
//! alternative is ever observable.

pub use accum::Tk;
pub use action::{ActionContext, ActionError, ActionFn};
use driver::ParseContext;
pub use grammar::{
    ActionId, ByteSet, Expr, Grammar, GrammarBuilder, GrammarError, Rule, RuleId, Shape, act, and,
    any, bind, call, choice, class, eof, lit, lit_nocase, none_of, not, opt, plus, repeat, seq, sol,
    star,
};
use crate::codemap::Span;
use std::collections::TryReserveError;

mod accum;
mod action;
mod buffer;
mod driver;
mod grammar;
pub mod notation;
mod thunk;
mod values;

/// A runtime error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No rule sequence matches the whole input.
    #[error("{0}")]
    Exhausted(Failure),
    /// A container could not grow.
    #[error("could not grow {what}: {source}")]
    Capacity {
        /// The container which failed to grow.
        what: &'static str,
        /// The allocation failure.
        source: TryReserveError,
    },
    /// Expressions nested too deeply.
    #[error("expressions nested more than {0} deep")]
    RecursionLimit(usize),
    /// A semantic action failed while the parse was being committed.
    #[error("action '{action}' failed at {}..{}: {message}", span.start, span.end)]
    Action {
        /// The action name.
        action: String,
        /// The text the action was run over.
        span: Span,
        /// The reason for the failure.
        message: String,
    },
}

/// The furthest point a failed parse reached.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Failure {
    /// The byte offset of the failure.
    pub offset: usize,
    /// The names of the rules which could not match there, sorted.
    pub expected: Vec<String>,
}

impl core::fmt::Display for Failure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "parse failed at offset {}", self.offset)?;
        if !self.expected.is_empty() {
            write!(f, "; expected {}", self.expected.join(", "))?;
        }
        Ok(())
    }
}

/// Which rule results are cached by input position.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Memo {
    /// No results are cached.
    Off,
    /// Only results of rules marked as memoizable are cached.
    #[default]
    Marked,
    /// All rule results are cached.
    All,
}

/// An unknown [`Memo`] mode name.
#[derive(Debug, Eq, PartialEq, thiserror::Error)]
#[error("unknown memo mode '{0}' (expected off, marked, or all)")]
pub struct MemoModeError(String);

impl core::str::FromStr for Memo {
    type Err = MemoModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "off" => Self::Off,
            "marked" => Self::Marked,
            "all" => Self::All,
            _ => return Err(MemoModeError(s.to_string())),
        })
    }
}

/// Starting capacities of the runtime containers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Capacity {
    /// Value stack slots.
    pub values: usize,
    /// Backtrack log records.
    pub thunks: usize,
    /// Accumulator scopes.
    pub scopes: usize,
}

impl Default for Capacity {
    fn default() -> Self {
        Self {
            values: 32,
            thunks: 32,
            scopes: 8,
        }
    }
}

/// Runtime options.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Options {
    /// Which rule results to cache.
    pub memo: Memo,
    /// The maximum expression nesting depth, counting each rule call as one
    /// level.
    pub max_depth: usize,
    /// Starting container capacities.
    pub initial_capacity: Capacity,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            memo: Memo::default(),
            max_depth: 256,
            initial_capacity: Capacity::default(),
        }
    }
}

/// Tokenizes all of `source` with the start rule of `grammar`.
pub fn tokenize<K: Copy, V: Default>(
    grammar: &Grammar<K, V>,
    source: &str,
    options: Options,
) -> Result<Vec<Tk<K>>, Error> {
    ParseContext::new(grammar, source, options)?.parse()
}

/// Tokenizes `source` one match of `rule` at a time.
pub fn chunks<'g, K: Copy, V: Default>(
    grammar: &'g Grammar<K, V>,
    rule: RuleId,
    source: &str,
    options: Options,
) -> Result<Chunks<'g, K, V>, Error> {
    Ok(Chunks {
        cx: ParseContext::new(grammar, source, options)?,
        rule,
        done: false,
    })
}

/// An iterator over the top-level tokens of successive matches of one rule.
///
/// Each step matches the rule once at the position where the previous step
/// stopped and commits only that match. Iteration ends at the end of input,
/// or after yielding the first error.
#[derive(Debug)]
pub struct Chunks<'g, K, V> {
    /// The parse state, shared across steps.
    cx: ParseContext<'g, K, V>,
    /// The rule matched by each step.
    rule: RuleId,
    /// Whether an error has been yielded.
    done: bool,
}

impl<K: Copy, V: Default> Iterator for Chunks<'_, K, V> {
    type Item = Result<Vec<Tk<K>>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.cx.next_chunk(self.rule)?;
        self.done = item.is_err();
        Some(item)
    }
}

impl<K: Copy, V: Default> core::iter::FusedIterator for Chunks<'_, K, V> {}

#[cfg(test)]
mod tests;
