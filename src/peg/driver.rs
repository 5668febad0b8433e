//! The rule engine.
//!
//! Rules are interpreted directly from the [`Grammar`] data. Every expression
//! either matches and leaves the cursor after its match, or fails and leaves
//! the parse state exactly as it found it. Semantic actions and token tree
//! construction are never performed while matching; they are logged as
//! [`Thunk`]s and replayed once the whole parse is known to succeed.

use super::{
    Error, Failure, Memo, Options,
    accum::{Accumulator, Tk},
    action::ActionContext,
    buffer::Buffer,
    grammar::{Expr, Grammar, Rule, RuleId, Shape},
    thunk::{Op, Thunk, ThunkLog},
    values::ValueStack,
};
use crate::codemap::Span;
use std::collections::{BTreeSet, HashMap, TryReserveError};

/// The outcome of matching an expression: `Ok(true)` if it matched,
/// `Ok(false)` if it did not, or an error if the parse must be abandoned.
type Step = Result<bool, Error>;

/// Saved parse state for backtracking.
#[derive(Clone, Copy, Debug)]
struct Checkpoint {
    /// The input cursor.
    cursor: usize,
    /// The backtrack log position.
    log: usize,
    /// The value stack top.
    values: usize,
    /// The number of open container scopes.
    scopes: usize,
}

/// An active rule invocation.
#[derive(Clone, Copy, Debug)]
struct Mark {
    /// The rule being matched.
    rule: RuleId,
    /// The base slot of the invocation’s value frame.
    base: usize,
}

/// A cached rule result.
#[derive(Debug)]
enum MemoEntry<K> {
    /// The rule did not match.
    Failed,
    /// The rule matched.
    Matched {
        /// The cursor after the match.
        end: usize,
        /// The base slot of the frame the rule ran in.
        base: usize,
        /// The number of value slots above `base` used by the match.
        extent: usize,
        /// The thunks logged by the match.
        thunks: Box<[Thunk<K>]>,
    },
}

/// The furthest position at which any expression failed.
#[derive(Debug, Default)]
struct Furthest {
    /// The failure position.
    offset: usize,
    /// The rules which failed there.
    rules: BTreeSet<RuleId>,
}

/// Parse statistics, for debug logging.
#[derive(Debug, Default)]
struct Stats {
    /// Rule invocations, including cache hits.
    invocations: u64,
    /// Cache hits.
    memo_hits: u64,
    /// Cache stores.
    memo_stores: u64,
    /// Replayed thunks.
    committed: u64,
}

/// The mutable state of one parse of one document.
///
/// A context owns its copy of the input and every stack used while parsing.
/// Nothing is shared between contexts except the immutable grammar, so
/// separate documents can be parsed on separate threads.
pub struct ParseContext<'g, K, V> {
    /// The rule table.
    grammar: &'g Grammar<K, V>,
    /// Runtime options.
    options: Options,
    /// The input.
    buffer: Buffer,
    /// The current input position.
    cursor: usize,
    /// Active rule invocations, innermost last.
    marks: Vec<Mark>,
    /// Semantic values.
    values: ValueStack<V>,
    /// Deferred actions.
    log: ThunkLog<K>,
    /// The token tree under construction. Only touched during commit.
    accum: Accumulator<K>,
    /// The number of container scopes opened by active invocations.
    scopes: usize,
    /// Cached rule results, keyed by rule and start position.
    memo: HashMap<(RuleId, usize), MemoEntry<K>>,
    /// Diagnostics for the furthest failure.
    furthest: Furthest,
    /// Nesting depth of the expression being matched.
    depth: usize,
    /// Nesting depth of negative lookahead, where failures are expected.
    quiet: usize,
    /// Statistics.
    stats: Stats,
}

impl<K, V> core::fmt::Debug for ParseContext<'_, K, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ParseContext")
            .field("buffer", &self.buffer)
            .field("cursor", &self.cursor)
            .field("depth", &self.depth)
            .field("thunks", &self.log.mark())
            .finish_non_exhaustive()
    }
}

impl<'g, K: Copy, V: Default> ParseContext<'g, K, V> {
    /// Creates a context for parsing `source` with `grammar`.
    pub fn new(grammar: &'g Grammar<K, V>, source: &str, options: Options) -> Result<Self, Error> {
        let capacity = options.initial_capacity;
        Ok(Self {
            grammar,
            options,
            buffer: Buffer::new(source),
            cursor: 0,
            marks: Vec::new(),
            values: ValueStack::with_capacity(capacity.values)
                .map_err(capacity_error("value stack"))?,
            log: ThunkLog::with_capacity(capacity.thunks).map_err(capacity_error("backtrack log"))?,
            accum: Accumulator::with_capacity(capacity.scopes)
                .map_err(capacity_error("accumulator stack"))?,
            scopes: 0,
            memo: HashMap::new(),
            furthest: Furthest::default(),
            depth: 0,
            quiet: 0,
            stats: Stats::default(),
        })
    }

    /// Parses the whole input with the grammar’s start rule and returns the
    /// top-level tokens.
    pub fn parse(mut self) -> Result<Vec<Tk<K>>, Error> {
        if self.buffer.is_empty() {
            log::trace!("empty input");
            return Ok(Vec::new());
        }

        let matched = self.invoke(self.grammar.start(), None)?;
        if !matched || self.cursor != self.buffer.len() {
            return Err(self.exhausted(matched.then_some(self.cursor)));
        }

        self.commit()?;
        self.report();
        Ok(self.accum.take_root())
    }

    /// Parses one block with `rule` at the current position and returns its
    /// top-level tokens, or `None` at the end of input.
    pub(super) fn next_chunk(&mut self, rule: RuleId) -> Option<Result<Vec<Tk<K>>, Error>> {
        if self.cursor >= self.buffer.len() {
            self.report();
            return None;
        }

        let start = self.cursor;
        self.furthest = Furthest {
            offset: start,
            rules: BTreeSet::new(),
        };

        Some(self.chunk(rule, start))
    }

    /// Matches `rule` once at `start` and commits the result.
    fn chunk(&mut self, rule: RuleId, start: usize) -> Result<Vec<Tk<K>>, Error> {
        if !self.invoke(rule, None)? || self.cursor == start {
            return Err(self.exhausted(None));
        }
        self.commit()?;
        Ok(self.accum.take_root())
    }

    /// Invokes a rule at the current position, optionally binding its result
    /// to a label slot in the calling rule’s frame.
    fn invoke(&mut self, id: RuleId, label: Option<u16>) -> Step {
        let grammar = self.grammar;
        let rule = grammar.rule(id);
        self.stats.invocations += 1;
        let start = self.cursor;
        let parent = self.frame();
        let memoize = match self.options.memo {
            Memo::Off => false,
            Memo::Marked => rule.memo,
            Memo::All => true,
        };

        if memoize {
            match self.memo.get(&(id, start)) {
                Some(MemoEntry::Failed) => {
                    self.stats.memo_hits += 1;
                    return Ok(false);
                }
                Some(MemoEntry::Matched {
                    end,
                    base,
                    extent,
                    thunks,
                }) => {
                    self.stats.memo_hits += 1;
                    let end = *end;
                    let new_base = self.values.top();
                    self.values
                        .ensure(new_base + extent)
                        .map_err(capacity_error("value stack"))?;
                    let delta = (new_base as isize).wrapping_sub(*base as isize);
                    self.log
                        .extend_rebased(thunks, delta)
                        .map_err(capacity_error("backtrack log"))?;
                    log::trace!("memo hit: {} at {start}..{end}", rule.name);
                    self.cursor = end;
                    self.bind(label, parent, new_base)?;
                    return Ok(true);
                }
                None => {}
            }
        }

        let checkpoint = self.save();
        let base = self
            .values
            .push(rule.slots)
            .map_err(capacity_error("value stack"))?;
        self.marks.push(Mark { rule: id, base });
        let matched = self.enter(rule, base, label.is_some() || memoize);
        self.marks.pop();
        self.values.pop(base);

        if matched? {
            if memoize {
                self.remember_match(id, start, base, checkpoint.log, rule.slots);
            }
            self.bind(label, parent, base)?;
            Ok(true)
        } else {
            self.restore(checkpoint);
            if memoize {
                self.memo.insert((id, start), MemoEntry::Failed);
                self.stats.memo_stores += 1;
            }
            Ok(false)
        }
    }

    /// Matches the body of a rule whose frame has already been pushed.
    fn enter(&mut self, rule: &'g Rule<K>, base: usize, framed: bool) -> Step {
        let start = self.cursor;
        let here = Span::new(start, start);
        if rule.valued || framed {
            self.push_thunk(Op::Frame { size: rule.slots }, here, base)?;
        }

        let container = rule.shape.is_container();
        if container {
            self.push_thunk(Op::Open, here, base)?;
            self.scopes += 1;
        }
        let matched = self.eval(&rule.expr);
        if container {
            self.scopes -= 1;
        }
        if !matched? {
            return Ok(false);
        }

        let op = match rule.shape {
            Shape::Transparent => return Ok(true),
            Shape::Leaf(kind) => Op::Emit(kind),
            Shape::Node(kind) => Op::Close(kind),
            Shape::Group => Op::Flatten,
        };
        self.push_thunk(op, Span::new(start, self.cursor), base)?;
        Ok(true)
    }

    /// Matches an expression.
    ///
    /// Each call nests one level deeper, and nesting past
    /// [`Options::max_depth`] levels fails the parse.
    fn eval(&mut self, expr: &'g Expr) -> Step {
        if self.depth >= self.options.max_depth {
            return Err(Error::RecursionLimit(self.options.max_depth));
        }
        self.depth += 1;
        let matched = self.eval_nested(expr);
        self.depth -= 1;
        matched
    }

    /// Matches an expression one level below [`Self::eval`].
    fn eval_nested(&mut self, expr: &'g Expr) -> Step {
        match expr {
            Expr::Literal(bytes) => {
                let matched = self.buffer.rest(self.cursor).starts_with(bytes);
                Ok(self.advance_if(matched, bytes.len()))
            }
            Expr::LiteralNoCase(bytes) => {
                let matched = self
                    .buffer
                    .rest(self.cursor)
                    .get(..bytes.len())
                    .is_some_and(|head| head.eq_ignore_ascii_case(bytes));
                Ok(self.advance_if(matched, bytes.len()))
            }
            Expr::Class(set) => {
                let matched = self
                    .buffer
                    .peek(self.cursor)
                    .is_some_and(|byte| set.contains(byte));
                Ok(self.advance_if(matched, 1))
            }
            Expr::Any => {
                let width = self.buffer.peek(self.cursor).map_or(0, |lead| {
                    utf8_width(lead).min(self.buffer.len() - self.cursor)
                });
                Ok(self.advance_if(width != 0, width))
            }
            Expr::Seq(items) => {
                let checkpoint = self.save();
                for item in items {
                    if !self.eval(item)? {
                        self.restore(checkpoint);
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Expr::Choice(alts) => {
                for alt in alts {
                    let checkpoint = self.save();
                    if self.eval(alt)? {
                        return Ok(true);
                    }
                    self.restore(checkpoint);
                }
                Ok(false)
            }
            Expr::Repeat { expr, min, max } => self.repeat(expr, *min, *max),
            Expr::And(expr) => {
                let checkpoint = self.save();
                let matched = self.eval(expr);
                self.restore(checkpoint);
                matched
            }
            Expr::Not(expr) => {
                let checkpoint = self.save();
                self.quiet += 1;
                let matched = self.eval(expr);
                self.quiet -= 1;
                self.restore(checkpoint);
                Ok(!matched?)
            }
            Expr::Call(rule) => self.invoke(*rule, None),
            Expr::Bind(label, rule) => self.invoke(*rule, Some(*label)),
            Expr::Act(expr, action) => {
                let start = self.cursor;
                if !self.eval(expr)? {
                    return Ok(false);
                }
                let frame = self.frame();
                self.push_thunk(Op::Action(*action), Span::new(start, self.cursor), frame)?;
                Ok(true)
            }
            Expr::Sol => {
                let matched =
                    self.cursor == 0 || self.buffer.peek(self.cursor - 1) == Some(b'\n');
                Ok(self.advance_if(matched, 0))
            }
            Expr::Eof => {
                let matched = self.cursor == self.buffer.len();
                Ok(self.advance_if(matched, 0))
            }
        }
    }

    /// Matches `expr` at least `min` and at most `max` times.
    fn repeat(&mut self, expr: &'g Expr, min: u32, max: Option<u32>) -> Step {
        let checkpoint = self.save();
        let mut count = 0;
        while max.is_none_or(|max| count < max) {
            let iteration = self.save();
            if !self.eval(expr)? {
                self.restore(iteration);
                break;
            }
            count += 1;
            if self.cursor == iteration.cursor {
                // Every further iteration would match the same empty string.
                if max.is_none() {
                    log::debug!(
                        "repetition in '{}' matched nothing at {}",
                        self.current_rule_name(),
                        self.cursor
                    );
                }
                count = count.max(min);
                break;
            }
        }

        if count < min {
            self.restore(checkpoint);
            Ok(false)
        } else {
            Ok(true)
        }
    }

    /// Moves the cursor ahead by `len` if `matched`, or records a failure at
    /// the cursor otherwise. Returns `matched`.
    #[inline]
    fn advance_if(&mut self, matched: bool, len: usize) -> bool {
        if matched {
            self.cursor += len;
        } else {
            self.fail();
        }
        matched
    }

    /// Records a primitive match failure at the cursor for diagnostics.
    fn fail(&mut self) {
        if self.quiet > 0 {
            return;
        }
        let Some(mark) = self.marks.last() else {
            return;
        };
        if self.cursor > self.furthest.offset {
            self.furthest.offset = self.cursor;
            self.furthest.rules.clear();
        }
        if self.cursor == self.furthest.offset {
            self.furthest.rules.insert(mark.rule);
        }
    }

    /// Logs a move of a returned child’s result into the caller’s label slot.
    fn bind(&mut self, label: Option<u16>, parent: usize, base: usize) -> Result<(), Error> {
        if let Some(label) = label {
            let here = Span::new(self.cursor, self.cursor);
            self.push_thunk(
                Op::Bind { from: base },
                here,
                parent + 1 + usize::from(label),
            )?;
        }
        Ok(())
    }

    /// Caches a successful match of rule `id` which started at `start`.
    fn remember_match(&mut self, id: RuleId, start: usize, base: usize, mark: usize, slots: usize) {
        let thunks = Box::<[Thunk<K>]>::from(self.log.since(mark));
        let reach = thunks
            .iter()
            .map(|thunk| match thunk.op {
                Op::Frame { size } => thunk.slot + size,
                Op::Bind { from } => (from + 1).max(thunk.slot + 1),
                _ => thunk.slot + 1,
            })
            .fold(base + slots, usize::max);
        self.memo.insert(
            (id, start),
            MemoEntry::Matched {
                end: self.cursor,
                base,
                extent: reach - base,
                thunks,
            },
        );
        self.stats.memo_stores += 1;
    }

    /// Appends a thunk to the backtrack log.
    #[inline]
    fn push_thunk(&mut self, op: Op<K>, capture: Span, slot: usize) -> Result<(), Error> {
        self.log
            .log(Thunk { op, capture, slot })
            .map_err(capacity_error("backtrack log"))
    }

    /// Replays and drains the whole backtrack log.
    fn commit(&mut self) -> Result<(), Error> {
        let Self {
            grammar,
            buffer,
            values,
            log,
            accum,
            stats,
            ..
        } = self;

        let end = log.mark();
        log::trace!("committing {end} thunks");
        for Thunk { op, capture, slot } in log.commit(end) {
            stats.committed += 1;
            match op {
                Op::Frame { size } => values.reset(slot, size),
                Op::Open => accum
                    .open_scope(capture.start)
                    .map_err(capacity_error("accumulator stack"))?,
                Op::Close(kind) => {
                    if let Some(token) = accum.close_scope(kind, capture.end) {
                        accum.append(token);
                    }
                }
                Op::Flatten => {
                    accum.close_scope_flatten();
                }
                Op::Emit(kind) => accum.append(Tk::leaf(kind, capture)),
                Op::Bind { from } => {
                    let value = values.take(from);
                    values.set(slot, value);
                }
                Op::Action(id) => {
                    let action = grammar.action(id);
                    let mut cx = ActionContext {
                        buffer: &*buffer,
                        capture,
                        frame: slot,
                        values: &mut *values,
                        accum: &mut *accum,
                    };
                    (action.run)(&mut cx).map_err(|err| Error::Action {
                        action: action.name.to_string(),
                        span: capture,
                        message: err.to_string(),
                    })?;
                }
            }
        }
        Ok(())
    }

    /// Builds the parse failure error for the furthest failure, or for `end`
    /// if the start rule matched but stopped before the end of input there.
    fn exhausted(&self, end: Option<usize>) -> Error {
        let mut offset = self.furthest.offset;
        let mut expected = self
            .furthest
            .rules
            .iter()
            .map(|id| self.grammar.rule(*id).name.to_string())
            .collect::<Vec<_>>();

        if let Some(end) = end
            && end >= offset
        {
            if end > offset {
                expected.clear();
            }
            offset = end;
            expected.push("end of input".to_string());
        }

        expected.sort();
        expected.dedup();
        log::debug!("parse failed at {offset}; expected {expected:?}");
        Error::Exhausted(Failure { offset, expected })
    }

    /// Logs parse statistics.
    fn report(&self) {
        log::debug!(
            "{} bytes: {} invocations, {} thunks committed, memo {} hits / {} stores",
            self.buffer.len(),
            self.stats.invocations,
            self.stats.committed,
            self.stats.memo_hits,
            self.stats.memo_stores,
        );
    }

    /// Saves the parse state.
    #[inline]
    fn save(&self) -> Checkpoint {
        Checkpoint {
            cursor: self.cursor,
            log: self.log.mark(),
            values: self.values.top(),
            scopes: self.scopes,
        }
    }

    /// Restores a saved parse state.
    #[inline]
    fn restore(&mut self, checkpoint: Checkpoint) {
        self.cursor = checkpoint.cursor;
        self.log.truncate(checkpoint.log);
        self.values.pop(checkpoint.values);
        self.scopes = checkpoint.scopes;
    }

    /// The base slot of the innermost invocation’s frame.
    #[inline]
    fn frame(&self) -> usize {
        self.marks.last().map_or(0, |mark| mark.base)
    }

    /// The name of the innermost rule being matched.
    fn current_rule_name(&self) -> &str {
        self.marks
            .last()
            .map_or("", |mark| &self.grammar.rule(mark.rule).name)
    }
}

/// The number of bytes in a UTF-8 sequence starting with `lead`. Stray
/// continuation bytes count as one.
#[inline]
fn utf8_width(lead: u8) -> usize {
    match lead {
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xff => 4,
        _ => 1,
    }
}

/// Converts a container growth failure into a parse error.
fn capacity_error(what: &'static str) -> impl FnOnce(TryReserveError) -> Error {
    move |source| Error::Capacity { what, source }
}
