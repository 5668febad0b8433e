//! The rule table data model.
//!
//! A grammar is plain data: an ordered list of named rules, each an [`Expr`]
//! tree plus a [`Shape`] describing what the rule contributes to the token
//! tree, and a table of semantic action functions referenced by [`ActionId`].

use super::action::ActionFn;
use indexmap::IndexMap;
use std::borrow::Cow;

/// Identifies a rule within a [`Grammar`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RuleId(u32);

impl RuleId {
    /// The index of the rule in the rule table.
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifies a semantic action within a [`Grammar`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ActionId(u32);

/// A set of bytes, for single-byte character class matching.
#[derive(Clone, Copy, Default, Eq, Hash, PartialEq)]
pub struct ByteSet([u128; 2]);

impl ByteSet {
    /// Creates an empty set.
    pub const fn new() -> Self {
        Self([0; 2])
    }

    /// Adds `byte` to the set.
    pub const fn with(mut self, byte: u8) -> Self {
        self.0[(byte >> 7) as usize] |= 1 << (byte & 0x7f);
        self
    }

    /// Adds every byte in `lo..=hi` to the set.
    pub const fn with_range(mut self, lo: u8, hi: u8) -> Self {
        let mut byte = lo;
        while byte <= hi {
            self = self.with(byte);
            if byte == u8::MAX {
                break;
            }
            byte += 1;
        }
        self
    }

    /// Adds every byte in `bytes` to the set.
    pub const fn with_bytes(mut self, bytes: &[u8]) -> Self {
        let mut index = 0;
        while index < bytes.len() {
            self = self.with(bytes[index]);
            index += 1;
        }
        self
    }

    /// Returns the complement of the set.
    pub const fn negate(self) -> Self {
        Self([!self.0[0], !self.0[1]])
    }

    /// Returns true if `byte` is in the set.
    #[inline]
    pub const fn contains(&self, byte: u8) -> bool {
        self.0[(byte >> 7) as usize] & (1 << (byte & 0x7f)) != 0
    }
}

impl core::fmt::Debug for ByteSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("[")?;
        for byte in 0..=u8::MAX {
            if self.contains(byte) {
                write!(f, "{}", core::ascii::escape_default(byte))?;
            }
        }
        f.write_str("]")
    }
}

/// A parsing expression.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Expr {
    /// Matches the exact bytes.
    Literal(Box<[u8]>),
    /// Matches the bytes, ignoring ASCII case.
    LiteralNoCase(Box<[u8]>),
    /// Matches one byte in the set.
    Class(ByteSet),
    /// Matches one UTF-8 encoded character.
    Any,
    /// Matches each expression in turn.
    Seq(Vec<Expr>),
    /// Matches the first expression that matches.
    Choice(Vec<Expr>),
    /// Matches the expression repeatedly.
    Repeat {
        /// The repeated expression.
        expr: Box<Expr>,
        /// The minimum number of repetitions.
        min: u32,
        /// The maximum number of repetitions, if bounded.
        max: Option<u32>,
    },
    /// Succeeds without consuming input if the expression matches.
    And(Box<Expr>),
    /// Succeeds without consuming input if the expression does not match.
    Not(Box<Expr>),
    /// Invokes a rule.
    Call(RuleId),
    /// Invokes a rule and stores its result value in a label slot of the
    /// calling rule.
    Bind(u16, RuleId),
    /// Matches the expression, then schedules a semantic action over the
    /// matched text.
    Act(Box<Expr>, ActionId),
    /// Succeeds without consuming input at the start of a line.
    Sol,
    /// Succeeds without consuming input at the end of input.
    Eof,
}

impl Expr {
    /// Visits every sub-expression, depth first.
    fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        f(self);
        match self {
            Expr::Seq(items) | Expr::Choice(items) => {
                for item in items {
                    item.walk(f);
                }
            }
            Expr::Repeat { expr, .. } | Expr::And(expr) | Expr::Not(expr) | Expr::Act(expr, _) => {
                expr.walk(f);
            }
            _ => {}
        }
    }
}

/// Matches the exact text.
pub fn lit(text: impl AsRef<[u8]>) -> Expr {
    Expr::Literal(text.as_ref().into())
}

/// Matches the text, ignoring ASCII case.
pub fn lit_nocase(text: impl AsRef<[u8]>) -> Expr {
    Expr::LiteralNoCase(text.as_ref().into())
}

/// Matches one byte in `set`.
pub fn class(set: ByteSet) -> Expr {
    Expr::Class(set)
}

/// Matches one byte which is *not* one of `bytes`.
pub fn none_of(bytes: &[u8]) -> Expr {
    Expr::Class(ByteSet::new().with_bytes(bytes).negate())
}

/// Matches one character.
pub fn any() -> Expr {
    Expr::Any
}

/// Matches `items` in order.
pub fn seq(items: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::Seq(items.into_iter().collect())
}

/// Matches the first of `alts` which matches.
pub fn choice(alts: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::Choice(alts.into_iter().collect())
}

/// Matches `expr` between `min` and `max` times.
pub fn repeat(expr: Expr, min: u32, max: Option<u32>) -> Expr {
    Expr::Repeat {
        expr: Box::new(expr),
        min,
        max,
    }
}

/// Matches `expr` zero or more times.
pub fn star(expr: Expr) -> Expr {
    repeat(expr, 0, None)
}

/// Matches `expr` one or more times.
pub fn plus(expr: Expr) -> Expr {
    repeat(expr, 1, None)
}

/// Matches `expr` zero or one times.
pub fn opt(expr: Expr) -> Expr {
    repeat(expr, 0, Some(1))
}

/// Positive lookahead.
pub fn and(expr: Expr) -> Expr {
    Expr::And(Box::new(expr))
}

/// Negative lookahead.
pub fn not(expr: Expr) -> Expr {
    Expr::Not(Box::new(expr))
}

/// Invokes `rule`.
pub fn call(rule: RuleId) -> Expr {
    Expr::Call(rule)
}

/// Invokes `rule`, binding its result to `label`.
pub fn bind(label: u16, rule: RuleId) -> Expr {
    Expr::Bind(label, rule)
}

/// Matches `expr` and then runs `action` over the matched text.
pub fn act(expr: Expr, action: ActionId) -> Expr {
    Expr::Act(Box::new(expr), action)
}

/// Asserts the start of a line.
pub fn sol() -> Expr {
    Expr::Sol
}

/// Asserts the end of input.
pub fn eof() -> Expr {
    Expr::Eof
}

/// What a rule contributes to the token tree.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Shape<K> {
    /// Nothing; any tokens produced by sub-rules go to the enclosing scope.
    Transparent,
    /// A single token with no children, spanning the match.
    Leaf(K),
    /// A composite token holding the tokens produced by sub-rules.
    Node(K),
    /// A scope which is spliced into the enclosing scope on success.
    Group,
}

impl<K> Shape<K> {
    /// Returns true if the rule opens an accumulator scope.
    #[inline]
    pub fn is_container(&self) -> bool {
        matches!(self, Shape::Node(_) | Shape::Group)
    }
}

/// A grammar rule.
#[derive(Clone, Debug)]
pub struct Rule<K> {
    /// The rule name, for diagnostics.
    pub name: Cow<'static, str>,
    /// The rule body.
    pub expr: Expr,
    /// The token tree contribution.
    pub shape: Shape<K>,
    /// Whether results of the rule may be cached by position.
    pub memo: bool,
    /// The number of value slots in a frame of this rule: one for its own
    /// result and one per label.
    pub(crate) slots: usize,
    /// Whether the rule body reads or writes values.
    pub(crate) valued: bool,
}

/// A named semantic action.
pub(crate) struct Action<K, V> {
    /// The action name, for diagnostics.
    pub name: Cow<'static, str>,
    /// The action function.
    pub run: ActionFn<K, V>,
}

/// A complete, validated rule table.
///
/// `K` is the token kind type and `V` is the semantic value type produced by
/// actions.
pub struct Grammar<K, V = ()> {
    /// All rules, indexed by [`RuleId`].
    rules: Vec<Rule<K>>,
    /// All actions, indexed by [`ActionId`].
    actions: Vec<Action<K, V>>,
    /// The start rule.
    start: RuleId,
}

impl<K, V> Grammar<K, V> {
    /// The start rule.
    #[inline]
    pub fn start(&self) -> RuleId {
        self.start
    }

    /// Returns a rule by ID.
    #[inline]
    pub fn rule(&self, id: RuleId) -> &Rule<K> {
        &self.rules[id.index()]
    }

    /// Finds a rule by name.
    pub fn rule_id(&self, name: &str) -> Option<RuleId> {
        self.rules
            .iter()
            .position(|rule| rule.name == name)
            .and_then(|index| u32::try_from(index).ok())
            .map(RuleId)
    }

    /// The number of rules in the grammar.
    #[inline]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true if the grammar has no rules. [`GrammarBuilder::build`]
    /// rejects empty grammars, so this is false for every built grammar.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns an action by ID.
    #[inline]
    pub(crate) fn action(&self, id: ActionId) -> &Action<K, V> {
        &self.actions[id.0 as usize]
    }
}

impl<K: core::fmt::Debug, V> core::fmt::Debug for Grammar<K, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Grammar")
            .field("start", &self.rule(self.start).name)
            .field("rules", &self.rules)
            .field(
                "actions",
                &self.actions.iter().map(|a| &a.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// A grammar construction error.
#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum GrammarError {
    /// A rule was defined twice.
    #[error("rule '{0}' is defined more than once")]
    Duplicate(String),
    /// No rules were defined.
    #[error("grammar has no rules")]
    Empty,
    /// A repetition can never match anything useful.
    #[error("rule '{rule}' has an invalid repetition {{{min},{max}}}")]
    Repeat {
        /// The rule containing the repetition.
        rule: String,
        /// The lower bound.
        min: u32,
        /// The upper bound.
        max: u32,
    },
    /// Too many rules or actions.
    #[error("grammar is too large")]
    TooLarge,
    /// A rule was referenced but not defined.
    #[error("rule '{0}' is referenced but never defined")]
    Undefined(String),
}

/// A rule declaration which may not be defined yet.
struct Slot<K> {
    /// The rule definition.
    def: Option<(Expr, Shape<K>)>,
    /// Whether results of the rule may be cached.
    memo: bool,
}

/// Builds a [`Grammar`] by name, allowing forward references between rules.
pub struct GrammarBuilder<K, V = ()> {
    /// All rules declared so far, in declaration order.
    rules: IndexMap<Cow<'static, str>, Slot<K>>,
    /// All actions registered so far.
    actions: Vec<Action<K, V>>,
    /// The explicitly chosen start rule.
    start: Option<RuleId>,
    /// The first rule defined.
    first: Option<RuleId>,
    /// The first error encountered while building.
    error: Option<GrammarError>,
}

impl<K, V> Default for GrammarBuilder<K, V> {
    fn default() -> Self {
        Self {
            rules: IndexMap::new(),
            actions: Vec::new(),
            start: None,
            first: None,
            error: None,
        }
    }
}

impl<K: Copy, V> GrammarBuilder<K, V> {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the ID of the rule named `name`, declaring it if needed.
    pub fn rule(&mut self, name: impl Into<Cow<'static, str>>) -> RuleId {
        let entry = self.rules.entry(name.into());
        let index = entry.index();
        entry.or_insert(Slot {
            def: None,
            memo: false,
        });
        self.id_for(index)
    }

    /// Defines the rule named `name`.
    pub fn define(
        &mut self,
        name: impl Into<Cow<'static, str>>,
        shape: Shape<K>,
        expr: Expr,
    ) -> RuleId {
        let name = name.into();
        let id = self.rule(name.clone());
        let slot = &mut self.rules[id.index()];
        if slot.def.is_some() {
            self.error
                .get_or_insert(GrammarError::Duplicate(name.into_owned()));
        } else {
            slot.def = Some((expr, shape));
            self.first.get_or_insert(id);
        }
        id
    }

    /// Allows results of `rule` to be cached by input position.
    pub fn memoize(&mut self, rule: RuleId) -> &mut Self {
        if let Some((_, slot)) = self.rules.get_index_mut(rule.index()) {
            slot.memo = true;
        }
        self
    }

    /// Registers a semantic action.
    pub fn action(&mut self, name: impl Into<Cow<'static, str>>, run: ActionFn<K, V>) -> ActionId {
        let index = self.actions.len();
        self.actions.push(Action {
            name: name.into(),
            run,
        });
        if let Ok(index) = u32::try_from(index) {
            ActionId(index)
        } else {
            self.error.get_or_insert(GrammarError::TooLarge);
            ActionId(u32::MAX)
        }
    }

    /// Sets the start rule. By default, the first defined rule is used.
    pub fn start(&mut self, rule: RuleId) -> &mut Self {
        self.start = Some(rule);
        self
    }

    /// Validates the rule table and builds the grammar.
    pub fn build(self) -> Result<Grammar<K, V>, GrammarError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let Some(start) = self.start.or(self.first) else {
            return Err(GrammarError::Empty);
        };

        let mut rules = Vec::with_capacity(self.rules.len());
        for (name, slot) in self.rules {
            let Some((expr, shape)) = slot.def else {
                return Err(GrammarError::Undefined(name.into_owned()));
            };

            let mut labels = 0;
            let mut valued = false;
            let mut bad_repeat = None;
            expr.walk(&mut |expr| match expr {
                Expr::Bind(label, _) => {
                    valued = true;
                    labels = labels.max(usize::from(*label) + 1);
                }
                Expr::Act(..) => valued = true,
                Expr::Repeat {
                    min,
                    max: Some(max),
                    ..
                } if *max == 0 || min > max => {
                    bad_repeat.get_or_insert((*min, *max));
                }
                _ => {}
            });

            if let Some((min, max)) = bad_repeat {
                return Err(GrammarError::Repeat {
                    rule: name.into_owned(),
                    min,
                    max,
                });
            }

            rules.push(Rule {
                name,
                expr,
                shape,
                memo: slot.memo,
                slots: 1 + labels,
                valued,
            });
        }

        Ok(Grammar {
            rules,
            actions: self.actions,
            start,
        })
    }

    /// Converts a rule index into an ID, recording an error on overflow.
    fn id_for(&mut self, index: usize) -> RuleId {
        if let Ok(index) = u32::try_from(index) {
            RuleId(index)
        } else {
            self.error.get_or_insert(GrammarError::TooLarge);
            RuleId(u32::MAX)
        }
    }
}
