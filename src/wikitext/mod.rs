//! Wikitext tokenizer.

use crate::{
    codemap::FileMap,
    peg::{self as runtime, Failure, Grammar, Options, Tk},
};
pub use inspectors::inspect;
use ::peg::str::LineCol;
use serde::Serialize;
use std::sync::LazyLock;

mod grammar;
mod inspectors;
#[cfg(test)]
mod tests;

/// The built-in rule table.
static GRAMMAR: LazyLock<Grammar<TokenKind>> =
    LazyLock::new(|| grammar::build().expect("built-in wikitext grammar is valid"));

/// A tokenizer error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The input could not be tokenized.
    #[error("{at}: {}", describe(expected))]
    Syntax {
        /// The furthest position the tokenizer reached.
        at: LineCol,
        /// The rules which could not match there.
        expected: Vec<String>,
    },
    /// A grammar action failed.
    #[error("{at}: action '{action}' failed: {message}")]
    Action {
        /// The start of the text the action ran over.
        at: LineCol,
        /// The action name.
        action: String,
        /// The reason for the failure.
        message: String,
    },
    /// The runtime gave up.
    #[error(transparent)]
    Runtime(runtime::Error),
}

impl Error {
    /// Converts a runtime error, resolving byte offsets against `map`.
    fn new(map: &FileMap<'_>, err: runtime::Error) -> Self {
        match err {
            runtime::Error::Exhausted(Failure { offset, expected }) => Self::Syntax {
                at: map.find_line_col(offset),
                expected,
            },
            runtime::Error::Action {
                action,
                span,
                message,
            } => Self::Action {
                at: map.find_line_col(span.start),
                action,
                message,
            },
            err => Self::Runtime(err),
        }
    }
}

/// Formats a list of expected rules.
fn describe(expected: &[String]) -> String {
    if expected.is_empty() {
        "unexpected input".to_string()
    } else {
        format!("expected {}", expected.join(" or "))
    }
}

/// A Wikitext tokenizer.
#[derive(Clone, Copy, Debug)]
pub struct Tokenizer<'g> {
    /// The rule table.
    grammar: &'g Grammar<TokenKind>,
    /// Runtime options.
    options: Options,
}

impl Default for Tokenizer<'static> {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

impl Tokenizer<'static> {
    /// Creates a tokenizer for the built-in grammar.
    pub fn new(options: Options) -> Self {
        Self {
            grammar: &GRAMMAR,
            options,
        }
    }
}

impl<'g> Tokenizer<'g> {
    /// Creates a tokenizer for a custom rule table.
    pub fn with_grammar(grammar: &'g Grammar<TokenKind>, options: Options) -> Self {
        Self { grammar, options }
    }

    /// Tokenizes a whole document.
    pub fn tokenize(&self, source: &str) -> Result<Output, Error> {
        runtime::tokenize(self.grammar, source, self.options)
            .map(|root| Output { root })
            .map_err(|err| Error::new(&FileMap::new(source), err))
    }

    /// Tokenizes a document one top-level block at a time.
    ///
    /// Blocks are matched with the rule named `block`, or the start rule if
    /// the grammar has no such rule.
    pub fn chunks<'s>(&self, source: &'s str) -> Result<Chunks<'g, 's>, Error> {
        let map = FileMap::new(source);
        let rule = self
            .grammar
            .rule_id("block")
            .unwrap_or_else(|| self.grammar.start());
        match runtime::chunks(self.grammar, rule, source, self.options) {
            Ok(inner) => Ok(Chunks { inner, map }),
            Err(err) => Err(Error::new(&map, err)),
        }
    }
}

/// An iterator over the tokens of each top-level block of a document.
#[derive(Debug)]
pub struct Chunks<'g, 's> {
    /// The runtime iterator.
    inner: runtime::Chunks<'g, TokenKind, ()>,
    /// The source, for error positions.
    map: FileMap<'s>,
}

impl Iterator for Chunks<'_, '_> {
    type Item = Result<Vec<Tk<TokenKind>>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.inner.next()?.map_err(|err| Error::new(&self.map, err)))
    }
}

/// The tokenizer output.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Output {
    /// The token tree.
    pub root: Vec<Tk<TokenKind>>,
}

/// A Wikitext token kind.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
pub enum TokenKind {
    /// Plain text.
    Text,
    /// A line terminator.
    NewLine,
    /// `'''bold'''`.
    Bold,
    /// `''italic''`.
    Italic,
    /// `== heading ==`.
    Heading(HeadingLevel),
    /// `* item`, `# item`, `: item`, or `; item`.
    ListItem,
    /// `----`.
    HorizontalRule,
    /// `[[target|content]]`.
    Link,
    /// The target of a link.
    LinkTarget,
    /// `[https://example.com content]`.
    ExternalLink,
    /// `{{name|argument}}`.
    Template,
    /// One argument of a template or parameter.
    Argument,
    /// `{{{name|default}}}`.
    Parameter,
    /// `<!-- comment -->`.
    Comment,
    /// `&name;` or `&#NN;`.
    Entity,
    /// `<nowiki>text</nowiki>`.
    Nowiki,
}

impl TokenKind {
    /// All kinds without data, by name.
    const NAMED: [(&'static str, TokenKind); 15] = [
        ("Text", TokenKind::Text),
        ("NewLine", TokenKind::NewLine),
        ("Bold", TokenKind::Bold),
        ("Italic", TokenKind::Italic),
        ("ListItem", TokenKind::ListItem),
        ("HorizontalRule", TokenKind::HorizontalRule),
        ("Link", TokenKind::Link),
        ("LinkTarget", TokenKind::LinkTarget),
        ("ExternalLink", TokenKind::ExternalLink),
        ("Template", TokenKind::Template),
        ("Argument", TokenKind::Argument),
        ("Parameter", TokenKind::Parameter),
        ("Comment", TokenKind::Comment),
        ("Entity", TokenKind::Entity),
        ("Nowiki", TokenKind::Nowiki),
    ];
}

impl core::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if let TokenKind::Heading(level) = self {
            write!(f, "Heading({})", level.0)
        } else {
            let name = Self::NAMED
                .iter()
                .find_map(|(name, kind)| (kind == self).then_some(*name))
                .unwrap_or_default();
            f.write_str(name)
        }
    }
}

/// An unknown token kind name.
#[derive(Debug, Eq, PartialEq, thiserror::Error)]
#[error("unknown token kind '{0}'")]
pub struct KindError(String);

impl core::str::FromStr for TokenKind {
    type Err = KindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(level) = s
            .strip_prefix("Heading(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            return level
                .parse::<u8>()
                .ok()
                .and_then(|level| HeadingLevel::try_from(level).ok())
                .map(TokenKind::Heading)
                .ok_or_else(|| KindError(s.to_string()));
        }

        Self::NAMED
            .iter()
            .find_map(|(name, kind)| (*name == s).then_some(*kind))
            .ok_or_else(|| KindError(s.to_string()))
    }
}

/// A conversion error for out-of-range heading levels.
#[derive(Debug, thiserror::Error)]
#[error("{0} is not a valid HTML heading level")]
pub struct HeadingRangeError(u8);

/// A heading level.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct HeadingLevel(u8);

impl From<HeadingLevel> for u8 {
    fn from(value: HeadingLevel) -> Self {
        value.0
    }
}

impl TryFrom<u8> for HeadingLevel {
    type Error = HeadingRangeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (1..=6).contains(&value) {
            Ok(Self(value))
        } else {
            Err(HeadingRangeError(value))
        }
    }
}
