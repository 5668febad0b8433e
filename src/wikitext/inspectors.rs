//! Helpers for improved debug formatting of token trees.

use super::TokenKind;
use crate::{codemap::FileMap, peg::Tk};
use core::fmt;

/// Returns a debug inspector for a token list using the given source code.
pub fn inspect<'a>(input: &'a FileMap<'a>, tree: &'a [Tk<TokenKind>]) -> VInspector<'a> {
    VInspector(input, tree)
}

/// A debug formatter for token lists.
pub struct VInspector<'a>(&'a FileMap<'a>, &'a [Tk<TokenKind>]);

impl fmt::Debug for VInspector<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.1.iter().map(|token| TokenInspector(self.0, token)))
            .finish()
    }
}

/// A debug formatter for [`Tk<TokenKind>`].
pub struct TokenInspector<'a>(&'a FileMap<'a>, &'a Tk<TokenKind>);

impl fmt::Debug for TokenInspector<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = String::from_utf8_lossy(&self.0.as_bytes()[self.1.span.into_range()]);
        match self.1.kind {
            TokenKind::Text => fmt::Debug::fmt(&text, f),
            TokenKind::NewLine => f.write_str("\\n"),
            kind if self.1.children.is_empty() && !is_container(kind) => f
                .debug_tuple(&span_name(kind, self.0, self.1))
                .field(&text)
                .finish(),
            kind => f
                .debug_struct(&span_name(kind, self.0, self.1))
                .field("children", &VInspector(self.0, &self.1.children))
                .finish(),
        }
    }
}

/// Returns true if tokens of the given kind are composite.
fn is_container(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Bold
            | TokenKind::Italic
            | TokenKind::Heading(_)
            | TokenKind::ListItem
            | TokenKind::Link
            | TokenKind::ExternalLink
            | TokenKind::Template
            | TokenKind::Argument
            | TokenKind::Parameter
    )
}

/// Decorates a token kind with the line and column information of the token
/// in the source code.
fn span_name(kind: TokenKind, input: &FileMap<'_>, token: &Tk<TokenKind>) -> String {
    let start = input.find_line_col(token.span.start);
    let end = input.find_line_col(token.span.end);
    if start.line == end.line {
        format!("{kind} @ {start}..{}", end.column)
    } else {
        format!("{kind} @ {start}..{}:{}", end.line, end.column)
    }
}
