//! The built-in Wikitext rule table.
//!
//! Blocks are line-oriented: every block starts at the beginning of a line,
//! and ordinary lines are grouped so their inline tokens land at the top
//! level. Inline constructs are tried in order, and anything which does not
//! form a complete construct falls through to the `other` rule as text, so
//! every input tokenizes.

use super::{HeadingLevel, TokenKind};
use crate::peg::{
    ActionContext, ActionError, ByteSet, Expr, Grammar, GrammarBuilder, GrammarError, RuleId,
    Shape, act, and, any, call, choice, class, eof, lit, lit_nocase, none_of, not, opt, plus, seq,
    sol, star,
};

/// Bytes which may start an inline construct, or end a line.
const SPECIAL: &[u8] = b"'[]{}<&|=\r\n";

/// Merges runs of adjacent text tokens in the innermost scope into one.
fn merge_text(cx: &mut ActionContext<'_, TokenKind, ()>) -> Result<(), ActionError> {
    cx.tokens_mut().dedup_by(|next, prev| {
        if prev.kind == TokenKind::Text
            && next.kind == TokenKind::Text
            && prev.span.end == next.span.start
        {
            prev.span = prev.span.merge(next.span);
            true
        } else {
            false
        }
    });
    Ok(())
}

/// Matches `inline` up to, and not including, `stop` or a line break.
fn inline_until(stop: Expr, newline: RuleId, inline: RuleId) -> Expr {
    seq([not(stop), not(call(newline)), call(inline)])
}

/// Builds the rule table.
pub(super) fn build() -> Result<Grammar<TokenKind>, GrammarError> {
    let mut g = GrammarBuilder::new();
    let merge = g.action("merge_text", merge_text);

    let block = g.rule("block");
    let heading = g.rule("heading");
    let hr = g.rule("hr");
    let list_item = g.rule("list_item");
    let newline = g.rule("newline");
    let line = g.rule("line");
    let inline = g.rule("inline");
    let plain = g.rule("plain");
    let nested = g.rule("nested");
    let argument = g.rule("argument");
    let link_target = g.rule("link_target");
    let url = g.rule("url");

    g.define("start", Shape::Transparent, star(call(block)));
    g.define(
        "block",
        Shape::Transparent,
        choice([
            call(heading),
            call(hr),
            call(list_item),
            call(newline),
            call(line),
        ]),
    );
    g.memoize(block);

    let line_end = || choice([call(newline), eof()]);
    let mut levels = Vec::with_capacity(6);
    for level in (1..=6).rev() {
        let fence = lit("=".repeat(usize::from(level)));
        let closing = seq([fence.clone(), star(class(ByteSet::new().with_bytes(b" \t"))), line_end()]);
        let body = seq([
            sol(),
            fence.clone(),
            act(plus(inline_until(closing, newline, inline)), merge),
            fence,
            star(class(ByteSet::new().with_bytes(b" \t"))),
            and(line_end()),
        ]);
        levels.push(call(g.define(
            format!("h{level}"),
            Shape::Node(TokenKind::Heading(HeadingLevel(level))),
            body,
        )));
    }
    g.define("heading", Shape::Transparent, choice(levels));

    g.define(
        "hr",
        Shape::Leaf(TokenKind::HorizontalRule),
        seq([sol(), lit("----"), star(lit("-"))]),
    );
    g.define(
        "list_item",
        Shape::Node(TokenKind::ListItem),
        seq([
            sol(),
            plus(class(ByteSet::new().with_bytes(b"*#:;"))),
            act(star(seq([not(call(newline)), call(inline)])), merge),
        ]),
    );
    g.define(
        "newline",
        Shape::Leaf(TokenKind::NewLine),
        seq([opt(lit("\r")), lit("\n")]),
    );
    g.define(
        "line",
        Shape::Group,
        act(plus(seq([not(call(newline)), call(inline)])), merge),
    );

    let comment = g.define(
        "comment",
        Shape::Leaf(TokenKind::Comment),
        seq([
            lit("<!--"),
            star(seq([not(lit("-->")), any()])),
            choice([lit("-->"), eof()]),
        ]),
    );
    let nowiki = g.define(
        "nowiki",
        Shape::Leaf(TokenKind::Nowiki),
        seq([
            lit_nocase("<nowiki>"),
            star(seq([not(lit_nocase("</nowiki>")), any()])),
            lit_nocase("</nowiki>"),
        ]),
    );
    let parameter = g.define(
        "parameter",
        Shape::Node(TokenKind::Parameter),
        seq([
            lit("{{{"),
            act(
                plus(seq([not(lit("|")), not(lit("}}}")), call(nested)])),
                merge,
            ),
            star(seq([lit("|"), call(argument)])),
            lit("}}}"),
        ]),
    );
    let template = g.define(
        "template",
        Shape::Node(TokenKind::Template),
        seq([
            lit("{{"),
            act(
                plus(seq([not(lit("|")), not(lit("}}")), call(nested)])),
                merge,
            ),
            star(seq([lit("|"), call(argument)])),
            lit("}}"),
        ]),
    );
    g.define(
        "argument",
        Shape::Node(TokenKind::Argument),
        act(
            star(seq([not(lit("|")), not(lit("}}")), call(nested)])),
            merge,
        ),
    );
    g.define(
        "nested",
        Shape::Transparent,
        choice([call(newline), call(inline)]),
    );
    let link = g.define(
        "link",
        Shape::Node(TokenKind::Link),
        seq([
            lit("[["),
            call(link_target),
            opt(seq([
                lit("|"),
                act(star(inline_until(lit("]]"), newline, inline)), merge),
            ])),
            lit("]]"),
        ]),
    );
    g.define(
        "link_target",
        Shape::Leaf(TokenKind::LinkTarget),
        plus(none_of(b"|[]{}<>\r\n")),
    );
    let external_link = g.define(
        "external_link",
        Shape::Node(TokenKind::ExternalLink),
        seq([
            lit("["),
            call(url),
            opt(seq([
                plus(lit(" ")),
                act(star(inline_until(lit("]"), newline, inline)), merge),
            ])),
            lit("]"),
        ]),
    );
    g.define(
        "url",
        Shape::Leaf(TokenKind::LinkTarget),
        seq([
            choice([
                lit_nocase("http://"),
                lit_nocase("https://"),
                lit_nocase("ftp://"),
                lit_nocase("mailto:"),
                lit("//"),
            ]),
            plus(none_of(b" ][<>\"\n\r\t")),
        ]),
    );

    // Quotes nest one level at most: a bold run may hold an italic run and
    // vice versa, but the inner run holds only plain inline tokens.
    let quote = |fence: &'static str, stop: Expr, content: RuleId| {
        seq([
            lit(fence),
            act(plus(inline_until(stop, newline, content)), merge),
            lit(fence),
        ])
    };
    let italic_stop = || seq([lit("''"), not(lit("'"))]);
    let inner_bold = g.define(
        "inner_bold",
        Shape::Node(TokenKind::Bold),
        quote("'''", lit("'''"), plain),
    );
    let inner_italic = g.define(
        "inner_italic",
        Shape::Node(TokenKind::Italic),
        quote("''", italic_stop(), plain),
    );
    let in_bold = g.define(
        "in_bold",
        Shape::Transparent,
        choice([call(inner_italic), call(plain)]),
    );
    let in_italic = g.define(
        "in_italic",
        Shape::Transparent,
        choice([call(inner_bold), call(plain)]),
    );
    let bold = g.define(
        "bold",
        Shape::Node(TokenKind::Bold),
        quote("'''", lit("'''"), in_bold),
    );
    let italic = g.define(
        "italic",
        Shape::Node(TokenKind::Italic),
        quote("''", italic_stop(), in_italic),
    );

    let alpha = ByteSet::new().with_range(b'a', b'z').with_range(b'A', b'Z');
    let digit = ByteSet::new().with_range(b'0', b'9');
    let hex = digit.with_range(b'a', b'f').with_range(b'A', b'F');
    let entity = g.define(
        "entity",
        Shape::Leaf(TokenKind::Entity),
        seq([
            lit("&"),
            choice([
                seq([class(alpha), star(class(alpha.with_range(b'0', b'9')))]),
                seq([lit_nocase("#x"), plus(class(hex))]),
                seq([lit("#"), plus(class(digit))]),
            ]),
            lit(";"),
        ]),
    );
    let text = g.define(
        "text",
        Shape::Leaf(TokenKind::Text),
        plus(none_of(SPECIAL)),
    );
    let other = g.define(
        "other",
        Shape::Leaf(TokenKind::Text),
        seq([not(call(newline)), any()]),
    );

    g.define(
        "plain",
        Shape::Transparent,
        choice([
            call(comment),
            call(nowiki),
            call(parameter),
            call(template),
            call(link),
            call(external_link),
            call(entity),
            call(text),
            call(other),
        ]),
    );
    g.define(
        "inline",
        Shape::Transparent,
        choice([call(bold), call(italic), call(plain)]),
    );
    g.memoize(inline).memoize(plain);

    g.build()
}
