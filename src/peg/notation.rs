//! A textual notation for rule tables.
//!
//! ```text
//! # comment
//! start         = block* ;
//! block~ @_     = heading / line ;
//! heading @Heading(2) = ^ "==" (!"==" text)+ "==" ;
//! text :Text    = [^=\n]+ ;
//! tag           = "<br"i ">" ;
//! ```
//!
//! A definition is a rule name, an optional `~` to allow memoization, an
//! optional shape (`@Kind` for a node, `:Kind` for a leaf, `@_` for a group),
//! then `=`, an expression, and `;`. The first rule defined is the start rule.

use super::{ByteSet, Expr, Grammar, GrammarBuilder, GrammarError, Shape};
use crate::codemap::{FileMap, Spanned};
use peg::str::LineCol;
use std::{collections::HashSet, str::FromStr};

/// A notation loading error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The text is not valid notation.
    #[error("syntax error at {}: expected {}", .0.location, .0.expected)]
    Syntax(#[from] peg::error::ParseError<LineCol>),
    /// A shape names a token kind which does not exist.
    #[error("{at}: unknown token kind '{kind}'")]
    UnknownKind {
        /// The kind name.
        kind: String,
        /// Where the kind was named.
        at: LineCol,
    },
    /// An expression references a rule which is never defined.
    #[error("{at}: rule '{name}' is not defined")]
    Undefined {
        /// The rule name.
        name: String,
        /// Where the rule was referenced.
        at: LineCol,
    },
    /// The rule table is invalid.
    #[error(transparent)]
    Grammar(#[from] GrammarError),
}

/// Loads a rule table from `source`, resolving token kind names with
/// [`FromStr`].
pub fn load<K: Copy + FromStr>(source: &str) -> Result<Grammar<K>, Error> {
    let defs = notation::grammar(source)?;
    let map = FileMap::new(source);
    let defined = defs.iter().map(|def| *def.name).collect::<HashSet<_>>();

    let mut b = GrammarBuilder::new();
    for def in defs {
        let shape = match def.shape {
            ShapeSpec::Transparent => Shape::Transparent,
            ShapeSpec::Group => Shape::Group,
            ShapeSpec::Leaf(kind) => Shape::Leaf(resolve_kind(&map, kind)?),
            ShapeSpec::Node(kind) => Shape::Node(resolve_kind(&map, kind)?),
        };
        let expr = lower(&mut b, &map, &defined, def.expr)?;
        let id = b.define(def.name.node.to_string(), shape, expr);
        if def.memo {
            b.memoize(id);
        }
    }

    let grammar = b.build()?;
    log::debug!("loaded {} rules", grammar.len());
    Ok(grammar)
}

/// Looks up a token kind by name.
fn resolve_kind<K: FromStr>(map: &FileMap<'_>, kind: Spanned<&str>) -> Result<K, Error> {
    kind.parse().map_err(|_| Error::UnknownKind {
        kind: kind.node.to_string(),
        at: map.find_line_col(kind.span.start),
    })
}

/// Converts a parsed expression into a runtime expression.
fn lower<K: Copy>(
    b: &mut GrammarBuilder<K>,
    map: &FileMap<'_>,
    defined: &HashSet<&str>,
    node: Node<'_>,
) -> Result<Expr, Error> {
    Ok(match node {
        Node::Expr(expr) => expr,
        Node::Name(name) => {
            if !defined.contains(*name) {
                return Err(Error::Undefined {
                    name: name.node.to_string(),
                    at: map.find_line_col(name.span.start),
                });
            }
            Expr::Call(b.rule(name.node.to_string()))
        }
        Node::Seq(items) => Expr::Seq(lower_all(b, map, defined, items)?),
        Node::Choice(alts) => Expr::Choice(lower_all(b, map, defined, alts)?),
        Node::Repeat(expr, min, max) => Expr::Repeat {
            expr: Box::new(lower(b, map, defined, *expr)?),
            min,
            max,
        },
        Node::And(expr) => Expr::And(Box::new(lower(b, map, defined, *expr)?)),
        Node::Not(expr) => Expr::Not(Box::new(lower(b, map, defined, *expr)?)),
    })
}

/// Converts parsed expressions into runtime expressions.
fn lower_all<K: Copy>(
    b: &mut GrammarBuilder<K>,
    map: &FileMap<'_>,
    defined: &HashSet<&str>,
    nodes: Vec<Node<'_>>,
) -> Result<Vec<Expr>, Error> {
    nodes
        .into_iter()
        .map(|node| lower(b, map, defined, node))
        .collect()
}

/// A parsed rule definition.
struct Def<'a> {
    /// The rule name.
    name: Spanned<&'a str>,
    /// Whether the rule may be memoized.
    memo: bool,
    /// The rule shape.
    shape: ShapeSpec<'a>,
    /// The rule body.
    expr: Node<'a>,
}

/// A parsed rule shape, with unresolved kind names.
enum ShapeSpec<'a> {
    /// No shape.
    Transparent,
    /// `:Kind`.
    Leaf(Spanned<&'a str>),
    /// `@Kind`.
    Node(Spanned<&'a str>),
    /// `@_`.
    Group,
}

/// A parsed expression, with unresolved rule names.
enum Node<'a> {
    /// A primitive.
    Expr(Expr),
    /// A rule reference.
    Name(Spanned<&'a str>),
    /// A sequence.
    Seq(Vec<Node<'a>>),
    /// An ordered choice.
    Choice(Vec<Node<'a>>),
    /// A repetition.
    Repeat(Box<Node<'a>>, u32, Option<u32>),
    /// A positive lookahead.
    And(Box<Node<'a>>),
    /// A negative lookahead.
    Not(Box<Node<'a>>),
}

impl<'a> Node<'a> {
    /// Returns the only node in `nodes`, or `many(nodes)` if there is not
    /// exactly one.
    fn one_or(mut nodes: Vec<Node<'a>>, many: fn(Vec<Node<'a>>) -> Node<'a>) -> Node<'a> {
        if nodes.len() == 1
            && let Some(node) = nodes.pop()
        {
            node
        } else {
            many(nodes)
        }
    }
}

/// One character of a literal or class.
#[derive(Clone, Copy)]
enum Unit {
    /// A character, encoded as UTF-8.
    Char(char),
    /// A raw byte from a `\x` escape.
    Byte(u8),
}

impl Unit {
    /// Appends the unit to `bytes`.
    fn push_to(self, bytes: &mut Vec<u8>) {
        match self {
            Unit::Char(c) => bytes.extend_from_slice(c.encode_utf8(&mut [0; 4]).as_bytes()),
            Unit::Byte(b) => bytes.push(b),
        }
    }

    /// The unit as a single byte, if it is one.
    fn byte(self) -> Option<u8> {
        match self {
            Unit::Char(c) => c.is_ascii().then_some(c as u8),
            Unit::Byte(b) => Some(b),
        }
    }
}

/// Builds a literal expression.
fn literal(units: Vec<Unit>, no_case: bool) -> Expr {
    let mut bytes = Vec::with_capacity(units.len());
    for unit in units {
        unit.push_to(&mut bytes);
    }
    if no_case {
        Expr::LiteralNoCase(bytes.into())
    } else {
        Expr::Literal(bytes.into())
    }
}

peg::parser! {grammar notation() for str {
  pub rule grammar() -> Vec<Def<'input>>
  = sp() defs:def()+
  { defs }

  rule def() -> Def<'input>
  = name:ident() sp()
    memo:("~" sp())?
    shape:shape()?
    "=" sp()
    expr:choice()
    ";" sp()
  { Def { name, memo: memo.is_some(), shape: shape.unwrap_or(ShapeSpec::Transparent), expr } }

  rule shape() -> ShapeSpec<'input>
  = "@" "_" !ident_char() sp() { ShapeSpec::Group }
  / "@" kind:kind() sp() { ShapeSpec::Node(kind) }
  / ":" kind:kind() sp() { ShapeSpec::Leaf(kind) }

  rule choice() -> Node<'input>
  = alts:(sequence() ++ ("/" sp()))
  { Node::one_or(alts, Node::Choice) }

  rule sequence() -> Node<'input>
  = items:prefixed()+
  { Node::one_or(items, Node::Seq) }

  rule prefixed() -> Node<'input>
  = "&" sp() e:prefixed() { Node::And(Box::new(e)) }
  / "!" sp() e:prefixed() { Node::Not(Box::new(e)) }
  / suffixed()

  rule suffixed() -> Node<'input>
  = e:primary() suffixes:suffix()*
  { suffixes.into_iter().fold(e, |e, (min, max)| Node::Repeat(Box::new(e), min, max)) }

  rule suffix() -> (u32, Option<u32>)
  = "*" sp() { (0, None) }
  / "+" sp() { (1, None) }
  / "?" sp() { (0, Some(1)) }
  / "{" sp() n:number() sp() "}" sp() { (n, Some(n)) }
  / "{" sp() n:number() sp() "," sp() m:number()? sp() "}" sp() { (n, m) }

  rule primary() -> Node<'input>
  = name:ident() sp() !("~" / "@" / ":" / "=") { Node::Name(name) }
  / "(" sp() e:choice() ")" sp() { e }
  / e:literal() sp() { Node::Expr(e) }
  / e:class() sp() { Node::Expr(e) }
  / "." sp() { Node::Expr(Expr::Any) }
  / "^" sp() { Node::Expr(Expr::Sol) }
  / "$" sp() { Node::Expr(Expr::Eof) }

  rule literal() -> Expr
  = "\"" units:(escape() / c:[^ '"' | '\\' | '\n'] { Unit::Char(c) })* "\"" i:("i" !ident_char())?
  { literal(units, i.is_some()) }
  / "'" units:(escape() / c:[^ '\'' | '\\' | '\n'] { Unit::Char(c) })* "'" i:("i" !ident_char())?
  { literal(units, i.is_some()) }

  rule class() -> Expr
  = "[" negate:"^"? items:class_item()* "]"
  {
    let set = items
        .into_iter()
        .fold(ByteSet::new(), |set, (lo, hi)| set.with_range(lo, hi));
    Expr::Class(if negate.is_some() { set.negate() } else { set })
  }

  rule class_item() -> (u8, u8)
  = lo:class_byte() "-" hi:class_byte()
    {? if lo <= hi { Ok((lo, hi)) } else { Err("an ascending range") } }
  / b:class_byte() { (b, b) }

  rule class_byte() -> u8
  = u:(escape() / c:[^ ']' | '\\' | '\n'] { Unit::Char(c) })
    {? u.byte().ok_or("an ASCII character or byte escape") }

  rule escape() -> Unit
  = "\\" u:(
      "n" { Unit::Char('\n') }
    / "r" { Unit::Char('\r') }
    / "t" { Unit::Char('\t') }
    / "0" { Unit::Char('\0') }
    / "x" h:$(['0'..='9' | 'a'..='f' | 'A'..='F']*<2>)
      {? u8::from_str_radix(h, 16).map(Unit::Byte).or(Err("two hex digits")) }
    / c:['\\' | '"' | '\'' | '[' | ']' | '-' | '^'] { Unit::Char(c) }
  )
  { u }

  rule number() -> u32
  = n:$(['0'..='9']+)
  {? n.parse().or(Err("a number")) }

  rule ident() -> Spanned<&'input str>
  = start:position!() name:$(['a'..='z' | 'A'..='Z' | '_'] ident_char()*) end:position!()
  { Spanned::new(name, start, end) }

  rule kind() -> Spanned<&'input str>
  = start:position!()
    name:$(['a'..='z' | 'A'..='Z'] ident_char()* ("(" [^ ')' | '\n']* ")")?)
    end:position!()
  { Spanned::new(name, start, end) }

  rule ident_char() = ['a'..='z' | 'A'..='Z' | '0'..='9' | '_']

  rule sp() = quiet!{ ([' ' | '\t' | '\r' | '\n'] / "#" [^ '\n']*)* }
}}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peg::{Options, Tk, tokenize};

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    enum K {
        Word,
        Pair,
        Big,
    }

    impl FromStr for K {
        type Err = ();

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            match s {
                "Word" => Ok(Self::Word),
                "Pair" => Ok(Self::Pair),
                "Big(1)" => Ok(Self::Big),
                _ => Err(()),
            }
        }
    }

    fn kinds(tokens: &[Tk<K>]) -> Vec<(K, usize, usize, usize)> {
        tokens
            .iter()
            .map(|t| (t.kind, t.span.start, t.span.end, t.children.len()))
            .collect()
    }

    #[test]
    fn loads_and_runs() {
        let grammar = load::<K>(
            r#"
            # pairs of words, or single words
            start       = (pair / word / sep)* $ ;
            pair~ @Pair = word "=" word ;
            word :Word  = [a-z\x41-Z_]+ ;
            sep   @_    = [ ,]{1,2} ;
            "#,
        )
        .unwrap();
        assert_eq!(grammar.len(), 4);
        assert_eq!(grammar.rule(grammar.start()).name, "start");
        assert!(grammar.rule(grammar.rule_id("pair").unwrap()).memo);

        let tokens = tokenize(&grammar, "ab=Cd, ef", Options::default()).unwrap();
        assert_eq!(
            kinds(&tokens),
            [(K::Pair, 0, 5, 2), (K::Word, 7, 9, 0)]
        );
    }

    #[test]
    fn literals() {
        let grammar = load::<K>(
            r#"
            start = (a / b / c / d)+ ;
            a :Word = "<BR>"i ;
            b :Big(1) = '\'\\\t' ;
            c :Pair = "\x7e" . "\n" ;
            d :Word = ^ "!"{2,} ;
            "#,
        )
        .unwrap();
        let tokens = tokenize(&grammar, "<br>'\\\t~é\n!!!", Options::default()).unwrap();
        assert_eq!(
            kinds(&tokens),
            [
                (K::Word, 0, 4, 0),
                (K::Big, 4, 7, 0),
                (K::Pair, 7, 11, 0),
                (K::Word, 11, 14, 0),
            ]
        );
    }

    #[test]
    fn errors() {
        let err = load::<K>("start = missing ;").unwrap_err();
        assert!(
            matches!(&err, Error::Undefined { name, at } if name == "missing" && at.column == 9),
            "{err}"
        );

        let err = load::<K>("start\n  :Nope = \"x\" ;").unwrap_err();
        assert!(
            matches!(&err, Error::UnknownKind { kind, at } if kind == "Nope" && at.line == 2),
            "{err}"
        );

        let err = load::<K>("start = \"x\" ").unwrap_err();
        assert!(matches!(err, Error::Syntax(_)), "{err}");

        let err = load::<K>("start = [é] ;").unwrap_err();
        assert!(matches!(err, Error::Syntax(_)), "{err}");

        let err = load::<K>("a = \"x\" ; a = \"y\" ;").unwrap_err();
        assert!(
            matches!(err, Error::Grammar(GrammarError::Duplicate(_))),
            "{err}"
        );
    }
}
