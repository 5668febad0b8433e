use super::*;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum K {
    Text,
    Bold,
    Num,
    Sum,
    Total(i64),
}

fn leaf(kind: K, start: usize, end: usize) -> Tk<K> {
    Tk::leaf(kind, Span::new(start, end))
}

fn node(kind: K, start: usize, end: usize, children: Vec<Tk<K>>) -> Tk<K> {
    Tk::node(kind, Span::new(start, end), children)
}

/// `start = inline*; inline = bold / text; bold @Bold = "'''" (!"'''" text)+ "'''";
/// text :Text = [^']+ / "'"`, optionally without the `bold` alternative.
fn quotes(with_bold: bool) -> Grammar<K> {
    let mut b = GrammarBuilder::new();
    let inline = b.rule("inline");
    let bold = b.rule("bold");
    let text = b.rule("text");
    b.define("start", Shape::Transparent, star(call(inline)));
    if with_bold {
        b.define("inline", Shape::Transparent, choice([call(bold), call(text)]));
    } else {
        b.define("inline", Shape::Transparent, choice([call(text)]));
    }
    b.define(
        "bold",
        Shape::Node(K::Bold),
        seq([
            lit("'''"),
            plus(seq([not(lit("'''")), call(text)])),
            lit("'''"),
        ]),
    );
    b.define(
        "text",
        Shape::Leaf(K::Text),
        choice([plus(none_of(b"'")), lit("'")]),
    );
    b.build().unwrap()
}

fn num(cx: &mut ActionContext<'_, K, i64>) -> Result<(), ActionError> {
    let value = cx
        .text()
        .parse::<i64>()
        .map_err(|err| ActionError::from(err.to_string()))?;
    cx.set_value(value);
    Ok(())
}

fn first(cx: &mut ActionContext<'_, K, i64>) -> Result<(), ActionError> {
    let value = cx.take_label(0);
    cx.set_value(value);
    Ok(())
}

fn add(cx: &mut ActionContext<'_, K, i64>) -> Result<(), ActionError> {
    let value = cx.take_label(1);
    if let Some(sum) = cx.value_mut() {
        *sum += value;
    }
    Ok(())
}

fn total(cx: &mut ActionContext<'_, K, i64>) -> Result<(), ActionError> {
    let total = cx.label(0).copied().unwrap_or_default();
    if total > 100 {
        return Err("too large".into());
    }
    let span = cx.span();
    cx.emit(K::Total(total), span);
    Ok(())
}

/// Sums like `1+2+3`, optionally followed by `=`. Without the `=`, the first
/// alternative fails after matching the whole sum and the second one matches
/// it again from a deeper frame.
fn sums() -> Grammar<K, i64> {
    let mut b = GrammarBuilder::new();
    let num_action = b.action("num", num);
    let first = b.action("first", first);
    let add = b.action("add", add);
    let total = b.action("total", total);
    let sum = b.rule("sum");
    let wrapper = b.rule("wrapper");
    let number = b.rule("num");
    b.define(
        "start",
        Shape::Transparent,
        choice([act(seq([bind(0, sum), lit("=")]), total), call(wrapper)]),
    );
    b.define("wrapper", Shape::Transparent, act(bind(0, sum), total));
    b.define(
        "sum",
        Shape::Node(K::Sum),
        seq([
            act(bind(0, number), first),
            star(act(seq([lit("+"), bind(1, number)]), add)),
        ]),
    );
    b.define(
        "num",
        Shape::Leaf(K::Num),
        act(plus(class(ByteSet::new().with_range(b'0', b'9'))), num_action),
    );
    b.memoize(sum).memoize(number);
    b.build().unwrap()
}

fn exhausted<T: core::fmt::Debug>(result: Result<T, Error>) -> Failure {
    match result {
        Err(Error::Exhausted(failure)) => failure,
        other => panic!("expected a parse failure, got {other:?}"),
    }
}

#[test]
fn bold_then_plain() {
    let _ = env_logger::try_init();
    let tokens = tokenize(&quotes(true), "'''bold''' plain", Options::default()).unwrap();
    assert_eq!(
        tokens,
        [
            node(K::Bold, 0, 10, vec![leaf(K::Text, 3, 7)]),
            leaf(K::Text, 10, 16),
        ]
    );
}

#[test]
fn backtracked_alternative_leaves_nothing() {
    for source in ["'''x", "a'''b''c", "''", "'''''"] {
        let with = tokenize(&quotes(true), source, Options::default()).unwrap();
        assert!(with.iter().all(|token| token.kind == K::Text), "{source}");
        let without = tokenize(&quotes(false), source, Options::default()).unwrap();
        assert_eq!(with, without, "{source}");
    }

    assert_eq!(
        tokenize(&quotes(true), "'''x", Options::default()).unwrap(),
        [
            leaf(K::Text, 0, 1),
            leaf(K::Text, 1, 2),
            leaf(K::Text, 2, 3),
            leaf(K::Text, 3, 4),
        ]
    );
}

#[test]
fn empty_input() {
    assert_eq!(tokenize(&quotes(true), "", Options::default()).unwrap(), []);
}

#[test]
fn unmatchable_input() {
    let mut b = GrammarBuilder::<K, ()>::new();
    let word = b.rule("word");
    b.define("start", Shape::Transparent, plus(call(word)));
    b.define(
        "word",
        Shape::Leaf(K::Text),
        plus(class(ByteSet::new().with_range(b'a', b'z'))),
    );
    let grammar = b.build().unwrap();
    let failure = exhausted(tokenize(&grammar, "123", Options::default()));
    assert_eq!(failure.offset, 0);
    assert_eq!(failure.expected, ["word"]);
    assert_eq!(
        Error::Exhausted(failure).to_string(),
        "parse failed at offset 0; expected word"
    );
}

#[test]
fn lookahead_is_zero_width() {
    fn grammar(guard: fn(RuleId) -> Option<Expr>) -> Grammar<K> {
        let mut b = GrammarBuilder::new();
        let word = b.rule("word");
        let body = match guard(word) {
            Some(guard) => seq([guard, call(word)]),
            None => call(word),
        };
        b.define("start", Shape::Transparent, body);
        b.define(
            "word",
            Shape::Leaf(K::Text),
            plus(class(ByteSet::new().with_range(b'a', b'z'))),
        );
        b.build().unwrap()
    }
    let opts = Options::default();

    let plain = tokenize(&grammar(|_| None), "abc", opts).unwrap();
    assert_eq!(plain, [leaf(K::Text, 0, 3)]);

    // A positive lookahead which itself produces tokens leaves none behind.
    let guarded = grammar(|word| Some(and(call(word))));
    assert_eq!(tokenize(&guarded, "abc", opts).unwrap(), plain);

    let prefixed = grammar(|_| Some(and(lit("ab"))));
    assert_eq!(tokenize(&prefixed, "abc", opts).unwrap(), plain);
    let failure = exhausted(tokenize(&prefixed, "xbc", opts));
    assert_eq!(failure.offset, 0);

    let negated = grammar(|_| Some(not(lit("x"))));
    assert_eq!(tokenize(&negated, "abc", opts).unwrap(), plain);
    exhausted(tokenize(&negated, "xbc", opts));
}

#[test]
fn actions_and_values() {
    let grammar = sums();
    let expected = |end| {
        vec![
            node(
                K::Sum,
                0,
                5,
                vec![leaf(K::Num, 0, 1), leaf(K::Num, 2, 3), leaf(K::Num, 4, 5)],
            ),
            leaf(K::Total(6), 0, end),
        ]
    };

    for memo in [Memo::Off, Memo::Marked, Memo::All] {
        let opts = Options {
            memo,
            ..Options::default()
        };
        assert_eq!(tokenize(&grammar, "1+2+3=", opts).unwrap(), expected(6));
        assert_eq!(tokenize(&grammar, "1+2+3", opts).unwrap(), expected(5));
        assert_eq!(
            tokenize(&grammar, "40+2", opts).unwrap()[1],
            leaf(K::Total(42), 0, 4)
        );
    }
}

#[test]
fn action_failure() {
    let result = tokenize(&sums(), "60+50", Options::default());
    let Err(Error::Action {
        action,
        span,
        message,
    }) = result
    else {
        panic!("expected an action failure, got {result:?}");
    };
    assert_eq!(action, "total");
    assert_eq!(span, Span::new(0, 5));
    assert_eq!(message, "too large");
}

fn fold_bold(cx: &mut ActionContext<'_, K, ()>) -> Result<(), ActionError> {
    cx.fold(K::Bold);
    Ok(())
}

#[test]
fn fold_keeps_earlier_siblings() {
    let mut b = GrammarBuilder::<K, ()>::new();
    let fold = b.action("fold", fold_bold);
    let x = b.rule("x");
    let y = b.rule("y");
    b.define(
        "start",
        Shape::Transparent,
        seq([call(x), act(plus(call(y)), fold)]),
    );
    b.define("x", Shape::Leaf(K::Text), lit("x"));
    b.define("y", Shape::Leaf(K::Num), lit("y"));
    let grammar = b.build().unwrap();

    assert_eq!(
        tokenize(&grammar, "xyy", Options::default()).unwrap(),
        [
            leaf(K::Text, 0, 1),
            node(K::Bold, 1, 3, vec![leaf(K::Num, 1, 2), leaf(K::Num, 2, 3)]),
        ]
    );
}

#[test]
fn trailing_input() {
    let failure = exhausted(tokenize(&sums(), "1+2?", Options::default()));
    assert_eq!(failure.offset, 3);
    assert!(failure.expected.contains(&"end of input".to_string()));
}

#[test]
fn bounded_repetition() {
    let mut b = GrammarBuilder::<K, ()>::new();
    let run = b.rule("run");
    b.define("start", Shape::Transparent, plus(call(run)));
    b.define("run", Shape::Leaf(K::Text), repeat(lit("a"), 2, Some(3)));
    let grammar = b.build().unwrap();

    assert_eq!(
        tokenize(&grammar, "aaaaa", Options::default()).unwrap(),
        [leaf(K::Text, 0, 3), leaf(K::Text, 3, 5)]
    );
    let failure = exhausted(tokenize(&grammar, "a", Options::default()));
    assert_eq!(failure.offset, 1);
    assert_eq!(failure.expected, ["run"]);
}

#[test]
fn empty_repetition_terminates() {
    let mut b = GrammarBuilder::<K, ()>::new();
    b.define("start", Shape::Transparent, star(opt(lit("a"))));
    let grammar = b.build().unwrap();
    assert_eq!(tokenize(&grammar, "aaa", Options::default()).unwrap(), []);
    let failure = exhausted(tokenize(&grammar, "aab", Options::default()));
    assert_eq!(failure.offset, 2);
    assert_eq!(failure.expected, ["end of input", "start"]);
}

#[test]
fn left_recursion_is_an_error() {
    let mut b = GrammarBuilder::<K, ()>::new();
    let start = b.rule("start");
    b.define(
        "start",
        Shape::Transparent,
        choice([seq([call(start), lit("x")]), lit("x")]),
    );
    let grammar = b.build().unwrap();
    let opts = Options {
        max_depth: 64,
        ..Options::default()
    };
    assert!(matches!(
        tokenize(&grammar, "xx", opts),
        Err(Error::RecursionLimit(64))
    ));
}

#[test]
fn primitives() {
    let mut b = GrammarBuilder::<K, ()>::new();
    let marker = b.rule("marker");
    let tag = b.rule("tag");
    let ch = b.rule("ch");
    b.define(
        "start",
        Shape::Transparent,
        seq([star(choice([call(marker), call(tag), call(ch)])), eof()]),
    );
    b.define("marker", Shape::Leaf(K::Bold), seq([sol(), lit("#")]));
    b.define("tag", Shape::Leaf(K::Num), lit_nocase("<br>"));
    b.define("ch", Shape::Leaf(K::Text), any());
    let grammar = b.build().unwrap();

    let kinds_and_spans = |source| {
        tokenize(&grammar, source, Options::default())
            .unwrap()
            .into_iter()
            .map(|token| (token.kind, token.span.start, token.span.end))
            .collect::<Vec<_>>()
    };

    assert_eq!(
        kinds_and_spans("#é\n#<BR>#"),
        [
            (K::Bold, 0, 1),
            (K::Text, 1, 3),
            (K::Text, 3, 4),
            (K::Bold, 4, 5),
            (K::Num, 5, 9),
            (K::Text, 9, 10),
        ]
    );
}

#[test]
fn chunked() {
    let mut b = GrammarBuilder::<K, ()>::new();
    let block = b.rule("block");
    let word = b.rule("word");
    b.define("start", Shape::Transparent, star(call(block)));
    b.define(
        "block",
        Shape::Node(K::Bold),
        seq([call(word), opt(lit("\n"))]),
    );
    b.define(
        "word",
        Shape::Leaf(K::Text),
        plus(class(ByteSet::new().with_range(b'a', b'z'))),
    );
    let grammar = b.build().unwrap();
    let opts = Options::default();

    let source = "ab\ncd\nef";
    let whole = tokenize(&grammar, source, opts).unwrap();
    let chunks = chunks(&grammar, block, source, opts)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks.concat(), whole);
    assert_eq!(
        chunks[1],
        [node(K::Bold, 3, 6, vec![leaf(K::Text, 3, 5)])]
    );

    let mut iter = super::chunks(&grammar, block, "ab\n?x", opts).unwrap();
    assert!(format!("{iter:?}").starts_with("Chunks"));
    assert!(iter.next().unwrap().is_ok());
    let failure = exhausted(iter.next().unwrap());
    assert_eq!(failure.offset, 3);
    assert_eq!(failure.expected, ["word"]);
    assert!(iter.next().is_none());

    assert!(super::chunks(&grammar, block, "", opts).unwrap().next().is_none());
}

#[test]
fn options() {
    assert_eq!("off".parse::<Memo>(), Ok(Memo::Off));
    assert_eq!("marked".parse::<Memo>(), Ok(Memo::Marked));
    assert_eq!("all".parse::<Memo>(), Ok(Memo::All));
    assert!("some".parse::<Memo>().is_err());
    let opts = Options::default();
    assert_eq!(opts.memo, Memo::Marked);
    assert_eq!(opts.max_depth, 256);
    assert_eq!(opts.initial_capacity.thunks, 32);
}

#[test]
fn grammars_are_shareable() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Grammar<K, i64>>();
}
