use super::*;
use crate::codemap::FileMap;


const BASE_DIR: &str = "./src/wikitext/tests";

macro_rules! run_tests {
    ($($name:ident),* $(,)?) => {
        $(#[test]
        fn $name() {
            run_test(
                stringify!($name),
                include_str!(concat!("./inputs/", stringify!($name), ".wiki"))
            );
        })*
    }
}

#[track_caller]
fn run_test(test_name: &str, input: &str) {
    use std::io::Write as _;

    let _ = env_logger::try_init();
    let mut mint = goldenfile::Mint::new(format!("{BASE_DIR}/goldenfiles"));
    let mut file = mint.new_goldenfile(format!("{test_name}.txt")).unwrap();
    let result = Tokenizer::default().tokenize(input).unwrap();
    let _ = writeln!(
        file,
        "{:#?}",
        inspectors::inspect(&FileMap::new(input), &result.root)
    );
}

/// Tokenizes `input` with the built-in grammar.
#[track_caller]
fn tokens(input: &str) -> Vec<Tk<TokenKind>> {
    Tokenizer::default().tokenize(input).unwrap().root
}

run_tests! {
    blocks,
    inline,
    links,
}
