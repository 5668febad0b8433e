use rayon::prelude::*;
use std::{
    io::Read as _,
    path::{Path, PathBuf},
    process::ExitCode,
    time::Instant,
};
use wikitok::{
    codemap::FileMap,
    peg::{Memo, Options, notation},
    wikitext::{Error, Output, TokenKind, Tokenizer, inspect},
};

/// How to print token trees.
#[derive(Clone, Copy)]
struct Mode {
    /// Print JSON instead of an inspector tree.
    json: bool,
    /// Tokenize one top-level block at a time.
    chunks: bool,
}

fn usage<T>(err: &'static str) -> anyhow::Result<T> {
    let exe = std::env::args().next().unwrap_or_default();
    println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    println!("Usage: {exe} [options] [FILE...]\n");
    println!("Reads standard input when no files are given.\n");
    println!("Options:");
    println!("    --json: Print tokens as JSON");
    println!("    --grammar FILE: Use a rule table from FILE instead of the built-in one");
    println!("    --memo off|marked|all: Which rule results to cache (default: marked)");
    println!("    --max-depth N: Maximum expression nesting depth (default: 256)");
    println!("    --chunks: Tokenize one top-level block at a time\n");
    Err(anyhow::Error::msg(err))
}

/// Reads a document from `path`, or from standard input for `-`.
fn read_document(path: &Path) -> anyhow::Result<String> {
    let mut source = String::new();
    if path == Path::new("-") {
        std::io::stdin().read_to_string(&mut source)?;
    } else {
        source = std::fs::read_to_string(path)
            .map_err(|err| anyhow::anyhow!("{}: {err}", path.display()))?;
    }
    Ok(source)
}

/// Tokenizes one document and formats the result.
fn render(tokenizer: &Tokenizer<'_>, source: &str, mode: Mode) -> anyhow::Result<String> {
    let root = if mode.chunks {
        let mut root = Vec::new();
        for chunk in tokenizer.chunks(source)? {
            root.extend(chunk?);
        }
        root
    } else {
        tokenizer.tokenize(source)?.root
    };

    Ok(if mode.json {
        serde_json::to_string_pretty(&Output { root })?
    } else {
        format!("{:#?}", inspect(&FileMap::new(source), &root))
    })
}

fn main() -> anyhow::Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let mut args = pico_args::Arguments::from_env();
    if args.contains(["-h", "--help"]) {
        let _ = usage::<()>("Help requested");
        return Ok(ExitCode::SUCCESS);
    }
    let mode = Mode {
        json: args.contains("--json"),
        chunks: args.contains("--chunks"),
    };
    let grammar_path = args.opt_value_from_str::<_, PathBuf>("--grammar")?;
    let defaults = Options::default();
    let options = Options {
        memo: args.opt_value_from_str::<_, Memo>("--memo")?.unwrap_or(defaults.memo),
        max_depth: args
            .opt_value_from_str("--max-depth")?
            .unwrap_or(defaults.max_depth),
        ..defaults
    };
    let _ = args.contains("--");

    let mut paths = Vec::new();
    for arg in args.finish() {
        if arg != "-" && arg.to_string_lossy().starts_with('-') {
            return usage("Unknown option passed");
        }
        paths.push(PathBuf::from(arg));
    }
    if paths.is_empty() {
        paths.push(PathBuf::from("-"));
    }

    let custom = grammar_path
        .map(|path| {
            let source = read_document(&path)?;
            notation::load::<TokenKind>(&source)
                .map_err(|err| anyhow::anyhow!("{}: {err}", path.display()))
        })
        .transpose()?;
    let tokenizer = match &custom {
        Some(grammar) => Tokenizer::with_grammar(grammar, options),
        None => Tokenizer::new(options),
    };

    let documents = paths
        .into_iter()
        .map(|path| Ok((path.display().to_string(), read_document(&path)?)))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let results = documents
        .par_iter()
        .map(|(name, source)| {
            let time = Instant::now();
            let result = render(&tokenizer, source, mode);
            log::info!("Tokenized {name} in {:.2?}", time.elapsed());
            result
        })
        .collect::<Vec<_>>();

    let mut status = ExitCode::SUCCESS;
    for ((name, source), result) in documents.iter().zip(results) {
        match result {
            Ok(text) => println!("{text}"),
            Err(err) => {
                eprintln!("{name}:{err}");
                if let Some(Error::Syntax { at, .. } | Error::Action { at, .. }) =
                    err.downcast_ref::<Error>()
                    && let Some(line) = FileMap::new(source).line_span(at.line)
                {
                    eprintln!("    {}", &source[line.into_range()]);
                }
                status = ExitCode::FAILURE;
            }
        }
    }
    Ok(status)
}
