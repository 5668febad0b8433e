//! A backtracking PEG runtime for tokenizing wikitext, with deferred
//! semantic actions and packrat memoization.

pub mod codemap;
pub mod peg;
pub mod wikitext;
