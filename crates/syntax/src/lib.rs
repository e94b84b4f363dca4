//! Lexer, AST and parser for sink source text.
//!
//! `ast`/`lexer`/`parser` modules, a crate-local `Error`/`Result`; the
//! lexer is hand-rolled instead of `logos`-generated (see `crate::lexer`
//! docs), and there's just one parser module, no separate grammar
//! experiment.

pub mod ast;
pub mod lexer;
pub mod parser;

pub use diag::Error;
pub use parser::parse;

pub type Result<T, E = diag::Error> = std::result::Result<T, E>;
