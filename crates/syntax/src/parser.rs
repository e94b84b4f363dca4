//! Recursive-descent / precedence-climbing parser.
//!
//! An ordinary recursive-descent parser: a `Parser` struct holding a lexer
//! plus one token of lookahead, with `fn expr`/`fn stmt` methods doing
//! precedence climbing. Grammatical position becomes a Rust call frame
//! instead of an explicit state enum, which is what lets the incremental,
//! one-token-at-a-time grammar read as ordinary recursive descent.

mod common;
mod expr;
mod stmt;

use ast::Module;
use diag::Error;

use crate::ast;
use crate::lexer::{Lexer, Token, TokenKind};

pub struct Parser<'src> {
  file: String,
  lexer: Lexer<'src>,
  cur: Token<'src>,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Parses a complete module from source text. `file` is used only to stamp
/// diagnostics (`file:line:col: msg`).
pub fn parse<'src>(file: impl Into<String>, src: &'src str) -> Result<Module<'src>> {
  let mut lexer = Lexer::new(src);
  let cur = lexer.next()?;
  let mut parser = Parser {
    file: file.into(),
    lexer,
    cur,
  };
  parser.parse_module()
}

#[cfg(test)]
mod tests;
