use diag::Error;
use span::Span;

use super::Parser;
use crate::lexer::{Keyword, Punct, TokenKind};

impl<'src> Parser<'src> {
  pub(super) fn span(&self) -> Span {
    self.cur.span
  }

  pub(super) fn err(&self, span: impl Into<Span>, msg: impl Into<String>) -> Error {
    Error::parse(self.file.clone(), span.into(), msg.into())
  }

  pub(super) fn is_eof(&self) -> bool {
    matches!(self.cur.kind, TokenKind::Eof)
  }

  pub(super) fn is_newline(&self) -> bool {
    matches!(self.cur.kind, TokenKind::Newline { .. })
  }

  pub(super) fn is_kw(&self, kw: Keyword) -> bool {
    matches!(self.cur.kind, TokenKind::Keyword(k) if k == kw)
  }

  pub(super) fn is_punct(&self, p: Punct) -> bool {
    matches!(self.cur.kind, TokenKind::Punct(p2) if p2 == p)
  }

  /// Advances the cursor by one token, returning the token that was current.
  pub(super) fn bump(&mut self) -> super::Result<crate::lexer::Token<'src>> {
    let next = self.lexer.next()?;
    Ok(std::mem::replace(&mut self.cur, next))
  }

  pub(super) fn eat_punct(&mut self, p: Punct) -> super::Result<bool> {
    if self.is_punct(p) {
      self.bump()?;
      Ok(true)
    } else {
      Ok(false)
    }
  }

  pub(super) fn eat_kw(&mut self, kw: Keyword) -> super::Result<bool> {
    if self.is_kw(kw) {
      self.bump()?;
      Ok(true)
    } else {
      Ok(false)
    }
  }

  pub(super) fn expect_punct(&mut self, p: Punct) -> super::Result<Span> {
    if !self.is_punct(p) {
      return Err(self.err(self.span(), format!("expected `{p:?}`")));
    }
    Ok(self.bump()?.span)
  }

  pub(super) fn expect_kw(&mut self, kw: Keyword) -> super::Result<Span> {
    if !self.is_kw(kw) {
      return Err(self.err(self.span(), format!("expected `{kw:?}`")));
    }
    Ok(self.bump()?.span)
  }

  /// Skips zero or more soft/hard newlines (blank statement separators).
  pub(super) fn skip_newlines(&mut self) -> super::Result<()> {
    while self.is_newline() {
      self.bump()?;
    }
    Ok(())
  }

  pub(super) fn check_recursion(&self, span: Span) -> super::Result<()> {
    check_recursion_limit(span, &self.file)
  }

  pub(super) fn ident(&mut self) -> super::Result<ast::Ident<'src>> {
    let span = self.span();
    match self.cur.kind.clone() {
      TokenKind::Ident(name) => {
        self.bump()?;
        Ok(ast::Ident::new(span, name))
      }
      _ => Err(self.err(span, "expected identifier")),
    }
  }
}

use crate::ast;

// On average a single parse_XXX() call consumes a few hundred bytes of stack;
// assume ~50 recursive dives per nesting level and round up.
const MINIMUM_STACK_REQUIRED: usize = 64_000;

#[cfg(all(feature = "check-recursion-limit", not(target_family = "wasm")))]
pub(super) fn check_recursion_limit(span: Span, file: &str) -> super::Result<()> {
  if stacker::remaining_stack()
    .map(|available| available > MINIMUM_STACK_REQUIRED)
    .unwrap_or(true)
  {
    Ok(())
  } else {
    Err(Error::parse(file.to_string(), span, "nesting limit reached"))
  }
}

#[cfg(any(not(feature = "check-recursion-limit"), target_family = "wasm"))]
pub(super) fn check_recursion_limit(_span: Span, _file: &str) -> super::Result<()> {
  Ok(())
}
