use span::Spanned;

use super::Parser;
use crate::ast::{Module, Stmt, StmtKind};
use crate::lexer::{Keyword, Punct, TokenKind};

/// Block terminators: statement lists stop as soon as one of these keywords
/// (or EOF) is the lookahead, without consuming it — the caller decides what
/// to do with `end`/`else`/`elseif`.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Term {
  End,
  Else,
  Elseif,
}

impl<'src> Parser<'src> {
  pub(super) fn parse_module(&mut self) -> super::Result<Module<'src>> {
    let body = self.stmt_list(&[])?;
    if !self.is_eof() {
      return Err(self.err(self.span(), "expected end of input"));
    }
    Ok(Module { body })
  }

  fn at_terminator(&self, terms: &[Term]) -> bool {
    if self.is_eof() {
      return true;
    }
    terms.iter().any(|t| match t {
      Term::End => self.is_kw(Keyword::End),
      Term::Else => self.is_kw(Keyword::Else),
      Term::Elseif => self.is_kw(Keyword::Elseif),
    })
  }

  fn stmt_list(&mut self, terms: &[Term]) -> super::Result<Vec<Stmt<'src>>> {
    let mut out = vec![];
    self.skip_newlines()?;
    while !self.at_terminator(terms) {
      out.push(self.stmt()?);
      if self.at_terminator(terms) || self.is_eof() {
        break;
      }
      if !self.is_newline() {
        return Err(self.err(self.span(), "expected end of statement"));
      }
      self.skip_newlines()?;
    }
    Ok(out)
  }

  /// A block that always ends in `end` (while/for/loop/def/namespace/enum).
  fn block_until_end(&mut self) -> super::Result<Vec<Stmt<'src>>> {
    let body = self.stmt_list(&[Term::End])?;
    self.expect_kw(Keyword::End)?;
    Ok(body)
  }

  fn stmt(&mut self) -> super::Result<Stmt<'src>> {
    let start = self.span();
    self.check_recursion(start)?;

    // One-token-lookahead label intercept: `ident ':'`.
    if let TokenKind::Ident(name) = self.cur.kind.clone() {
      let saved_lexer = self.lexer.clone();
      let saved_cur = self.cur.clone();
      self.bump()?;
      if self.is_punct(Punct::Colon) {
        let end = self.bump()?.span;
        return Ok(Spanned::new(
          start.join(end),
          StmtKind::Label(crate::ast::Ident::new(start, name)),
        ));
      }
      // not a label: rewind.
      self.lexer = saved_lexer;
      self.cur = saved_cur;
    }

    if self.is_kw(Keyword::Var) {
      return self.stmt_var(start);
    }
    if self.is_kw(Keyword::If) {
      return self.stmt_if(start);
    }
    if self.is_kw(Keyword::While) {
      return self.stmt_while(start);
    }
    if self.is_kw(Keyword::For) {
      return self.stmt_for(start);
    }
    if self.is_kw(Keyword::Loop) {
      self.bump()?;
      let body = self.block_until_end()?;
      return Ok(Spanned::new(start.join(self.prev_span()), StmtKind::Loop { body }));
    }
    if self.is_kw(Keyword::Break) {
      let end = self.bump()?.span;
      return Ok(Spanned::new(start.join(end), StmtKind::Break));
    }
    if self.is_kw(Keyword::Continue) {
      let end = self.bump()?.span;
      return Ok(Spanned::new(start.join(end), StmtKind::Continue));
    }
    if self.is_kw(Keyword::Return) {
      self.bump()?;
      if self.is_newline() || self.is_eof() || self.is_kw(Keyword::End) {
        return Ok(Spanned::new(start, StmtKind::Return(None)));
      }
      let e = self.expr()?;
      let span = start.join(e.span);
      return Ok(Spanned::new(span, StmtKind::Return(Some(e))));
    }
    if self.is_kw(Keyword::Def) {
      return self.stmt_def(start);
    }
    if self.is_kw(Keyword::Namespace) {
      self.bump()?;
      let name = self.ident()?;
      let body = self.block_until_end()?;
      return Ok(Spanned::new(
        start.join(self.prev_span()),
        StmtKind::Namespace { name, body },
      ));
    }
    if self.is_kw(Keyword::Using) {
      self.bump()?;
      let mut names = vec![self.ident()?];
      while self.eat_punct(Punct::Comma)? {
        names.push(self.ident()?);
      }
      return Ok(Spanned::new(start.join(self.prev_span()), StmtKind::Using(names)));
    }
    if self.is_kw(Keyword::Enum) {
      return self.stmt_enum(start);
    }
    if self.is_kw(Keyword::Goto) {
      self.bump()?;
      let name = self.ident()?;
      return Ok(Spanned::new(start.join(name.span), StmtKind::Goto(name)));
    }

    let e = self.expr()?;
    let span = e.span;
    Ok(Spanned::new(span, StmtKind::Expr(e)))
  }

  fn prev_span(&self) -> span::Span {
    self.cur.span
  }

  fn stmt_var(&mut self, start: span::Span) -> super::Result<Stmt<'src>> {
    self.bump()?;
    let mut decls = vec![];
    loop {
      let lv = self.lvalue()?;
      let init = if self.eat_punct(Punct::Eq)? {
        Some(self.expr()?)
      } else {
        None
      };
      decls.push((lv, init));
      if !self.eat_punct(Punct::Comma)? {
        break;
      }
    }
    let span = start.join(self.prev_span());
    Ok(Spanned::new(span, StmtKind::Var(decls)))
  }

  fn stmt_if(&mut self, start: span::Span) -> super::Result<Stmt<'src>> {
    self.bump()?; // if
    let mut arms = vec![];
    let cond = self.expr()?;
    let body = self.stmt_list(&[Term::End, Term::Else, Term::Elseif])?;
    arms.push((cond, body));
    while self.is_kw(Keyword::Elseif) {
      self.bump()?;
      let cond = self.expr()?;
      let body = self.stmt_list(&[Term::End, Term::Else, Term::Elseif])?;
      arms.push((cond, body));
    }
    let else_ = if self.eat_kw(Keyword::Else)? {
      Some(self.stmt_list(&[Term::End])?)
    } else {
      None
    };
    self.expect_kw(Keyword::End)?;
    Ok(Spanned::new(
      start.join(self.prev_span()),
      StmtKind::If { arms, else_ },
    ))
  }

  fn stmt_while(&mut self, start: span::Span) -> super::Result<Stmt<'src>> {
    self.bump()?;
    let cond = self.expr()?;
    let body = self.block_until_end()?;
    Ok(Spanned::new(
      start.join(self.prev_span()),
      StmtKind::While { cond, body },
    ))
  }

  fn stmt_for(&mut self, start: span::Span) -> super::Result<Stmt<'src>> {
    self.bump()?;
    let declares = self.eat_kw(Keyword::Var)?;
    let lvalue = self.lvalue()?;
    self.expect_punct(Punct::Colon)?;
    let iter = self.expr()?;
    let body = self.block_until_end()?;
    Ok(Spanned::new(
      start.join(self.prev_span()),
      StmtKind::For {
        lvalue,
        declares,
        iter,
        body,
      },
    ))
  }

  fn stmt_def(&mut self, start: span::Span) -> super::Result<Stmt<'src>> {
    self.bump()?;
    let name = self.ident()?;
    let mut params = vec![];
    let mut rest = None;
    if self.eat_punct(Punct::LParen)? {
      if !self.is_punct(Punct::RParen) {
        loop {
          if self.eat_punct(Punct::DotDotDot)? {
            rest = Some(self.ident()?);
            break;
          }
          params.push(self.lvalue()?);
          if !self.eat_punct(Punct::Comma)? {
            break;
          }
        }
      }
      self.expect_punct(Punct::RParen)?;
    } else {
      // parenthesis-less parameter list: `def f a, b`
      if !self.is_newline() && !self.is_eof() {
        loop {
          if self.eat_punct(Punct::DotDotDot)? {
            rest = Some(self.ident()?);
            break;
          }
          params.push(self.lvalue()?);
          if !self.eat_punct(Punct::Comma)? {
            break;
          }
        }
      }
    }
    let body = self.block_until_end()?;
    Ok(Spanned::new(
      start.join(self.prev_span()),
      StmtKind::Def {
        name,
        params,
        rest,
        body,
      },
    ))
  }

  fn stmt_enum(&mut self, start: span::Span) -> super::Result<Stmt<'src>> {
    self.bump()?;
    let name = if let TokenKind::Ident(_) = self.cur.kind {
      Some(self.ident()?)
    } else {
      None
    };
    self.skip_newlines()?;
    let mut members = vec![];
    while !self.is_kw(Keyword::End) {
      let member_name = self.ident()?;
      let value = if self.eat_punct(Punct::Eq)? {
        Some(self.expr()?)
      } else {
        None
      };
      members.push((member_name, value));
      if self.is_newline() {
        self.skip_newlines()?;
      } else if !self.eat_punct(Punct::Comma)? {
        break;
      } else {
        self.skip_newlines()?;
      }
    }
    self.expect_kw(Keyword::End)?;
    Ok(Spanned::new(
      start.join(self.prev_span()),
      StmtKind::Enum { name, members },
    ))
  }
}
