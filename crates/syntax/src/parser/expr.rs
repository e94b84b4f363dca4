use span::{Span, Spanned};

use super::Parser;
use crate::ast::{self, AssignOp, BinaryOp, Expr, ExprKind, Lvalue, LvalueKind, PrefixOp, StrPart};
use crate::lexer::{InterpPart, Keyword, Punct, TokenKind};

/// Binding power of each infix operator: lower binds *tighter* (`pow` is
/// precedence 1, the assignment family is precedence 20). The remaining
/// levels are arranged in the conventional order (multiplicative tighter
/// than additive tighter than concat tighter than comparisons tighter
/// than equality tighter than `&&` tighter than `||`).
fn infix_bp(op: BinaryOp) -> (u8, u8) {
  // (left binding power, right binding power); right < left means left-assoc.
  match op {
    BinaryOp::Pow => (2, 1), // right-associative, tightest
    BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => (3, 4),
    BinaryOp::Add | BinaryOp::Sub => (5, 6),
    BinaryOp::Concat => (7, 8),
    BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => (9, 10),
    BinaryOp::Eq | BinaryOp::Ne => (11, 12),
    BinaryOp::And => (13, 14),
    BinaryOp::Or => (15, 16),
    BinaryOp::Pipe => (17, 18),
  }
}

const ASSIGN_BP: u8 = 20;

impl<'src> Parser<'src> {
  /// Parses a full expression, including the lowest-precedence assignment
  /// family (precedence 20, right-associative).
  pub(crate) fn expr(&mut self) -> super::Result<Expr<'src>> {
    self.expr_bp(0)
  }

  fn expr_bp(&mut self, min_bp: u8) -> super::Result<Expr<'src>> {
    let mut lhs = self.expr_prefix()?;

    loop {
      if let Some(op) = self.peek_assign_op()? {
        if ASSIGN_BP < min_bp {
          break;
        }
        self.bump()?;
        let lvalue = self.expr_to_lvalue(lhs)?;
        // right-associative: same binding power on the recursive call
        let rhs = self.expr_bp(ASSIGN_BP)?;
        let span = lvalue.span.join(rhs.span);
        lhs = Expr::new(span, ExprKind::Assign(op, Box::new(lvalue), Box::new(rhs)));
        continue;
      }

      let Some(op) = self.peek_binary_op() else {
        break;
      };
      let (l_bp, r_bp) = infix_bp(op);
      if l_bp < min_bp {
        break;
      }
      let op_span = self.span();
      self.bump()?;
      let rhs = self.expr_bp(r_bp)?;
      if op == BinaryOp::Pipe && !matches!(rhs.kind, ExprKind::Call { .. } | ExprKind::Name(_)) {
        return Err(self.err(op_span.join(rhs.span), "right-hand side of `|` must be a call or name"));
      }
      let span = lhs.span.join(rhs.span);
      lhs = self.fold_binary(span, op, lhs, rhs);
    }

    Ok(lhs)
  }

  fn peek_binary_op(&self) -> Option<BinaryOp> {
    Some(match self.cur.kind {
      TokenKind::Punct(Punct::Caret) => BinaryOp::Pow,
      TokenKind::Punct(Punct::Star) => BinaryOp::Mul,
      TokenKind::Punct(Punct::Slash) => BinaryOp::Div,
      TokenKind::Punct(Punct::Percent) => BinaryOp::Mod,
      TokenKind::Punct(Punct::Plus) => BinaryOp::Add,
      TokenKind::Punct(Punct::Minus) => BinaryOp::Sub,
      TokenKind::Punct(Punct::Tilde) => BinaryOp::Concat,
      TokenKind::Punct(Punct::Lt) => BinaryOp::Lt,
      TokenKind::Punct(Punct::Le) => BinaryOp::Le,
      TokenKind::Punct(Punct::Gt) => BinaryOp::Gt,
      TokenKind::Punct(Punct::Ge) => BinaryOp::Ge,
      TokenKind::Punct(Punct::EqEq) => BinaryOp::Eq,
      TokenKind::Punct(Punct::Ne) => BinaryOp::Ne,
      TokenKind::Punct(Punct::AndAnd) => BinaryOp::And,
      TokenKind::Punct(Punct::OrOr) => BinaryOp::Or,
      TokenKind::Punct(Punct::Pipe) => BinaryOp::Pipe,
      _ => return None,
    })
  }

  fn peek_assign_op(&mut self) -> super::Result<Option<AssignOp>> {
    Ok(Some(match self.cur.kind {
      TokenKind::Punct(Punct::Eq) => AssignOp::Set,
      TokenKind::Punct(Punct::PlusEq) => AssignOp::Add,
      TokenKind::Punct(Punct::MinusEq) => AssignOp::Sub,
      TokenKind::Punct(Punct::StarEq) => AssignOp::Mul,
      TokenKind::Punct(Punct::SlashEq) => AssignOp::Div,
      TokenKind::Punct(Punct::PercentEq) => AssignOp::Mod,
      TokenKind::Punct(Punct::TildeEq) => AssignOp::Concat,
      TokenKind::Punct(Punct::AndAndEq) => AssignOp::AndAnd,
      TokenKind::Punct(Punct::OrOrEq) => AssignOp::OrOr,
      _ => return Ok(None),
    }))
  }

  fn expr_prefix(&mut self) -> super::Result<Expr<'src>> {
    let start = self.span();
    self.check_recursion(start)?;
    let op = match self.cur.kind {
      TokenKind::Punct(Punct::Plus) => Some(PrefixOp::Pos),
      TokenKind::Punct(Punct::Minus) => Some(PrefixOp::Neg),
      TokenKind::Punct(Punct::Amp) => Some(PrefixOp::Ref),
      TokenKind::Punct(Punct::Bang) => Some(PrefixOp::Not),
      TokenKind::Punct(Punct::DotDotDot) => Some(PrefixOp::Spread),
      _ => None,
    };
    let Some(op) = op else {
      return self.expr_postfix();
    };
    self.bump()?;
    let operand = self.expr_prefix()?;
    let span = start.join(operand.span);
    Ok(self.fold_prefix(span, op, operand))
  }

  fn fold_prefix(&self, span: Span, op: PrefixOp, operand: Expr<'src>) -> Expr<'src> {
    if let (PrefixOp::Pos | PrefixOp::Neg, ExprKind::Number(n)) = (op, &operand.kind) {
      let n = if op == PrefixOp::Neg { -*n } else { *n };
      return Expr::new(span, ExprKind::Number(n));
    }
    Expr::new(span, ExprKind::Prefix(op, Box::new(operand)))
  }

  fn fold_binary(&self, span: Span, op: BinaryOp, lhs: Expr<'src>, rhs: Expr<'src>) -> Expr<'src> {
    if let (ExprKind::Number(a), ExprKind::Number(b)) = (&lhs.kind, &rhs.kind) {
      let (a, b) = (*a, *b);
      let folded = match op {
        BinaryOp::Pow => Some(a.powf(b)),
        BinaryOp::Mul => Some(a * b),
        BinaryOp::Div => Some(a / b),
        BinaryOp::Mod => Some(a % b),
        BinaryOp::Add => Some(a + b),
        BinaryOp::Sub => Some(a - b),
        _ => None,
      };
      if let Some(n) = folded {
        return Expr::new(span, ExprKind::Number(n));
      }
    }
    if op == BinaryOp::Concat {
      if let (ExprKind::Str(a), ExprKind::Str(b)) = (&lhs.kind, &rhs.kind) {
        let mut parts = a.clone();
        parts.extend(b.clone());
        return Expr::new(span, ExprKind::Str(parts));
      }
      if let (ExprKind::List(a), ExprKind::List(b)) = (&lhs.kind, &rhs.kind) {
        let mut items = a.clone();
        items.extend(b.clone());
        return Expr::new(span, ExprKind::List(items));
      }
    }
    Expr::new(span, ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)))
  }

  fn expr_postfix(&mut self) -> super::Result<Expr<'src>> {
    let mut e = self.expr_primary()?;
    loop {
      if self.is_punct(Punct::LParen) {
        let lparen = self.bump()?.span;
        let mut args = vec![];
        if !self.is_punct(Punct::RParen) {
          loop {
            args.push(self.expr()?);
            if !self.eat_punct(Punct::Comma)? {
              break;
            }
          }
        }
        let rparen = self.expect_punct(Punct::RParen)?;
        let span = e.span.join(lparen).join(rparen);
        e = Expr::new(
          span,
          ExprKind::Call {
            callee: Box::new(e),
            args,
          },
        );
        continue;
      }
      if self.is_punct(Punct::LBracket) {
        self.bump()?;
        e = self.expr_index_or_slice(e)?;
        continue;
      }
      if self.is_punct(Punct::Dot) {
        self.bump()?;
        let name = self.ident()?;
        let span = e.span.join(name.span);
        e = match e.kind {
          ExprKind::Path(mut segs) => {
            segs.push(name);
            Expr::new(span, ExprKind::Path(segs))
          }
          ExprKind::Name(head) => {
            let head_span = e.span;
            Expr::new(
              span,
              ExprKind::Path(vec![ast::Ident::new(head_span, head), name]),
            )
          }
          _ => return Err(self.err(span, "`.` may only follow a name or path")),
        };
        continue;
      }
      break;
    }
    if matches!(e.kind, ExprKind::Name(_) | ExprKind::Path(_)) && self.can_start_bare_arg() {
      e = self.bare_call(e)?;
    }
    Ok(e)
  }

  /// Command-call syntax without parens (`say 'hello'`, `say a + b`,
  /// `list.push a, a`, `range 3`): a bare name
  /// or path immediately followed by something that can only be the start
  /// of an argument expression is a call, same as if parens had been
  /// written. `+`/`-` are deliberately excluded (see `can_start_bare_arg`)
  /// so ordinary binary arithmetic (`x + y`) is never misread as `x(+y)`.
  fn bare_call(&mut self, callee: Expr<'src>) -> super::Result<Expr<'src>> {
    let mut args = vec![self.expr()?];
    while self.eat_punct(Punct::Comma)? {
      args.push(self.expr()?);
    }
    let span = callee.span.join(args.last().unwrap().span);
    Ok(Expr::new(
      span,
      ExprKind::Call {
        callee: Box::new(callee),
        args,
      },
    ))
  }

  fn can_start_bare_arg(&self) -> bool {
    matches!(
      self.cur.kind,
      TokenKind::Number(_)
        | TokenKind::Str(_)
        | TokenKind::InterpStart
        | TokenKind::Ident(_)
        | TokenKind::Keyword(Keyword::Nil)
        | TokenKind::Punct(Punct::LBrace)
        | TokenKind::Punct(Punct::Amp)
        | TokenKind::Punct(Punct::Bang)
        | TokenKind::Punct(Punct::DotDotDot)
    )
  }

  fn expr_index_or_slice(&mut self, base: Expr<'src>) -> super::Result<Expr<'src>> {
    // already consumed `[`
    if self.eat_punct(Punct::Colon)? {
      let hi = if self.is_punct(Punct::RBracket) {
        None
      } else {
        Some(Box::new(self.expr()?))
      };
      let end = self.expect_punct(Punct::RBracket)?;
      let span = base.span.join(end);
      return Ok(Expr::new(span, ExprKind::Slice(Box::new(base), None, hi)));
    }
    let first = self.expr()?;
    if self.eat_punct(Punct::Colon)? {
      let hi = if self.is_punct(Punct::RBracket) {
        None
      } else {
        Some(Box::new(self.expr()?))
      };
      let end = self.expect_punct(Punct::RBracket)?;
      let span = base.span.join(end);
      return Ok(Expr::new(
        span,
        ExprKind::Slice(Box::new(base), Some(Box::new(first)), hi),
      ));
    }
    let end = self.expect_punct(Punct::RBracket)?;
    let span = base.span.join(end);
    Ok(Expr::new(span, ExprKind::Index(Box::new(base), Box::new(first))))
  }

  fn expr_primary(&mut self) -> super::Result<Expr<'src>> {
    let span = self.span();
    match self.cur.kind.clone() {
      TokenKind::Keyword(Keyword::Nil) => {
        self.bump()?;
        Ok(Expr::new(span, ExprKind::Nil))
      }
      TokenKind::Number(n) => {
        self.bump()?;
        Ok(Expr::new(span, ExprKind::Number(n)))
      }
      TokenKind::Str(s) => {
        self.bump()?;
        Ok(Expr::new(span, ExprKind::Str(vec![StrPart::Literal(s)])))
      }
      TokenKind::InterpStart => self.expr_interp_str(span),
      TokenKind::Ident(name) => {
        self.bump()?;
        Ok(Expr::new(span, ExprKind::Name(name)))
      }
      TokenKind::Punct(Punct::LBrace) => self.expr_list(span),
      TokenKind::Punct(Punct::LParen) => {
        self.bump()?;
        let inner = self.expr()?;
        self.expect_punct(Punct::RParen)?;
        Ok(inner)
      }
      TokenKind::Punct(Punct::DotDotDot) => {
        self.bump()?;
        let operand = self.expr_prefix()?;
        let span = span.join(operand.span);
        Ok(Expr::new(span, ExprKind::Spread(Box::new(operand))))
      }
      _ => Err(self.err(span, "expected an expression")),
    }
  }

  fn expr_list(&mut self, start: Span) -> super::Result<Expr<'src>> {
    self.bump()?; // `{`
    let mut items = vec![];
    self.skip_newlines()?;
    if !self.is_punct(Punct::RBrace) {
      loop {
        self.skip_newlines()?;
        items.push(self.expr()?);
        self.skip_newlines()?;
        if !self.eat_punct(Punct::Comma)? {
          break;
        }
        self.skip_newlines()?;
        if self.is_punct(Punct::RBrace) {
          break;
        }
      }
    }
    self.skip_newlines()?;
    let end = self.expect_punct(Punct::RBrace)?;
    Ok(Expr::new(start.join(end), ExprKind::List(items)))
  }

  /// Builds an [`ExprKind::Str`] out of literal/embedded parts: string
  /// interpolation re-entry, realized directly as a part list rather than
  /// a synthesized concatenation expression.
  ///
  /// `self.cur` is the already-fetched [`TokenKind::InterpStart`] token; the
  /// underlying lexer cursor sits right after the opening `"`. This method
  /// drives the lexer directly (via [`crate::lexer::Lexer::lex_interp_part`]
  /// for literal runs, ordinary token-by-token lexing for embeds) rather
  /// than going through `self.bump()`, because the lexer alternates between
  /// "raw string text" and "ordinary tokens" mode, which `self.cur`'s single
  /// slot of lookahead cannot represent without this explicit resync.
  fn expr_interp_str(&mut self, start: Span) -> super::Result<Expr<'src>> {
    let mut parts = vec![];
    let mut end = start;
    loop {
      let part = self.lexer.lex_interp_part()?;
      match part {
        InterpPart::End => break,
        InterpPart::Literal(s, span) => {
          end = span;
          parts.push(StrPart::Literal(s));
          break;
        }
        InterpPart::LiteralThenEmbed(s, span) => {
          end = span;
          parts.push(StrPart::Literal(s));
          end = self.parse_interp_embed(&mut parts)?;
        }
        InterpPart::EmbedStart => {
          end = self.parse_interp_embed(&mut parts)?;
        }
      }
    }
    // resync lookahead to a real token past the closing quote
    self.cur = self.lexer.next()?;
    Ok(Expr::new(start.join(end), ExprKind::Str(parts)))
  }

  fn parse_interp_embed(&mut self, parts: &mut Vec<StrPart<'src>>) -> super::Result<Span> {
    self.cur = self.lexer.next()?;
    let e = self.expr()?;
    if !self.is_punct(Punct::RBrace) {
      return Err(self.err(self.span(), "expected `}` to close interpolated expression"));
    }
    let span = self.cur.span;
    parts.push(StrPart::Embed(e));
    // don't bump: the lexer cursor already sits right past `}`, ready to
    // resume raw string-text scanning on the next `lex_interp_part` call.
    Ok(span)
  }

  // --- lvalues ---

  pub(crate) fn lvalue(&mut self) -> super::Result<Lvalue<'src>> {
    let span = self.span();
    if self.is_punct(Punct::LBrace) {
      return self.lvalue_list(span);
    }
    let name = self.ident()?;
    let base = Spanned::new(name.span, LvalueKind::Name(name.into_inner()));
    self.lvalue_postfix(base)
  }

  fn lvalue_postfix(&mut self, base: Lvalue<'src>) -> super::Result<Lvalue<'src>> {
    if !self.is_punct(Punct::LBracket) {
      return Ok(base);
    }
    self.bump()?;
    let base_expr = self.lvalue_to_expr(base);
    if self.eat_punct(Punct::Colon)? {
      let hi = self.expr()?;
      let end = self.expect_punct(Punct::RBracket)?;
      let span = base_expr.span.join(end);
      let zero = Expr::new(base_expr.span, ExprKind::Number(0.0));
      return Ok(Spanned::new(
        span,
        LvalueKind::Slice(Box::new(base_expr), Box::new(zero), Box::new(hi)),
      ));
    }
    let idx = self.expr()?;
    if self.eat_punct(Punct::Colon)? {
      let hi = self.expr()?;
      let end = self.expect_punct(Punct::RBracket)?;
      let span = base_expr.span.join(end);
      return Ok(Spanned::new(
        span,
        LvalueKind::Slice(Box::new(base_expr), Box::new(idx), Box::new(hi)),
      ));
    }
    let end = self.expect_punct(Punct::RBracket)?;
    let span = base_expr.span.join(end);
    Ok(Spanned::new(
      span,
      LvalueKind::Index(Box::new(base_expr), Box::new(idx)),
    ))
  }

  fn lvalue_list(&mut self, start: Span) -> super::Result<Lvalue<'src>> {
    self.bump()?; // `{`
    let mut items = vec![];
    let mut rest = None;
    if !self.is_punct(Punct::RBrace) {
      loop {
        if self.eat_punct(Punct::DotDotDot)? {
          rest = Some(Box::new(self.lvalue()?));
          break;
        }
        items.push(self.lvalue()?);
        if !self.eat_punct(Punct::Comma)? {
          break;
        }
        if self.is_punct(Punct::RBrace) {
          break;
        }
      }
    }
    let end = self.expect_punct(Punct::RBrace)?;
    Ok(Spanned::new(
      start.join(end),
      LvalueKind::List { items, rest },
    ))
  }

  /// Turns an already-parsed expression into an lvalue, used when the
  /// left-hand side of `=`/`+=`/etc. was parsed generically as an
  /// expression (so `a[0]` and `a.b` reuse the expression grammar instead
  /// of being re-derived by a separate lvalue-only parse).
  fn expr_to_lvalue(&self, e: Expr<'src>) -> super::Result<Lvalue<'src>> {
    let span = e.span;
    match e.kind {
      ExprKind::Name(name) => Ok(Spanned::new(span, LvalueKind::Name(name))),
      ExprKind::Index(base, key) => Ok(Spanned::new(span, LvalueKind::Index(base, key))),
      ExprKind::Slice(base, lo, hi) => {
        let lo = lo.unwrap_or_else(|| Box::new(Expr::new(span, ExprKind::Number(0.0))));
        let hi = hi.ok_or_else(|| self.err(span, "slice assignment requires an upper bound"))?;
        Ok(Spanned::new(span, LvalueKind::Slice(base, lo, hi)))
      }
      _ => Err(self.err(span, "invalid assignment target")),
    }
  }

  fn lvalue_to_expr(&self, lv: Lvalue<'src>) -> Expr<'src> {
    let span = lv.span;
    match lv.into_inner() {
      LvalueKind::Name(name) => Expr::new(span, ExprKind::Name(name)),
      LvalueKind::Index(base, key) => Expr::new(span, ExprKind::Index(base, key)),
      LvalueKind::Slice(base, lo, hi) => {
        Expr::new(span, ExprKind::Slice(base, Some(lo), Some(hi)))
      }
      LvalueKind::List { .. } => Expr::new(span, ExprKind::Nil),
    }
  }
}

