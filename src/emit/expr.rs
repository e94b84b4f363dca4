//! Expression code generation: the lvalue-assignment protocol,
//! short-circuiting `&&`/`||`/`&&=`/`||=`, the pipe operator, and the
//! handful of pseudo-commands (`pick`, `isnative`, `embed`, and
//! literal-folded `str.hash`) that don't compile to an ordinary call.

use syntax::ast::{AssignOp, BinaryOp, Expr, ExprKind, Lvalue, LvalueKind, PrefixOp, StrPart};

use crate::op::{BuiltinOp, Op, Reg};
use crate::symbol::Binding;

use super::{CodeGen, Result};

impl<'a> CodeGen<'a> {
  /// Evaluates `e`, returning a register holding the result: the
  /// variable's own register for a bare name reference, a fresh temp
  /// otherwise. Callers that don't need the result past the current
  /// statement should free non-var temps with [`CodeGen::free_temp`].
  pub(super) fn emit_expr(&mut self, e: &Expr) -> Result<Reg> {
    if let ExprKind::Name(name) = &*e {
      if let Some(Binding::Var { frame_idx, slot }) = self.lookup(name.as_ref()) {
        return Ok(self.var_reg_for(frame_idx, slot));
      }
    }
    let dst = self.alloc_temp(0)?;
    self.emit_expr_to(dst, e)?;
    Ok(dst)
  }

  pub(super) fn emit_expr_to(&mut self, dst: Reg, e: &Expr) -> Result<()> {
    let span = e.span;
    match &*e {
      ExprKind::Nil => {
        self.emit_at(Op::Nil { dst }, span);
      }
      ExprKind::Number(n) => {
        self.emit_at(Op::LitNum { dst, value: *n }, span);
      }
      ExprKind::Str(parts) => self.emit_str(dst, parts, span)?,
      ExprKind::List(items) => self.emit_list(dst, items, span)?,
      ExprKind::Name(name) => self.emit_name(dst, name.as_ref(), span)?,
      ExprKind::Path(segs) => self.emit_path(dst, segs, span)?,
      ExprKind::Prefix(op, operand) => self.emit_prefix(dst, *op, operand, span)?,
      ExprKind::Binary(BinaryOp::And, l, r) => self.emit_short_circuit(dst, true, l, r)?,
      ExprKind::Binary(BinaryOp::Or, l, r) => self.emit_short_circuit(dst, false, l, r)?,
      ExprKind::Binary(BinaryOp::Pipe, l, r) => self.emit_pipe(dst, l, r, span)?,
      ExprKind::Binary(op, l, r) => self.emit_binary(dst, *op, l, r, span)?,
      ExprKind::Assign(op, lvalue, rhs) => self.emit_assign(dst, *op, lvalue, rhs, span)?,
      ExprKind::Index(base, key) => {
        let b = self.emit_expr(base)?;
        let k = self.emit_expr(key)?;
        self.emit_at(Op::Binary { op: BuiltinOp::GetAt, dst, a: b, b: k }, span);
        self.free_temp(0, b);
        self.free_temp(0, k);
      }
      ExprKind::Slice(base, lo, hi) => {
        let b = self.emit_expr(base)?;
        let lo_r = self.emit_opt_index(lo, 0.0)?;
        let hi_r = self.emit_slice_hi(b, hi, span)?;
        self.emit_at(
          Op::Ternary { op: BuiltinOp::Slice, dst, a: b, b: lo_r, c: hi_r },
          span,
        );
        self.free_temp(0, b);
        self.free_temp(0, lo_r);
        self.free_temp(0, hi_r);
      }
      ExprKind::Call { callee, args } => self.emit_call(dst, callee, args, span)?,
      ExprKind::Spread(_) => {
        return Err(self.err(span, "`...` spread is only valid as a call argument"));
      }
    }
    Ok(())
  }

  fn emit_opt_index(&mut self, e: &Option<Box<Expr>>, default: f64) -> Result<Reg> {
    match e {
      Some(e) => self.emit_expr(e),
      None => {
        let r = self.alloc_temp(0)?;
        self.push(Op::LitNum { dst: r, value: default });
        Ok(r)
      }
    }
  }

  fn emit_slice_hi(&mut self, base: Reg, hi: &Option<Box<Expr>>, span: span::Span) -> Result<Reg> {
    match hi {
      Some(e) => self.emit_expr(e),
      None => {
        let r = self.alloc_temp(0)?;
        self.emit_at(Op::Unary { op: BuiltinOp::Len, dst: r, src: base }, span);
        Ok(r)
      }
    }
  }

  fn emit_str(&mut self, dst: Reg, parts: &[StrPart], span: span::Span) -> Result<()> {
    if parts.is_empty() {
      let idx = self.program.intern_string(b"");
      self.emit_at(Op::LitStr { dst, str_index: idx }, span);
      return Ok(());
    }
    if let [StrPart::Literal(s)] = parts {
      let idx = self.program.intern_string(s.as_bytes());
      self.emit_at(Op::LitStr { dst, str_index: idx }, span);
      return Ok(());
    }
    let mut regs = Vec::with_capacity(parts.len());
    for part in parts {
      let r = self.alloc_temp(0)?;
      match part {
        StrPart::Literal(s) => {
          let idx = self.program.intern_string(s.as_bytes());
          self.emit_at(Op::LitStr { dst: r, str_index: idx }, span);
        }
        StrPart::Embed(e) => {
          let v = self.emit_expr(e)?;
          self.emit_at(Op::Unary { op: BuiltinOp::ToStr, dst: r, src: v }, e.span);
          self.free_temp(0, v);
        }
      }
      regs.push(r);
    }
    self.emit_at(Op::Variadic { op: BuiltinOp::StrCat, dst, args: regs.clone() }, span);
    for r in regs {
      self.free_temp(0, r);
    }
    Ok(())
  }

  fn emit_list(&mut self, dst: Reg, items: &[Expr], span: span::Span) -> Result<()> {
    self.emit_at(Op::NewList { dst, hint: items.len() as u32 }, span);
    let mut plain_run = Vec::new();
    let flush = |cg: &mut Self, run: &mut Vec<Reg>| {
      if run.is_empty() {
        return;
      }
      let mut args = vec![dst];
      args.extend(run.iter().copied());
      cg.emit_at(Op::Variadic { op: BuiltinOp::ListPush, dst, args }, span);
      for r in run.drain(..) {
        cg.free_temp(0, r);
      }
    };
    for item in items {
      if let ExprKind::Spread(inner) = &**item {
        flush(self, &mut plain_run);
        let src = self.emit_expr(inner)?;
        self.emit_at(Op::Variadic { op: BuiltinOp::ListAppend, dst, args: vec![dst, src] }, item.span);
        self.free_temp(0, src);
      } else {
        let r = self.emit_expr(item)?;
        plain_run.push(r);
      }
    }
    flush(self, &mut plain_run);
    Ok(())
  }

  fn emit_name(&mut self, dst: Reg, name: &str, span: span::Span) -> Result<()> {
    match self.lookup(name) {
      Some(Binding::Var { frame_idx, slot }) => {
        let src = self.var_reg_for(frame_idx, slot);
        self.emit_at(Op::Move { dst, src }, span);
        Ok(())
      }
      Some(Binding::EnumConst { value }) => {
        self.emit_at(Op::LitNum { dst, value }, span);
        Ok(())
      }
      Some(Binding::LocalCommand { .. }) | Some(Binding::NativeCommand { .. }) | Some(Binding::OpcodeCommand { .. }) => {
        self.emit_call_binding(dst, name, &[], span)
      }
      Some(Binding::Namespace(_)) => Err(self.err(span, format!("`{name}` is a namespace, not a value"))),
      None => Err(self.err(span, format!("undeclared name `{name}`"))),
    }
  }

  fn emit_path(&mut self, dst: Reg, segs: &[syntax::ast::Ident], span: span::Span) -> Result<()> {
    let binding = self.resolve_path(segs, span)?;
    self.emit_binding_value(dst, &binding, segs.last().unwrap().as_ref(), &[], span)
  }

  fn resolve_path(&self, segs: &[syntax::ast::Ident], span: span::Span) -> Result<Binding> {
    let mut iter = segs.iter();
    let first = iter.next().unwrap();
    let mut cur = self
      .lookup(first.as_ref())
      .ok_or_else(|| self.err(span, format!("undeclared name `{}`", first.as_ref())))?;
    for seg in iter {
      let ns = match cur {
        Binding::Namespace(ns) => ns,
        _ => return Err(self.err(span, format!("`{}` is not a namespace", seg.as_ref()))),
      };
      cur = self
        .namespaces
        .resolve(ns, seg.as_ref())
        .cloned()
        .ok_or_else(|| self.err(span, format!("`{}` has no member `{}`", self.namespaces.get(ns).name, seg.as_ref())))?;
    }
    Ok(cur)
  }

  fn emit_binding_value(&mut self, dst: Reg, binding: &Binding, name: &str, args: &[Expr], span: span::Span) -> Result<()> {
    match binding {
      Binding::Var { frame_idx, slot } => {
        let src = self.var_reg_for(*frame_idx, *slot);
        self.emit_at(Op::Move { dst, src }, span);
        Ok(())
      }
      Binding::EnumConst { value } => {
        self.emit_at(Op::LitNum { dst, value: *value }, span);
        Ok(())
      }
      Binding::Namespace(_) => Err(self.err(span, format!("`{name}` is a namespace, not a value"))),
      Binding::LocalCommand { .. } | Binding::NativeCommand { .. } | Binding::OpcodeCommand { .. } => {
        self.emit_binding_call(dst, binding.clone(), args, span)
      }
    }
  }

  fn emit_prefix(&mut self, dst: Reg, op: PrefixOp, operand: &Expr, span: span::Span) -> Result<()> {
    match op {
      // `+x`/`&x` have no distinct runtime effect in this implementation:
      // sink has no reference/pointer value kind, so `&` is accepted for
      // syntactic compatibility and compiles to identity.
      PrefixOp::Pos | PrefixOp::Ref => self.emit_expr_to(dst, operand),
      PrefixOp::Neg => {
        let src = self.emit_expr(operand)?;
        self.emit_at(Op::Unary { op: BuiltinOp::Neg, dst, src }, span);
        self.free_temp(0, src);
        Ok(())
      }
      PrefixOp::Not => {
        let cond = self.emit_expr(operand)?;
        let zero = self.alloc_temp(0)?;
        let one = self.alloc_temp(0)?;
        self.push(Op::LitNum { dst: zero, value: 0.0 });
        self.push(Op::LitNum { dst: one, value: 1.0 });
        self.emit_at(Op::Pick { dst, cond, a: zero, b: one }, span);
        self.free_temp(0, cond);
        self.free_temp(0, zero);
        self.free_temp(0, one);
        Ok(())
      }
      PrefixOp::Spread => Err(self.err(span, "`...` spread is only valid as a call argument")),
    }
  }

  fn emit_short_circuit(&mut self, dst: Reg, is_and: bool, l: &Expr, r: &Expr) -> Result<()> {
    self.emit_expr_to(dst, l)?;
    let end = self.anon_label(if is_and { "and_end" } else { "or_end" });
    if is_and {
      self.jump_if_false_to(dst, &end);
    } else {
      self.jump_if_true_to(dst, &end);
    }
    self.emit_expr_to(dst, r)?;
    self.declare_label(&end);
    Ok(())
  }

  fn emit_pipe(&mut self, dst: Reg, l: &Expr, r: &Expr, span: span::Span) -> Result<()> {
    match &**r {
      ExprKind::Call { callee, args } => {
        let mut piped = Vec::with_capacity(args.len() + 1);
        piped.push((**l).clone());
        piped.extend(args.iter().cloned());
        self.emit_call(dst, callee, &piped, span)
      }
      ExprKind::Name(_) | ExprKind::Path(_) => self.emit_call(dst, r, std::slice::from_ref(l), span),
      _ => Err(self.err(span, "right-hand side of `|` must be a command or call")),
    }
  }

  fn emit_binary(&mut self, dst: Reg, op: BinaryOp, l: &Expr, r: &Expr, span: span::Span) -> Result<()> {
    use BinaryOp::*;
    let (swapped, op) = match op {
      Gt => (true, Le),
      Ge => (true, Lt),
      _ => (false, op),
    };
    let (l, r): (&Expr, &Expr) = if swapped { (r, l) } else { (l, r) };
    let builtin = match op {
      Pow => BuiltinOp::Pow,
      Mul => BuiltinOp::Mul,
      Div => BuiltinOp::Div,
      Mod => BuiltinOp::Mod,
      Add => BuiltinOp::Add,
      Sub => BuiltinOp::Sub,
      Concat => BuiltinOp::Concat,
      Lt => BuiltinOp::Lt,
      Le => BuiltinOp::Le,
      Eq => BuiltinOp::Eq,
      Ne => BuiltinOp::Ne,
      Gt | Ge | And | Or | Pipe => unreachable!("handled above"),
    };
    // `a > b` compiles to `b < a`, `a >= b` to `b <= a`: a plain operand
    // swap, no separate "greater than" opcode needed.
    let a = self.emit_expr(l)?;
    let b = self.emit_expr(r)?;
    self.emit_at(Op::Binary { op: builtin, dst, a, b }, span);
    self.free_temp(0, a);
    self.free_temp(0, b);
    Ok(())
  }

  // --- assignment ---

  fn emit_assign(&mut self, dst: Reg, op: AssignOp, lvalue: &Lvalue, rhs: &Expr, span: span::Span) -> Result<()> {
    if op.is_short_circuit() {
      return self.emit_cond_assign(dst, op == AssignOp::AndAnd, lvalue, rhs, span);
    }
    match &**lvalue {
      LvalueKind::Name(name) => {
        let target = self.var_reg(name.as_ref(), lvalue.span)?;
        match op.to_binary() {
          None => {
            self.emit_expr_to(target, rhs)?;
          }
          Some(bin_op) => {
            let r = self.emit_expr(rhs)?;
            self.emit_at(Op::Binary { op: binary_to_builtin(bin_op), dst: target, a: target, b: r }, span);
            self.free_temp(0, r);
          }
        }
        self.push(Op::Move { dst, src: target });
        Ok(())
      }
      LvalueKind::Index(base, key) => {
        let b = self.emit_expr(base)?;
        let k = self.emit_expr(key)?;
        let value = match op.to_binary() {
          None => self.emit_expr(rhs)?,
          Some(bin_op) => {
            let cur = self.alloc_temp(0)?;
            self.emit_at(Op::Binary { op: BuiltinOp::GetAt, dst: cur, a: b, b: k }, span);
            let r = self.emit_expr(rhs)?;
            self.emit_at(Op::Binary { op: binary_to_builtin(bin_op), dst: cur, a: cur, b: r }, span);
            self.free_temp(0, r);
            cur
          }
        };
        self.emit_at(Op::Ternary { op: BuiltinOp::SetAt, dst, a: b, b: k, c: value }, span);
        self.push(Op::Move { dst, src: value });
        self.free_temp(0, b);
        self.free_temp(0, k);
        self.free_temp(0, value);
        Ok(())
      }
      LvalueKind::Slice(base, lo, hi) => {
        if op.to_binary().is_some() {
          return Err(self.err(span, "compound assignment to a slice is not supported"));
        }
        let b = self.emit_expr(base)?;
        let lo_r = self.emit_expr(lo)?;
        let hi_r = self.emit_expr(hi)?;
        let value = self.emit_expr(rhs)?;
        self.emit_at(
          Op::Variadic { op: BuiltinOp::Splice, dst, args: vec![b, lo_r, hi_r, value] },
          span,
        );
        self.push(Op::Move { dst, src: value });
        self.free_temp(0, b);
        self.free_temp(0, lo_r);
        self.free_temp(0, hi_r);
        self.free_temp(0, value);
        Ok(())
      }
      LvalueKind::List { .. } => {
        if op.to_binary().is_some() {
          return Err(self.err(span, "compound assignment to a list pattern is not supported"));
        }
        let value = self.emit_expr(rhs)?;
        self.destructure(lvalue, value, false)?;
        self.push(Op::Move { dst, src: value });
        self.free_temp(0, value);
        Ok(())
      }
    }
  }

  /// Resolves a name-lvalue to its register, declaring it as a fresh
  /// variable the first time it's assigned inside a `var` pattern. Plain
  /// assignment (`x = 1`, no preceding `var`) requires `x` to already be
  /// declared.
  pub(super) fn var_reg(&mut self, name: &str, span: span::Span) -> Result<Reg> {
    match self.lookup(name) {
      Some(Binding::Var { frame_idx, slot }) => Ok(self.var_reg_for(frame_idx, slot)),
      Some(_) => Err(self.err(span, format!("`{name}` is not a variable"))),
      None => Err(self.err(span, format!("undeclared name `{name}`"))),
    }
  }

  /// Destructures `src` (a list) into `lvalue`, declaring fresh variables
  /// when `declare` is set (used by `var {a, b} = ...`) or assigning into
  /// already-declared lvalues otherwise.
  pub(super) fn destructure(&mut self, lvalue: &Lvalue, src: Reg, declare: bool) -> Result<()> {
    match &**lvalue {
      LvalueKind::Name(name) => {
        let target = if declare {
          let r = self.alloc_var(0)?;
          let frame_idx = self.cur_frame_idx() as u8;
          self.declare(name.as_ref(), Binding::Var { frame_idx, slot: r.slot })?;
          r
        } else {
          self.var_reg(name.as_ref(), lvalue.span)?
        };
        self.push(Op::Move { dst: target, src });
        Ok(())
      }
      LvalueKind::List { items, rest } => {
        for (i, item) in items.iter().enumerate() {
          let idx = self.alloc_temp(0)?;
          self.push(Op::LitNum { dst: idx, value: i as f64 });
          let elem = self.alloc_temp(0)?;
          self.push(Op::Binary { op: BuiltinOp::GetAt, dst: elem, a: src, b: idx });
          self.destructure(item, elem, declare)?;
          self.free_temp(0, idx);
          self.free_temp(0, elem);
        }
        if let Some(rest) = rest {
          let lo = self.alloc_temp(0)?;
          self.push(Op::LitNum { dst: lo, value: items.len() as f64 });
          let hi = self.alloc_temp(0)?;
          self.push(Op::Unary { op: BuiltinOp::Len, dst: hi, src });
          let tail = self.alloc_temp(0)?;
          self.push(Op::Ternary { op: BuiltinOp::Slice, dst: tail, a: src, b: lo, c: hi });
          self.destructure(rest, tail, declare)?;
          self.free_temp(0, lo);
          self.free_temp(0, hi);
          self.free_temp(0, tail);
        }
        Ok(())
      }
      LvalueKind::Index(..) | LvalueKind::Slice(..) => {
        Err(self.err(lvalue.span, "index/slice targets cannot appear inside a list pattern"))
      }
    }
  }

  /// `x &&= y` / `x ||= y`: for a scalar lvalue the whole value is
  /// replaced only if its current truthiness matches (`&&=` needs truthy,
  /// `||=` needs falsy); for a list lvalue the same test and replacement
  /// happens per-element, taking the replacement from the same index of
  /// `rhs`.
  fn emit_cond_assign(&mut self, dst: Reg, is_and: bool, lvalue: &Lvalue, rhs: &Expr, span: span::Span) -> Result<()> {
    let name = match &**lvalue {
      LvalueKind::Name(name) => name.as_ref().to_string(),
      _ => return Err(self.err(span, "`&&=`/`||=` only support a plain variable on the left-hand side")),
    };
    let target = self.var_reg(&name, lvalue.span)?;
    let is_list = self.alloc_temp(0)?;
    self.emit_at(Op::Unary { op: BuiltinOp::IsList, dst: is_list, src: target }, span);
    let scalar_label = self.anon_label("condassign_scalar");
    let end_label = self.anon_label("condassign_end");
    self.jump_if_false_to(is_list, &scalar_label);
    self.free_temp(0, is_list);

    // list path: for i in 0..len(target): if truthy(target[i]) == is_and: target[i] = rhs[i]
    let rhs_reg = self.emit_expr(rhs)?;
    let len = self.alloc_temp(0)?;
    self.push(Op::Unary { op: BuiltinOp::Len, dst: len, src: target });
    let idx = self.alloc_temp(0)?;
    self.push(Op::LitNum { dst: idx, value: 0.0 });
    let loop_start = self.anon_label("condassign_loop");
    let loop_end = self.anon_label("condassign_loopend");
    self.declare_label(&loop_start);
    let cond = self.alloc_temp(0)?;
    self.push(Op::Binary { op: BuiltinOp::Lt, dst: cond, a: idx, b: len });
    self.jump_if_false_to(cond, &loop_end);
    self.free_temp(0, cond);
    let elem = self.alloc_temp(0)?;
    self.push(Op::Binary { op: BuiltinOp::GetAt, dst: elem, a: target, b: idx });
    let matches = self.alloc_temp(0)?;
    if is_and {
      self.push(Op::Move { dst: matches, src: elem });
    } else {
      let zero = self.alloc_temp(0)?;
      let one = self.alloc_temp(0)?;
      self.push(Op::LitNum { dst: zero, value: 0.0 });
      self.push(Op::LitNum { dst: one, value: 1.0 });
      self.push(Op::Pick { dst: matches, cond: elem, a: zero, b: one });
      self.free_temp(0, zero);
      self.free_temp(0, one);
    }
    let skip = self.anon_label("condassign_skip");
    self.jump_if_false_to(matches, &skip);
    self.free_temp(0, matches);
    let repl = self.alloc_temp(0)?;
    self.push(Op::Binary { op: BuiltinOp::GetAt, dst: repl, a: rhs_reg, b: idx });
    self.push(Op::Ternary { op: BuiltinOp::SetAt, dst: repl, a: target, b: idx, c: repl });
    self.free_temp(0, repl);
    self.declare_label(&skip);
    self.free_temp(0, elem);
    self.push(Op::Inc { dst: idx });
    self.jump_to(&loop_start);
    self.declare_label(&loop_end);
    self.free_temp(0, idx);
    self.free_temp(0, len);
    self.free_temp(0, rhs_reg);
    self.jump_to(&end_label);

    // scalar path
    self.declare_label(&scalar_label);
    let matches_scalar = self.alloc_temp(0)?;
    if is_and {
      self.push(Op::Move { dst: matches_scalar, src: target });
    } else {
      let zero = self.alloc_temp(0)?;
      let one = self.alloc_temp(0)?;
      self.push(Op::LitNum { dst: zero, value: 0.0 });
      self.push(Op::LitNum { dst: one, value: 1.0 });
      self.push(Op::Pick { dst: matches_scalar, cond: target, a: zero, b: one });
      self.free_temp(0, zero);
      self.free_temp(0, one);
    }
    let scalar_skip = self.anon_label("condassign_scalar_skip");
    self.jump_if_false_to(matches_scalar, &scalar_skip);
    self.free_temp(0, matches_scalar);
    self.emit_expr_to(target, rhs)?;
    self.declare_label(&scalar_skip);

    self.declare_label(&end_label);
    self.push(Op::Move { dst, src: target });
    Ok(())
  }

  // --- calls ---

  fn emit_call(&mut self, dst: Reg, callee: &Expr, args: &[Expr], span: span::Span) -> Result<()> {
    if let ExprKind::Name(name) = &**callee {
      match name.as_ref() {
        "pick" => return self.emit_pick(dst, args, span),
        "isnative" => return self.emit_isnative(dst, args, span),
        "embed" => return self.emit_embed(dst, args, span),
        _ => {}
      }
    }
    if let Some(words) = str_hash_literal_fold(callee, args) {
      return self.emit_number_list(dst, &words, span);
    }
    let binding = match &**callee {
      ExprKind::Name(name) => self
        .lookup(name.as_ref())
        .ok_or_else(|| self.err(span, format!("undeclared name `{}`", name.as_ref())))?,
      ExprKind::Path(segs) => self.resolve_path(segs, span)?,
      _ => return Err(self.err(span, "expression is not callable")),
    };
    self.emit_binding_call(dst, binding, args, span)
  }

  fn emit_call_binding(&mut self, dst: Reg, name: &str, args: &[Expr], span: span::Span) -> Result<()> {
    let binding = self
      .lookup(name)
      .ok_or_else(|| self.err(span, format!("undeclared name `{name}`")))?;
    self.emit_binding_call(dst, binding, args, span)
  }

  fn emit_binding_call(&mut self, dst: Reg, binding: Binding, args: &[Expr], span: span::Span) -> Result<()> {
    let (arg_regs, spread_last) = self.emit_args(args)?;
    match binding {
      Binding::LocalCommand { label_id, .. } => {
        let site = self.push(Op::Call { target: 0, dst, args: arg_regs.clone(), spread_last }) + 1;
        self.labels.get_mut(label_id).patch_or_defer(&mut self.program.code, site as usize);
      }
      Binding::NativeCommand { hash } => {
        let hash_index = self.program.intern_native(hash);
        self.emit_at(Op::NativeCall { hash_index, dst, args: arg_regs.clone(), spread_last }, span);
      }
      Binding::OpcodeCommand { op } => {
        self.emit_at(Op::Variadic { op, dst, args: arg_regs.clone() }, span);
      }
      Binding::Var { .. } | Binding::EnumConst { .. } => {
        return Err(self.err(span, "value is not callable"));
      }
      Binding::Namespace(_) => {
        return Err(self.err(span, "namespace is not callable"));
      }
    }
    for r in arg_regs {
      self.free_temp(0, r);
    }
    Ok(())
  }

  /// Evaluates call arguments left to right. If the final argument is a
  /// `...spread`, it's evaluated separately and `spread_last` is set so
  /// the VM appends its elements as individual arguments at call time.
  fn emit_args(&mut self, args: &[Expr]) -> Result<(Vec<Reg>, bool)> {
    let mut regs = Vec::with_capacity(args.len());
    let mut spread_last = false;
    for (i, a) in args.iter().enumerate() {
      let is_last = i + 1 == args.len();
      if let ExprKind::Spread(inner) = &**a {
        if !is_last {
          return Err(self.err(a.span, "`...` spread may only appear as the last call argument"));
        }
        regs.push(self.emit_expr(inner)?);
        spread_last = true;
      } else {
        regs.push(self.emit_expr(a)?);
      }
    }
    Ok((regs, spread_last))
  }

  /// Emits a fixed list of number literals, e.g. the 4-word result of a
  /// compile-time-folded `str.hash`.
  fn emit_number_list(&mut self, dst: Reg, words: &[u32], span: span::Span) -> Result<()> {
    self.emit_at(Op::NewList { dst, hint: words.len() as u32 }, span);
    let mut regs = Vec::with_capacity(words.len());
    for &w in words {
      let r = self.alloc_temp(0)?;
      self.push(Op::LitNum { dst: r, value: w as f64 });
      regs.push(r);
    }
    let mut push_args = vec![dst];
    push_args.extend(regs.iter().copied());
    self.emit_at(Op::Variadic { op: BuiltinOp::ListPush, dst, args: push_args }, span);
    for r in regs {
      self.free_temp(0, r);
    }
    Ok(())
  }

  fn emit_pick(&mut self, dst: Reg, args: &[Expr], span: span::Span) -> Result<()> {
    let [cond, a, b] = args else {
      return Err(self.err(span, "pick expects exactly 3 arguments"));
    };
    let cond_r = self.emit_expr(cond)?;
    let a_r = self.emit_expr(a)?;
    let b_r = self.emit_expr(b)?;
    self.emit_at(Op::Pick { dst, cond: cond_r, a: a_r, b: b_r }, span);
    self.free_temp(0, cond_r);
    self.free_temp(0, a_r);
    self.free_temp(0, b_r);
    Ok(())
  }

  fn emit_isnative(&mut self, dst: Reg, args: &[Expr], span: span::Span) -> Result<()> {
    let [name_expr] = args else {
      return Err(self.err(span, "isnative expects exactly 1 argument"));
    };
    let ExprKind::Str(parts) = &**name_expr else {
      return Err(self.err(name_expr.span, "isnative requires a literal string argument"));
    };
    let [StrPart::Literal(s)] = parts.as_slice() else {
      return Err(self.err(name_expr.span, "isnative requires a literal string argument"));
    };
    let hash = crate::hash::hash_name(s.as_ref());
    let hash_index = self.program.intern_native(hash);
    self.emit_at(Op::IsNative { dst, hash_index }, span);
    Ok(())
  }

  fn emit_embed(&mut self, dst: Reg, args: &[Expr], span: span::Span) -> Result<()> {
    let [path_expr] = args else {
      return Err(self.err(span, "embed expects exactly 1 argument"));
    };
    let ExprKind::Str(parts) = &**path_expr else {
      return Err(self.err(path_expr.span, "embed requires a literal string path"));
    };
    let [StrPart::Literal(path)] = parts.as_slice() else {
      return Err(self.err(path_expr.span, "embed requires a literal string path"));
    };
    let bytes = self
      .includes
      .read(path.as_ref())
      .map_err(|e| self.err(path_expr.span, format!("embed: {e}")))?;
    let idx = self.program.intern_string(&bytes);
    self.emit_at(Op::LitStr { dst, str_index: idx }, span);
    Ok(())
  }
}

/// `str.hash(s, seed)` with both arguments as literals folds to the
/// 4-number list at compile time instead of emitting a runtime call.
fn str_hash_literal_fold(callee: &Expr, args: &[Expr]) -> Option<[u32; 4]> {
  let is_str_hash = matches!(
    &**callee,
    ExprKind::Path(segs) if segs.len() == 2 && segs[0].as_ref() == "str" && segs[1].as_ref() == "hash"
  );
  if !is_str_hash {
    return None;
  }
  let (s_expr, seed_expr) = match args {
    [s] => (s, None),
    [s, seed] => (s, Some(seed)),
    _ => return None,
  };
  let ExprKind::Str(parts) = &**s_expr else {
    return None;
  };
  let [StrPart::Literal(s)] = parts.as_slice() else {
    return None;
  };
  let seed = match seed_expr {
    Some(e) => match &**e {
      ExprKind::Number(n) => *n as i64 as u32,
      _ => return None,
    },
    None => 0,
  };
  Some(crate::hash::hash_seeded4(s.as_bytes(), seed))
}

fn binary_to_builtin(op: BinaryOp) -> BuiltinOp {
  match op {
    BinaryOp::Add => BuiltinOp::Add,
    BinaryOp::Sub => BuiltinOp::Sub,
    BinaryOp::Mul => BuiltinOp::Mul,
    BinaryOp::Div => BuiltinOp::Div,
    BinaryOp::Mod => BuiltinOp::Mod,
    BinaryOp::Concat => BuiltinOp::Concat,
    _ => unreachable!("AssignOp::to_binary only produces arithmetic/concat ops"),
  }
}
