//! Statement code generation: control flow, `var`/`def`/`namespace`/`enum`
//! declaration, and the two-pass block compile that lets sibling commands
//! in the same block call each other regardless of source order.

use syntax::ast::{Lvalue, LvalueKind, Stmt, StmtKind};

use crate::op::{BuiltinOp, Op, Reg};
use crate::symbol::{Binding, Namespace, Scope};

use super::{CodeGen, LoopLabels, Result};

impl<'a> CodeGen<'a> {
  pub(super) fn emit_block(&mut self, stmts: &[Stmt]) -> Result<()> {
    self.predeclare(stmts)?;
    for stmt in stmts {
      self.emit_stmt(stmt)?;
    }
    Ok(())
  }

  /// Scans a block's direct (non-nested) statements for `def`/`enum`/
  /// `namespace` and declares placeholder bindings before any statement's
  /// body is compiled, so forward references and mutual recursion between
  /// siblings resolve.
  fn predeclare(&mut self, stmts: &[Stmt]) -> Result<()> {
    for stmt in stmts {
      match &**stmt {
        StmtKind::Def { name, .. } => {
          let label_id = self.labels.alloc();
          self.declare(name.as_ref(), Binding::LocalCommand { label_id, placeholder: true })?;
        }
        StmtKind::Enum { name: Some(name), members } => {
          let ns = self.namespaces.push(Namespace::child(name.as_ref(), self.cur_ns()));
          self.declare(name.as_ref(), Binding::Namespace(ns))?;
          self.declare_enum_members(ns, members)?;
        }
        StmtKind::Enum { name: None, members } => {
          let ns = self.cur_ns();
          self.declare_enum_members(ns, members)?;
        }
        StmtKind::Namespace { name, body } => {
          let ns = self.namespaces.push(Namespace::child(name.as_ref(), self.cur_ns()));
          self.declare(name.as_ref(), Binding::Namespace(ns))?;
          self.scopes.push(Scope::new(ns));
          self.predeclare(body)?;
          self.scopes.pop();
        }
        _ => {}
      }
    }
    Ok(())
  }

  fn declare_enum_members(&mut self, ns: usize, members: &[(syntax::ast::Ident, Option<syntax::ast::Expr>)]) -> Result<()> {
    let mut next = 0.0f64;
    for (name, value) in members {
      let v = match value {
        Some(e) => self.const_number(e)?,
        None => next,
      };
      next = v + 1.0;
      self.namespaces.get_mut(ns).declare(name.as_ref(), Binding::EnumConst { value: v });
    }
    Ok(())
  }

  /// Enum member initializers must be compile-time constants: a numeric
  /// literal, or a reference to an already-declared enum constant.
  fn const_number(&mut self, e: &syntax::ast::Expr) -> Result<f64> {
    use syntax::ast::ExprKind;
    match &**e {
      ExprKind::Number(n) => Ok(*n),
      ExprKind::Prefix(syntax::ast::PrefixOp::Neg, inner) => Ok(-self.const_number(inner)?),
      ExprKind::Name(name) => match self.lookup(name.as_ref()) {
        Some(Binding::EnumConst { value }) => Ok(value),
        _ => Err(self.err(e.span, "enum member initializer must be a constant")),
      },
      _ => Err(self.err(e.span, "enum member initializer must be a constant")),
    }
  }

  fn emit_stmt(&mut self, stmt: &Stmt) -> Result<()> {
    let span = stmt.span;
    match &**stmt {
      StmtKind::Var(decls) => {
        for (lvalue, init) in decls {
          self.emit_var_decl(lvalue, init.as_ref())?;
        }
        Ok(())
      }
      StmtKind::Expr(e) => {
        let tmp = self.alloc_temp(0)?;
        self.emit_expr_to(tmp, e)?;
        self.free_temp(0, tmp);
        Ok(())
      }
      StmtKind::If { arms, else_ } => self.emit_if(arms, else_.as_deref()),
      StmtKind::While { cond, body } => self.emit_while(cond, body),
      StmtKind::For { lvalue, declares, iter, body } => self.emit_for(lvalue, *declares, iter, body),
      StmtKind::Loop { body } => self.emit_loop(body),
      StmtKind::Break => {
        let label = self
          .loop_stack
          .last()
          .map(|l| l.break_id)
          .ok_or_else(|| self.err(span, "`break` outside a loop"))?;
        let site = self.push(Op::Jump { target: 0 }) + 1;
        self.labels.get_mut(label).patch_or_defer(&mut self.program.code, site as usize);
        Ok(())
      }
      StmtKind::Continue => {
        let label = self
          .loop_stack
          .last()
          .map(|l| l.continue_id)
          .ok_or_else(|| self.err(span, "`continue` outside a loop"))?;
        let site = self.push(Op::Jump { target: 0 }) + 1;
        self.labels.get_mut(label).patch_or_defer(&mut self.program.code, site as usize);
        Ok(())
      }
      StmtKind::Return(e) => {
        match e {
          Some(e) => {
            let r = self.emit_expr(e)?;
            self.push(Op::Return { src: r });
            self.free_temp(0, r);
          }
          None => {
            let r = self.alloc_temp(0)?;
            self.push(Op::Nil { dst: r });
            self.push(Op::Return { src: r });
            self.free_temp(0, r);
          }
        }
        Ok(())
      }
      StmtKind::Def { name, params, rest, body } => self.emit_def(name.as_ref(), params, rest.as_ref(), body),
      StmtKind::Namespace { name, body } => self.emit_namespace(name.as_ref(), body),
      StmtKind::Using(names) => {
        for name in names {
          match self.lookup(name.as_ref()) {
            Some(Binding::Namespace(ns)) => {
              let cur = self.cur_ns();
              self.namespaces.get_mut(cur).add_use(ns);
            }
            _ => return Err(self.err(name.span, format!("`{}` is not a namespace", name.as_ref()))),
          }
        }
        Ok(())
      }
      // Enum declarations are fully handled by `predeclare`.
      StmtKind::Enum { .. } => Ok(()),
      StmtKind::Label(name) => {
        self.declare_label(name.as_ref());
        Ok(())
      }
      StmtKind::Goto(name) => {
        self.jump_to(name.as_ref());
        Ok(())
      }
    }
  }

  fn emit_var_decl(&mut self, lvalue: &Lvalue, init: Option<&syntax::ast::Expr>) -> Result<()> {
    match &**lvalue {
      LvalueKind::Name(name) => {
        let r = self.alloc_var(0)?;
        match init {
          Some(e) => self.emit_expr_to(r, e)?,
          None => {
            self.push(Op::Nil { dst: r });
          }
        }
        let frame_idx = self.cur_frame_idx() as u8;
        self.declare(name.as_ref(), Binding::Var { frame_idx, slot: r.slot })?;
        Ok(())
      }
      LvalueKind::List { .. } => {
        let src = match init {
          Some(e) => self.emit_expr(e)?,
          None => {
            let r = self.alloc_temp(0)?;
                self.push(Op::Nil { dst: r });
            r
          }
        };
        self.destructure(lvalue, src, true)?;
        self.free_temp(0, src);
        Ok(())
      }
      LvalueKind::Index(..) | LvalueKind::Slice(..) => {
        Err(self.err(lvalue.span, "`var` requires a name or list pattern"))
      }
    }
  }

  fn emit_if(&mut self, arms: &[(syntax::ast::Expr, Vec<Stmt>)], else_: Option<&[Stmt]>) -> Result<()> {
    let end = self.anon_label("if_end");
    for (cond, body) in arms {
      let next = self.anon_label("if_next");
      let c = self.emit_expr(cond)?;
      self.jump_if_false_to(c, &next);
      self.free_temp(0, c);
      self.push_child_scope();
      self.emit_block(body)?;
      self.pop_scope();
      self.jump_to(&end);
      self.declare_label(&next);
    }
    if let Some(body) = else_ {
      self.push_child_scope();
      self.emit_block(body)?;
      self.pop_scope();
    }
    self.declare_label(&end);
    Ok(())
  }

  fn emit_while(&mut self, cond: &syntax::ast::Expr, body: &[Stmt]) -> Result<()> {
    let start = self.anon_label("while_start");
    let end = self.anon_label("while_end");
    self.declare_label(&start);
    let c = self.emit_expr(cond)?;
    self.jump_if_false_to(c, &end);
    self.free_temp(0, c);
    self.with_loop(&start, &end, |cg| {
      cg.push_child_scope();
      cg.emit_block(body)?;
      cg.pop_scope();
      Ok(())
    })?;
    self.jump_to(&start);
    self.declare_label(&end);
    Ok(())
  }

  fn emit_loop(&mut self, body: &[Stmt]) -> Result<()> {
    let start = self.anon_label("loop_start");
    let end = self.anon_label("loop_end");
    self.declare_label(&start);
    self.with_loop(&start, &end, |cg| {
      cg.push_child_scope();
      cg.emit_block(body)?;
      cg.pop_scope();
      Ok(())
    })?;
    self.jump_to(&start);
    self.declare_label(&end);
    Ok(())
  }

  fn emit_for(&mut self, lvalue: &Lvalue, declares: bool, iter: &syntax::ast::Expr, body: &[Stmt]) -> Result<()> {
    let list = self.emit_expr(iter)?;
    let len = self.alloc_temp(0)?;
    self.push(Op::Unary { op: BuiltinOp::Len, dst: len, src: list });
    let idx = self.alloc_temp(0)?;
    self.push(Op::LitNum { dst: idx, value: 0.0 });

    let start = self.anon_label("for_start");
    let end = self.anon_label("for_end");
    let cont = self.anon_label("for_continue");
    self.declare_label(&start);
    let cond = self.alloc_temp(0)?;
    self.push(Op::Binary { op: BuiltinOp::Lt, dst: cond, a: idx, b: len });
    self.jump_if_false_to(cond, &end);
    self.free_temp(0, cond);

    self.push_child_scope();
    let elem = self.alloc_temp(0)?;
    self.push(Op::Binary { op: BuiltinOp::GetAt, dst: elem, a: list, b: idx });
    if declares {
      self.destructure(lvalue, elem, true)?;
    } else {
      self.destructure(lvalue, elem, false)?;
    }
    self.free_temp(0, elem);

    self.with_loop(&cont, &end, |cg| cg.emit_block(body))?;
    self.pop_scope();

    self.declare_label(&cont);
    self.push(Op::Inc { dst: idx });
    self.jump_to(&start);
    self.declare_label(&end);

    self.free_temp(0, idx);
    self.free_temp(0, len);
    self.free_temp(0, list);
    Ok(())
  }

  fn with_loop(&mut self, continue_name: &str, break_name: &str, body: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
    let continue_id = self.label_id(continue_name);
    let break_id = self.label_id(break_name);
    self.loop_stack.push(LoopLabels { break_id, continue_id });
    let result = body(self);
    self.loop_stack.pop();
    result
  }

  fn push_child_scope(&mut self) {
    let parent = self.cur_ns();
    let ns = self.namespaces.push(Namespace::child("<block>", parent));
    self.scopes.push(Scope::new(ns));
  }

  fn pop_scope(&mut self) {
    self.scopes.pop();
  }

  /// Emits a `def`'s body as `jump past -> cmdhead -> body -> [implicit
  /// return nil] -> cmdtail -> past:`, using the label the block's
  /// pre-declare pass already allocated so callers compiled before this
  /// `def` resolve correctly.
  fn emit_def(&mut self, name: &str, params: &[Lvalue], rest: Option<&syntax::ast::Ident>, body: &[Stmt]) -> Result<()> {
    let label_id = match self.lookup(name) {
      Some(Binding::LocalCommand { label_id, .. }) => label_id,
      _ => unreachable!("predeclare always registers a LocalCommand for every `def`"),
    };

    let past = self.anon_label("def_past");
    self.jump_to(&past);

    let body_pc = self.pc();
    self.labels.get_mut(label_id).declare(&mut self.program.code, body_pc);

    self.frames.push(crate::symbol::CompileFrame::new());
    let ns = self.namespaces.push(Namespace::child(name, self.cur_ns()));
    self.scopes.push(Scope::new(ns));

    let rest_slot: u8 = match rest {
      Some(_) => params.len() as u8,
      None => 0xFF,
    };
    self.push(Op::CmdHead { level: 0, params: params.len() as u8, rest: rest_slot });

    for param in params {
      self.bind_param(param)?;
    }
    if let Some(rest_name) = rest {
      let r = self.alloc_var(0)?;
      let frame_idx = self.cur_frame_idx() as u8;
      self.declare(rest_name.as_ref(), Binding::Var { frame_idx, slot: r.slot })?;
    }

    self.emit_block(body)?;

    let nil = self.alloc_temp(0)?;
    self.push(Op::Nil { dst: nil });
    self.push(Op::Return { src: nil });
    self.free_temp(0, nil);
    self.push(Op::CmdTail);

    let frame = self.frames.pop().unwrap();
    let undeclared = frame.undeclared_labels(&self.labels);
    if let Some(missing) = undeclared.first() {
      return Err(self.err(span::Span { start: 0, end: 0 }, format!("label `{missing}` is never declared")));
    }

    self.scopes.pop();

    if let Binding::LocalCommand { placeholder, .. } = self
      .namespaces
      .get_mut(self.scopes.last().unwrap().namespace)
      .get_mut(name)
      .expect("predeclare registered this name")
    {
      *placeholder = false;
    }

    self.declare_label(&past);
    Ok(())
  }

  fn bind_param(&mut self, param: &Lvalue) -> Result<()> {
    match &**param {
      LvalueKind::Name(name) => {
        let r = self.alloc_var(0)?;
        let frame_idx = self.cur_frame_idx() as u8;
        self.declare(name.as_ref(), Binding::Var { frame_idx, slot: r.slot })?;
        Ok(())
      }
      LvalueKind::List { .. } => {
        let r = self.alloc_var(0)?;
        self.destructure(param, r, true)
      }
      LvalueKind::Index(..) | LvalueKind::Slice(..) => {
        Err(self.err(param.span, "parameter must be a name or list pattern"))
      }
    }
  }

  fn emit_namespace(&mut self, name: &str, body: &[Stmt]) -> Result<()> {
    let ns = match self.lookup(name) {
      Some(Binding::Namespace(ns)) => ns,
      _ => unreachable!("predeclare always registers a Namespace binding for every `namespace` block"),
    };
    self.scopes.push(Scope::new(ns));
    self.emit_block(body)?;
    self.scopes.pop();
    Ok(())
  }
}
