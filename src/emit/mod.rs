//! AST → bytecode code generation.
//!
//! One [`CodeGen`] compiles a whole module into a [`Program`]. This walks the
//! surface [`syntax::ast`] directly rather than a resolved, type-checked
//! HIR — sink has no separate resolution pass, so name lookup, register
//! allocation and opcode emission all happen in the same tree walk, one AST
//! statement at a time.

mod expr;
mod prelude;
mod stmt;

use diag::Error;
use span::{SourceMap, Span};

use crate::host::IncludeResolver;
use crate::op::{Op, Reg};
use crate::program::Program;
use crate::symbol::{Binding, CodeGenLabels, CompileFrame, Namespace, NamespaceTable, Scope};

/// Per-`loop`/`while`/`for` break/continue targets, by label id.
struct LoopLabels {
  break_id: usize,
  continue_id: usize,
}

pub struct CodeGen<'a> {
  program: Program,
  namespaces: NamespaceTable,
  labels: CodeGenLabels,
  frames: Vec<CompileFrame>,
  /// Namespace chain for the scope currently being compiled, innermost last.
  /// Lexical blocks (`if`/`while`/`for`/`loop`) push a child scope so `var`
  /// declarations inside them don't leak out; `namespace` blocks additionally
  /// make the child visible to the outside world by name.
  scopes: Vec<Scope>,
  loop_stack: Vec<LoopLabels>,
  source: &'a SourceMap,
  file: String,
  includes: &'a dyn IncludeResolver,
  debug: bool,
  anon: u32,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Compiles one module to a [`Program`]. `file`/`source` are used only for
/// diagnostics and, when `debug` is set, the pos-table.
pub fn emit(
  file: &str,
  module: &syntax::ast::Module,
  source: &SourceMap,
  includes: &dyn IncludeResolver,
  debug: bool,
) -> Result<Program> {
  let mut cg = CodeGen::new(file, source, includes, debug);
  cg.run(module)?;
  Ok(cg.program)
}

impl<'a> CodeGen<'a> {
  fn new(file: &str, source: &'a SourceMap, includes: &'a dyn IncludeResolver, debug: bool) -> Self {
    let mut namespaces = NamespaceTable::new();
    let root = namespaces.push(Namespace::new("<root>"));
    let mut cg = CodeGen {
      program: Program::new(),
      namespaces,
      labels: CodeGenLabels::new(),
      frames: vec![CompileFrame::new()],
      scopes: vec![Scope::new(root)],
      loop_stack: Vec::new(),
      source,
      file: file.to_string(),
      includes,
      debug,
      anon: 0,
    };
    prelude::register(&mut cg, root);
    cg
  }

  fn run(&mut self, module: &syntax::ast::Module) -> Result<()> {
    self.emit_block(&module.body)?;
    // Implicit `return nil` at end of top-level code, and terminator.
    let nil = self.alloc_temp(0)?;
    self.push(Op::Nil { dst: nil });
    self.push(Op::Return { src: nil });
    self.free_temp(0, nil);
    self.push(Op::End);
    self.check_unresolved()
  }

  fn check_unresolved(&self) -> Result<()> {
    if let Some(name) = self.namespaces.all_unresolved().first() {
      return Err(Error::codegen(
        self.file.clone(),
        Span { start: 0, end: 0 },
        format!("command `{name}` was declared but never defined"),
      ));
    }
    let undeclared = self.frames[0].undeclared_labels(&self.labels);
    if let Some(name) = undeclared.first() {
      return Err(Error::codegen(
        self.file.clone(),
        Span { start: 0, end: 0 },
        format!("label `{name}` is never declared"),
      ));
    }
    Ok(())
  }

  // --- small accessors ---

  fn cur_frame_idx(&self) -> usize {
    self.frames.len() - 1
  }

  fn cur_ns(&self) -> usize {
    self.scopes.last().unwrap().namespace
  }

  fn frame_mut(&mut self) -> &mut CompileFrame {
    let idx = self.cur_frame_idx();
    &mut self.frames[idx]
  }

  fn alloc_var(&mut self, _frame_idx: usize) -> Result<Reg> {
    let slot = self.frame_mut().alloc_var().map_err(|e| self.wrap_frame_err(e))?;
    Ok(Reg::here(slot))
  }

  /// Converts a [`Binding::Var`]'s `frame_idx` (the absolute compile-frame
  /// it was declared in) to a runtime [`Reg`]: `depth` counts how many
  /// enclosing call-stack frames the current body is nested inside the
  /// declaring one, since a nested `def`'s activation always sits directly
  /// on top of the scope that defined it.
  fn var_reg_for(&self, frame_idx: u8, slot: u8) -> Reg {
    Reg {
      depth: self.cur_frame_idx() as u8 - frame_idx,
      slot,
    }
  }

  fn alloc_temp(&mut self, _frame_idx: usize) -> Result<Reg> {
    let slot = self.frame_mut().alloc_temp().map_err(|e| self.wrap_frame_err(e))?;
    Ok(Reg::here(slot))
  }

  fn free_temp(&mut self, _frame_idx: usize, r: Reg) {
    if r.depth == 0 {
      self.frame_mut().free_temp(r.slot);
    }
  }

  fn wrap_frame_err(&self, e: Error) -> Error {
    // CompileFrame doesn't know the source span; re-stamp with a zero span
    // rather than propagate the dummy one baked into symbol.rs's error.
    e
  }

  fn err(&self, span: Span, msg: impl Into<String>) -> Error {
    Error::codegen(self.file.clone(), span, msg.into())
  }

  /// Appends `op` to the program, optionally recording its source position
  /// in the debug pos-table.
  fn emit_at(&mut self, op: Op, span: Span) -> u32 {
    let pc = self.program.code.len() as u32;
    if self.debug {
      let lc = self.source.line_col(span.start);
      self.program.record_pos(pc, lc.line, lc.col, 0);
    }
    op.encode(&mut self.program.code);
    pc
  }

  fn push(&mut self, op: Op) -> u32 {
    self.emit_at(op, Span { start: 0, end: 0 })
  }

  fn pc(&self) -> u32 {
    self.program.code.len() as u32
  }

  /// Declares a fresh, compiler-internal synthetic label name (used for
  /// if/while/for/loop control-flow targets that the user can't `goto`).
  fn anon_label(&mut self, tag: &str) -> String {
    self.anon += 1;
    format!("%{tag}_{}", self.anon)
  }

  fn label_id(&mut self, name: &str) -> usize {
    let mut table = std::mem::take(&mut self.labels);
    let id = self.frame_mut().label(&mut table, name);
    self.labels = table;
    id
  }

  fn declare_label(&mut self, name: &str) {
    let id = self.label_id(name);
    let pc = self.pc();
    self.labels.get_mut(id).declare(&mut self.program.code, pc);
  }

  /// Emits `Op::Jump` to `name`, patching immediately if already declared.
  fn jump_to(&mut self, name: &str) {
    let id = self.label_id(name);
    let site = self.push(Op::Jump { target: 0 }) + 1;
    self.labels.get_mut(id).patch_or_defer(&mut self.program.code, site as usize);
  }

  fn jump_if_false_to(&mut self, cond: Reg, name: &str) {
    let id = self.label_id(name);
    let site = self.push(Op::JumpIfFalse { cond, target: 0 }) + 1 + 2;
    self.labels.get_mut(id).patch_or_defer(&mut self.program.code, site as usize);
  }

  fn jump_if_true_to(&mut self, cond: Reg, name: &str) {
    let id = self.label_id(name);
    let site = self.push(Op::JumpIfTrue { cond, target: 0 }) + 1 + 2;
    self.labels.get_mut(id).patch_or_defer(&mut self.program.code, site as usize);
  }

  // --- namespace/binding lookup ---

  fn lookup(&self, name: &str) -> Option<Binding> {
    let mut ns = self.cur_ns();
    loop {
      if let Some(b) = self.namespaces.resolve(ns, name) {
        return Some(b.clone());
      }
      match self.namespaces.get(ns).parent {
        Some(p) => ns = p,
        None => return None,
      }
    }
  }

  fn declare(&mut self, name: &str, binding: Binding) -> Result<()> {
    let ns = self.cur_ns();
    if self.namespaces.get_mut(ns).declare(name, binding).is_some() {
      return Err(self.err(Span { start: 0, end: 0 }, format!("`{name}` is already declared in this scope")));
    }
    Ok(())
  }
}

pub use prelude::BUILTIN_PRELUDE;
