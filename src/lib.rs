//! `sink`: an embeddable, sandboxed, dynamically-typed scripting language.
//!
//! The usual embedding shape is [`Script::compile`] once, then
//! [`Script::context`] as many times as you need a fresh, isolated runtime
//! over the same compiled program:
//!
//! ```no_run
//! let script = sink::Script::compile("game.sink", "say 'hello'").unwrap();
//! let mut ctx = script.context().build();
//! ctx.run(10_000);
//! ```

#![allow(clippy::wrong_self_convention)]

mod emit;
pub mod gc;
mod hash;
pub mod host;
mod object;
mod op;
pub mod program;
mod stdlib;
mod symbol;
mod value;
pub mod vm;

use std::rc::Rc;

pub use derive::native;
pub use diag::Error;

pub use host::Value;
use host::{HostIo, IncludeResolver, NoIncludes, StdIo};
use program::Program;
pub use vm::{Context, RunResult, Status};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A compiled, [verified][vm::verify::verify] module. Cheap to clone — the underlying [`Program`] is reference-counted, so one
/// `Script` backs as many [`Context`]s as the host wants to run in
/// parallel or in sequence.
#[derive(Clone)]
pub struct Script {
  program: Rc<Program>,
}

impl Script {
  /// Compiles `src` with no `include` support and no debug tables. Use
  /// [`Script::builder`] to attach an [`IncludeResolver`] or turn on debug
  /// info (pos-table and cmd-table) for stack traces that name source
  /// files and commands.
  pub fn compile(file: impl Into<String>, src: &str) -> Result<Self> {
    Self::builder().compile(file, src)
  }

  pub fn builder() -> ScriptBuilder {
    ScriptBuilder::default()
  }

  pub fn program(&self) -> &Program {
    &self.program
  }

  /// Starts building a [`Context`] that runs this program.
  pub fn context(&self) -> ContextBuilder {
    ContextBuilder::new(self.program.clone())
  }
}

/// Builds a [`Script`], configuring `include` resolution and debug info
/// before compiling.
#[derive(Default)]
pub struct ScriptBuilder {
  includes: Option<Box<dyn IncludeResolver>>,
  debug: bool,
}

impl ScriptBuilder {
  pub fn with_includes(mut self, includes: impl IncludeResolver + 'static) -> Self {
    self.includes = Some(Box::new(includes));
    self
  }

  /// Emits the pos-table and cmd-table so runtime errors and
  /// `stacktrace()` can report source files, lines and command names.
  pub fn with_debug(mut self) -> Self {
    self.debug = true;
    self
  }

  pub fn compile(self, file: impl Into<String>, src: &str) -> Result<Script> {
    let file = file.into();
    let module = syntax::parse(file.clone(), src)?;
    let source_map = span::SourceMap::new(file.clone(), src);
    let no_includes = NoIncludes;
    let includes: &dyn IncludeResolver = self.includes.as_deref().unwrap_or(&no_includes);
    let program = emit::emit(&file, &module, &source_map, includes, self.debug)?;
    vm::verify::verify(&program)
      .map_err(|e| Error::codegen(file.clone(), span::Span::default(), e.to_string()))?;
    Ok(Script { program: Rc::new(program) })
  }
}

/// Builds a [`Context`] over an already-compiled [`Script`]: one compiled
/// program, any number of fresh runtime states. Defaults to [`StdIo`] and
/// [`gc::GcLevel::Default`].
pub struct ContextBuilder {
  program: Rc<Program>,
  io: Option<Box<dyn HostIo>>,
  gc_level: gc::GcLevel,
}

impl ContextBuilder {
  fn new(program: Rc<Program>) -> Self {
    ContextBuilder {
      program,
      io: None,
      gc_level: gc::GcLevel::Default,
    }
  }

  pub fn with_io(mut self, io: impl HostIo + 'static) -> Self {
    self.io = Some(Box::new(io));
    self
  }

  pub fn with_gc_level(mut self, level: gc::GcLevel) -> Self {
    self.gc_level = level;
    self
  }

  pub fn build(self) -> Context {
    let io = self.io.unwrap_or_else(|| Box::new(StdIo));
    Context::new(self.program, io, self.gc_level)
  }
}
