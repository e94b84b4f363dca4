use std::fmt;

use span::{SourceMap, Span};

use crate::snippet::Snippet;
use crate::source::Source;
use crate::style::Style;

/// The error kinds from the error-handling design: lex/parse are
/// collapsed into one compile-time `Syntax` kind since both are surfaced
/// through the same `file:line:col: msg` pathway by the caller that
/// drives the lexer/parser.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompileErrorKind {
  Lex,
  Parse,
  Codegen,
}

impl fmt::Display for CompileErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CompileErrorKind::Lex => write!(f, "lex error"),
      CompileErrorKind::Parse => write!(f, "parse error"),
      CompileErrorKind::Codegen => write!(f, "codegen error"),
    }
  }
}

/// One entry of the runtime stack trace, constructed by mapping a program
/// counter back through the program's pos-table.
#[derive(Clone, Debug)]
pub struct StackFrame {
  pub file: String,
  pub line_col: span::LineCol,
  pub command: Option<String>,
}

impl fmt::Display for StackFrame {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.command {
      Some(cmd) => write!(f, "{}:{}: in {}", self.file, self.line_col, cmd),
      None => write!(f, "{}:{}", self.file, self.line_col),
    }
  }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
  #[error("{kind}: {message}")]
  Compile {
    kind: CompileErrorKind,
    message: String,
    file: String,
    span: Span,
  },
  #[error("runtime error: {message}")]
  Runtime {
    message: String,
    trace: Vec<StackFrame>,
  },
  #[error("invalid binary")]
  Validation,
}

impl Error {
  pub fn lex(file: impl Into<String>, span: impl Into<Span>, message: impl Into<String>) -> Self {
    Self::Compile {
      kind: CompileErrorKind::Lex,
      message: message.into(),
      file: file.into(),
      span: span.into(),
    }
  }

  pub fn parse(file: impl Into<String>, span: impl Into<Span>, message: impl Into<String>) -> Self {
    Self::Compile {
      kind: CompileErrorKind::Parse,
      message: message.into(),
      file: file.into(),
      span: span.into(),
    }
  }

  pub fn codegen(
    file: impl Into<String>,
    span: impl Into<Span>,
    message: impl Into<String>,
  ) -> Self {
    Self::Compile {
      kind: CompileErrorKind::Codegen,
      message: message.into(),
      file: file.into(),
      span: span.into(),
    }
  }

  pub fn runtime(message: impl Into<String>, trace: Vec<StackFrame>) -> Self {
    Self::Runtime {
      message: message.into(),
      trace,
    }
  }

  /// `file:line:col: msg`; runtime errors append the stack trace
  /// underneath.
  pub fn render(&self, map: &SourceMap, src: &Source<'_>, color: bool) -> String {
    let style = Style {
      enabled: color,
      span: owo_colors::Style::new().red().bold(),
      level: owo_colors::Style::new().red().bold(),
      symbol: owo_colors::Style::new().cyan(),
    };

    match self {
      Error::Compile {
        kind,
        message,
        file,
        span,
      } => {
        let lc = map.line_col(span.start);
        let mut out = format!(
          "{file}:{lc}: {level} {message}\n",
          level = style.level(kind)
        );
        let snippet = Snippet::new(src.str(), *span);
        render_snippet(&mut out, &snippet, &style);
        out
      }
      Error::Runtime { message, trace } => {
        let mut out = format!("{}\n", style.level(message));
        for frame in trace.iter().take(10) {
          out.push_str("  at ");
          out.push_str(&frame.to_string());
          out.push('\n');
        }
        out
      }
      Error::Validation => "invalid binary\n".to_string(),
    }
  }
}

fn render_snippet(out: &mut String, snippet: &Snippet<'_>, style: &Style) {
  for (i, line) in snippet.s.split('\n').enumerate() {
    let n = snippet.line + i;
    out.push_str(&format!("{n:>5} | {line}\n"));
  }
  let _ = style; // styling applied inline above; kept for future carat coloring
}
