mod error;
mod snippet;
pub mod source;
mod style;
mod util;

pub use error::{CompileErrorKind, Error, StackFrame};
pub use source::Source;
pub use span::{LineCol, SourceMap, Span};
