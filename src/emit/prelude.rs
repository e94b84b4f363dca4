//! Registers the standard library's dotted names (`num.floor`, `str.upper`,
//! `list.push`, ...) as [`Binding::OpcodeCommand`]s in the root namespace,
//! before any user code is compiled.
//!
//! A flat table of `(name, implementation)` walked once at startup; the
//! "implementation" is a [`crate::op::BuiltinOp`] selector instead of a Rust
//! closure, since every one of these compiles straight to a single
//! `Variadic` instruction.

use crate::op::BuiltinOp;
use crate::symbol::{Binding, Namespace};

use super::CodeGen;

/// `(dotted path, opcode)`. Every [`BuiltinOp`] variant appears exactly
/// once; `pick`, `isnative`, and `embed` are deliberately absent here and
/// instead special-cased by name in `expr.rs`'s call emission, since they
/// need custom argument handling (literal-only arguments, or a dedicated
/// instruction shape) rather than a plain `Variadic` call.
pub const BUILTIN_PRELUDE: &[(&str, BuiltinOp)] = &[
  ("num.abs", BuiltinOp::Abs),
  ("num.sign", BuiltinOp::Sign),
  ("num.floor", BuiltinOp::Floor),
  ("num.ceil", BuiltinOp::Ceil),
  ("num.round", BuiltinOp::Round),
  ("num.trunc", BuiltinOp::Trunc),
  ("num.min", BuiltinOp::Min),
  ("num.max", BuiltinOp::Max),
  ("num.clamp", BuiltinOp::Clamp),
  ("num.sin", BuiltinOp::Sin),
  ("num.cos", BuiltinOp::Cos),
  ("num.tan", BuiltinOp::Tan),
  ("num.asin", BuiltinOp::Asin),
  ("num.acos", BuiltinOp::Acos),
  ("num.atan", BuiltinOp::Atan),
  ("num.atan2", BuiltinOp::Atan2),
  ("num.log", BuiltinOp::Log),
  ("num.log2", BuiltinOp::Log2),
  ("num.log10", BuiltinOp::Log10),
  ("num.exp", BuiltinOp::Exp),
  ("num.lerp", BuiltinOp::Lerp),
  ("num.hex", BuiltinOp::Hex),
  ("num.oct", BuiltinOp::Oct),
  ("num.bin", BuiltinOp::Bin),
  ("num.int", BuiltinOp::IntCast),
  ("num.not", BuiltinOp::IntNot),
  ("num.and", BuiltinOp::IntAnd),
  ("num.or", BuiltinOp::IntOr),
  ("num.xor", BuiltinOp::IntXor),
  ("num.shl", BuiltinOp::Shl),
  ("num.shr", BuiltinOp::Shr),
  ("num.sar", BuiltinOp::Sar),
  ("num.clz", BuiltinOp::Clz),
  ("num.pop", BuiltinOp::Popcount),
  ("num.bswap", BuiltinOp::Byteswap),
  ("num.order", BuiltinOp::Order),
  ("str.cat", BuiltinOp::StrCat),
  ("str.split", BuiltinOp::StrSplit),
  ("str.replace", BuiltinOp::StrReplace),
  ("str.begins", BuiltinOp::StrBegins),
  ("str.ends", BuiltinOp::StrEnds),
  ("str.pad", BuiltinOp::StrPad),
  ("str.find", BuiltinOp::StrFind),
  ("str.rfind", BuiltinOp::StrRFind),
  ("str.lower", BuiltinOp::StrLower),
  ("str.upper", BuiltinOp::StrUpper),
  ("str.trim", BuiltinOp::StrTrim),
  ("str.rev", BuiltinOp::StrRev),
  ("str.rep", BuiltinOp::StrRep),
  ("str.list", BuiltinOp::StrList),
  ("str.byte", BuiltinOp::StrByte),
  ("str.hash", BuiltinOp::StrHash),
  ("str.str", BuiltinOp::ToStr),
  ("list.push", BuiltinOp::ListPush),
  ("list.pop", BuiltinOp::ListPop),
  ("list.shift", BuiltinOp::ListShift),
  ("list.unshift", BuiltinOp::ListUnshift),
  ("list.append", BuiltinOp::ListAppend),
  ("list.prepend", BuiltinOp::ListPrepend),
  ("list.find", BuiltinOp::ListFind),
  ("list.rfind", BuiltinOp::ListRFind),
  ("list.join", BuiltinOp::ListJoin),
  ("list.rev", BuiltinOp::ListReverse),
  ("list.sort", BuiltinOp::ListSort),
  ("list.rsort", BuiltinOp::ListRSort),
  ("list.str", BuiltinOp::ListStr),
  ("range", BuiltinOp::Range),
  ("utf8.encode", BuiltinOp::Utf8Encode),
  ("utf8.decode", BuiltinOp::Utf8Decode),
  ("struct.size", BuiltinOp::StructSize),
  ("struct.str", BuiltinOp::StructStr),
  ("struct.list", BuiltinOp::StructList),
  ("pickle.json", BuiltinOp::PickleJson),
  ("pickle.bin", BuiltinOp::PickleBin),
  ("pickle.val", BuiltinOp::PickleVal),
  ("pickle.valid", BuiltinOp::PickleValid),
  ("pickle.sibling", BuiltinOp::PickleSibling),
  ("pickle.circular", BuiltinOp::PickleCircular),
  ("pickle.copy", BuiltinOp::PickleCopy),
  ("io.say", BuiltinOp::Say),
  ("io.warn", BuiltinOp::Warn),
  ("io.ask", BuiltinOp::Ask),
  ("exit", BuiltinOp::Exit),
  ("abort", BuiltinOp::Abort),
  ("stacktrace", BuiltinOp::StackTrace),
  ("rand.seed", BuiltinOp::RandSeed),
  ("rand.seedauto", BuiltinOp::RandSeedAuto),
  ("rand.int", BuiltinOp::RandInt),
  ("rand.num", BuiltinOp::RandNum),
  ("rand.range", BuiltinOp::RandRange),
  ("rand.pick", BuiltinOp::RandPick),
  ("rand.shuffle", BuiltinOp::RandShuffle),
  ("rand.getstate", BuiltinOp::RandGetState),
  ("rand.setstate", BuiltinOp::RandSetState),
  ("gc.getlevel", BuiltinOp::GcGetLevel),
  ("gc.setlevel", BuiltinOp::GcSetLevel),
  ("gc.run", BuiltinOp::GcRun),
  ("isnum", BuiltinOp::IsNum),
  ("isstr", BuiltinOp::IsStr),
  ("islist", BuiltinOp::IsList),
];

/// Declares every entry of [`BUILTIN_PRELUDE`] under `root`, creating the
/// intermediate namespaces (`num`, `str`, `list`, ...) the first time each
/// is needed.
pub(super) fn register(cg: &mut CodeGen<'_>, root: usize) {
  for &(path, op) in BUILTIN_PRELUDE {
    let mut segments: Vec<&str> = path.split('.').collect();
    let leaf = segments.pop().unwrap();
    let mut ns = root;
    for seg in segments {
      ns = child_namespace(cg, ns, seg);
    }
    cg.namespaces.get_mut(ns).declare(leaf, Binding::OpcodeCommand { op });
  }
}

fn child_namespace(cg: &mut CodeGen<'_>, parent: usize, name: &str) -> usize {
  if let Some(Binding::Namespace(idx)) = cg.namespaces.get(parent).get(name) {
    return *idx;
  }
  let idx = cg.namespaces.push(Namespace::child(name, parent));
  cg.namespaces.get_mut(parent).declare(name, Binding::Namespace(idx));
  idx
}
