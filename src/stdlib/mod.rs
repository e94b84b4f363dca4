//! The built-in operation library: every [`BuiltinOp`]'s actual behavior,
//! reached from the dispatch loop's four opcode shapes.
//!
//! One submodule per family of related functions (arithmetic, containers,
//! strings, codecs, pickling, random, GC), with a flat dispatch `match` at
//! the front door of each.

mod arith;
mod codec;
mod container;
mod gcops;
mod pickle;
mod random;
pub mod render;
mod strops;

use diag::Error;

use crate::op::BuiltinOp;
use crate::value::Value;
use crate::vm::Context;

fn rt(ctx: &Context, message: impl Into<String>) -> Error {
  Error::runtime(message.into(), ctx.stack_trace())
}

fn expect_number(ctx: &Context, op: BuiltinOp, v: Value) -> crate::Result<f64> {
  v.as_number().ok_or_else(|| rt(ctx, format!("{op}: expected a number")))
}

fn expect_str_bytes(ctx: &Context, op: BuiltinOp, v: Value) -> crate::Result<Vec<u8>> {
  let idx = v.as_str_index().ok_or_else(|| rt(ctx, format!("{op}: expected a string")))?;
  Ok(
    ctx
      .heap()
      .strings
      .get(idx)
      .map(|s| s.as_bytes().to_vec())
      .unwrap_or_default(),
  )
}

fn expect_list_items(ctx: &Context, op: BuiltinOp, v: Value) -> crate::Result<Vec<Value>> {
  let idx = v.as_list_index().ok_or_else(|| rt(ctx, format!("{op}: expected a list")))?;
  Ok(
    ctx
      .heap()
      .lists
      .get(idx)
      .map(|l| l.as_slice().to_vec())
      .unwrap_or_default(),
  )
}

fn alloc_str(ctx: &mut Context, bytes: Vec<u8>) -> Value {
  Value::str(ctx.heap_mut().alloc_string(bytes))
}

fn alloc_list(ctx: &mut Context, items: Vec<Value>) -> Value {
  Value::list(ctx.heap_mut().lists.alloc(crate::object::SinkList::from_vec(items)))
}

/// Resolves a (possibly negative) sink index against a length: negative
/// counts back from the end. Returns `None` when the result still falls
/// outside `[0, len)`.
fn normalize_index(i: f64, len: usize) -> Option<usize> {
  let i = i as i64;
  let i = if i < 0 { i + len as i64 } else { i };
  if i < 0 || i as usize >= len {
    None
  } else {
    Some(i as usize)
  }
}

pub fn eval_unary(ctx: &mut Context, op: BuiltinOp, a: Value) -> crate::Result<Value> {
  match op {
    BuiltinOp::Neg => arith::neg(ctx, a),
    BuiltinOp::Len => container::len(ctx, a),
    BuiltinOp::ToStr => {
      let s = render::to_display_string(ctx.heap(), a);
      Ok(alloc_str(ctx, s.into_bytes()))
    }
    BuiltinOp::IsList => Ok(Value::number(if a.is_list() { 1.0 } else { 0.0 })),
    _ => unreachable!("{op} is not a unary builtin"),
  }
}

pub fn eval_binary(ctx: &mut Context, op: BuiltinOp, a: Value, b: Value) -> crate::Result<Value> {
  match op {
    BuiltinOp::Add => arith::broadcast_binary(ctx, op, a, b, |x, y| x + y),
    BuiltinOp::Sub => arith::broadcast_binary(ctx, op, a, b, |x, y| x - y),
    BuiltinOp::Mul => arith::broadcast_binary(ctx, op, a, b, |x, y| x * y),
    BuiltinOp::Div => arith::broadcast_binary(ctx, op, a, b, |x, y| x / y),
    BuiltinOp::Mod => arith::broadcast_binary(ctx, op, a, b, |x, y| x - y * (x / y).floor()),
    BuiltinOp::Pow => arith::broadcast_binary(ctx, op, a, b, f64::powf),
    BuiltinOp::Concat => container::concat(ctx, a, b),
    BuiltinOp::Lt => arith::compare(ctx, op, a, b).map(|o| Value::number(if o.is_lt() { 1.0 } else { 0.0 })),
    BuiltinOp::Le => arith::compare(ctx, op, a, b).map(|o| Value::number(if o.is_le() { 1.0 } else { 0.0 })),
    BuiltinOp::Eq => Ok(Value::number(if arith::values_equal(ctx, a, b) { 1.0 } else { 0.0 })),
    BuiltinOp::Ne => Ok(Value::number(if arith::values_equal(ctx, a, b) { 0.0 } else { 1.0 })),
    BuiltinOp::GetAt => container::get_at(ctx, a, b),
    _ => unreachable!("{op} is not a binary builtin"),
  }
}

pub fn eval_ternary(ctx: &mut Context, op: BuiltinOp, a: Value, b: Value, c: Value) -> crate::Result<Value> {
  match op {
    BuiltinOp::SetAt => container::set_at(ctx, a, b, c),
    BuiltinOp::Slice => container::slice(ctx, a, b, c),
    _ => unreachable!("{op} is not a ternary builtin"),
  }
}

pub fn eval_variadic(ctx: &mut Context, op: BuiltinOp, args: &[Value]) -> crate::Result<Value> {
  use BuiltinOp::*;
  match op {
    Abs | Sign | Floor | Ceil | Round | Trunc | Sin | Cos | Tan | Asin | Acos | Atan | Log | Log2 | Log10 | Exp
    | Hex | Oct | Bin => arith::unary_math(ctx, op, args),
    Min | Max | Atan2 | Lerp => arith::binary_math(ctx, op, args),
    Clamp => arith::clamp(ctx, args),
    IntCast | IntNot | IntAnd | IntOr | IntXor | Shl | Shr | Sar | Clz | Popcount | Byteswap => {
      arith::int_ops(ctx, op, args)
    }
    Order => arith::order(ctx, args),

    Splice | ListPush | ListPop | ListShift | ListUnshift | ListAppend | ListPrepend | ListFind | ListRFind
    | ListJoin | ListReverse | ListSort | ListRSort | ListStr | Range => container::variadic(ctx, op, args),

    StrCat | StrSplit | StrReplace | StrBegins | StrEnds | StrPad | StrFind | StrRFind | StrLower | StrUpper
    | StrTrim | StrRev | StrRep | StrList | StrByte | StrHash => strops::variadic(ctx, op, args),

    Utf8Encode | Utf8Decode | StructSize | StructStr | StructList => codec::variadic(ctx, op, args),

    PickleJson | PickleBin | PickleVal | PickleValid | PickleSibling | PickleCircular | PickleCopy => {
      pickle::variadic(ctx, op, args)
    }

    RandSeed | RandSeedAuto | RandInt | RandNum | RandRange | RandPick | RandShuffle | RandGetState
    | RandSetState => random::variadic(ctx, op, args),

    GcGetLevel | GcSetLevel | GcRun => gcops::variadic(ctx, op, args),

    IsNum => Ok(Value::number(if args.first().is_some_and(|v| v.is_number()) { 1.0 } else { 0.0 })),
    IsStr => Ok(Value::number(if args.first().is_some_and(|v| v.is_str()) { 1.0 } else { 0.0 })),

    Say | Warn | Ask | Exit | Abort | StackTrace => {
      unreachable!("{op} is handled directly by the dispatch loop")
    }
    Neg | Len | ToStr | IsList | Add | Sub | Mul | Div | Mod | Pow | Concat | Lt | Le | Eq | Ne | GetAt | SetAt
    | Slice => unreachable!("{op} never reaches eval_variadic"),
  }
}

fn arity_error(ctx: &Context, op: BuiltinOp, min: usize, got: usize) -> Error {
  rt(ctx, format!("{op}: expected at least {min} argument(s), got {got}"))
}
