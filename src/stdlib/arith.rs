//! Arithmetic, math, integer, and ordering operations.
//!
//! Numeric binary operators broadcast over lists: a list operand produces
//! an element-wise list result, a scalar operand broadcasts to the result
//! length, and a list shorter than the result continues from its own last
//! element rather than erroring.

use std::cmp::Ordering;

use crate::op::BuiltinOp;
use crate::value::Value;
use crate::vm::Context;

use super::{alloc_list, arity_error, expect_number, expect_str_bytes, rt};

pub(super) fn neg(ctx: &mut Context, a: Value) -> crate::Result<Value> {
  broadcast_unary(ctx, BuiltinOp::Neg, a, |x| -x)
}

/// Either a scalar wrapped in a one-element slice, or a list's elements.
fn operand(ctx: &Context, v: Value) -> Vec<Value> {
  match v.as_list_index() {
    Some(idx) => ctx.heap().lists.get(idx).map(|l| l.as_slice().to_vec()).unwrap_or_default(),
    None => vec![v],
  }
}

fn nth(ctx: &Context, op: BuiltinOp, items: &[Value], i: usize) -> crate::Result<f64> {
  let v = items
    .get(i)
    .or_else(|| items.last())
    .copied()
    .ok_or_else(|| rt(ctx, format!("{op}: empty list operand")))?;
  expect_number(ctx, op, v)
}

pub(super) fn broadcast_unary(
  ctx: &mut Context,
  op: BuiltinOp,
  a: Value,
  f: impl Fn(f64) -> f64,
) -> crate::Result<Value> {
  if a.is_list() {
    let items = operand(ctx, a);
    let mut out = Vec::with_capacity(items.len());
    for v in items {
      out.push(Value::number(f(expect_number(ctx, op, v)?)));
    }
    Ok(alloc_list(ctx, out))
  } else {
    Ok(Value::number(f(expect_number(ctx, op, a)?)))
  }
}

pub(super) fn broadcast_binary(
  ctx: &mut Context,
  op: BuiltinOp,
  a: Value,
  b: Value,
  f: impl Fn(f64, f64) -> f64,
) -> crate::Result<Value> {
  if !a.is_list() && !b.is_list() {
    let x = expect_number(ctx, op, a)?;
    let y = expect_number(ctx, op, b)?;
    return Ok(Value::number(f(x, y)));
  }
  let a_items = operand(ctx, a);
  let b_items = operand(ctx, b);
  let len = a_items.len().max(b_items.len());
  let mut out = Vec::with_capacity(len);
  for i in 0..len {
    let x = nth(ctx, op, &a_items, i)?;
    let y = nth(ctx, op, &b_items, i)?;
    out.push(Value::number(f(x, y)));
  }
  Ok(alloc_list(ctx, out))
}

pub(super) fn compare(ctx: &Context, op: BuiltinOp, a: Value, b: Value) -> crate::Result<Ordering> {
  if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
    return Ok(x.partial_cmp(&y).unwrap_or(Ordering::Equal));
  }
  if a.is_str() && b.is_str() {
    let sa = expect_str_bytes(ctx, op, a)?;
    let sb = expect_str_bytes(ctx, op, b)?;
    return Ok(sa.cmp(&sb));
  }
  Err(rt(ctx, format!("{op}: cannot compare operands of different types")))
}

/// Deep structural equality, cycle-safe: a list already being compared
/// earlier in the same call is treated as equal to itself, breaking cycles
/// the same way the GC's mark-bitmap guard does.
pub(super) fn values_equal(ctx: &Context, a: Value, b: Value) -> bool {
  let mut seen = Vec::new();
  values_equal_inner(ctx, a, b, &mut seen)
}

fn values_equal_inner(ctx: &Context, a: Value, b: Value, seen: &mut Vec<(u32, u32)>) -> bool {
  if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
    return x == y;
  }
  if let (Some(ia), Some(ib)) = (a.as_str_index(), b.as_str_index()) {
    let heap = ctx.heap();
    return match (heap.strings.get(ia), heap.strings.get(ib)) {
      (Some(sa), Some(sb)) => sa.as_bytes() == sb.as_bytes(),
      _ => false,
    };
  }
  if let (Some(ia), Some(ib)) = (a.as_list_index(), b.as_list_index()) {
    if ia == ib {
      return true;
    }
    if seen.contains(&(ia, ib)) {
      return true;
    }
    seen.push((ia, ib));
    let heap = ctx.heap();
    let (la, lb) = match (heap.lists.get(ia), heap.lists.get(ib)) {
      (Some(la), Some(lb)) => (la.as_slice().to_vec(), lb.as_slice().to_vec()),
      _ => return false,
    };
    if la.len() != lb.len() {
      return false;
    }
    return la
      .iter()
      .zip(lb.iter())
      .all(|(&x, &y)| values_equal_inner(ctx, x, y, seen));
  }
  a.is_nil() && b.is_nil()
}

/// Total order across types and within each type (`order`): nil < number <
/// string < list, recursing element-wise for lists.
pub(super) fn order(ctx: &mut Context, args: &[Value]) -> crate::Result<Value> {
  if args.len() < 2 {
    return Err(arity_error(ctx, BuiltinOp::Order, 2, args.len()));
  }
  let o = order_values(ctx, args[0], args[1]);
  Ok(Value::number(match o {
    Ordering::Less => -1.0,
    Ordering::Equal => 0.0,
    Ordering::Greater => 1.0,
  }))
}

pub(super) fn order_for_sort(ctx: &Context, a: Value, b: Value) -> Ordering {
  order_values(ctx, a, b)
}

fn order_values(ctx: &Context, a: Value, b: Value) -> Ordering {
  let (ra, rb) = (a.type_rank(), b.type_rank());
  if ra != rb {
    return ra.cmp(&rb);
  }
  if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
    return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
  }
  if let (Some(ia), Some(ib)) = (a.as_str_index(), b.as_str_index()) {
    let heap = ctx.heap();
    let sa = heap.strings.get(ia).map(|s| s.as_bytes().to_vec()).unwrap_or_default();
    let sb = heap.strings.get(ib).map(|s| s.as_bytes().to_vec()).unwrap_or_default();
    return sa.cmp(&sb);
  }
  if let (Some(ia), Some(ib)) = (a.as_list_index(), b.as_list_index()) {
    if ia == ib {
      return Ordering::Equal;
    }
    let heap = ctx.heap();
    let la = heap.lists.get(ia).map(|l| l.as_slice().to_vec()).unwrap_or_default();
    let lb = heap.lists.get(ib).map(|l| l.as_slice().to_vec()).unwrap_or_default();
    for (x, y) in la.iter().zip(lb.iter()) {
      let o = order_values(ctx, *x, *y);
      if o != Ordering::Equal {
        return o;
      }
    }
    return la.len().cmp(&lb.len());
  }
  Ordering::Equal
}

pub(super) fn unary_math(ctx: &mut Context, op: BuiltinOp, args: &[Value]) -> crate::Result<Value> {
  if args.is_empty() {
    return Err(arity_error(ctx, op, 1, 0));
  }
  let f: fn(f64) -> f64 = match op {
    BuiltinOp::Abs => f64::abs,
    BuiltinOp::Sign => f64::signum,
    BuiltinOp::Floor => f64::floor,
    BuiltinOp::Ceil => f64::ceil,
    BuiltinOp::Round => f64::round,
    BuiltinOp::Trunc => f64::trunc,
    BuiltinOp::Sin => f64::sin,
    BuiltinOp::Cos => f64::cos,
    BuiltinOp::Tan => f64::tan,
    BuiltinOp::Asin => f64::asin,
    BuiltinOp::Acos => f64::acos,
    BuiltinOp::Atan => f64::atan,
    BuiltinOp::Log => f64::ln,
    BuiltinOp::Log2 => f64::log2,
    BuiltinOp::Log10 => f64::log10,
    BuiltinOp::Exp => f64::exp,
    _ => unreachable!(),
  };
  if matches!(op, BuiltinOp::Sign) {
    let x = expect_number(ctx, op, args[0])?;
    return Ok(Value::number(if x > 0.0 {
      1.0
    } else if x < 0.0 {
      -1.0
    } else {
      0.0
    }));
  }
  if matches!(op, BuiltinOp::Hex | BuiltinOp::Oct | BuiltinOp::Bin) {
    let x = expect_number(ctx, op, args[0])? as i64 as u64;
    let s = match op {
      BuiltinOp::Hex => format!("{x:x}"),
      BuiltinOp::Oct => format!("{x:o}"),
      BuiltinOp::Bin => format!("{x:b}"),
      _ => unreachable!(),
    };
    return Ok(super::alloc_str(ctx, s.into_bytes()));
  }
  broadcast_unary(ctx, op, args[0], f)
}

pub(super) fn binary_math(ctx: &mut Context, op: BuiltinOp, args: &[Value]) -> crate::Result<Value> {
  match op {
    BuiltinOp::Min => fold_broadcast(ctx, op, args, f64::min),
    BuiltinOp::Max => fold_broadcast(ctx, op, args, f64::max),
    BuiltinOp::Atan2 => {
      if args.len() < 2 {
        return Err(arity_error(ctx, op, 2, args.len()));
      }
      broadcast_binary(ctx, op, args[0], args[1], f64::atan2)
    }
    BuiltinOp::Lerp => {
      if args.len() < 3 {
        return Err(arity_error(ctx, op, 3, args.len()));
      }
      let a = expect_number(ctx, op, args[0])?;
      let b = expect_number(ctx, op, args[1])?;
      let t = expect_number(ctx, op, args[2])?;
      Ok(Value::number(a + (b - a) * t))
    }
    _ => unreachable!(),
  }
}

fn fold_broadcast(ctx: &mut Context, op: BuiltinOp, args: &[Value], f: fn(f64, f64) -> f64) -> crate::Result<Value> {
  if args.is_empty() {
    return Err(arity_error(ctx, op, 1, 0));
  }
  let mut acc = args[0];
  for &v in &args[1..] {
    acc = broadcast_binary(ctx, op, acc, v, f)?;
  }
  Ok(acc)
}

pub(super) fn clamp(ctx: &mut Context, args: &[Value]) -> crate::Result<Value> {
  if args.len() < 3 {
    return Err(arity_error(ctx, BuiltinOp::Clamp, 3, args.len()));
  }
  let lo_hi = broadcast_binary(ctx, BuiltinOp::Clamp, args[1], args[2], f64::max)?;
  broadcast_binary(ctx, BuiltinOp::Clamp, args[0], lo_hi, f64::min)
}

pub(super) fn int_ops(ctx: &mut Context, op: BuiltinOp, args: &[Value]) -> crate::Result<Value> {
  if args.is_empty() {
    return Err(arity_error(ctx, op, 1, 0));
  }
  let a = expect_number(ctx, op, args[0])? as i64 as u32;
  let result = match op {
    BuiltinOp::IntCast => return Ok(Value::number(expect_number(ctx, op, args[0])?.trunc())),
    BuiltinOp::IntNot => !a,
    BuiltinOp::Clz => a.leading_zeros(),
    BuiltinOp::Popcount => a.count_ones(),
    BuiltinOp::Byteswap => a.swap_bytes(),
    BuiltinOp::IntAnd | BuiltinOp::IntOr | BuiltinOp::IntXor => {
      let f: fn(u32, u32) -> u32 = match op {
        BuiltinOp::IntAnd => |x, y| x & y,
        BuiltinOp::IntOr => |x, y| x | y,
        BuiltinOp::IntXor => |x, y| x ^ y,
        _ => unreachable!(),
      };
      let mut acc = a;
      for v in &args[1..] {
        let b = expect_number(ctx, op, *v)? as i64 as u32;
        acc = f(acc, b);
      }
      acc
    }
    BuiltinOp::Shl | BuiltinOp::Shr | BuiltinOp::Sar => {
      if args.len() < 2 {
        return Err(arity_error(ctx, op, 2, args.len()));
      }
      let b = expect_number(ctx, op, args[1])? as i64 as u32;
      match op {
        BuiltinOp::Shl => a.wrapping_shl(b),
        BuiltinOp::Shr => a.wrapping_shr(b),
        BuiltinOp::Sar => ((a as i32).wrapping_shr(b)) as u32,
        _ => unreachable!(),
      }
    }
    _ => unreachable!(),
  };
  Ok(Value::number(result as f64))
}

#[cfg(test)]
mod tests {
  use std::rc::Rc;

  use super::*;
  use crate::gc::GcLevel;
  use crate::host::StdIo;
  use crate::program::Program;

  fn test_ctx() -> Context {
    Context::new(Rc::new(Program::new()), Box::new(StdIo), GcLevel::Default)
  }

  #[test]
  fn int_and_or_xor_fold_over_three_or_more_args() {
    let mut ctx = test_ctx();
    let args = [Value::number(0b110 as f64), Value::number(0b101 as f64), Value::number(0b011 as f64)];
    let and = int_ops(&mut ctx, BuiltinOp::IntAnd, &args).unwrap();
    assert_eq!(and.as_number(), Some((0b110 & 0b101 & 0b011) as f64));
    let or = int_ops(&mut ctx, BuiltinOp::IntOr, &args).unwrap();
    assert_eq!(or.as_number(), Some((0b110 | 0b101 | 0b011) as f64));
    let xor = int_ops(&mut ctx, BuiltinOp::IntXor, &args).unwrap();
    assert_eq!(xor.as_number(), Some((0b110 ^ 0b101 ^ 0b011) as f64));
  }

  #[test]
  fn shl_shr_sar_reject_missing_second_operand() {
    let mut ctx = test_ctx();
    let args = [Value::number(1.0)];
    assert!(int_ops(&mut ctx, BuiltinOp::Shl, &args).is_err());
    assert!(int_ops(&mut ctx, BuiltinOp::Shr, &args).is_err());
    assert!(int_ops(&mut ctx, BuiltinOp::Sar, &args).is_err());
  }

  #[test]
  fn sar_is_arithmetic_shift() {
    let mut ctx = test_ctx();
    let args = [Value::number(-8.0), Value::number(1.0)];
    let out = int_ops(&mut ctx, BuiltinOp::Sar, &args).unwrap();
    assert_eq!(out.as_number(), Some(((-8i32) >> 1) as u32 as f64));
  }

  #[test]
  fn broadcast_binary_scalar_both_sides() {
    let mut ctx = test_ctx();
    let out = broadcast_binary(&mut ctx, BuiltinOp::Add, Value::number(2.0), Value::number(3.0), |a, b| a + b).unwrap();
    assert_eq!(out.as_number(), Some(5.0));
  }

  #[test]
  fn broadcast_binary_list_with_scalar_and_short_list_repeats_last() {
    let mut ctx = test_ctx();
    let list = alloc_list(&mut ctx, vec![Value::number(1.0), Value::number(2.0), Value::number(3.0)]);
    let out = broadcast_binary(&mut ctx, BuiltinOp::Add, list, Value::number(10.0), |a, b| a + b).unwrap();
    let idx = out.as_list_index().unwrap();
    let items = ctx.heap().lists.get(idx).unwrap().as_slice().to_vec();
    assert_eq!(items.iter().map(|v| v.as_number().unwrap()).collect::<Vec<_>>(), vec![11.0, 12.0, 13.0]);

    let short = alloc_list(&mut ctx, vec![Value::number(100.0)]);
    let long = alloc_list(&mut ctx, vec![Value::number(1.0), Value::number(2.0), Value::number(3.0)]);
    let out = broadcast_binary(&mut ctx, BuiltinOp::Add, short, long, |a, b| a + b).unwrap();
    let idx = out.as_list_index().unwrap();
    let items = ctx.heap().lists.get(idx).unwrap().as_slice().to_vec();
    assert_eq!(items.iter().map(|v| v.as_number().unwrap()).collect::<Vec<_>>(), vec![101.0, 102.0, 103.0]);
  }

  #[test]
  fn min_max_fold_across_more_than_two_args() {
    let mut ctx = test_ctx();
    let args = [Value::number(3.0), Value::number(1.0), Value::number(2.0)];
    let min = binary_math(&mut ctx, BuiltinOp::Min, &args).unwrap();
    assert_eq!(min.as_number(), Some(1.0));
    let max = binary_math(&mut ctx, BuiltinOp::Max, &args).unwrap();
    assert_eq!(max.as_number(), Some(3.0));
  }

  #[test]
  fn values_equal_handles_cyclic_lists() {
    let mut ctx = test_ctx();
    let idx_a = ctx.heap_mut().lists.alloc(crate::object::SinkList::new());
    let idx_b = ctx.heap_mut().lists.alloc(crate::object::SinkList::new());
    if let Some(l) = ctx.heap_mut().lists.get_mut(idx_a) {
      l.push(Value::list(idx_b));
    }
    if let Some(l) = ctx.heap_mut().lists.get_mut(idx_b) {
      l.push(Value::list(idx_a));
    }
    assert!(values_equal(&ctx, Value::list(idx_a), Value::list(idx_b)));
  }
}
