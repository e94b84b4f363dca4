//! Indexing, slicing, and list operations shared across strings and lists.

use crate::object::SinkList;
use crate::op::BuiltinOp;
use crate::value::Value;
use crate::vm::Context;

use super::{alloc_list, alloc_str, arity_error, expect_list_items, expect_number, expect_str_bytes, normalize_index, rt};

pub(super) fn len(ctx: &mut Context, a: Value) -> crate::Result<Value> {
  if let Some(idx) = a.as_str_index() {
    return Ok(Value::number(ctx.heap().strings.get(idx).map(|s| s.len()).unwrap_or(0) as f64));
  }
  if let Some(idx) = a.as_list_index() {
    return Ok(Value::number(ctx.heap().lists.get(idx).map(|l| l.len()).unwrap_or(0) as f64));
  }
  Err(rt(ctx, "len: expected a string or list"))
}

pub(super) fn concat(ctx: &mut Context, a: Value, b: Value) -> crate::Result<Value> {
  if a.is_str() && b.is_str() {
    let mut bytes = expect_str_bytes(ctx, BuiltinOp::Concat, a)?;
    bytes.extend(expect_str_bytes(ctx, BuiltinOp::Concat, b)?);
    return Ok(alloc_str(ctx, bytes));
  }
  if a.is_list() && b.is_list() {
    let mut items = expect_list_items(ctx, BuiltinOp::Concat, a)?;
    items.extend(expect_list_items(ctx, BuiltinOp::Concat, b)?);
    return Ok(alloc_list(ctx, items));
  }
  Err(rt(ctx, "concat: operands must both be strings or both be lists"))
}

pub(super) fn get_at(ctx: &mut Context, a: Value, b: Value) -> crate::Result<Value> {
  let i = expect_number(ctx, BuiltinOp::GetAt, b)?;
  if let Some(idx) = a.as_list_index() {
    let items = ctx.heap().lists.get(idx).map(|l| l.as_slice().to_vec()).unwrap_or_default();
    return Ok(match normalize_index(i, items.len()) {
      Some(i) => items[i],
      None => Value::nil(),
    });
  }
  if a.is_str() {
    let bytes = expect_str_bytes(ctx, BuiltinOp::GetAt, a)?;
    return Ok(match normalize_index(i, bytes.len()) {
      Some(i) => alloc_str(ctx, vec![bytes[i]]),
      None => Value::nil(),
    });
  }
  Err(rt(ctx, "get-at: expected a string or list"))
}

pub(super) fn set_at(ctx: &mut Context, a: Value, b: Value, c: Value) -> crate::Result<Value> {
  let idx = a
    .as_list_index()
    .ok_or_else(|| rt(ctx, "set-at: target must be a list"))?;
  let i = expect_number(ctx, BuiltinOp::SetAt, b)?;
  let len = ctx.heap().lists.get(idx).map(|l| l.len()).unwrap_or(0);
  let i = i as i64;
  let i = if i < 0 { i + len as i64 } else { i };
  if i < 0 {
    return Err(rt(ctx, "set-at: index out of range"));
  }
  if let Some(list) = ctx.heap_mut().lists.get_mut(idx) {
    list.set_at(i as usize, c);
  }
  Ok(c)
}

/// `a[lo:hi]`: non-mutating, `lo`/`hi` already resolved to concrete numbers
/// by codegen (an open-ended bound compiles to `len(a)` or `0`, not a
/// literal nil — see `emit/expr.rs`).
pub(super) fn slice(ctx: &mut Context, a: Value, lo: Value, hi: Value) -> crate::Result<Value> {
  let lo = expect_number(ctx, BuiltinOp::Slice, lo)?;
  let hi = expect_number(ctx, BuiltinOp::Slice, hi)?;
  if let Some(idx) = a.as_list_index() {
    let items = ctx.heap().lists.get(idx).map(|l| l.as_slice().to_vec()).unwrap_or_default();
    let (lo, hi) = clamp_range(lo, hi, items.len());
    return Ok(alloc_list(ctx, items.get(lo..hi).map(<[Value]>::to_vec).unwrap_or_default()));
  }
  if a.is_str() {
    let bytes = expect_str_bytes(ctx, BuiltinOp::Slice, a)?;
    let (lo, hi) = clamp_range(lo, hi, bytes.len());
    return Ok(alloc_str(ctx, bytes.get(lo..hi).map(<[u8]>::to_vec).unwrap_or_default()));
  }
  Err(rt(ctx, "slice: expected a string or list"))
}

fn clamp_range(lo: f64, hi: f64, len: usize) -> (usize, usize) {
  let resolve = |i: f64| -> i64 {
    let i = i as i64;
    if i < 0 { (i + len as i64).max(0) } else { i }
  };
  let lo = (resolve(lo) as usize).min(len);
  let hi = (resolve(hi) as usize).min(len);
  if lo > hi { (lo, lo) } else { (lo, hi) }
}

pub(super) fn variadic(ctx: &mut Context, op: BuiltinOp, args: &[Value]) -> crate::Result<Value> {
  use BuiltinOp::*;
  match op {
    Range => range(ctx, args),
    Splice => splice(ctx, args),
    ListPush => list_push(ctx, args),
    ListPop => list_pop(ctx, args, true),
    ListShift => list_pop(ctx, args, false),
    ListUnshift => list_unshift(ctx, args),
    ListAppend => list_append(ctx, args, true),
    ListPrepend => list_append(ctx, args, false),
    ListFind => list_find(ctx, args, true),
    ListRFind => list_find(ctx, args, false),
    ListJoin => list_join(ctx, args),
    ListReverse => list_reverse(ctx, args),
    ListSort => list_sort(ctx, args, false),
    ListRSort => list_sort(ctx, args, true),
    ListStr => list_str(ctx, args),
    _ => unreachable!(),
  }
}

fn range(ctx: &mut Context, args: &[Value]) -> crate::Result<Value> {
  let (start, stop, step) = match args.len() {
    1 => (0.0, expect_number(ctx, BuiltinOp::Range, args[0])?, 1.0),
    2 => (
      expect_number(ctx, BuiltinOp::Range, args[0])?,
      expect_number(ctx, BuiltinOp::Range, args[1])?,
      1.0,
    ),
    3 => (
      expect_number(ctx, BuiltinOp::Range, args[0])?,
      expect_number(ctx, BuiltinOp::Range, args[1])?,
      expect_number(ctx, BuiltinOp::Range, args[2])?,
    ),
    n => return Err(arity_error(ctx, BuiltinOp::Range, 1, n)),
  };
  if step == 0.0 {
    return Err(rt(ctx, "range: step must not be zero"));
  }
  let mut out = Vec::new();
  let mut x = start;
  if step > 0.0 {
    while x < stop {
      out.push(Value::number(x));
      x += step;
    }
  } else {
    while x > stop {
      out.push(Value::number(x));
      x += step;
    }
  }
  Ok(alloc_list(ctx, out))
}

/// `a[lo:hi] = d`: replaces the `[lo, hi)` window of list `a` with `d`'s
/// elements, in place, returning `a`.
fn splice(ctx: &mut Context, args: &[Value]) -> crate::Result<Value> {
  if args.len() < 4 {
    return Err(arity_error(ctx, BuiltinOp::Splice, 4, args.len()));
  }
  let (a, lo, hi, repl) = (args[0], args[1], args[2], args[3]);
  let idx = a
    .as_list_index()
    .ok_or_else(|| rt(ctx, "splice: target must be a list"))?;
  let lo = expect_number(ctx, BuiltinOp::Splice, lo)?;
  let hi = expect_number(ctx, BuiltinOp::Splice, hi)?;
  let repl_items = expect_list_items(ctx, BuiltinOp::Splice, repl)?;
  let len = ctx.heap().lists.get(idx).map(|l| l.len()).unwrap_or(0);
  let (lo, hi) = clamp_range(lo, hi, len);
  if let Some(list) = ctx.heap_mut().lists.get_mut(idx) {
    let mut items = list.as_slice().to_vec();
    items.splice(lo..hi, repl_items);
    *list = SinkList::from_vec(items);
  }
  Ok(a)
}

fn list_push(ctx: &mut Context, args: &[Value]) -> crate::Result<Value> {
  if args.is_empty() {
    return Err(arity_error(ctx, BuiltinOp::ListPush, 1, 0));
  }
  let idx = args[0]
    .as_list_index()
    .ok_or_else(|| rt(ctx, "list.push: target must be a list"))?;
  if let Some(list) = ctx.heap_mut().lists.get_mut(idx) {
    for &v in &args[1..] {
      list.push(v);
    }
  }
  Ok(args[0])
}

fn list_pop(ctx: &mut Context, args: &[Value], from_back: bool) -> crate::Result<Value> {
  let idx = args
    .first()
    .and_then(|v| v.as_list_index())
    .ok_or_else(|| rt(ctx, "list pop/shift: target must be a list"))?;
  let v = ctx
    .heap_mut()
    .lists
    .get_mut(idx)
    .and_then(|l| if from_back { l.pop() } else { l.shift() });
  Ok(v.unwrap_or(Value::nil()))
}

fn list_unshift(ctx: &mut Context, args: &[Value]) -> crate::Result<Value> {
  if args.len() < 2 {
    return Err(arity_error(ctx, BuiltinOp::ListUnshift, 2, args.len()));
  }
  let idx = args[0]
    .as_list_index()
    .ok_or_else(|| rt(ctx, "list.unshift: target must be a list"))?;
  if let Some(list) = ctx.heap_mut().lists.get_mut(idx) {
    for &v in args[1..].iter().rev() {
      list.unshift(v);
    }
  }
  Ok(args[0])
}

fn list_append(ctx: &mut Context, args: &[Value], at_end: bool) -> crate::Result<Value> {
  if args.is_empty() {
    return Err(arity_error(ctx, BuiltinOp::ListAppend, 1, 0));
  }
  let idx = args[0]
    .as_list_index()
    .ok_or_else(|| rt(ctx, "list append/prepend: target must be a list"))?;
  let mut extra = Vec::new();
  for &src in &args[1..] {
    extra.extend(expect_list_items(ctx, BuiltinOp::ListAppend, src)?);
  }
  if let Some(list) = ctx.heap_mut().lists.get_mut(idx) {
    if at_end {
      list.append(&extra);
    } else {
      let mut items = extra;
      items.extend_from_slice(list.as_slice());
      *list = SinkList::from_vec(items);
    }
  }
  Ok(args[0])
}

fn list_find(ctx: &mut Context, args: &[Value], forward: bool) -> crate::Result<Value> {
  if args.len() < 2 {
    return Err(arity_error(ctx, BuiltinOp::ListFind, 2, args.len()));
  }
  let items = expect_list_items(ctx, BuiltinOp::ListFind, args[0])?;
  let needle = args[1];
  let found = if forward {
    items.iter().position(|&v| super::arith::values_equal(ctx, v, needle))
  } else {
    items.iter().rposition(|&v| super::arith::values_equal(ctx, v, needle))
  };
  Ok(found.map(|i| Value::number(i as f64)).unwrap_or(Value::nil()))
}

fn list_join(ctx: &mut Context, args: &[Value]) -> crate::Result<Value> {
  let items = expect_list_items(ctx, BuiltinOp::ListJoin, args.first().copied().unwrap_or(Value::nil()))?;
  let sep = match args.get(1) {
    Some(v) => expect_str_bytes(ctx, BuiltinOp::ListJoin, *v)?,
    None => Vec::new(),
  };
  let mut out = Vec::new();
  for (i, &v) in items.iter().enumerate() {
    if i > 0 {
      out.extend_from_slice(&sep);
    }
    out.extend(super::render::to_display_string(ctx.heap(), v).into_bytes());
  }
  Ok(alloc_str(ctx, out))
}

fn list_reverse(ctx: &mut Context, args: &[Value]) -> crate::Result<Value> {
  let idx = args
    .first()
    .and_then(|v| v.as_list_index())
    .ok_or_else(|| rt(ctx, "list.rev: target must be a list"))?;
  if let Some(list) = ctx.heap_mut().lists.get_mut(idx) {
    list.reverse();
  }
  Ok(args[0])
}

fn list_sort(ctx: &mut Context, args: &[Value], descending: bool) -> crate::Result<Value> {
  let idx = args
    .first()
    .and_then(|v| v.as_list_index())
    .ok_or_else(|| rt(ctx, "list sort: target must be a list"))?;
  let mut items = ctx.heap().lists.get(idx).map(|l| l.as_slice().to_vec()).unwrap_or_default();
  items.sort_by(|&a, &b| super::arith::order_for_sort(ctx, a, b));
  if descending {
    items.reverse();
  }
  if let Some(list) = ctx.heap_mut().lists.get_mut(idx) {
    *list = SinkList::from_vec(items);
  }
  Ok(args[0])
}

fn list_str(ctx: &mut Context, args: &[Value]) -> crate::Result<Value> {
  let v = args.first().copied().unwrap_or(Value::nil());
  let s = super::render::to_display_string(ctx.heap(), v);
  Ok(alloc_str(ctx, s.into_bytes()))
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

  fn nums(ctx: &mut Context, xs: &[f64]) -> Value {
    alloc_list(ctx, xs.iter().map(|&n| Value::number(n)).collect())
  }

  fn to_nums(ctx: &Context, v: Value) -> Vec<f64> {
    let idx = v.as_list_index().unwrap();
    ctx.heap().lists.get(idx).unwrap().as_slice().iter().map(|v| v.as_number().unwrap()).collect()
  }

  #[test]
  fn range_with_negative_step() {
    let mut ctx = test_ctx();
    let out = range(&mut ctx, &[Value::number(5.0), Value::number(0.0), Value::number(-2.0)]).unwrap();
    assert_eq!(to_nums(&ctx, out), vec![5.0, 3.0, 1.0]);
  }

  #[test]
  fn range_rejects_zero_step() {
    let mut ctx = test_ctx();
    assert!(range(&mut ctx, &[Value::number(0.0), Value::number(1.0), Value::number(0.0)]).is_err());
  }

  #[test]
  fn list_push_appends_in_order() {
    let mut ctx = test_ctx();
    let list = nums(&mut ctx, &[1.0]);
    let args = [list, Value::number(2.0), Value::number(3.0)];
    list_push(&mut ctx, &args).unwrap();
    assert_eq!(to_nums(&ctx, list), vec![1.0, 2.0, 3.0]);
  }

  #[test]
  fn list_pop_and_shift_remove_from_opposite_ends() {
    let mut ctx = test_ctx();
    let list = nums(&mut ctx, &[1.0, 2.0, 3.0]);
    let popped = list_pop(&mut ctx, &[list], true).unwrap();
    assert_eq!(popped.as_number(), Some(3.0));
    let shifted = list_pop(&mut ctx, &[list], false).unwrap();
    assert_eq!(shifted.as_number(), Some(1.0));
    assert_eq!(to_nums(&ctx, list), vec![2.0]);
  }

  #[test]
  fn splice_replaces_window_in_place() {
    let mut ctx = test_ctx();
    let list = nums(&mut ctx, &[1.0, 2.0, 3.0, 4.0]);
    let repl = nums(&mut ctx, &[9.0, 9.0]);
    let args = [list, Value::number(1.0), Value::number(3.0), repl];
    splice(&mut ctx, &args).unwrap();
    assert_eq!(to_nums(&ctx, list), vec![1.0, 9.0, 9.0, 4.0]);
  }

  #[test]
  fn slice_clamps_out_of_range_bounds() {
    let mut ctx = test_ctx();
    let list = nums(&mut ctx, &[1.0, 2.0, 3.0]);
    let out = slice(&mut ctx, list, Value::number(-100.0), Value::number(100.0)).unwrap();
    assert_eq!(to_nums(&ctx, out), vec![1.0, 2.0, 3.0]);
  }

  #[test]
  fn list_find_and_rfind_locate_first_and_last_match() {
    let mut ctx = test_ctx();
    let list = nums(&mut ctx, &[1.0, 2.0, 1.0]);
    let fwd = list_find(&mut ctx, &[list, Value::number(1.0)], true).unwrap();
    assert_eq!(fwd.as_number(), Some(0.0));
    let bwd = list_find(&mut ctx, &[list, Value::number(1.0)], false).unwrap();
    assert_eq!(bwd.as_number(), Some(2.0));
    let missing = list_find(&mut ctx, &[list, Value::number(9.0)], true).unwrap();
    assert!(missing.is_nil());
  }

  #[test]
  fn list_sort_ascending_and_descending() {
    let mut ctx = test_ctx();
    let list = nums(&mut ctx, &[3.0, 1.0, 2.0]);
    list_sort(&mut ctx, &[list], false).unwrap();
    assert_eq!(to_nums(&ctx, list), vec![1.0, 2.0, 3.0]);
    list_sort(&mut ctx, &[list], true).unwrap();
    assert_eq!(to_nums(&ctx, list), vec![3.0, 2.0, 1.0]);
  }

  #[test]
  fn concat_requires_matching_operand_kinds() {
    let mut ctx = test_ctx();
    let list = nums(&mut ctx, &[1.0]);
    let s = alloc_str(&mut ctx, b"x".to_vec());
    assert!(concat(&mut ctx, list, s).is_err());
  }
}
