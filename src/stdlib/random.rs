//! `rand.*`: thin wrappers over [`Context`]'s own xorshift128+ generator so
//! `rand.getstate`/`rand.setstate` can round-trip the exact generator
//! state.

use crate::op::BuiltinOp;
use crate::value::Value;
use crate::vm::Context;

use super::{alloc_list, arity_error, expect_list_items, expect_number, rt};

pub(super) fn variadic(ctx: &mut Context, op: BuiltinOp, args: &[Value]) -> crate::Result<Value> {
  use BuiltinOp::*;
  match op {
    RandSeed => {
      let seed = expect_number(ctx, op, args.first().copied().unwrap_or(Value::number(0.0)))?;
      ctx.rand_seed(seed);
      Ok(Value::nil())
    }
    RandSeedAuto => {
      ctx.rand_seed_auto();
      Ok(Value::nil())
    }
    RandInt => {
      let max = expect_number(ctx, op, args.first().copied().unwrap_or(Value::number(1.0)))?;
      if max <= 0.0 {
        return Err(rt(ctx, "rand.int: max must be positive"));
      }
      Ok(Value::number((ctx.rand_f64() * max).floor()))
    }
    RandNum => Ok(Value::number(ctx.rand_f64())),
    RandRange => {
      if args.len() < 2 {
        return Err(arity_error(ctx, op, 2, args.len()));
      }
      let lo = expect_number(ctx, op, args[0])?;
      let hi = expect_number(ctx, op, args[1])?;
      Ok(Value::number(lo + ctx.rand_f64() * (hi - lo)))
    }
    RandPick => {
      let items = expect_list_items(ctx, op, args.first().copied().unwrap_or(Value::nil()))?;
      if items.is_empty() {
        return Ok(Value::nil());
      }
      let i = (ctx.rand_f64() * items.len() as f64).floor() as usize;
      Ok(items[i.min(items.len() - 1)])
    }
    RandShuffle => shuffle(ctx, args),
    RandGetState => {
      let (s0, s1) = ctx.rand_state();
      Ok(alloc_list(ctx, vec![Value::number(s0), Value::number(s1)]))
    }
    RandSetState => {
      let state = expect_list_items(ctx, op, args.first().copied().unwrap_or(Value::nil()))?;
      let s0 = state.first().and_then(|v| v.as_number()).unwrap_or(0.0);
      let s1 = state.get(1).and_then(|v| v.as_number()).unwrap_or(0.0);
      ctx.rand_set_state(s0, s1);
      Ok(Value::nil())
    }
    _ => unreachable!(),
  }
}

/// Fisher-Yates, in place.
fn shuffle(ctx: &mut Context, args: &[Value]) -> crate::Result<Value> {
  let idx = args
    .first()
    .and_then(|v| v.as_list_index())
    .ok_or_else(|| rt(ctx, "rand.shuffle: target must be a list"))?;
  let mut items = ctx.heap().lists.get(idx).map(|l| l.as_slice().to_vec()).unwrap_or_default();
  for i in (1..items.len()).rev() {
    let j = (ctx.rand_f64() * (i + 1) as f64).floor() as usize;
    items.swap(i, j.min(i));
  }
  if let Some(list) = ctx.heap_mut().lists.get_mut(idx) {
    *list = crate::object::SinkList::from_vec(items);
  }
  Ok(args[0])
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
  fn seeding_makes_the_stream_deterministic() {
    let mut a = test_ctx();
    let mut b = test_ctx();
    a.rand_seed(42.0);
    b.rand_seed(42.0);
    let seq_a: Vec<f64> = (0..5).map(|_| a.rand_f64()).collect();
    let seq_b: Vec<f64> = (0..5).map(|_| b.rand_f64()).collect();
    assert_eq!(seq_a, seq_b);
  }

  #[test]
  fn getstate_setstate_round_trip_resumes_the_same_stream() {
    let mut ctx = test_ctx();
    ctx.rand_seed(7.0);
    ctx.rand_f64();
    let (s0, s1) = ctx.rand_state();
    let next_from_live = ctx.rand_f64();

    let mut replay = test_ctx();
    replay.rand_set_state(s0, s1);
    let next_from_replay = replay.rand_f64();
    assert_eq!(next_from_live, next_from_replay);
  }

  #[test]
  fn rand_int_is_within_bounds_and_rejects_nonpositive_max() {
    let mut ctx = test_ctx();
    ctx.rand_seed(1.0);
    for _ in 0..20 {
      let args = [Value::number(10.0)];
      let n = variadic(&mut ctx, BuiltinOp::RandInt, &args).unwrap().as_number().unwrap();
      assert!((0.0..10.0).contains(&n));
    }
    assert!(variadic(&mut ctx, BuiltinOp::RandInt, &[Value::number(0.0)]).is_err());
  }

  #[test]
  fn shuffle_is_a_permutation_of_the_original_elements() {
    let mut ctx = test_ctx();
    ctx.rand_seed(3.0);
    let items: Vec<Value> = (0..6).map(|n| Value::number(n as f64)).collect();
    let list = alloc_list(&mut ctx, items.clone());
    shuffle(&mut ctx, &[list]).unwrap();
    let idx = list.as_list_index().unwrap();
    let mut shuffled: Vec<f64> = ctx.heap().lists.get(idx).unwrap().as_slice().iter().map(|v| v.as_number().unwrap()).collect();
    shuffled.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert_eq!(shuffled, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
  }
}
