//! `gc.*`: thin wrappers over [`Context`]'s collector accessors. Level
//! numbering matches `SINK_GC_{NONE,DEFAULT,LOWMEM}` ordering.

use crate::gc::GcLevel;
use crate::op::BuiltinOp;
use crate::value::Value;
use crate::vm::Context;

use super::rt;

fn level_to_number(level: GcLevel) -> f64 {
  match level {
    GcLevel::None => 0.0,
    GcLevel::Default => 1.0,
    GcLevel::LowMem => 2.0,
  }
}

fn number_to_level(ctx: &Context, n: f64) -> crate::Result<GcLevel> {
  match n as i64 {
    0 => Ok(GcLevel::None),
    1 => Ok(GcLevel::Default),
    2 => Ok(GcLevel::LowMem),
    _ => Err(rt(ctx, "gc.setlevel: level must be 0 (none), 1 (default), or 2 (lowmem)")),
  }
}

pub(super) fn variadic(ctx: &mut Context, op: BuiltinOp, args: &[Value]) -> crate::Result<Value> {
  use BuiltinOp::*;
  match op {
    GcGetLevel => Ok(Value::number(level_to_number(ctx.gc_level()))),
    GcSetLevel => {
      let n = super::expect_number(ctx, op, args.first().copied().unwrap_or(Value::number(1.0)))?;
      let level = number_to_level(ctx, n)?;
      ctx.set_gc_level(level);
      Ok(Value::nil())
    }
    GcRun => {
      ctx.gc_run();
      Ok(Value::nil())
    }
    _ => unreachable!(),
  }
}

#[cfg(test)]
mod tests {
  use std::rc::Rc;

  use super::*;
  use crate::host::StdIo;
  use crate::program::Program;

  fn test_ctx() -> Context {
    Context::new(Rc::new(Program::new()), Box::new(StdIo), GcLevel::Default)
  }

  #[test]
  fn get_level_reflects_default_construction() {
    let ctx = test_ctx();
    assert_eq!(ctx.gc_level(), GcLevel::Default);
  }

  #[test]
  fn set_level_round_trips_through_variadic_dispatch() {
    let mut ctx = test_ctx();
    variadic(&mut ctx, BuiltinOp::GcSetLevel, &[Value::number(2.0)]).unwrap();
    assert_eq!(ctx.gc_level(), GcLevel::LowMem);
    let n = variadic(&mut ctx, BuiltinOp::GcGetLevel, &[]).unwrap();
    assert_eq!(n.as_number(), Some(2.0));
  }

  #[test]
  fn set_level_rejects_out_of_range_value() {
    let mut ctx = test_ctx();
    assert!(variadic(&mut ctx, BuiltinOp::GcSetLevel, &[Value::number(7.0)]).is_err());
  }

  #[test]
  fn gc_run_does_not_error_on_an_empty_heap() {
    let mut ctx = test_ctx();
    assert!(variadic(&mut ctx, BuiltinOp::GcRun, &[]).is_ok());
  }
}
