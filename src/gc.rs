//! Mark-and-sweep garbage collection over the string/list pools.
//!
//! Stop-the-world, driven by a step-countdown ("GC ticks left"). The mark
//! phase walks (i) the pinned set, (ii) every live execution frame's
//! registers, and (iii) for lists, recursively marks contained values,
//! guarded by the pool's reachability bitmap so cycles terminate.

use crate::object::Heap;
use crate::value::Value;
use crate::vm::frame::Frame;

/// GC levels: how many opcodes run between sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcLevel {
  /// Never collect.
  None,
  /// Collect roughly every 10,000 instructions.
  Default,
  /// Collect roughly every 1,000 instructions, for memory-constrained hosts.
  LowMem,
}

impl GcLevel {
  pub fn ticks(self) -> u32 {
    match self {
      GcLevel::None => u32::MAX,
      GcLevel::Default => 10_000,
      GcLevel::LowMem => 1_000,
    }
  }
}

/// Fixed tick cost charged against the timeout budget for running a
/// collection, on top of the opcodes that ran inside the collected window.
pub const GC_TICK_COST: u64 = 100;

pub struct Collector {
  level: GcLevel,
  ticks_left: u32,
}

impl Collector {
  pub fn new(level: GcLevel) -> Self {
    Collector {
      level,
      ticks_left: level.ticks(),
    }
  }

  pub fn level(&self) -> GcLevel {
    self.level
  }

  pub fn set_level(&mut self, level: GcLevel) {
    self.level = level;
    self.ticks_left = level.ticks();
  }

  /// Called once per dispatched opcode; returns `true` when a collection is
  /// due (the caller then calls [`Collector::collect`]).
  pub fn tick(&mut self) -> bool {
    if self.level == GcLevel::None {
      return false;
    }
    if self.ticks_left == 0 {
      true
    } else {
      self.ticks_left -= 1;
      false
    }
  }

  /// Runs a full mark-and-sweep. `pinned` is the host-visible pin set,
  /// `frames` is every live execution frame (register file). Returns the
  /// number of strings/lists freed, plus the usertype tag of every swept
  /// list that had one, so the caller can run its finalizer (this module
  /// has no access to [`crate::host::UsertypeRegistry`] itself).
  pub fn collect(
    &mut self,
    heap: &mut Heap,
    pinned: &[Value],
    frames: &[Frame],
  ) -> (usize, usize, Vec<(crate::object::Usertype, usize)>) {
    tracing::debug!(target: "sink::gc", "collection starting");
    for &v in pinned {
      mark_value(heap, v);
    }
    for frame in frames {
      for &v in frame.slots() {
        mark_value(heap, v);
      }
    }

    let mut strings_freed = 0;
    heap.strings.sweep(|_, _| strings_freed += 1);
    let mut lists_freed = 0;
    let mut finalize: Vec<(crate::object::Usertype, usize)> = Vec::new();
    heap.lists.sweep(|_, list| {
      lists_freed += 1;
      if let Some(user) = list.user() {
        finalize.push(user);
      }
    });

    self.ticks_left = self.level.ticks();
    tracing::debug!(
      target: "sink::gc",
      strings_freed,
      lists_freed,
      "collection finished"
    );
    (strings_freed, lists_freed, finalize)
  }
}

fn mark_value(heap: &mut Heap, v: Value) {
  if let Some(idx) = v.as_str_index() {
    heap.strings.mark(idx);
  } else if let Some(idx) = v.as_list_index() {
    mark_list(heap, idx);
  }
}

/// Recursively marks a list's contents. `Pool::mark` returns `false` when
/// the slot was already marked this cycle, which is exactly the guard a
/// self-referential or mutually-cyclic list needs to terminate.
fn mark_list(heap: &mut Heap, idx: u32) {
  if !heap.lists.mark(idx) {
    return;
  }
  let Some(list) = heap.lists.get(idx) else {
    return;
  };
  let items: Vec<Value> = list.as_slice().to_vec();
  for v in items {
    mark_value(heap, v);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::object::SinkList;

  #[test]
  fn cyclic_list_is_reachable_and_terminates() {
    // `var a = {}\nlist.push a, a`: a list that references itself must
    // still be reachable from the pin set, and marking it must terminate.
    let mut heap = Heap::new();
    let idx = heap.alloc_list();
    {
      let l = heap.lists.get_mut(idx).unwrap();
      l.push(Value::list(idx));
    }
    let mut gc = Collector::new(GcLevel::Default);
    let pinned = [Value::list(idx)];
    let (strings_freed, lists_freed, _) = gc.collect(&mut heap, &pinned, &[]);
    assert_eq!(strings_freed, 0);
    assert_eq!(lists_freed, 0);
    assert!(heap.lists.is_allocated(idx));
  }

  #[test]
  fn unreachable_list_is_swept() {
    let mut heap = Heap::new();
    let idx = heap.alloc_list();
    let mut gc = Collector::new(GcLevel::Default);
    let (_, lists_freed, _) = gc.collect(&mut heap, &[], &[]);
    assert_eq!(lists_freed, 1);
    assert!(!heap.lists.is_allocated(idx));
  }
}
