//! Namespaces, scopes, and register allocation for code generation.

use std::collections::HashMap;

use diag::Error;
use indexmap::IndexMap;
use span::Span;

/// A position in the opcode buffer that is forward-referenced before it's
/// known, with a list of fixup sites to patch once it resolves.
#[derive(Debug, Clone, Default)]
pub struct Label {
  pub resolved: Option<u32>,
  /// Byte offsets of the jump-target operand to overwrite once resolved.
  pub patch_sites: Vec<u32>,
  pub declared: bool,
}

impl Label {
  pub fn new() -> Self {
    Self::default()
  }

  /// Writes a forward reference to this label at `site` (the byte offset
  /// of a 4-byte jump-target operand already reserved in `buf`): if the
  /// label is already resolved the real target is patched in immediately,
  /// otherwise `site` is queued and patched later by [`Label::declare`].
  /// A reference registered after the label is already declared is
  /// patched immediately.
  pub fn patch_or_defer(&mut self, buf: &mut [u8], site: usize) {
    match self.resolved {
      Some(pc) => buf[site..site + 4].copy_from_slice(&pc.to_le_bytes()),
      None => self.patch_sites.push(site as u32),
    }
  }

  /// Declares this label at `pc`, patching every previously-queued forward
  /// reference.
  pub fn declare(&mut self, buf: &mut [u8], pc: u32) {
    self.resolved = Some(pc);
    self.declared = true;
    for &site in &self.patch_sites {
      buf[site as usize..site as usize + 4].copy_from_slice(&pc.to_le_bytes());
    }
    self.patch_sites.clear();
  }
}

/// What a name in a [`Namespace`] resolves to.
///
/// `LocalCommand`'s `target` is an index into [`CodeGenLabels`] rather than
/// an embedded [`Label`]: the label's byte-buffer patch sites are mutated
/// from code generation while a binding lookup is in progress, and keeping
/// every `Label` in one flat, centrally-owned table (instead of nested
/// inside whichever `Namespace`/`CompileFrame` happens to declare it) means
/// patching a forward reference never needs two simultaneous mutable
/// borrows of the symbol table.
#[derive(Debug, Clone)]
pub enum Binding {
  /// `frame_idx` is the absolute index (into [`CodeGen`]'s frame stack) of
  /// the `CompileFrame` this variable was declared in — not a depth, since
  /// a name can be looked up from a more deeply nested `def` than the one
  /// that declared it. The caller converts this to a runtime [`crate::op::Reg`]
  /// depth via `current_frame_idx - frame_idx`.
  Var { frame_idx: u8, slot: u8 },
  EnumConst { value: f64 },
  /// A locally-defined command: a jump target, plus a placeholder flag set
  /// while only declared (not yet defined).
  LocalCommand { label_id: usize, placeholder: bool },
  NativeCommand { hash: u64 },
  /// A built-in opcode pseudo-command (`pick`, `isnative`, stdlib numeric
  /// / string / list / struct / pickle commands) resolved directly to a
  /// [`crate::op::BuiltinOp`] rather than through a call.
  OpcodeCommand { op: crate::op::BuiltinOp },
  Namespace(usize),
}

/// The flat, centrally-owned label table [`Binding::LocalCommand`] and
/// [`CompileFrame`] labels index into.
#[derive(Debug, Default)]
pub struct CodeGenLabels {
  labels: Vec<Label>,
}

impl CodeGenLabels {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn alloc(&mut self) -> usize {
    self.labels.push(Label::new());
    self.labels.len() - 1
  }

  pub fn get_mut(&mut self, id: usize) -> &mut Label {
    &mut self.labels[id]
  }

  pub fn get(&self, id: usize) -> &Label {
    &self.labels[id]
  }
}

/// A name → binding table, plus the `using` import edges: imports are
/// transitive but guarded against cycles.
#[derive(Debug, Default)]
pub struct Namespace {
  pub name: String,
  /// The lexically enclosing scope (ordinary block/function nesting, not a
  /// `using` import): lookups fall through to it when a name isn't found
  /// locally or via `uses`.
  pub parent: Option<usize>,
  bindings: IndexMap<String, Binding>,
  uses: Vec<usize>,
}

impl Namespace {
  pub fn new(name: impl Into<String>) -> Self {
    Namespace {
      name: name.into(),
      parent: None,
      bindings: IndexMap::new(),
      uses: Vec::new(),
    }
  }

  pub fn child(name: impl Into<String>, parent: usize) -> Self {
    Namespace {
      name: name.into(),
      parent: Some(parent),
      bindings: IndexMap::new(),
      uses: Vec::new(),
    }
  }

  pub fn declare(&mut self, name: &str, binding: Binding) -> Option<&Binding> {
    if self.bindings.contains_key(name) {
      return self.bindings.get(name);
    }
    self.bindings.insert(name.to_string(), binding);
    None
  }

  pub fn get(&self, name: &str) -> Option<&Binding> {
    self.bindings.get(name)
  }

  pub fn get_mut(&mut self, name: &str) -> Option<&mut Binding> {
    self.bindings.get_mut(name)
  }

  pub fn add_use(&mut self, ns: usize) {
    if !self.uses.contains(&ns) {
      self.uses.push(ns);
    }
  }

  pub fn uses(&self) -> &[usize] {
    &self.uses
  }

  pub fn unresolved_placeholders(&self) -> Vec<&str> {
    self
      .bindings
      .iter()
      .filter_map(|(name, b)| match b {
        Binding::LocalCommand { placeholder: true, .. } => Some(name.as_str()),
        _ => None,
      })
      .collect()
  }
}

/// A table of namespaces (one per scope/`namespace` block), addressed by
/// index so `using` edges and nested scopes can reference each other
/// without fighting the borrow checker.
#[derive(Debug, Default)]
pub struct NamespaceTable {
  namespaces: Vec<Namespace>,
}

impl NamespaceTable {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&mut self, ns: Namespace) -> usize {
    self.namespaces.push(ns);
    self.namespaces.len() - 1
  }

  pub fn get(&self, idx: usize) -> &Namespace {
    &self.namespaces[idx]
  }

  pub fn get_mut(&mut self, idx: usize) -> &mut Namespace {
    &mut self.namespaces[idx]
  }

  /// Names of every `def` across every namespace that was declared
  /// (pre-registered by a block's hoisting pass) but never defined.
  pub fn all_unresolved(&self) -> Vec<&str> {
    self.namespaces.iter().flat_map(|ns| ns.unresolved_placeholders()).collect()
  }

  /// Looks up `name` starting at `start`, walking `using` edges
  /// transitively. Carries a visited set so import cycles terminate.
  pub fn resolve(&self, start: usize, name: &str) -> Option<&Binding> {
    let mut visited = vec![false; self.namespaces.len()];
    self.resolve_inner(start, name, &mut visited)
  }

  fn resolve_inner(&self, at: usize, name: &str, visited: &mut [bool]) -> Option<&Binding> {
    if visited[at] {
      return None;
    }
    visited[at] = true;
    let ns = &self.namespaces[at];
    if let Some(b) = ns.get(name) {
      return Some(b);
    }
    for &used in ns.uses() {
      if let Some(b) = self.resolve_inner(used, name, visited) {
        return Some(b);
      }
    }
    None
  }
}

/// One slot's state in a [`CompileFrame`]'s register file: a free-list
/// inside the frame's slot vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
  Var,
  TempInUse,
  TempAvail,
}

/// Per-`def` compile-time state: register allocation and the labels
/// declared directly inside it — popping a frame verifies every label
/// declared in it was actually emitted. `labels` maps a name to an id in
/// the [`CodeGenLabels`] table shared by the whole compile.
#[derive(Debug, Default)]
pub struct CompileFrame {
  slots: Vec<SlotState>,
  pub labels: HashMap<String, usize>,
}

impl CompileFrame {
  pub const MAX_SLOTS: usize = crate::vm::frame::MAX_SLOTS;

  pub fn new() -> Self {
    Self::default()
  }

  /// Allocates a slot bound to a named variable (never reused as a temp).
  pub fn alloc_var(&mut self) -> Result<u8, Error> {
    self.alloc_slot(SlotState::Var)
  }

  /// Allocates a scratch register, reusing a freed temp slot if one is
  /// available.
  pub fn alloc_temp(&mut self) -> Result<u8, Error> {
    if let Some(idx) = self.slots.iter().position(|s| *s == SlotState::TempAvail) {
      self.slots[idx] = SlotState::TempInUse;
      return Ok(idx as u8);
    }
    self.alloc_slot(SlotState::TempInUse)
  }

  fn alloc_slot(&mut self, state: SlotState) -> Result<u8, Error> {
    if self.slots.len() >= Self::MAX_SLOTS {
      return Err(Error::codegen(
        "<codegen>",
        Span { start: 0, end: 0 },
        "function body exceeds 256 registers",
      ));
    }
    self.slots.push(state);
    Ok((self.slots.len() - 1) as u8)
  }

  /// Returns a temp register to the free list. No-op for `Var` slots,
  /// which live for the whole frame.
  pub fn free_temp(&mut self, slot: u8) {
    if let Some(s) = self.slots.get_mut(slot as usize) {
      if *s == SlotState::TempInUse {
        *s = SlotState::TempAvail;
      }
    }
  }

  pub fn num_slots(&self) -> usize {
    self.slots.len()
  }

  /// Returns the label id bound to `name`, allocating a fresh one in
  /// `table` the first time this frame sees the name.
  pub fn label(&mut self, table: &mut CodeGenLabels, name: &str) -> usize {
    *self
      .labels
      .entry(name.to_string())
      .or_insert_with(|| table.alloc())
  }

  pub fn existing_label(&self, name: &str) -> Option<usize> {
    self.labels.get(name).copied()
  }

  /// Every label declared in this frame that was never actually emitted.
  pub fn undeclared_labels(&self, table: &CodeGenLabels) -> Vec<&str> {
    self
      .labels
      .iter()
      .filter(|(_, &id)| !table.get(id).declared)
      .map(|(name, _)| name.as_str())
      .collect()
  }
}

/// A lexical scope: the namespace it declares names into, plus the
/// break/continue targets active at this nesting level.
pub struct Scope {
  pub namespace: usize,
  pub break_label: Option<String>,
  pub continue_label: Option<String>,
}

impl Scope {
  pub fn new(namespace: usize) -> Self {
    Scope {
      namespace,
      break_label: None,
      continue_label: None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn using_resolves_transitively_and_terminates_on_cycle() {
    let mut table = NamespaceTable::new();
    let a = table.push(Namespace::new("a"));
    let b = table.push(Namespace::new("b"));
    table.get_mut(b).declare("thing", Binding::EnumConst { value: 1.0 });
    table.get_mut(a).add_use(b);
    table.get_mut(b).add_use(a); // cycle back to `a`

    assert!(matches!(table.resolve(a, "thing"), Some(Binding::EnumConst { value }) if *value == 1.0));
    assert!(table.resolve(a, "missing").is_none());
  }

  #[test]
  fn frame_reuses_freed_temp_slots() {
    let mut frame = CompileFrame::new();
    let t0 = frame.alloc_temp().unwrap();
    frame.free_temp(t0);
    let t1 = frame.alloc_temp().unwrap();
    assert_eq!(t0, t1);
  }

  #[test]
  fn frame_caps_at_256_slots() {
    let mut frame = CompileFrame::new();
    for _ in 0..256 {
      frame.alloc_var().unwrap();
    }
    assert!(frame.alloc_var().is_err());
  }

  #[test]
  fn undeclared_label_is_reported() {
    let mut table = CodeGenLabels::new();
    let mut frame = CompileFrame::new();
    frame.label(&mut table, "loop_end");
    assert_eq!(frame.undeclared_labels(&table), vec!["loop_end"]);
    let id = frame.existing_label("loop_end").unwrap();
    let mut buf = Vec::new();
    table.get_mut(id).declare(&mut buf, 0);
    assert!(frame.undeclared_labels(&table).is_empty());
  }
}
