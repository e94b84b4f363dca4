//! Growable, mutable list objects.
//!
//! Lists may reference themselves or each other, forming cycles; every
//! traversal (compare, render, pickle) carries a visited-index stack that
//! pushes before descending into an element and pops on return, so cycles
//! terminate.

use crate::value::Value;

/// An integer tag a host registers categories of lists under ("usertype"),
/// paired with an opaque host pointer. The human-readable hint and
/// finalizer registered alongside it are what sweep (`Pool::sweep`)
/// invokes per `Usertype`.
pub type Usertype = u32;

#[derive(Debug, Clone)]
pub struct SinkList {
  items: Vec<Value>,
  user: Option<(Usertype, usize)>,
}

impl SinkList {
  pub fn new() -> Self {
    SinkList {
      items: Vec::new(),
      user: None,
    }
  }

  pub fn with_capacity(cap: usize) -> Self {
    SinkList {
      items: Vec::with_capacity(cap),
      user: None,
    }
  }

  pub fn from_vec(items: Vec<Value>) -> Self {
    SinkList { items, user: None }
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn as_slice(&self) -> &[Value] {
    &self.items
  }

  pub fn as_mut_slice(&mut self) -> &mut [Value] {
    &mut self.items
  }

  pub fn get(&self, i: usize) -> Option<Value> {
    self.items.get(i).copied()
  }

  pub fn push(&mut self, v: Value) {
    self.items.push(v);
  }

  pub fn pop(&mut self) -> Option<Value> {
    self.items.pop()
  }

  pub fn shift(&mut self) -> Option<Value> {
    (!self.items.is_empty()).then(|| self.items.remove(0))
  }

  pub fn unshift(&mut self, v: Value) {
    self.items.insert(0, v);
  }

  pub fn insert(&mut self, i: usize, v: Value) {
    self.items.insert(i.min(self.items.len()), v);
  }

  pub fn remove(&mut self, i: usize) -> Option<Value> {
    (i < self.items.len()).then(|| self.items.remove(i))
  }

  /// `set_at` extends with nils if `i` is past the current end.
  pub fn set_at(&mut self, i: usize, v: Value) {
    if i >= self.items.len() {
      self.items.resize(i + 1, Value::nil());
    }
    self.items[i] = v;
  }

  pub fn truncate(&mut self, len: usize) {
    self.items.truncate(len);
  }

  pub fn clear(&mut self) {
    self.items.clear();
  }

  pub fn reverse(&mut self) {
    self.items.reverse();
  }

  pub fn append(&mut self, other: &[Value]) {
    self.items.extend_from_slice(other);
  }

  pub fn set_user(&mut self, tag: Usertype, ptr: usize) {
    self.user = Some((tag, ptr));
  }

  pub fn user(&self) -> Option<(Usertype, usize)> {
    self.user
  }

  pub fn has_user(&self) -> bool {
    self.user.is_some()
  }
}

impl Default for SinkList {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn set_at_extends_with_nil() {
    let mut l = SinkList::new();
    l.set_at(2, Value::number(9.0));
    assert_eq!(l.len(), 3);
    assert!(l.get(0).unwrap().is_nil());
    assert!(l.get(1).unwrap().is_nil());
    assert_eq!(l.get(2).unwrap().as_number(), Some(9.0));
  }

  #[test]
  fn shift_unshift() {
    let mut l = SinkList::from_vec(vec![Value::number(1.0), Value::number(2.0)]);
    l.unshift(Value::number(0.0));
    assert_eq!(l.len(), 3);
    assert_eq!(l.shift().unwrap().as_number(), Some(0.0));
  }
}
