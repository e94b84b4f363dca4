//! The "wait object": the unit of asynchrony a host I/O call can return.
//!
//! A [`Wait<T>`] has two terminal transitions, "result provided" and
//! "then-handler attached", which may happen in either order but must both
//! happen exactly once before the handler fires.

use std::cell::RefCell;
use std::rc::Rc;

struct Inner<T> {
  result: Option<T>,
  handler: Option<Box<dyn FnOnce(T)>>,
  cancelled: bool,
}

/// A handle a host keeps to fulfill a [`Wait`] once its async I/O
/// completes — e.g. after a line of input arrives, or a timer fires.
/// Cloning shares the same underlying cell, so either side (host or VM) can
/// be the one to observe the other already happened.
pub struct PendingWait<T>(Rc<RefCell<Inner<T>>>);

impl<T> Clone for PendingWait<T> {
  fn clone(&self) -> Self {
    PendingWait(self.0.clone())
  }
}

impl<T> PendingWait<T> {
  pub fn new() -> Self {
    PendingWait(Rc::new(RefCell::new(Inner {
      result: None,
      handler: None,
      cancelled: false,
    })))
  }

  /// Provides the result. If a handler is already attached, it fires
  /// immediately; otherwise the result is stashed for [`Wait::then`].
  /// A no-op if the wait was cancelled.
  pub fn fulfill(&self, value: T) {
    let handler = {
      let mut inner = self.0.borrow_mut();
      if inner.cancelled {
        return;
      }
      match inner.handler.take() {
        Some(h) => Some(h),
        None => {
          inner.result = Some(value);
          return;
        }
      }
    };
    if let Some(h) = handler {
      h(value);
    }
  }

  /// A host may cancel a wait before fulfillment; the attached handler, if
  /// any, is dropped without firing.
  pub fn cancel(&self) {
    let mut inner = self.0.borrow_mut();
    inner.cancelled = true;
    inner.handler = None;
  }

  fn then(&self, handler: impl FnOnce(T) + 'static) {
    let value = {
      let mut inner = self.0.borrow_mut();
      if inner.cancelled {
        return;
      }
      match inner.result.take() {
        Some(v) => Some(v),
        None => {
          inner.handler = Some(Box::new(handler));
          None
        }
      }
    };
    if let Some(v) = value {
      handler(v);
    }
  }
}

impl<T> Default for PendingWait<T> {
  fn default() -> Self {
    Self::new()
  }
}

/// Either an already-available result, or a [`PendingWait`] the caller must
/// attach a continuation to.
pub enum Wait<T> {
  Ready(T),
  Pending(PendingWait<T>),
}

impl<T> Wait<T> {
  pub fn is_pending(&self) -> bool {
    matches!(self, Wait::Pending(_))
  }

  /// Attaches `handler`, consuming the wait. Fires synchronously if the
  /// result is already available.
  pub fn then(self, handler: impl FnOnce(T) + 'static) {
    match self {
      Wait::Ready(v) => handler(v),
      Wait::Pending(p) => p.then(handler),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::cell::RefCell;
  use std::rc::Rc;

  use super::*;

  #[test]
  fn ready_fires_immediately() {
    let seen = Rc::new(RefCell::new(None));
    let seen2 = seen.clone();
    Wait::Ready(42).then(move |v| *seen2.borrow_mut() = Some(v));
    assert_eq!(*seen.borrow(), Some(42));
  }

  #[test]
  fn fulfill_then_attach() {
    let pending = PendingWait::new();
    pending.fulfill("hi");
    let seen = Rc::new(RefCell::new(None));
    let seen2 = seen.clone();
    Wait::Pending(pending).then(move |v| *seen2.borrow_mut() = Some(v));
    assert_eq!(*seen.borrow(), Some("hi"));
  }

  #[test]
  fn attach_then_fulfill() {
    let pending = PendingWait::new();
    let seen = Rc::new(RefCell::new(None));
    let seen2 = seen.clone();
    Wait::Pending(pending.clone()).then(move |v| *seen2.borrow_mut() = Some(v));
    assert!(seen.borrow().is_none());
    pending.fulfill(7);
    assert_eq!(*seen.borrow(), Some(7));
  }

  #[test]
  fn cancel_suppresses_handler() {
    let pending = PendingWait::new();
    let seen = Rc::new(RefCell::new(false));
    let seen2 = seen.clone();
    Wait::Pending(pending.clone()).then(move |_: i32| *seen2.borrow_mut() = true);
    pending.cancel();
    pending.fulfill(1);
    assert!(!*seen.borrow());
  }
}
