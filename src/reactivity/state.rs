use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::{next_id, release_target, track, trigger, TargetId, VALUE_FIELD};

struct StateInner<T> {
    id: TargetId,
    value: RefCell<T>,
}

impl<T> Drop for StateInner<T> {
    fn drop(&mut self) {
        release_target(self.id);
    }
}

/// A reactive cell holding one value.
///
/// Clones share the cell.
pub struct State<T> {
    inner: Rc<StateInner<T>>,
}

impl<T> Clone for State<T> {
    fn clone(&self) -> Self {
        State {
            inner: self.inner.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for State<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("id", &self.inner.id)
            .field("value", &self.inner.value.borrow())
            .finish()
    }
}

impl<T> State<T> {
    pub fn new(initial: T) -> Self {
        State {
            inner: Rc::new(StateInner {
                id: next_id(),
                value: RefCell::new(initial),
            }),
        }
    }

    /// Reads the value through `f`, registering the current observer.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        track(self.inner.id, VALUE_FIELD);
        f(&self.inner.value.borrow())
    }

    /// Mutates in place and always notifies.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.inner.value.borrow_mut());
        trigger(self.inner.id, VALUE_FIELD);
    }

    /// True when both handles refer to the same cell.
    pub fn ptr_eq(&self, other: &State<T>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn target_id(&self) -> TargetId {
        self.inner.id
    }
}

impl<T: Clone> State<T> {
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    pub fn get_untracked(&self) -> T {
        self.inner.value.borrow().clone()
    }
}

impl<T: PartialEq> State<T> {
    /// Stores `value`; writing an equal value is a no-op.
    pub fn set(&self, value: T) {
        let changed = {
            let mut current = self.inner.value.borrow_mut();
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        };
        if changed {
            trigger(self.inner.id, VALUE_FIELD);
        }
    }
}

pub fn state<T>(initial: T) -> State<T> {
    State::new(initial)
}
