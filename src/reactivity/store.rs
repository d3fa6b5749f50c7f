use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use super::{next_id, release_target, track, trigger, TargetId};

struct StoreInner<V> {
    id: TargetId,
    fields: RefCell<BTreeMap<String, V>>,
}

impl<V> Drop for StoreInner<V> {
    fn drop(&mut self) {
        release_target(self.id);
    }
}

/// A reactive record: each field is tracked on its own, so an effect that
/// reads `a` is not re-run when `b` changes.
pub struct Store<V> {
    inner: Rc<StoreInner<V>>,
}

impl<V> Clone for Store<V> {
    fn clone(&self) -> Self {
        Store {
            inner: self.inner.clone(),
        }
    }
}

impl<V> Default for Store<V> {
    fn default() -> Self {
        Store::new()
    }
}

impl<V> Store<V> {
    pub fn new() -> Self {
        Store {
            inner: Rc::new(StoreInner {
                id: next_id(),
                fields: RefCell::new(BTreeMap::new()),
            }),
        }
    }

    pub fn from_fields(fields: impl IntoIterator<Item = (String, V)>) -> Self {
        let store = Store::new();
        store.inner.fields.borrow_mut().extend(fields);
        store
    }

    /// Tracked presence check. Reading a missing field still subscribes, so
    /// adding it later notifies.
    pub fn contains(&self, field: &str) -> bool {
        track(self.inner.id, field);
        self.inner.fields.borrow().contains_key(field)
    }

    pub fn update(&self, field: &str, f: impl FnOnce(Option<&mut V>)) {
        f(self.inner.fields.borrow_mut().get_mut(field));
        trigger(self.inner.id, field);
    }

    pub fn remove(&self, field: &str) -> Option<V> {
        let removed = self.inner.fields.borrow_mut().remove(field);
        if removed.is_some() {
            trigger(self.inner.id, field);
        }
        removed
    }

    /// Untracked snapshot of the field names.
    pub fn keys(&self) -> Vec<String> {
        self.inner.fields.borrow().keys().cloned().collect()
    }
}

impl<V: Clone> Store<V> {
    pub fn get(&self, field: &str) -> Option<V> {
        track(self.inner.id, field);
        self.inner.fields.borrow().get(field).cloned()
    }
}

impl<V: PartialEq> Store<V> {
    /// Writes one field; an equal value is a no-op.
    pub fn set(&self, field: &str, value: V) {
        let changed = {
            let mut fields = self.inner.fields.borrow_mut();
            match fields.get(field) {
                Some(current) if *current == value => false,
                _ => {
                    fields.insert(field.to_string(), value);
                    true
                }
            }
        };
        if changed {
            trigger(self.inner.id, field);
        }
    }
}
