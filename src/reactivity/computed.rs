use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::{cleanup, next_id, release_target, track, trigger, ObserverGuard, Subscriber, TargetId, VALUE_FIELD};

struct ComputedInner<T> {
    /// Identity as a target (read by dependents).
    id: TargetId,
    /// Identity as a subscriber (of its own dependencies).
    subscriber: u64,
    getter: Box<dyn Fn() -> T>,
    cache: RefCell<Option<T>>,
    dirty: Cell<bool>,
    dependencies: RefCell<Vec<(TargetId, String)>>,
}

impl<T: 'static> Subscriber for ComputedInner<T> {
    fn subscriber_id(&self) -> u64 {
        self.subscriber
    }

    fn dependencies(&self) -> &RefCell<Vec<(TargetId, String)>> {
        &self.dependencies
    }

    fn notify(self: Rc<Self>) {
        if !self.dirty.replace(true) {
            trigger(self.id, VALUE_FIELD);
        }
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        release_target(self.id);
    }
}

/// A lazily evaluated, memoized derivation.
///
/// The getter runs on the first read and again on the first read after any
/// dependency changed. Becoming dirty notifies the computed's own dependents.
pub struct Computed<T> {
    inner: Rc<ComputedInner<T>>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Computed {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + 'static> Computed<T> {
    pub fn new(getter: impl Fn() -> T + 'static) -> Self {
        Computed {
            inner: Rc::new(ComputedInner {
                id: next_id(),
                subscriber: next_id(),
                getter: Box::new(getter),
                cache: RefCell::new(None),
                dirty: Cell::new(true),
                dependencies: RefCell::new(Vec::new()),
            }),
        }
    }

    fn evaluate(&self) -> T {
        let inner = &self.inner;
        cleanup(inner.as_ref());
        let observer: Rc<dyn Subscriber> = inner.clone();
        let value = {
            let _guard = ObserverGuard::push(Some(observer));
            (inner.getter)()
        };
        *inner.cache.borrow_mut() = Some(value.clone());
        inner.dirty.set(false);
        value
    }

    pub fn get(&self) -> T {
        track(self.inner.id, VALUE_FIELD);
        if !self.inner.dirty.get() {
            if let Some(value) = self.inner.cache.borrow().as_ref() {
                return value.clone();
            }
        }
        self.evaluate()
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }
}

pub fn computed<T: Clone + 'static>(getter: impl Fn() -> T + 'static) -> Computed<T> {
    Computed::new(getter)
}
