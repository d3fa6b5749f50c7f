use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::{cleanup, next_id, ObserverGuard, Subscriber, TargetId};

struct EffectInner {
    id: u64,
    f: Box<dyn Fn()>,
    dependencies: RefCell<Vec<(TargetId, String)>>,
    active: Cell<bool>,
}

impl EffectInner {
    fn run(self: &Rc<Self>) {
        if !self.active.get() {
            return;
        }
        cleanup(self.as_ref());
        let observer: Rc<dyn Subscriber> = self.clone();
        let _guard = ObserverGuard::push(Some(observer));
        (self.f)();
    }
}

impl Subscriber for EffectInner {
    fn subscriber_id(&self) -> u64 {
        self.id
    }

    fn dependencies(&self) -> &RefCell<Vec<(TargetId, String)>> {
        &self.dependencies
    }

    fn is_active(&self) -> bool {
        self.active.get()
    }

    fn notify(self: Rc<Self>) {
        self.run();
    }
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        cleanup(self);
    }
}

/// A side effect that re-runs whenever a cell it read changes.
///
/// The effect stays subscribed for as long as a handle to it is alive, or for
/// the rest of the thread after [`Effect::detach`].
pub struct Effect {
    inner: Rc<EffectInner>,
}

thread_local! {
    static DETACHED: RefCell<Vec<Rc<EffectInner>>> = const { RefCell::new(Vec::new()) };
}

impl Effect {
    /// Registers `f` and runs it once immediately.
    pub fn new(f: impl Fn() + 'static) -> Self {
        let inner = Rc::new(EffectInner {
            id: next_id(),
            f: Box::new(f),
            dependencies: RefCell::new(Vec::new()),
            active: Cell::new(true),
        });
        inner.run();
        Effect { inner }
    }

    /// Unsubscribes from every dependency. A stopped effect never runs again.
    pub fn stop(&self) {
        if self.inner.active.replace(false) {
            cleanup(self.inner.as_ref());
        }
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    /// Keeps the effect alive until the thread exits.
    pub fn detach(self) {
        let _ = DETACHED.try_with(|detached| detached.borrow_mut().push(self.inner.clone()));
    }

    #[cfg(test)]
    pub(crate) fn dependency_count(&self) -> usize {
        self.inner.dependencies.borrow().len()
    }
}

pub fn effect(f: impl Fn() + 'static) -> Effect {
    Effect::new(f)
}
