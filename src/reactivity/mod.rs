//! Fine-grained reactivity runtime.
//!
//! Cells ([`State`], [`Computed`], [`Store`] fields) are *targets*; effects
//! and computeds are *subscribers*. Reading a target while a subscriber is
//! running records a weak edge from `(target, field)` to that subscriber;
//! writing the target re-runs the subscribers recorded for that field, in
//! registration order. Edges are rebuilt on every run.
//!
//! The runtime is single-threaded: all bookkeeping lives in a thread-local
//! and the handle types are `!Send`.

mod computed;
mod effect;
mod global;
mod state;
mod store;

pub use computed::{computed, Computed};
pub use effect::{effect, Effect};
pub use global::{global, GlobalRegistry, DEFAULT_GLOBAL_KEY};
pub use state::{state, State};
pub use store::Store;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

/// Identity of a tracked target.
pub(crate) type TargetId = u64;

/// The single field of a [`State`] or [`Computed`].
pub(crate) const VALUE_FIELD: &str = "value";

pub(crate) trait Subscriber {
    fn subscriber_id(&self) -> u64;

    /// Edges recorded during the current run, for cleanup.
    fn dependencies(&self) -> &RefCell<Vec<(TargetId, String)>>;

    fn is_active(&self) -> bool {
        true
    }

    fn notify(self: Rc<Self>);
}

type Edges = Vec<(u64, Weak<dyn Subscriber>)>;

#[derive(Default)]
struct Runtime {
    /// `None` entries come from `untrack`.
    observers: RefCell<Vec<Option<Rc<dyn Subscriber>>>>,
    targets: RefCell<HashMap<TargetId, HashMap<String, Edges>>>,
    next_id: Cell<u64>,
}

thread_local! {
    static RUNTIME: Runtime = Runtime::default();
}

pub(crate) fn next_id() -> u64 {
    RUNTIME.with(|rt| {
        let id = rt.next_id.get() + 1;
        rt.next_id.set(id);
        id
    })
}

/// Pops the observer stack when dropped, so a panicking getter cannot leave
/// a stale observer behind.
pub(crate) struct ObserverGuard {
    _private: (),
}

impl ObserverGuard {
    pub(crate) fn push(observer: Option<Rc<dyn Subscriber>>) -> Self {
        RUNTIME.with(|rt| rt.observers.borrow_mut().push(observer));
        ObserverGuard { _private: () }
    }
}

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        let _ = RUNTIME.try_with(|rt| rt.observers.borrow_mut().pop());
    }
}

/// Records a read of `(target, field)` by the current observer, if any.
pub(crate) fn track(target: TargetId, field: &str) {
    RUNTIME.with(|rt| {
        let observer = match rt.observers.borrow().last() {
            Some(Some(observer)) => observer.clone(),
            _ => return,
        };
        let id = observer.subscriber_id();
        let mut targets = rt.targets.borrow_mut();
        let edges = targets
            .entry(target)
            .or_default()
            .entry(field.to_string())
            .or_default();
        if edges.iter().any(|(existing, _)| *existing == id) {
            return;
        }
        edges.push((id, Rc::downgrade(&observer)));
        observer
            .dependencies()
            .borrow_mut()
            .push((target, field.to_string()));
    });
}

/// Re-runs every live subscriber of `(target, field)`. The subscriber list is
/// snapshotted first, so subscribers that re-register while running are not
/// visited twice.
pub(crate) fn trigger(target: TargetId, field: &str) {
    let snapshot: Vec<Rc<dyn Subscriber>> = RUNTIME.with(|rt| {
        let mut targets = rt.targets.borrow_mut();
        let Some(edges) = targets.get_mut(&target).and_then(|f| f.get_mut(field)) else {
            return Vec::new();
        };
        edges.retain(|(_, weak)| weak.strong_count() > 0);
        edges.iter().filter_map(|(_, weak)| weak.upgrade()).collect()
    });
    for subscriber in snapshot {
        if subscriber.is_active() {
            subscriber.notify();
        }
    }
}

/// Removes every edge recorded for `subscriber`.
pub(crate) fn cleanup(subscriber: &dyn Subscriber) {
    let id = subscriber.subscriber_id();
    let dependencies: Vec<(TargetId, String)> = subscriber.dependencies().borrow_mut().drain(..).collect();
    if dependencies.is_empty() {
        return;
    }
    let _ = RUNTIME.try_with(|rt| {
        let mut targets = rt.targets.borrow_mut();
        for (target, field) in dependencies {
            if let Some(edges) = targets.get_mut(&target).and_then(|f| f.get_mut(&field)) {
                edges.retain(|(existing, _)| *existing != id);
            }
        }
    });
}

/// Forgets a dropped target.
pub(crate) fn release_target(target: TargetId) {
    let _ = RUNTIME.try_with(|rt| rt.targets.borrow_mut().remove(&target));
}

/// Runs `f` without recording any dependency.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    let _guard = ObserverGuard::push(None);
    f()
}

#[cfg(test)]
pub(crate) fn edge_count(target: TargetId, field: &str) -> usize {
    RUNTIME.with(|rt| {
        rt.targets
            .borrow()
            .get(&target)
            .and_then(|f| f.get(field))
            .map(|edges| edges.iter().filter(|(_, w)| w.strong_count() > 0).count())
            .unwrap_or(0)
    })
}

#[cfg(test)]
pub(crate) fn observer_depth() -> usize {
    RUNTIME.with(|rt| rt.observers.borrow().len())
}
