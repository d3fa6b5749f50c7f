use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;

use super::State;

/// Key used when `global` is called without one.
pub const DEFAULT_GLOBAL_KEY: &str = "__aspc_global__";

/// Keyed registry of shared cells. The same key always yields the same cell
/// while the stored type matches.
#[derive(Default)]
pub struct GlobalRegistry {
    cells: RefCell<HashMap<String, Box<dyn Any>>>,
}

impl GlobalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cell under `key`, creating it with `initial` on first use.
    /// `initial` is ignored when the cell already exists.
    pub fn global<T: 'static>(&self, initial: T, key: Option<&str>) -> State<T> {
        let key = key.unwrap_or(DEFAULT_GLOBAL_KEY);
        let mut cells = self.cells.borrow_mut();
        if let Some(existing) = cells.get(key) {
            if let Some(cell) = existing.downcast_ref::<State<T>>() {
                return cell.clone();
            }
            log::warn!(
                "[aspc] global \"{}\" was registered with a different type; replacing it",
                key
            );
        }
        let cell = State::new(initial);
        cells.insert(key.to_string(), Box::new(cell.clone()));
        cell
    }

    pub fn contains(&self, key: &str) -> bool {
        self.cells.borrow().contains_key(key)
    }

    pub fn remove(&self, key: &str) -> bool {
        self.cells.borrow_mut().remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.cells.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.borrow().is_empty()
    }
}

thread_local! {
    static GLOBALS: GlobalRegistry = GlobalRegistry::new();
}

/// [`GlobalRegistry::global`] on the thread's default registry.
pub fn global<T: 'static>(initial: T, key: Option<&str>) -> State<T> {
    GLOBALS.with(|registry| registry.global(initial, key))
}
