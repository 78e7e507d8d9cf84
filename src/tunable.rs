//! Operator-tunable numbers, read when a routine starts.

use alloc::{rc::Rc, string::String};
use core::cell::RefCell;

use hashbrown::HashMap;

/// A flat key/value store of numbers shared with the operator console.
///
/// Missing keys read as the supplied default.
pub trait TunableStore {
    fn get_number(&self, key: &str, default: f64) -> f64;
    fn put_number(&mut self, key: &str, value: f64);
}

pub type SharedStore = Rc<RefCell<dyn TunableStore>>;

/// An in-memory [`TunableStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: HashMap<String, f64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedStore {
        Rc::new(RefCell::new(self))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }
}

impl TunableStore for MemoryStore {
    fn get_number(&self, key: &str, default: f64) -> f64 {
        self.values.get(key).copied().unwrap_or(default)
    }

    fn put_number(&mut self, key: &str, value: f64) {
        self.values.insert(String::from(key), value);
    }
}
