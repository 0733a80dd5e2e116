//! Open-ended typed configuration attached to loaders and requests.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A bag of typed values keyed by name.
///
/// Values are stored behind `Arc` so cloning the bag is cheap; lookups downcast
/// to the requested type and return `None` on a type mismatch.
#[derive(Clone, Default)]
pub struct Extras {
    values: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl Extras {
    /// Creates an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, replacing any previous value under `key`.
    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Arc::new(value));
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use]
    pub fn with<T: Any + Send + Sync>(mut self, key: impl Into<String>, value: T) -> Self {
        self.insert(key, value);
        self
    }

    /// Returns the value under `key` if present and of type `T`.
    #[must_use]
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    /// Returns true if a value exists under `key`, whatever its type.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the bag is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns a bag with `self`'s entries layered over `base`'s.
    #[must_use]
    pub fn merged_over(&self, base: &Self) -> Self {
        if self.is_empty() {
            return base.clone();
        }
        let mut values = base.values.clone();
        values.extend(self.values.iter().map(|(k, v)| (k.clone(), Arc::clone(v))));
        Self { values }
    }
}

impl fmt::Debug for Extras {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.values.keys().collect();
        keys.sort();
        f.debug_struct("Extras").field("keys", &keys).finish()
    }
}
