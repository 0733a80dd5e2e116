//! Resources that are created on first use.

use parking_lot::Mutex;

type Factory<T> = Box<dyn FnOnce() -> T + Send>;

enum Slot<T> {
    Pending(Factory<T>),
    Ready(T),
    Released,
}

/// A value produced by a factory that runs at most once, on first access.
pub(crate) struct Lazy<T> {
    slot: Mutex<Slot<T>>,
}

impl<T: Clone + Default> Lazy<T> {
    pub(crate) fn ready(value: T) -> Self {
        Self {
            slot: Mutex::new(Slot::Ready(value)),
        }
    }

    pub(crate) fn deferred(factory: impl FnOnce() -> T + Send + 'static) -> Self {
        Self {
            slot: Mutex::new(Slot::Pending(Box::new(factory))),
        }
    }

    /// Returns the value, running the factory if needed. Released slots yield
    /// the default value.
    pub(crate) fn get(&self) -> T {
        let mut slot = self.slot.lock();
        if matches!(*slot, Slot::Pending(_))
            && let Slot::Pending(factory) = std::mem::replace(&mut *slot, Slot::Released)
        {
            *slot = Slot::Ready(factory());
        }
        match &*slot {
            Slot::Ready(value) => value.clone(),
            Slot::Pending(_) | Slot::Released => T::default(),
        }
    }

    /// Returns the value only if it was already created.
    pub(crate) fn peek(&self) -> Option<T> {
        match &*self.slot.lock() {
            Slot::Ready(value) => Some(value.clone()),
            Slot::Pending(_) | Slot::Released => None,
        }
    }

    /// Drops the value, or the factory if it never ran.
    pub(crate) fn release(&self) -> Option<T> {
        match std::mem::replace(&mut *self.slot.lock(), Slot::Released) {
            Slot::Ready(value) => Some(value),
            Slot::Pending(_) | Slot::Released => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_factory_runs_once_on_first_use() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let lazy = Lazy::deferred(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Some(42)
        });

        assert_eq!(lazy.peek(), None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(lazy.get(), Some(42));
        assert_eq!(lazy.get(), Some(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_drops_value() {
        let lazy = Lazy::ready(Some("client"));
        assert_eq!(lazy.release(), Some(Some("client")));
        assert_eq!(lazy.get(), None);
    }
}
