//! ListenerSet - thread-safe callback registry with snapshot-before-notify
//!
//! Registration and removal may happen from any thread, including from inside
//! a callback. Notification always iterates over a copy taken under the read
//! lock, so no lock is held while user code runs.

use std::sync::Arc;

use parking_lot::RwLock; // 2-3x faster than std::sync::RwLock

/// Ordered set of shared callback handles, compared by identity.
pub struct ListenerSet<T: ?Sized> {
    entries: RwLock<Vec<Arc<T>>>,
}

/// Identity comparison that ignores trait-object vtables.
fn same<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

impl<T: ?Sized> ListenerSet<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Append a listener. Registering the same handle twice notifies it twice.
    pub fn add(&self, listener: Arc<T>) {
        self.entries.write().push(listener);
    }

    /// Append a listener unless this exact handle is already registered.
    ///
    /// Returns `false` when the handle was already present.
    pub fn add_unique(&self, listener: Arc<T>) -> bool {
        let mut entries = self.entries.write();
        if entries.iter().any(|existing| same(existing, &listener)) {
            return false;
        }
        entries.push(listener);
        true
    }

    /// Remove the first registration of this handle. Unknown handles are ignored.
    pub fn remove(&self, listener: &Arc<T>) -> bool {
        let mut entries = self.entries.write();
        match entries.iter().position(|existing| same(existing, listener)) {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, listener: &Arc<T>) -> bool {
        self.entries.read().iter().any(|existing| same(existing, listener))
    }

    /// Copy of the current registrations, in registration order.
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl<T: ?Sized> Default for ListenerSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    trait Callback: Send + Sync {
        fn call(&self, log: &Mutex<Vec<&'static str>>);
    }

    struct Named(&'static str);

    impl Callback for Named {
        fn call(&self, log: &Mutex<Vec<&'static str>>) {
            log.lock().push(self.0);
        }
    }

    #[test]
    fn snapshot_preserves_registration_order() {
        let set: ListenerSet<dyn Callback> = ListenerSet::new();
        set.add(Arc::new(Named("a")));
        set.add(Arc::new(Named("b")));
        set.add(Arc::new(Named("c")));

        let log = Mutex::new(Vec::new());
        for listener in set.snapshot() {
            listener.call(&log);
        }
        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
    }

    #[test]
    fn add_unique_rejects_same_handle() {
        let set: ListenerSet<dyn Callback> = ListenerSet::new();
        let first: Arc<dyn Callback> = Arc::new(Named("a"));

        assert!(set.add_unique(Arc::clone(&first)));
        assert!(!set.add_unique(Arc::clone(&first)));
        // Equal content, different handle
        assert!(set.add_unique(Arc::new(Named("a"))));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn remove_by_identity() {
        let set: ListenerSet<dyn Callback> = ListenerSet::new();
        let a: Arc<dyn Callback> = Arc::new(Named("a"));
        let b: Arc<dyn Callback> = Arc::new(Named("b"));
        set.add(Arc::clone(&a));
        set.add(Arc::clone(&b));

        assert!(set.remove(&a));
        assert!(!set.remove(&a));
        assert!(!set.contains(&a));
        assert!(set.contains(&b));
    }

    #[test]
    fn mutation_during_iteration_does_not_affect_snapshot() {
        let set: ListenerSet<dyn Callback> = ListenerSet::new();
        let a: Arc<dyn Callback> = Arc::new(Named("a"));
        set.add(Arc::clone(&a));
        set.add(Arc::new(Named("b")));

        let log = Mutex::new(Vec::new());
        for listener in set.snapshot() {
            set.remove(&a);
            listener.call(&log);
        }
        assert_eq!(*log.lock(), vec!["a", "b"]);
        assert_eq!(set.len(), 1);
    }
}
