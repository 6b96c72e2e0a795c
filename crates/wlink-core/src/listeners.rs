//! Callback registry shared by the host abstraction and the event emitter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Handle returned when registering a callback.
pub type ListenerId = u64;

/// Ordered set of callbacks addressable by [`ListenerId`].
///
/// Callbacks are invoked on a snapshot taken outside the lock, so a callback
/// may add or remove listeners while it runs.
pub struct ListenerRegistry<F: ?Sized> {
    next_id: AtomicU64,
    entries: Mutex<Vec<(ListenerId, Arc<F>)>>,
}

impl<F: ?Sized> Default for ListenerRegistry<F> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl<F: ?Sized> std::fmt::Debug for ListenerRegistry<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("len", &self.len())
            .finish()
    }
}

impl<F: ?Sized> ListenerRegistry<F> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(ListenerId, Arc<F>)>> {
        // A panicking callback never runs under this lock, so a poisoned
        // mutex still holds a consistent list.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a callback.
    pub fn add(&self, callback: Arc<F>) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push((id, callback));
        id
    }

    /// Remove a callback. Returns `false` if it was already gone.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    /// Callbacks registered right now, in registration order.
    pub fn snapshot(&self) -> Vec<Arc<F>> {
        self.lock().iter().map(|(_, cb)| Arc::clone(cb)).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    type Callback = dyn Fn(usize) + Send + Sync;

    #[test]
    fn test_add_remove_is_idempotent() {
        let registry: ListenerRegistry<Callback> = ListenerRegistry::new();
        let id = registry.add(Arc::new(|_| {}));
        assert_eq!(registry.len(), 1);
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_ids_are_unique() {
        let registry: ListenerRegistry<Callback> = ListenerRegistry::new();
        let a = registry.add(Arc::new(|_| {}));
        let b = registry.add(Arc::new(|_| {}));
        assert_ne!(a, b);
    }

    #[test]
    fn test_callback_may_remove_itself() {
        let registry: Arc<ListenerRegistry<Callback>> = Arc::new(ListenerRegistry::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let slot = Arc::new(Mutex::new(None::<ListenerId>));
        let (reg, slot_cb, calls_cb) = (registry.clone(), slot.clone(), calls.clone());
        let id = registry.add(Arc::new(move |n| {
            calls_cb.fetch_add(n, Ordering::SeqCst);
            if let Some(id) = slot_cb.lock().unwrap().take() {
                reg.remove(id);
            }
        }));
        *slot.lock().unwrap() = Some(id);

        for cb in registry.snapshot() {
            cb(1);
        }
        for cb in registry.snapshot() {
            cb(1);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }
}
