//! Observer registry shared by a session and its workers

use std::sync::{Arc, Mutex};

/// Registered progress callback
pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Ordered list of listeners with synchronous delivery.
///
/// The listener list is snapshotted under the lock and invoked outside it,
/// so a listener may subscribe further listeners without deadlocking. Those
/// only see events published after their registration.
pub struct ProgressBus<E> {
    listeners: Mutex<Vec<Listener<E>>>,
}

impl<E> ProgressBus<E> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Append a listener; it is called after every listener registered before it
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.lock().push(Arc::new(listener));
    }

    /// Deliver an event to every currently registered listener, in registration order
    pub fn publish(&self, event: &E) {
        for listener in self.snapshot() {
            listener(event);
        }
    }

    /// Deliver a terminal event, then drop every listener that received it
    pub fn publish_final(&self, event: &E) {
        let listeners = std::mem::take(&mut *self.lock());
        for listener in listeners {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn snapshot(&self) -> Vec<Listener<E>> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Listener<E>>> {
        // A listener panicking on another thread must not wedge the bus
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<E> Default for ProgressBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for ProgressBus<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
