//! Synchronous subscriber lists
//!
//! Observers run on the notifying thread, in subscription order, and must
//! not block.

use parking_lot::RwLock;
use std::sync::Arc;

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// A list of callbacks for events of type `E`
pub struct Observers<E> {
    callbacks: RwLock<Vec<Callback<E>>>,
}

impl<E> Observers<E> {
    pub fn new() -> Self {
        Self {
            callbacks: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.callbacks.write().push(Arc::new(callback));
    }

    pub fn notify(&self, event: &E) {
        // Snapshot first so a callback may subscribe without deadlocking
        let callbacks: Vec<Callback<E>> = self.callbacks.read().clone();
        for callback in callbacks {
            callback(event);
        }
    }

    pub fn len(&self) -> usize {
        self.callbacks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E> Default for Observers<E> {
    fn default() -> Self {
        Self::new()
    }
}
