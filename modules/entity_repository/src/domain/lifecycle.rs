//! Scoped ownership of a store session

use super::store::Store;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Owned reference to a store session, released exactly once.
///
/// Release happens on the first call to [`StoreHandle::release`] or when the
/// handle is dropped, whichever comes first. Later calls are no-ops.
pub struct StoreHandle<S: Store> {
    store: Arc<S>,
    released: AtomicBool,
}

impl<S: Store> StoreHandle<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            released: AtomicBool::new(false),
        }
    }

    /// The held session, or `None` once released.
    pub fn get(&self) -> Option<&S> {
        if self.is_released() {
            None
        } else {
            Some(&self.store)
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Forward disposal to the store. Returns `true` on the releasing call.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.store.dispose();
        tracing::debug!("store handle released");
        true
    }
}

impl<S: Store> Drop for StoreHandle<S> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<S: Store> std::fmt::Debug for StoreHandle<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("released", &self.is_released())
            .finish()
    }
}
