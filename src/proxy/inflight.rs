//! Registry of in-progress upstream fetches
//!
//! Concurrent cache misses for the same key share one fetch: the first caller
//! registers a shared future and later callers await a clone of it. The fetch
//! holds a `FinishGuard`, which drops the registration however the fetch ends.

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::cache::CacheKey;

type SharedFetch<T> = Shared<BoxFuture<'static, T>>;

/// Shared futures keyed by cache key
pub struct InFlight<T: Clone> {
    pending: Mutex<HashMap<CacheKey, SharedFetch<T>>>,
}

impl<T: Clone> Default for InFlight<T> {
    fn default() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> InFlight<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the fetch already running for `key`, or starts one with `start`
    ///
    /// `start` runs under the registry lock, so it must not call back into this
    /// registry synchronously. A registration whose future already resolved is
    /// stale and gets replaced.
    pub fn join_or_start<F>(&self, key: &CacheKey, start: F) -> SharedFetch<T>
    where
        F: FnOnce() -> BoxFuture<'static, T>,
    {
        let mut pending = self.pending.lock();
        if let Some(existing) = pending.get(key) {
            if existing.peek().is_none() {
                debug!(key = %key, "joining in-flight fetch");
                return existing.clone();
            }
            debug!(key = %key, "replacing settled fetch");
        }
        let fetch = start().shared();
        pending.insert(key.clone(), fetch.clone());
        fetch
    }

    /// Removes the registration for `key`
    pub fn finish(&self, key: &CacheKey) {
        self.pending.lock().remove(key);
    }

    /// A guard that calls `finish(key)` when dropped
    pub fn guard(self: &Arc<Self>, key: CacheKey) -> FinishGuard<T> {
        FinishGuard {
            registry: Arc::clone(self),
            key,
        }
    }

    /// Number of fetches currently registered
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

/// Releases an in-flight registration on drop, including on panic or abort
pub struct FinishGuard<T: Clone + Send + Sync + 'static> {
    registry: Arc<InFlight<T>>,
    key: CacheKey,
}

impl<T: Clone + Send + Sync + 'static> Drop for FinishGuard<T> {
    fn drop(&mut self) {
        self.registry.finish(&self.key);
    }
}
