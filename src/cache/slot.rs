//! Single-slot TTL cache

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

/// A value together with the moment it was written
#[derive(Debug, Clone)]
struct Stored<T> {
    data: T,
    stored_at: DateTime<Utc>,
}

/// Cache holding at most one value
///
/// `get` only returns the value while `now - stored_at < ttl`. `put` always
/// overwrites the slot and resets its timestamp.
#[derive(Debug)]
pub struct SlotCache<T> {
    ttl: Duration,
    slot: RwLock<Option<Stored<T>>>,
}

impl<T: Clone> SlotCache<T> {
    /// Creates an empty slot whose contents stay fresh for `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: RwLock::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached value if it is still fresh
    pub fn get(&self) -> Option<T> {
        self.get_at(Utc::now())
    }

    /// Returns the cached value if it is fresh at `now`
    pub fn get_at(&self, now: DateTime<Utc>) -> Option<T> {
        let slot = self.slot.read();
        let stored = slot.as_ref()?;
        if now - stored.stored_at < self.ttl {
            Some(stored.data.clone())
        } else {
            None
        }
    }

    /// Replaces the slot contents, stamping them with the current time
    pub fn put(&self, value: T) {
        self.put_at(value, Utc::now());
    }

    /// Replaces the slot contents, stamping them with `now`
    pub fn put_at(&self, value: T, now: DateTime<Utc>) {
        *self.slot.write() = Some(Stored {
            data: value,
            stored_at: now,
        });
    }

    /// When the current value was written, fresh or not
    pub fn stored_at(&self) -> Option<DateTime<Utc>> {
        self.slot.read().as_ref().map(|stored| stored.stored_at)
    }
}
