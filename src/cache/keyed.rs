//! Keyed multi-entry TTL cache with bounded size

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

use super::CacheKey;

/// A cached value with its write time and validation token
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    /// The cached data
    pub data: T,
    /// When the data was cached
    pub stored_at: DateTime<Utc>,
    /// ETag computed from `data`
    pub etag: String,
}

impl<T> CacheEntry<T> {
    /// Whether the entry is still valid at `now` for the given TTL
    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now - self.stored_at < ttl
    }

    /// Time left before the entry expires, clamped at zero
    ///
    /// Computed from the elapsed age, so a TTL reaching past the representable
    /// date range does not overflow.
    pub fn remaining(&self, ttl: Duration, now: DateTime<Utc>) -> Duration {
        let age = now - self.stored_at;
        match ttl.checked_sub(&age) {
            Some(left) if left > Duration::zero() => left,
            _ => Duration::zero(),
        }
    }
}

/// Cache holding one entry per `CacheKey`
///
/// Reads treat expired entries as absent without removing them. Size is bounded
/// by `evict_if_over_capacity`, which keeps the most recently stored entries.
#[derive(Debug)]
pub struct KeyedCache<T> {
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<CacheKey, CacheEntry<T>>>,
}

impl<T: Clone> KeyedCache<T> {
    /// Creates an empty cache
    ///
    /// `max_entries` is the bound applied by `insert`.
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Returns the entry for `key` if present and fresh
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry<T>> {
        self.get_at(key, Utc::now())
    }

    /// Returns the entry for `key` if present and fresh at `now`
    pub fn get_at(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<CacheEntry<T>> {
        let entries = self.entries.lock();
        let entry = entries.get(key)?;
        if entry.is_fresh(self.ttl, now) {
            Some(entry.clone())
        } else {
            debug!(key = %key, "cache entry expired");
            None
        }
    }

    /// Inserts or overwrites the entry for `key`, stamped with the current time
    pub fn put(&self, key: CacheKey, data: T, etag: String) -> CacheEntry<T> {
        self.put_at(key, data, etag, Utc::now())
    }

    /// Inserts or overwrites the entry for `key`, stamped with `now`
    pub fn put_at(&self, key: CacheKey, data: T, etag: String, now: DateTime<Utc>) -> CacheEntry<T> {
        let entry = CacheEntry {
            data,
            stored_at: now,
            etag,
        };
        self.entries.lock().insert(key, entry.clone());
        entry
    }

    /// Stores an entry and then enforces the configured size bound
    pub fn insert(&self, key: CacheKey, data: T, etag: String) -> CacheEntry<T> {
        let entry = self.put(key, data, etag);
        self.evict_if_over_capacity(self.max_entries);
        entry
    }

    /// Drops the oldest entries until at most `max` remain
    ///
    /// Entries are ordered by `stored_at`, newest first, and everything past the
    /// first `max` is removed regardless of freshness. Returns the number removed.
    pub fn evict_if_over_capacity(&self, max: usize) -> usize {
        let mut entries = self.entries.lock();
        if entries.len() <= max {
            return 0;
        }

        let mut by_age: Vec<(CacheKey, DateTime<Utc>)> = entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.stored_at))
            .collect();
        by_age.sort_by(|a, b| b.1.cmp(&a.1));

        let evicted = by_age.len() - max;
        for (key, _) in by_age.into_iter().skip(max) {
            entries.remove(&key);
        }
        debug!(evicted, remaining = entries.len(), "evicted cache entries");
        evicted
    }

    /// Number of stored entries, including expired ones not yet evicted
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Whether an entry exists for `key`, fresh or not
    pub fn contains_key(&self, key: &CacheKey) -> bool {
        self.entries.lock().contains_key(key)
    }
}
