//! In-process cache stores for normalized upstream responses
//!
//! Two stores are provided. `SlotCache` holds exactly one value and is used where
//! the caller-visible query space has a single member (the latest telemetry
//! reading). `KeyedCache` holds one entry per `CacheKey`, tags each entry with an
//! ETag and keeps its size bounded by evicting the oldest entries first.
//!
//! Freshness is always computed from the entry's `stored_at` timestamp and the
//! store's TTL at read time; nothing is removed proactively when it expires.

mod key;
mod keyed;
mod slot;

pub use key::{canonical_json, digest_etag, CacheKey};
pub use keyed::{CacheEntry, KeyedCache};
pub use slot::SlotCache;
