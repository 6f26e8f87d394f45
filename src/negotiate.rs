//! Conditional response negotiation
//!
//! Decides between "not modified", a full cached body, or a cache miss by
//! comparing the caller's validation token with a cache entry's ETag. Pure: no
//! I/O and no cache mutation.

use chrono::{DateTime, Duration, Utc};

use crate::cache::CacheEntry;

/// Outcome of negotiating a request against a cache entry
#[derive(Debug, PartialEq)]
pub enum Negotiation<'a, T> {
    /// Caller already holds the current version
    NotModified { etag: &'a str, max_age: Duration },
    /// Serve the cached body
    Full {
        body: &'a T,
        etag: &'a str,
        max_age: Duration,
    },
    /// No fresh entry; the caller must fetch
    Miss,
}

/// Negotiates a request against an optional cache entry
///
/// `max_age` in the result is the entry's remaining lifetime, used as the
/// freshness directive sent back to the caller.
pub fn negotiate<'a, T>(
    client_etag: Option<&str>,
    entry: Option<&'a CacheEntry<T>>,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Negotiation<'a, T> {
    let entry = match entry {
        Some(entry) if entry.is_fresh(ttl, now) => entry,
        _ => return Negotiation::Miss,
    };
    let max_age = entry.remaining(ttl, now);

    match client_etag {
        Some(tag) if etag_matches(tag, &entry.etag) => Negotiation::NotModified {
            etag: &entry.etag,
            max_age,
        },
        _ => Negotiation::Full {
            body: &entry.data,
            etag: &entry.etag,
            max_age,
        },
    }
}

/// Compares an `If-None-Match` value against a stored ETag
///
/// Accepts quoted or bare tags, weak (`W/`) prefixes, comma-separated lists and
/// the `*` wildcard.
pub fn etag_matches(header: &str, etag: &str) -> bool {
    header.split(',').map(str::trim).any(|candidate| {
        candidate == "*" || {
            let candidate = candidate.strip_prefix("W/").unwrap_or(candidate);
            candidate.trim_matches('"') == etag
        }
    })
}

/// Wraps a bare ETag in quotes for use as a header value
pub fn quote_etag(etag: &str) -> String {
    format!("\"{}\"", etag)
}
