//! TTL read cache.
//!
//! Maps a logical key to the decoded JSON last read for it. A fetch takes a
//! [`FillTicket`] before going to the backend and may only populate the
//! cache if no write invalidated the key in the meantime. Without that, a
//! slow read that started before a write could re-insert the old value
//! after the write finished.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Permission to populate one key, valid until the key is invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillTicket(u64);

/// Invalidation marks kept before they are folded into the floor.
const MAX_TRACKED_INVALIDATIONS: usize = 1024;

/// Entry count at which a fill also evicts expired entries.
const PURGE_THRESHOLD: usize = 256;

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    /// Epoch of each key's latest invalidation.
    invalidated: HashMap<String, u64>,
    epoch: u64,
    /// Tickets older than this are void for every key.
    floor: u64,
}

impl Inner {
    fn mark(&mut self, key: &str) {
        self.epoch += 1;
        let epoch = self.epoch;
        self.invalidated.insert(key.to_string(), epoch);
        if self.invalidated.len() > MAX_TRACKED_INVALIDATIONS {
            self.invalidated.clear();
            self.floor = epoch;
        }
    }

    fn is_void(&self, key: &str, ticket: FillTicket) -> bool {
        ticket.0 < self.floor || self.invalidated.get(key).is_some_and(|&at| at > ticket.0)
    }
}

/// A key → value cache whose entries expire after a fixed time-to-live.
#[derive(Debug)]
pub struct TtlCache {
    ttl: Duration,
    inner: Mutex<Inner>,
}

impl TtlCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Returns the live value for `key`, dropping it if it has expired.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut inner = self.inner.lock();
        match inner.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                inner.entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Takes a ticket for a fetch of `key` that is about to start.
    pub fn ticket(&self, _key: &str) -> FillTicket {
        FillTicket(self.inner.lock().epoch)
    }

    /// Stores `value` if `key` was not invalidated since `ticket` was taken.
    ///
    /// Returns whether the value was stored.
    pub fn fill(&self, key: &str, value: Value, ticket: FillTicket) -> bool {
        let mut inner = self.inner.lock();
        if inner.is_void(key, ticket) {
            return false;
        }
        let now = Instant::now();
        if inner.entries.len() >= PURGE_THRESHOLD {
            inner.entries.retain(|_, entry| entry.expires_at > now);
        }
        inner.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + self.ttl,
            },
        );
        true
    }

    /// Stores `value` unconditionally.
    pub fn insert(&self, key: &str, value: Value) {
        let ticket = self.ticket(key);
        self.fill(key, value, ticket);
    }

    /// Drops `key` and voids every outstanding ticket for it.
    pub fn invalidate(&self, key: &str) {
        let mut inner = self.inner.lock();
        inner.entries.remove(key);
        inner.mark(key);
    }

    /// Drops every entry and voids every outstanding ticket.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.invalidated.clear();
        inner.epoch += 1;
        inner.floor = inner.epoch;
    }

    /// Number of entries, including any not yet evicted after expiring.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn tracked_invalidations(&self) -> usize {
        self.inner.lock().invalidated.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = TtlCache::new(Duration::from_secs(30));
        cache.insert("decks", json!([{ "id": "d1" }]));
        assert_eq!(cache.get("decks"), Some(json!([{ "id": "d1" }])));

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(cache.get("decks").is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("decks"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn invalidate_voids_outstanding_tickets() {
        let cache = TtlCache::new(Duration::from_secs(30));
        let ticket = cache.ticket("user");
        cache.invalidate("user");
        assert!(!cache.fill("user", json!({ "id": "stale" }), ticket));
        assert_eq!(cache.get("user"), None);

        let ticket = cache.ticket("user");
        assert!(cache.fill("user", json!({ "id": "fresh" }), ticket));
        assert_eq!(cache.get("user"), Some(json!({ "id": "fresh" })));
    }

    #[tokio::test]
    async fn tickets_are_per_key() {
        let cache = TtlCache::new(Duration::from_secs(30));
        let ticket = cache.ticket("themes");
        cache.invalidate("decks");
        assert!(cache.fill("themes", json!([]), ticket));
    }

    #[tokio::test]
    async fn clear_drops_everything() {
        let cache = TtlCache::new(Duration::from_secs(30));
        cache.insert("a", json!(1));
        cache.insert("b", json!(2));
        let ticket = cache.ticket("a");
        cache.clear();
        assert!(cache.is_empty());
        assert!(!cache.fill("a", json!(1), ticket));
    }

    #[tokio::test]
    async fn invalidation_marks_stay_bounded() {
        let cache = TtlCache::new(Duration::from_secs(30));
        let stale = cache.ticket("k0");
        for i in 0..5000 {
            cache.invalidate(&format!("k{i}"));
        }
        assert!(cache.tracked_invalidations() <= MAX_TRACKED_INVALIDATIONS);
        // Folding marks into the floor must not revive old tickets.
        assert!(!cache.fill("k0", json!(0), stale));
        let fresh = cache.ticket("k0");
        assert!(cache.fill("k0", json!(1), fresh));
    }

    #[tokio::test(start_paused = true)]
    async fn fills_evict_expired_entries() {
        let cache = TtlCache::new(Duration::from_secs(1));
        for i in 0..PURGE_THRESHOLD {
            cache.insert(&format!("k{i}"), json!(i));
        }
        tokio::time::advance(Duration::from_secs(2)).await;
        cache.insert("fresh", json!(true));
        assert_eq!(cache.len(), 1);
    }
}
