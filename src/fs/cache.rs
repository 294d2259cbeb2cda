//! Time-bounded, capacity-bounded cache used for directory listings.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;

struct TtlEntry<V> {
    value: V,
    inserted: Instant,
}

/// An LRU map whose entries also expire after a fixed TTL.
///
/// Expired entries are dropped on access; `set` always replaces the whole
/// value for a key, so readers observe either the old list or the new one.
pub struct TtlCache<K: Hash + Eq, V> {
    entries: LruCache<K, TtlEntry<V>>,
    ttl: Duration,
}

impl<K: Hash + Eq, V> TtlCache<K, V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            ttl,
        }
    }

    pub fn get(&mut self, key: &K) -> Option<&V> {
        let expired = match self.entries.peek(key) {
            Some(entry) => entry.inserted.elapsed() > self.ttl,
            None => return None,
        };
        if expired {
            self.entries.pop(key);
            return None;
        }
        self.entries.get(key).map(|entry| &entry.value)
    }

    pub fn set(&mut self, key: K, value: V) {
        self.entries.put(
            key,
            TtlEntry {
                value,
                inserted: Instant::now(),
            },
        );
    }

    pub fn remove(&mut self, key: &K) {
        self.entries.pop(key);
    }
}
