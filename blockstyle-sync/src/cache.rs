//! TTL caches.
//!
//! Entries carry the instant they were written; an entry older than its TTL
//! is never served, whether or not it has been purged yet. Timestamps use
//! `tokio::time::Instant` so that paused test clocks apply.
//!
//! Values are cloned out under a read lock. Entities are stored behind
//! `Arc`, so a read is an immutable snapshot that later writes cannot tear.

use crate::{read, write};
use blockstyle_model::Entity;
use blockstyle_types::EntityId;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    written_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.written_at) < self.ttl
    }
}

/// A map whose entries expire after a per-entry TTL.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    ttl: Duration,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    /// Creates a cache with a default TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// The default TTL.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the value if it is still fresh.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        read(&self.entries)
            .get(key)
            .filter(|e| e.is_fresh(now))
            .map(|e| e.value.clone())
    }

    /// Stores a value with the default TTL.
    pub fn insert(&self, key: K, value: V) {
        self.insert_with_ttl(key, value, self.ttl);
    }

    /// Stores a value with its own TTL.
    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Duration) {
        write(&self.entries).insert(
            key,
            CacheEntry {
                value,
                written_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Removes one entry.
    pub fn invalidate(&self, key: &K) -> bool {
        write(&self.entries).remove(key).is_some()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        write(&self.entries).clear();
    }

    /// Drops expired entries and returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = write(&self.entries);
        let before = entries.len();
        entries.retain(|_, e| e.is_fresh(now));
        before - entries.len()
    }

    /// Number of stored entries, fresh or not.
    pub fn len(&self) -> usize {
        read(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of an entity fetch as remembered by the cache.
#[derive(Debug, Clone)]
pub enum CachedLookup {
    Found(Arc<Entity>),
    /// The fetch failed; treated as "no properties" until it expires.
    Failed,
}

impl CachedLookup {
    /// The entity, if the fetch succeeded.
    pub fn entity(&self) -> Option<&Arc<Entity>> {
        match self {
            CachedLookup::Found(e) => Some(e),
            CachedLookup::Failed => None,
        }
    }
}

/// Memoizes entity fetches per entity id.
#[derive(Debug)]
pub struct PropertyCache {
    entries: TtlCache<EntityId, CachedLookup>,
    negative_ttl: Duration,
}

impl PropertyCache {
    /// Creates a cache serving successes for `ttl` and failures for
    /// `negative_ttl`.
    pub fn new(ttl: Duration, negative_ttl: Duration) -> Self {
        Self {
            entries: TtlCache::new(ttl),
            negative_ttl,
        }
    }

    /// A fresh lookup result, or `None` on a miss.
    pub fn get(&self, id: EntityId) -> Option<CachedLookup> {
        self.entries.get(&id)
    }

    /// Remembers a fetched entity.
    pub fn set(&self, id: EntityId, entity: Arc<Entity>) {
        self.entries.insert(id, CachedLookup::Found(entity));
    }

    /// Remembers a failed fetch for the shorter negative TTL.
    pub fn set_failed(&self, id: EntityId) {
        self.entries
            .insert_with_ttl(id, CachedLookup::Failed, self.negative_ttl);
    }

    pub fn invalidate(&self, id: EntityId) {
        if self.entries.invalidate(&id) {
            debug!("Invalidated cached properties of entity {}", id);
        }
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn purge_expired(&self) -> usize {
        self.entries.purge_expired()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
