//! In-memory response cache.
//!
//! ## Semantics
//!
//! - Every entry carries its own TTL; an entry whose age reaches its TTL is
//!   never returned. Expired entries are dropped lazily on access and by
//!   [`ResponseCache::purge_expired`].
//! - Entries can be evicted early by exact key, by key substring, by exact
//!   [`CacheTag`], or all at once.
//! - Updates are atomic per key (DashMap shard locks); there are no
//!   multi-key transactions.

use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Structured invalidation tag attached to an entry at write time.
///
/// Two shapes are used: the entity type alone (`article`) and the entity
/// type with its id (`article/42`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheTag(String);

impl CacheTag {
    pub fn entity_type(entity_type: &str) -> Self {
        Self(entity_type.to_string())
    }

    pub fn entity(entity_type: &str, entity_id: &str) -> Self {
        Self(format!("{entity_type}/{entity_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A cached entry with TTL support.
///
/// The payload is wrapped in `Arc` so cache hits are cheap clones.
#[derive(Clone, Debug)]
pub struct CachedEntry {
    pub data: Arc<Vec<u8>>,
    pub cached_at: Instant,
    pub ttl: Duration,
    pub tags: Arc<[CacheTag]>,
}

impl CachedEntry {
    pub fn new(data: Vec<u8>, ttl: Duration) -> Self {
        Self::with_tags(data, ttl, Vec::new())
    }

    pub fn with_tags(data: Vec<u8>, ttl: Duration, tags: Vec<CacheTag>) -> Self {
        Self {
            data: Arc::new(data),
            cached_at: Instant::now(),
            ttl,
            tags: tags.into(),
        }
    }

    /// An entry is stale once its age reaches the TTL.
    pub fn is_expired(&self) -> bool {
        self.cached_at.elapsed() >= self.ttl
    }

    pub fn has_tag(&self, tag: &CacheTag) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Cache statistics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Live (non-expired) entries.
    pub count: usize,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Single-process response cache shared by all in-flight requests.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: DashMap<String, CachedEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a value from the cache, counting the lookup as a hit or miss.
    pub fn get(&self, key: &str) -> Option<Arc<Vec<u8>>> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(Arc::clone(&entry.data));
            }
            // Release the shard read lock before removing
            drop(entry);
            // A concurrent `set` may have replaced the stale entry meanwhile
            self.entries.remove_if(key, |_, entry| entry.is_expired());
            tracing::trace!(key = %key, "expired cache entry evicted");
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store a value, replacing any previous entry and resetting its TTL.
    pub fn set(&self, key: impl Into<String>, value: Vec<u8>, ttl: Duration) {
        self.set_tagged(key, value, ttl, Vec::new());
    }

    /// Store a value together with its invalidation tags.
    pub fn set_tagged(
        &self,
        key: impl Into<String>,
        value: Vec<u8>,
        ttl: Duration,
        tags: Vec<CacheTag>,
    ) {
        let key = key.into();
        tracing::debug!(key = %key, ttl_secs = ttl.as_secs(), tags = tags.len(), "cache set");
        self.entries
            .insert(key, CachedEntry::with_tags(value, ttl, tags));
    }

    /// Remove one entry by exact key. Returns whether an entry was removed.
    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove every entry whose key contains `fragment`.
    ///
    /// An empty fragment matches nothing; use [`ResponseCache::flush`] to
    /// clear the cache.
    pub fn delete_matching(&self, fragment: &str) -> usize {
        if fragment.is_empty() {
            return 0;
        }
        self.remove_where(|key, _| key.contains(fragment))
    }

    /// Remove every entry carrying `tag`.
    pub fn delete_tagged(&self, tag: &CacheTag) -> usize {
        self.remove_where(|_, entry| entry.has_tag(tag))
    }

    /// Remove all entries. Returns the number removed.
    pub fn flush(&self) -> usize {
        let removed = self.remove_where(|_, _| true);
        tracing::info!(removed, "cache flushed");
        removed
    }

    /// Proactively drop expired entries.
    pub fn purge_expired(&self) -> usize {
        self.remove_where(|_, entry| entry.is_expired())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            count: self
                .entries
                .iter()
                .filter(|entry| !entry.value().is_expired())
                .count(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn remove_where(&self, mut predicate: impl FnMut(&str, &CachedEntry) -> bool) -> usize {
        let mut removed = 0;
        self.entries.retain(|key, entry| {
            if predicate(key, entry) {
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn test_get_set() {
        let cache = ResponseCache::new();
        cache.set("key", b"value".to_vec(), MINUTE);

        assert_eq!(cache.get("key"), Some(Arc::new(b"value".to_vec())));
        assert_eq!(cache.get("other"), None);

        let stats = cache.stats();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[test]
    fn test_expired_entry_is_never_returned() {
        let cache = ResponseCache::new();
        cache.set("short", b"v".to_vec(), Duration::from_millis(30));
        assert!(cache.get("short").is_some());

        thread::sleep(Duration::from_millis(60));

        assert!(cache.get("short").is_none());
        // Lazily evicted on access
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_zero_ttl_is_immediately_stale() {
        let cache = ResponseCache::new();
        cache.set("zero", b"v".to_vec(), Duration::ZERO);
        assert!(cache.get("zero").is_none());
    }

    #[test]
    fn test_set_overwrites_and_resets_ttl() {
        let cache = ResponseCache::new();
        cache.set("key", b"old".to_vec(), Duration::from_millis(30));
        cache.set("key", b"new".to_vec(), MINUTE);

        thread::sleep(Duration::from_millis(60));

        assert_eq!(cache.get("key"), Some(Arc::new(b"new".to_vec())));
    }

    #[test]
    fn test_delete() {
        let cache = ResponseCache::new();
        cache.set("key", b"v".to_vec(), MINUTE);

        assert!(cache.delete("key"));
        assert!(!cache.delete("key"));
        assert!(cache.get("key").is_none());
    }

    #[test]
    fn test_delete_matching_only_touches_matching_keys() {
        let cache = ResponseCache::new();
        cache.set("content-proxy_GET_/node/article/42", b"a".to_vec(), MINUTE);
        cache.set("content-proxy_GET_/node/article/7", b"b".to_vec(), MINUTE);
        cache.set("content-proxy_GET_/node/page/3", b"c".to_vec(), MINUTE);

        assert_eq!(cache.delete_matching("/42"), 1);
        assert_eq!(cache.delete_matching("article"), 1);
        assert_eq!(cache.delete_matching("article"), 0);
        assert_eq!(cache.delete_matching(""), 0);

        assert!(cache.get("content-proxy_GET_/node/page/3").is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_delete_tagged() {
        let cache = ResponseCache::new();
        cache.set_tagged(
            "a",
            b"1".to_vec(),
            MINUTE,
            vec![CacheTag::entity_type("article"), CacheTag::entity("article", "42")],
        );
        cache.set_tagged(
            "b",
            b"2".to_vec(),
            MINUTE,
            vec![CacheTag::entity_type("article"), CacheTag::entity("article", "420")],
        );
        cache.set("c", b"3".to_vec(), MINUTE);

        assert_eq!(cache.delete_tagged(&CacheTag::entity("article", "42")), 1);
        assert!(cache.get("b").is_some());
        assert_eq!(cache.delete_tagged(&CacheTag::entity_type("article")), 1);
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_flush_and_purge() {
        let cache = ResponseCache::new();
        cache.set("live", b"1".to_vec(), MINUTE);
        cache.set("stale", b"2".to_vec(), Duration::ZERO);

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);

        cache.set("another", b"3".to_vec(), MINUTE);
        assert_eq!(cache.flush(), 2);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().count, 0);
    }

    #[test]
    fn test_concurrent_writers_never_tear() {
        let cache = Arc::new(ResponseCache::new());
        let values: Vec<Vec<u8>> = (0..4u8).map(|i| vec![i; 4096]).collect();

        let handles: Vec<_> = values
            .iter()
            .cloned()
            .map(|value| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for _ in 0..200 {
                        cache.set("shared", value.clone(), MINUTE);
                        if let Some(seen) = cache.get("shared") {
                            let first = seen[0];
                            assert!(seen.iter().all(|b| *b == first));
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let last = cache.get("shared").unwrap();
        assert!(values.iter().any(|v| v.as_slice() == last.as_slice()));
    }
}
