//! In-process cache store backed by `DashMap`

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::CacheStore;
use crate::error::Result;

#[derive(Debug)]
struct Entry {
    payload: String,
    expires_at: Instant,
    tags: Vec<String>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: DashMap<String, Entry>,
    tags: DashMap<String, HashSet<String>>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Process-local cache store
///
/// Values are stored serialized as JSON, so a hit always returns a fresh copy.
/// Concurrent `remember` calls for the same key compute at most once: later
/// callers wait on a per-key lock and then read the stored value.
/// Cloning shares the underlying storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    inner: Arc<Inner>,
}

impl MemoryCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.inner
            .entries
            .iter()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    /// Whether the cache holds no live entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        if let Some(entry) = self.inner.entries.get(key) {
            if entry.expires_at > now {
                return Some(entry.payload.clone());
            }
        }
        self.evict_expired(key, now);
        None
    }

    /// Insert an entry, sweeping any that have expired
    fn store(&self, tags: &[String], key: &str, payload: String, ttl: Duration) {
        let now = Instant::now();
        self.purge_expired(now);

        for tag in tags {
            self.inner
                .tags
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
        self.inner.entries.insert(
            key.to_string(),
            Entry {
                payload,
                expires_at: now + ttl,
                tags: tags.to_vec(),
            },
        );
    }

    fn purge_expired(&self, now: Instant) {
        let expired: Vec<String> = self
            .inner
            .entries
            .iter()
            .filter(|entry| entry.expires_at <= now)
            .map(|entry| entry.key().clone())
            .collect();
        if !expired.is_empty() {
            tracing::debug!(entries = expired.len(), "Sweeping expired cache entries");
        }
        for key in expired {
            self.evict_expired(&key, now);
        }
    }

    fn evict_expired(&self, key: &str, now: Instant) {
        if let Some((_, entry)) = self
            .inner
            .entries
            .remove_if(key, |_, entry| entry.expires_at <= now)
        {
            self.unlink_tags(key, &entry.tags);
        }
    }

    fn remove(&self, key: &str) {
        if let Some((_, entry)) = self.inner.entries.remove(key) {
            self.unlink_tags(key, &entry.tags);
        }
    }

    /// Drop `key` from each tag set, and drop tag sets left empty
    fn unlink_tags(&self, key: &str, tags: &[String]) {
        for tag in tags {
            let emptied = match self.inner.tags.get_mut(tag) {
                Some(mut keys) => {
                    // A concurrent store may have re-added the key
                    if !self.inner.entries.contains_key(key) {
                        keys.remove(key);
                    }
                    keys.is_empty()
                }
                None => false,
            };
            if emptied {
                self.inner.tags.remove_if(tag, |_, keys| keys.is_empty());
            }
        }
    }

    fn release_lock(&self, key: &str) {
        self.inner
            .locks
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl CacheStore for MemoryCache {
    fn remember<T, Fut>(
        &self,
        tags: &[String],
        key: &str,
        ttl: Duration,
        compute: Fut,
    ) -> impl Future<Output = Result<T>> + Send
    where
        T: Serialize + DeserializeOwned + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        async move {
            if let Some(payload) = self.lookup(key) {
                tracing::debug!(key, "Cache hit");
                return Ok(serde_json::from_str(&payload)?);
            }

            let lock = self
                .inner
                .locks
                .entry(key.to_string())
                .or_default()
                .clone();

            let result = {
                let _guard = lock.lock().await;

                // Another caller may have filled the entry while we waited
                if let Some(payload) = self.lookup(key) {
                    tracing::debug!(key, "Cache hit after wait");
                    serde_json::from_str(&payload).map_err(Into::into)
                } else {
                    tracing::debug!(key, ttl_secs = ttl.as_secs(), "Cache miss");
                    match compute.await {
                        Ok(value) => match serde_json::to_string(&value) {
                            Ok(payload) => {
                                self.store(tags, key, payload, ttl);
                                Ok(value)
                            }
                            Err(e) => Err(e.into()),
                        },
                        Err(e) => Err(e),
                    }
                }
            };

            drop(lock);
            self.release_lock(key);
            result
        }
    }

    async fn flush_tags(&self, tags: &[String]) -> Result<()> {
        for tag in tags {
            let Some((_, keys)) = self.inner.tags.remove(tag) else {
                continue;
            };
            tracing::debug!(tag = %tag, entries = keys.len(), "Flushing cache tag");
            for key in keys {
                self.remove(&key);
            }
        }
        Ok(())
    }

    async fn forget(&self, key: &str) -> Result<()> {
        self.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tags(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn test_computes_once_per_key() {
        let cache = MemoryCache::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value: Vec<u32> = cache
                .remember(&tags(&["users"]), "k1", HOUR, async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![1, 2, 3])
                })
                .await
                .unwrap();
            assert_eq!(value, vec![1, 2, 3]);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_compute_separately() {
        let cache = MemoryCache::new();
        let a: String = cache
            .remember(&tags(&["users"]), "a", HOUR, async { Ok("a".to_string()) })
            .await
            .unwrap();
        let b: String = cache
            .remember(&tags(&["users"]), "b", HOUR, async { Ok("b".to_string()) })
            .await
            .unwrap();
        assert_eq!((a.as_str(), b.as_str()), ("a", "b"));
    }

    #[tokio::test]
    async fn test_recomputes_after_expiry() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_millis(20);

        let first: u32 = cache
            .remember(&tags(&["t"]), "k", ttl, async { Ok(1) })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second: u32 = cache
            .remember(&tags(&["t"]), "k", ttl, async { Ok(2) })
            .await
            .unwrap();

        assert_eq!((first, second), (1, 2));
    }

    #[tokio::test]
    async fn test_flush_tags_invalidates_tagged_entries_only() {
        let cache = MemoryCache::new();
        let _: u32 = cache
            .remember(&tags(&["users"]), "u", HOUR, async { Ok(1) })
            .await
            .unwrap();
        let _: u32 = cache
            .remember(&tags(&["orders"]), "o", HOUR, async { Ok(1) })
            .await
            .unwrap();

        cache.flush_tags(&tags(&["users"])).await.unwrap();

        let u: u32 = cache
            .remember(&tags(&["users"]), "u", HOUR, async { Ok(2) })
            .await
            .unwrap();
        let o: u32 = cache
            .remember(&tags(&["orders"]), "o", HOUR, async { Ok(2) })
            .await
            .unwrap();
        assert_eq!((u, o), (2, 1));
    }

    #[tokio::test]
    async fn test_forget_drops_one_entry() {
        let cache = MemoryCache::new();
        let _: u32 = cache
            .remember(&tags(&["t"]), "k", HOUR, async { Ok(1) })
            .await
            .unwrap();
        cache.forget("k").await.unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache = MemoryCache::new();
        let failed: Result<u32> = cache
            .remember(&tags(&["t"]), "k", HOUR, async {
                Err(Error::Query("connection reset".to_string()))
            })
            .await;
        assert!(failed.is_err());

        let value: u32 = cache
            .remember(&tags(&["t"]), "k", HOUR, async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_store_sweeps_expired_entries() {
        let cache = MemoryCache::new();
        let _: u32 = cache
            .remember(&tags(&["stale"]), "old", Duration::from_millis(10), async { Ok(1) })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let _: u32 = cache
            .remember(&tags(&["fresh"]), "new", HOUR, async { Ok(2) })
            .await
            .unwrap();

        assert_eq!(cache.inner.entries.len(), 1);
        assert!(!cache.inner.entries.contains_key("old"));
        assert!(!cache.inner.tags.contains_key("stale"));
        assert!(cache.inner.tags.contains_key("fresh"));
    }

    #[tokio::test]
    async fn test_forget_drops_emptied_tag_sets() {
        let cache = MemoryCache::new();
        let _: u32 = cache
            .remember(&tags(&["users", "reports"]), "a", HOUR, async { Ok(1) })
            .await
            .unwrap();
        let _: u32 = cache
            .remember(&tags(&["users"]), "b", HOUR, async { Ok(2) })
            .await
            .unwrap();

        cache.forget("a").await.unwrap();

        assert!(!cache.inner.tags.contains_key("reports"));
        let users = cache.inner.tags.get("users").unwrap();
        assert_eq!(users.len(), 1);
        assert!(users.contains("b"));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_computation() {
        let cache = MemoryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .remember(&["t".to_string()], "shared", HOUR, async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(99u32)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 99);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
