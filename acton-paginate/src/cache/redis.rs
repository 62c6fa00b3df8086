//! Redis-backed cache store
//!
//! Entries are stored with `SET EX` under `<prefix>:<key>`. Every tag keeps a
//! Redis set of the entry keys carrying it (`<prefix>:tag:<tag>`), and every
//! entry keeps the set of its own tags (`<prefix>:<key>:tags`) so that it can
//! be unlinked from its tag sets when it is dropped. Tag sets expire with the
//! longest-lived entry added to them.
//!
//! Unlike [`MemoryCache`](super::MemoryCache), concurrent misses for the same
//! key on different instances may each compute the value.

use std::future::Future;
use std::time::Duration;

use deadpool_redis::{
    redis::{self, AsyncCommands, Pipeline},
    Config as DeadpoolConfig, Connection, Pool, Runtime,
};
use serde::{de::DeserializeOwned, Serialize};

use super::CacheStore;
use crate::config::RedisConfig;
use crate::error::{Error, Result};

/// Cache store shared by every instance connected to the same Redis
#[derive(Clone)]
pub struct RedisCache {
    pool: Pool,
    key_prefix: String,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("key_prefix", &self.key_prefix)
            .field("pool", &self.pool.status())
            .finish()
    }
}

impl RedisCache {
    /// Connect using `config`, retrying with exponential backoff
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let pool = create_pool(config).await?;
        Ok(Self::from_pool(pool, config.key_prefix.clone()))
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: Pool, key_prefix: impl Into<String>) -> Self {
        Self {
            pool,
            key_prefix: key_prefix.into(),
        }
    }

    fn entry_key(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }

    fn tag_key(&self, tag: &str) -> String {
        format!("{}:tag:{}", self.key_prefix, tag)
    }

    fn entry_tags_key(entry_key: &str) -> String {
        format!("{}:tags", entry_key)
    }

    /// Payload, tag memberships and the entry's own tag set, in one transaction
    fn store_pipeline(&self, tags: &[String], key: &str, payload: String, ttl_secs: u64) -> Pipeline {
        let entry_key = self.entry_key(key);
        let mut pipe = redis::pipe();
        pipe.atomic().set_ex(&entry_key, payload, ttl_secs).ignore();
        for tag in tags {
            pipe.sadd(self.tag_key(tag), &entry_key).ignore();
        }
        if !tags.is_empty() {
            let own_tags = Self::entry_tags_key(&entry_key);
            pipe.sadd(&own_tags, tags)
                .ignore()
                .expire(&own_tags, ttl_secs as i64)
                .ignore();
        }
        pipe
    }

    /// Remove `entry_key` from each of `tags` and delete the entry
    fn unlink_pipeline(&self, entry_key: &str, tags: &[String]) -> Pipeline {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for tag in tags {
            pipe.srem(self.tag_key(tag), entry_key).ignore();
        }
        pipe.del(vec![entry_key.to_string(), Self::entry_tags_key(entry_key)])
            .ignore();
        pipe
    }

    /// Extend each tag set's TTL to at least `ttl_secs`
    async fn extend_tag_ttls(&self, conn: &mut Connection, tags: &[String], ttl_secs: u64) -> Result<()> {
        for tag in tags {
            let tag_key = self.tag_key(tag);
            // -1 when the set has no expiry yet
            let remaining: i64 = conn.ttl(&tag_key).await?;
            if remaining < ttl_secs as i64 {
                conn.expire::<_, ()>(&tag_key, ttl_secs as i64).await?;
            }
        }
        Ok(())
    }

    async fn unlink(&self, conn: &mut Connection, entry_key: &str) -> Result<()> {
        let tags: Vec<String> = conn.smembers(Self::entry_tags_key(entry_key)).await?;
        self.unlink_pipeline(entry_key, &tags)
            .query_async::<()>(conn)
            .await?;
        Ok(())
    }

    async fn connection(&self) -> Result<Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| Error::Cache(format!("Failed to get Redis connection: {}", e)))
    }
}

impl CacheStore for RedisCache {
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
            let entry_key = self.entry_key(key);
            let mut conn = self.connection().await?;

            let cached: Option<String> = conn.get(&entry_key).await?;
            if let Some(payload) = cached {
                tracing::debug!(key, "Cache hit");
                return Ok(serde_json::from_str(&payload)?);
            }

            tracing::debug!(key, ttl_secs = ttl.as_secs(), "Cache miss");
            let value = compute.await?;
            let payload = serde_json::to_string(&value)?;

            let ttl_secs = ttl.as_secs().max(1);
            self.store_pipeline(tags, key, payload, ttl_secs)
                .query_async::<()>(&mut conn)
                .await?;
            self.extend_tag_ttls(&mut conn, tags, ttl_secs).await?;

            Ok(value)
        }
    }

    async fn flush_tags(&self, tags: &[String]) -> Result<()> {
        let mut conn = self.connection().await?;

        for tag in tags {
            let tag_key = self.tag_key(tag);
            let keys: Vec<String> = conn.smembers(&tag_key).await?;
            tracing::debug!(tag = %tag, entries = keys.len(), "Flushing cache tag");

            for entry_key in &keys {
                self.unlink(&mut conn, entry_key).await?;
            }
            conn.del::<_, ()>(&tag_key).await?;
        }
        Ok(())
    }

    async fn forget(&self, key: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        self.unlink(&mut conn, &self.entry_key(key)).await
    }
}

/// Create a Redis connection pool with retry logic
pub(crate) async fn create_pool(config: &RedisConfig) -> Result<Pool> {
    create_pool_with_retries(config, config.max_retries).await
}

/// Create a Redis connection pool with configurable retries
///
/// Uses exponential backoff strategy for retries
async fn create_pool_with_retries(config: &RedisConfig, max_retries: u32) -> Result<Pool> {
    let mut attempt = 0;
    let base_delay = Duration::from_secs(config.retry_delay_secs);

    loop {
        match try_create_pool(config).await {
            Ok(pool) => {
                if attempt > 0 {
                    tracing::info!(
                        "Redis connection established after {} attempt(s)",
                        attempt + 1
                    );
                } else {
                    tracing::info!(
                        "Redis cache pool created: max_connections={}",
                        config.max_connections
                    );
                }
                return Ok(pool);
            }
            Err(e) => {
                attempt += 1;

                if attempt > max_retries {
                    tracing::error!(
                        "Failed to connect to Redis after {} attempts: {}",
                        max_retries + 1,
                        e
                    );
                    return Err(e);
                }

                let delay = base_delay * 2_u32.pow(attempt.saturating_sub(1));
                tracing::warn!(
                    "Redis connection attempt {} failed: {}. Retrying in {:?}...",
                    attempt,
                    e,
                    delay
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Attempt to create a Redis pool (single try)
async fn try_create_pool(config: &RedisConfig) -> Result<Pool> {
    let pool = DeadpoolConfig::from_url(&config.url)
        .builder()
        .map_err(|e| Error::Cache(format!("Failed to build Redis pool: {}", e)))?
        .max_size(config.max_connections)
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| Error::Cache(format!("Failed to create Redis pool: {}", e)))?;

    // Fail fast on an unreachable server
    let conn = pool
        .get()
        .await
        .map_err(|e| Error::Cache(format!("Failed to get Redis connection: {}", e)))?;
    drop(conn);

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lazy_cache() -> RedisCache {
        let pool = DeadpoolConfig::from_url("redis://127.0.0.1:6379")
            .create_pool(Some(Runtime::Tokio1))
            .unwrap();
        RedisCache::from_pool(pool, "test")
    }

    #[test]
    fn test_key_layout() {
        let cache = lazy_cache();
        assert_eq!(cache.entry_key("paginate:users:abc"), "test:paginate:users:abc");
        assert_eq!(cache.tag_key("users"), "test:tag:users");
        assert_eq!(
            RedisCache::entry_tags_key("test:paginate:users:abc"),
            "test:paginate:users:abc:tags"
        );
    }

    fn contains(haystack: &[u8], needle: &str) -> bool {
        haystack
            .windows(needle.len())
            .any(|window| window == needle.as_bytes())
    }

    #[test]
    fn test_store_expires_entry_and_own_tag_set() {
        let cache = lazy_cache();
        let tags = vec!["users".to_string(), "orders".to_string()];
        let packed = cache
            .store_pipeline(&tags, "paginate:users:abc", "{}".to_string(), 60)
            .get_packed_pipeline();

        assert!(contains(&packed, "MULTI"));
        assert!(contains(&packed, "SETEX"));
        assert!(contains(&packed, "test:tag:users"));
        assert!(contains(&packed, "test:tag:orders"));
        assert!(contains(&packed, "test:paginate:users:abc:tags"));
        assert!(contains(&packed, "EXPIRE"));
    }

    #[test]
    fn test_store_without_tags_skips_tag_sets() {
        let cache = lazy_cache();
        let packed = cache
            .store_pipeline(&[], "k", "{}".to_string(), 60)
            .get_packed_pipeline();

        assert!(contains(&packed, "SETEX"));
        assert!(!contains(&packed, "SADD"));
    }

    #[test]
    fn test_unlink_removes_key_from_every_tag_set() {
        let cache = lazy_cache();
        let tags = vec!["users".to_string(), "orders".to_string()];
        let packed = cache
            .unlink_pipeline("test:paginate:users:abc", &tags)
            .get_packed_pipeline();

        assert_eq!(packed.windows(4).filter(|w| w == b"SREM").count(), 2);
        assert!(contains(&packed, "test:tag:users"));
        assert!(contains(&packed, "test:tag:orders"));
        assert!(contains(&packed, "DEL"));
        assert!(contains(&packed, "test:paginate:users:abc:tags"));
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_after_retries() {
        let config = RedisConfig {
            url: "redis://127.0.0.1:1".to_string(),
            max_connections: 2,
            max_retries: 0,
            retry_delay_secs: 0,
            key_prefix: "test".to_string(),
        };
        let err = RedisCache::connect(&config).await.unwrap_err();
        assert!(matches!(err, Error::Cache(_)));
    }
}
