//! Tag-scoped result caching
//!
//! Paginated and exported row sets are cached under a key derived from the
//! request and grouped under tags (by default the table name), so that a
//! write to a table can invalidate every cached page of it at once.
//!
//! # Implementations
//!
//! - [`MemoryCache`]: process-local, single-flight per key
//! - [`RedisCache`]: shared across instances (requires the `cache` feature)
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use acton_paginate::cache::{CacheStore, MemoryCache};
//!
//! # #[tokio::main]
//! # async fn main() -> acton_paginate::error::Result<()> {
//! let cache = MemoryCache::new();
//! let tags = vec!["users".to_string()];
//!
//! let first: u64 = cache
//!     .remember(&tags, "users:count", Duration::from_secs(60), async { Ok(42) })
//!     .await?;
//! let second: u64 = cache
//!     .remember(&tags, "users:count", Duration::from_secs(60), async { Ok(0) })
//!     .await?;
//! assert_eq!(first, second);
//!
//! cache.flush_tags(&tags).await?;
//! # Ok(())
//! # }
//! ```

mod memory;
#[cfg(feature = "cache")]
mod redis;

pub use memory::MemoryCache;
#[cfg(feature = "cache")]
pub use self::redis::RedisCache;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::Result;

/// Compute-if-absent cache with TTL and tag invalidation
pub trait CacheStore: Send + Sync {
    /// Return the value cached under `key`, or await `compute` and cache its result
    ///
    /// `compute` is only polled on a miss; on a hit it is dropped unpolled.
    /// The value is associated with every tag in `tags` and expires after
    /// `ttl`. Errors from `compute` propagate and nothing is cached.
    fn remember<T, Fut>(
        &self,
        tags: &[String],
        key: &str,
        ttl: Duration,
        compute: Fut,
    ) -> impl Future<Output = Result<T>> + Send
    where
        T: Serialize + DeserializeOwned + Send,
        Fut: Future<Output = Result<T>> + Send;

    /// Drop every entry carrying any of `tags`
    fn flush_tags(&self, tags: &[String]) -> impl Future<Output = Result<()>> + Send;

    /// Drop a single entry
    fn forget(&self, key: &str) -> impl Future<Output = Result<()>> + Send;
}

impl<C: CacheStore> CacheStore for Arc<C> {
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
        (**self).remember(tags, key, ttl, compute)
    }

    fn flush_tags(&self, tags: &[String]) -> impl Future<Output = Result<()>> + Send {
        (**self).flush_tags(tags)
    }

    fn forget(&self, key: &str) -> impl Future<Output = Result<()>> + Send {
        (**self).forget(key)
    }
}
