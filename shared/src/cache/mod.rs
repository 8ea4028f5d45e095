// Read cache for the post service.
//
// Keys:
//   item:<id>                 one post, long TTL
//   listing:<page>:<limit>    one page of the listing, short TTL
//
// Values are JSON bytes. The cache is an optimization: read failures fall
// through to the catalog and invalidation failures are logged and counted,
// never surfaced to the caller.

pub mod invalidator;
pub mod keys;
pub mod memory;
pub mod reads;
pub mod redis_cache;

use async_trait::async_trait;
use std::time::Duration;

pub use invalidator::CacheInvalidator;
pub use keys::{item_key, listing_key, KeyFamily, LISTING_PATTERN};
pub use memory::MemoryCache;
pub use reads::ReadThrough;
pub use redis_cache::RedisCache;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Cache operation timed out after {0:?}")]
    Timeout(Duration),
}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        CacheError::Unavailable(e.to_string())
    }
}

impl From<CacheError> for murmur_error::AppError {
    fn from(e: CacheError) -> Self {
        murmur_error::AppError::CacheUnavailable(e.to_string())
    }
}

/// Key-value store with per-entry TTL
#[async_trait]
pub trait ReadCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Delete every key matching a glob pattern (`listing:*`), returning how
    /// many were removed
    async fn delete_matching(&self, pattern: &str) -> Result<u64, CacheError>;
}

/// Cache that stores nothing (CACHE_ENABLED=false)
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

#[async_trait]
impl ReadCache for NoopCache {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<(), CacheError> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Ok(())
    }

    async fn delete_matching(&self, _pattern: &str) -> Result<u64, CacheError> {
        Ok(0)
    }
}

/// Run a cache call under `limit`
pub(crate) async fn bounded<T, F>(limit: Duration, f: F) -> Result<T, CacheError>
where
    F: std::future::Future<Output = Result<T, CacheError>>,
{
    tokio::time::timeout(limit, f)
        .await
        .map_err(|_| CacheError::Timeout(limit))?
}
