use async_trait::async_trait;
use murmur_redis::RedisClient;
use std::time::Duration;

use super::{CacheError, ReadCache};

/// Read cache backed by Redis (`SET EX`, `SCAN MATCH` + `DEL`)
#[derive(Clone)]
pub struct RedisCache {
    client: RedisClient,
}

impl RedisCache {
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }

    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        Ok(Self::new(RedisClient::connect(url).await?))
    }
}

#[async_trait]
impl ReadCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut client = self.client.clone();
        Ok(client.get(key).await?)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let mut client = self.client.clone();
        // SETEX rejects 0; sub-second TTLs round up
        let seconds = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
        client.set_ex(key, value, seconds.max(1)).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut client = self.client.clone();
        client.del(key).await?;
        Ok(())
    }

    async fn delete_matching(&self, pattern: &str) -> Result<u64, CacheError> {
        let mut client = self.client.clone();
        Ok(client.delete_matching(pattern).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    // Note: These tests require a running Redis instance
    // Run with: docker run -d -p 6379:6379 redis:7

    #[tokio::test]
    #[ignore] // Requires Redis
    #[serial]
    async fn test_set_get_delete() {
        let cache = RedisCache::connect("redis://localhost:6379").await.unwrap();

        cache
            .set("item:murmur-test", br#"{"id":"x"}"#, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            cache.get("item:murmur-test").await.unwrap().as_deref(),
            Some(&br#"{"id":"x"}"#[..])
        );

        cache.delete("item:murmur-test").await.unwrap();
        assert!(cache.get("item:murmur-test").await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    #[serial]
    async fn test_delete_matching_removes_every_listing_page() {
        let cache = RedisCache::connect("redis://localhost:6379").await.unwrap();

        for page in 1..=250 {
            cache
                .set(&format!("listing:{}:10", page), b"[]", Duration::from_secs(60))
                .await
                .unwrap();
        }
        cache.set("item:keep-me", b"{}", Duration::from_secs(60)).await.unwrap();

        let removed = cache.delete_matching("listing:*").await.unwrap();
        assert!(removed >= 250);
        assert!(cache.get("listing:137:10").await.unwrap().is_none());
        assert!(cache.get("item:keep-me").await.unwrap().is_some());

        cache.delete("item:keep-me").await.unwrap();
    }
}
