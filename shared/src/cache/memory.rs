use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use super::keys::glob_match;
use super::{CacheError, ReadCache};

/// In-process read cache.
///
/// Expiry uses the tokio clock, so TTL behaviour can be driven with a paused
/// runtime. `set_failing(true)` makes every call fail as an unreachable Redis
/// would.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, (Vec<u8>, Instant)>,
    failing: AtomicBool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Whether `key` holds a live entry
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .map(|e| e.1 > Instant::now())
            .unwrap_or(false)
    }

    /// Live keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.value().1 > now)
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        keys
    }

    fn check(&self) -> Result<(), CacheError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(CacheError::Unavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ReadCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.check()?;
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if entry.1 > now => return Ok(Some(entry.0.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, (_, expires)| *expires <= now);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        self.check()?;
        self.entries
            .insert(key.to_string(), (value.to_vec(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.check()?;
        self.entries.remove(key);
        Ok(())
    }

    async fn delete_matching(&self, pattern: &str) -> Result<u64, CacheError> {
        self.check()?;
        let doomed: Vec<String> = self
            .entries
            .iter()
            .filter(|e| glob_match(pattern, e.key()))
            .map(|e| e.key().clone())
            .collect();

        let mut removed = 0;
        for key in doomed {
            if self.entries.remove(&key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = MemoryCache::new();
        cache.set("item:1", b"{}", Duration::from_secs(60)).await.unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.get("item:1").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("item:1").await.unwrap().is_none());
        assert!(cache.keys().is_empty());
    }

    #[tokio::test]
    async fn test_delete_matching_only_touches_pattern() {
        let cache = MemoryCache::new();
        for key in ["listing:1:10", "listing:2:10", "listing:1:50", "item:1"] {
            cache.set(key, b"{}", Duration::from_secs(60)).await.unwrap();
        }

        assert_eq!(cache.delete_matching("listing:*").await.unwrap(), 3);
        assert_eq!(cache.keys(), vec!["item:1".to_string()]);
    }

    #[tokio::test]
    async fn test_failing_cache_errors() {
        let cache = MemoryCache::new();
        cache.set_failing(true);
        assert!(matches!(
            cache.get("item:1").await,
            Err(CacheError::Unavailable(_))
        ));
        assert!(cache.delete_matching("listing:*").await.is_err());
    }
}
