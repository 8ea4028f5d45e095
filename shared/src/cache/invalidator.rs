// ============================================================================
// Cache Invalidator
// ============================================================================
//
// Discipline for every mutating write on the post service:
//
//   1. write the catalog
//   2. delete item:<id> and every listing:* key
//   3. respond
//
// Listing invalidation is global because any write can shift every page.
//
// Known race: a reader that missed before the write committed can store the
// pre-write value after step 2. That entry is served until its TTL expires,
// which bounds the divergence; it is not closed with locking.
//
// ============================================================================

use murmur_metrics::CACHE_INVALIDATION_FAILURES_TOTAL;
use murmur_types::PostId;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use super::keys::{item_key, LISTING_PATTERN};
use super::{bounded, CacheError, ReadCache};

#[derive(Clone)]
pub struct CacheInvalidator {
    cache: Arc<dyn ReadCache>,
    op_timeout: Duration,
}

impl CacheInvalidator {
    pub fn new(cache: Arc<dyn ReadCache>, op_timeout: Duration) -> Self {
        Self { cache, op_timeout }
    }

    /// Drop everything a write to `id` may have made stale.
    ///
    /// Never fails the caller: the catalog write already happened. Failures
    /// are logged at error and counted, and stale entries then live until
    /// their TTL.
    pub async fn after_write(&self, id: &PostId) {
        if let Err(e) = self.try_invalidate(id).await {
            CACHE_INVALIDATION_FAILURES_TOTAL.inc();
            error!(
                post_id = %id,
                error = %e,
                "Cache invalidation failed, stale entries may be served until TTL expiry"
            );
        }
    }

    /// Delete `item:<id>` then every `listing:*` key. Both deletes are
    /// attempted even if the first fails.
    pub async fn try_invalidate(&self, id: &PostId) -> Result<u64, CacheError> {
        let key = item_key(id);
        let item = bounded(self.op_timeout, self.cache.delete(&key)).await;
        let listings = bounded(self.op_timeout, self.cache.delete_matching(LISTING_PATTERN)).await;

        item?;
        let removed = listings?;
        debug!(cache_key = %key, listings_removed = removed, "Cache invalidated");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    #[tokio::test]
    async fn test_invalidates_item_and_all_listings() {
        let cache = Arc::new(MemoryCache::new());
        for key in ["item:1", "item:2", "listing:1:10", "listing:7:25"] {
            cache.set(key, b"{}", Duration::from_secs(60)).await.unwrap();
        }
        let invalidator = CacheInvalidator::new(cache.clone(), Duration::from_millis(100));

        let removed = invalidator.try_invalidate(&PostId::new("1")).await.unwrap();

        assert_eq!(removed, 2);
        assert_eq!(cache.keys(), vec!["item:2".to_string()]);
    }

    #[tokio::test]
    async fn test_failure_is_absorbed() {
        let cache = Arc::new(MemoryCache::new());
        cache.set_failing(true);
        let invalidator = CacheInvalidator::new(cache, Duration::from_millis(100));

        assert!(invalidator.try_invalidate(&PostId::new("1")).await.is_err());
        invalidator.after_write(&PostId::new("1")).await;
    }
}
