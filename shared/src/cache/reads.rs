use murmur_config::CacheConfig;
use murmur_metrics::CACHE_LOOKUPS_TOTAL;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::keys::KeyFamily;
use super::{bounded, ReadCache};

/// Typed, failure-absorbing view of the read cache.
///
/// Every call is bounded by the cache op timeout. A cache that errors or
/// times out behaves like a miss, and an entry that no longer decodes is
/// deleted and reported as a miss.
#[derive(Clone)]
pub struct ReadThrough {
    cache: Arc<dyn ReadCache>,
    op_timeout: Duration,
    item_ttl: Duration,
    listing_ttl: Duration,
}

impl ReadThrough {
    pub fn new(cache: Arc<dyn ReadCache>, config: &CacheConfig) -> Self {
        Self {
            cache,
            op_timeout: config.op_timeout(),
            item_ttl: config.item_ttl(),
            listing_ttl: config.listing_ttl(),
        }
    }

    pub fn ttl_for(&self, family: KeyFamily) -> Duration {
        match family {
            KeyFamily::Item => self.item_ttl,
            KeyFamily::Listing => self.listing_ttl,
        }
    }

    /// Cached value for `key`, or None on miss / error / corrupt entry
    pub async fn get_json<T: DeserializeOwned>(&self, family: KeyFamily, key: &str) -> Option<T> {
        let raw = match bounded(self.op_timeout, self.cache.get(key)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                record(family, "miss");
                return None;
            }
            Err(e) => {
                record(family, "error");
                warn!(cache_key = %key, error = %e, "Cache read failed, falling through to catalog");
                return None;
            }
        };

        match serde_json::from_slice(&raw) {
            Ok(value) => {
                record(family, "hit");
                debug!(cache_key = %key, "Cache hit");
                Some(value)
            }
            Err(e) => {
                record(family, "corrupt");
                warn!(cache_key = %key, error = %e, "Discarding undecodable cache entry");
                if let Err(e) = bounded(self.op_timeout, self.cache.delete(key)).await {
                    warn!(cache_key = %key, error = %e, "Failed to delete corrupt cache entry");
                }
                None
            }
        }
    }

    /// Store `value` under `key` with the family's TTL. Failures are logged.
    pub async fn put_json<T: Serialize + ?Sized>(&self, family: KeyFamily, key: &str, value: &T) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(cache_key = %key, error = %e, "Failed to encode cache entry");
                return;
            }
        };

        let ttl = self.ttl_for(family);
        if let Err(e) = bounded(self.op_timeout, self.cache.set(key, &bytes, ttl)).await {
            warn!(cache_key = %key, error = %e, "Cache write failed");
        }
    }
}

fn record(family: KeyFamily, result: &str) {
    CACHE_LOOKUPS_TOTAL
        .with_label_values(&[family.as_str(), result])
        .inc();
}
