// ============================================================================
// Read Cache Configuration
// ============================================================================

use std::time::Duration;

use crate::constants::*;
use crate::{env_flag, env_parse};

/// TTL classes and timeouts for the post read cache
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// false = no-op cache, every read goes to the catalog
    pub enabled: bool,
    /// TTL for `item:<id>` entries
    pub item_ttl_secs: u64,
    /// TTL for `listing:<page>:<limit>` entries
    pub listing_ttl_secs: u64,
    /// Bound for every GET/SET/DEL/SCAN round trip
    pub op_timeout_ms: u64,
}

impl CacheConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            enabled: env_flag("CACHE_ENABLED", true),
            item_ttl_secs: env_parse("CACHE_ITEM_TTL_SECS", DEFAULT_ITEM_TTL_SECS),
            listing_ttl_secs: env_parse("CACHE_LISTING_TTL_SECS", DEFAULT_LISTING_TTL_SECS),
            op_timeout_ms: env_parse("CACHE_OP_TIMEOUT_MS", DEFAULT_CACHE_OP_TIMEOUT_MS),
        }
    }

    pub fn item_ttl(&self) -> Duration {
        Duration::from_secs(self.item_ttl_secs)
    }

    pub fn listing_ttl(&self) -> Duration {
        Duration::from_secs(self.listing_ttl_secs)
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            item_ttl_secs: DEFAULT_ITEM_TTL_SECS,
            listing_ttl_secs: DEFAULT_LISTING_TTL_SECS,
            op_timeout_ms: DEFAULT_CACHE_OP_TIMEOUT_MS,
        }
    }
}
