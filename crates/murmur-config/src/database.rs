// ============================================================================
// Database Configuration
// ============================================================================

use std::time::Duration;

use crate::constants::DEFAULT_CATALOG_TIMEOUT_MS;
use crate::env_parse;

/// Database connection pool configuration
#[derive(Clone, Debug)]
pub struct DbConfig {
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Timeout for acquiring a connection from the pool (seconds)
    pub acquire_timeout_secs: u64,
    /// Timeout for idle connections before they are closed (seconds)
    pub idle_timeout_secs: u64,
    /// Bound for a single catalog query
    pub catalog_timeout_ms: u64,
}

impl DbConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            max_connections: env_parse("DB_MAX_CONNECTIONS", 10),
            acquire_timeout_secs: env_parse("DB_ACQUIRE_TIMEOUT_SECS", 30),
            idle_timeout_secs: env_parse("DB_IDLE_TIMEOUT_SECS", 600),
            catalog_timeout_ms: env_parse("CATALOG_TIMEOUT_MS", DEFAULT_CATALOG_TIMEOUT_MS),
        }
    }

    pub fn catalog_timeout(&self) -> Duration {
        Duration::from_millis(self.catalog_timeout_ms)
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout_secs: 30,
            idle_timeout_secs: 600,
            catalog_timeout_ms: DEFAULT_CATALOG_TIMEOUT_MS,
        }
    }
}
