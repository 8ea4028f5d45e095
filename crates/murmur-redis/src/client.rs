//! Redis client implementation with connection management

use crate::Result;
use redis::{aio::ConnectionManager, AsyncCommands};

/// Keys fetched per SCAN round trip and deleted per DEL batch
const SCAN_BATCH: usize = 100;

/// Redis client with automatic reconnection
#[derive(Clone)]
pub struct RedisClient {
    conn: ConnectionManager,
}

impl RedisClient {
    /// Connect to Redis server
    ///
    /// Supports both redis:// and rediss:// (TLS) URLs
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    /// PING - round trip used by health checks
    pub async fn ping(&mut self) -> Result<()> {
        let _: String = redis::cmd("PING").query_async(&mut self.conn).await?;
        Ok(())
    }

    // ============================================================================
    // Key-Value Operations
    // ============================================================================

    /// GET - Get value by key
    pub async fn get<T: redis::FromRedisValue>(&mut self, key: &str) -> Result<Option<T>> {
        self.conn.get(key).await
    }

    /// SETEX - Set key with expiry in seconds
    pub async fn set_ex<V>(&mut self, key: &str, value: V, seconds: u64) -> Result<()>
    where
        V: redis::ToRedisArgs + Send + Sync,
    {
        self.conn.set_ex(key, value, seconds).await
    }

    /// DEL - Delete one or more keys, returns how many existed
    pub async fn del<K>(&mut self, keys: K) -> Result<i64>
    where
        K: redis::ToRedisArgs + Send + Sync,
    {
        self.conn.del(keys).await
    }

    /// TTL - Get time to live in seconds
    pub async fn ttl(&mut self, key: &str) -> Result<i64> {
        self.conn.ttl(key).await
    }

    /// Delete every key matching a glob pattern.
    ///
    /// Walks the keyspace with SCAN (never KEYS, which blocks the server) and
    /// deletes in batches. Keys created after the walk passes their slot are
    /// not removed.
    pub async fn delete_matching(&mut self, pattern: &str) -> Result<u64> {
        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut self.conn)
                .await?;

            for chunk in keys.chunks(SCAN_BATCH) {
                let deleted: i64 = self.conn.del(chunk).await?;
                removed += deleted.max(0) as u64;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(removed)
    }

    // ============================================================================
    // Atomic Operations
    // ============================================================================

    /// INCR followed by EXPIRE, returns the new value
    pub async fn incr_with_expiry(&mut self, key: &str, seconds: i64) -> Result<i64> {
        let (count, _): (i64, i64) = redis::pipe()
            .atomic()
            .cmd("INCR")
            .arg(key)
            .cmd("EXPIRE")
            .arg(key)
            .arg(seconds)
            .query_async(&mut self.conn)
            .await?;
        Ok(count)
    }
}
