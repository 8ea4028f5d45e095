//! # Murmur Redis
//!
//! Low-level Redis client shared by the murmur services.
//!
//! ## Design Principles
//!
//! - **No business logic** - Pure infrastructure layer
//! - **No dependencies** on other murmur-* crates
//! - **Generic operations** - Key-value, expiry, pattern delete, counters
//!
//! ## Example
//!
//! ```rust,no_run
//! use murmur_redis::RedisClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = RedisClient::connect("redis://localhost:6379").await?;
//!
//!     client.set_ex("item:42", "{}", 3600).await?;
//!     let value: Option<String> = client.get("item:42").await?;
//!     let removed = client.delete_matching("listing:*").await?;
//!
//!     Ok(())
//! }
//! ```

mod client;

pub use client::RedisClient;

// Re-export commonly used types
pub use redis::RedisError;

/// Result type for Redis operations
pub type Result<T> = std::result::Result<T, RedisError>;
