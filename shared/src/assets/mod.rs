// ============================================================================
// Assets
// ============================================================================
//
// Remote object stores and the idempotent cleanup handler the media service
// runs for every `post.deleted` event.
//
// ============================================================================

pub mod cleanup;
pub mod fs_store;
pub mod http_store;
pub mod memory_store;

use async_trait::async_trait;
use murmur_config::{MediaStorageConfig, StorageBackend};
use std::sync::Arc;
use std::time::Duration;

pub use cleanup::{AssetCleanupHandler, CleanupReport};
pub use fs_store::FsObjectStore;
pub use http_store::HttpObjectStore;
pub use memory_store::MemoryObjectStore;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Storage returned status {0}")]
    Status(u16),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl From<StorageError> for murmur_error::AppError {
    fn from(e: StorageError) -> Self {
        murmur_error::AppError::Storage(e.to_string())
    }
}

/// Result of a delete that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// Object was already gone; counts as success
    NotFound,
}

/// Remote object storage, as far as cleanup needs it
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Delete the object stored under `key`. Must tolerate a missing object.
    async fn delete(&self, key: &str) -> Result<DeleteOutcome, StorageError>;

    fn backend(&self) -> &'static str;
}

/// Build the configured object store
pub fn object_store_from_config(
    config: &MediaStorageConfig,
) -> Result<Arc<dyn ObjectStore>, StorageError> {
    Ok(match config.backend {
        StorageBackend::Filesystem => Arc::new(FsObjectStore::new(config.storage_dir.clone())),
        StorageBackend::Http => Arc::new(HttpObjectStore::new(&config.base_url, config.timeout())?),
    })
}
