// Catalogs are the source of truth: posts for the post service, asset
// records for the media service. Every call is bounded by the catalog
// timeout; a timeout surfaces as CatalogError::Timeout.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use murmur_types::{AssetId, AssetRecord, Post, PostId, UserId};
use std::time::Duration;

pub use memory::{MemoryAssetCatalog, MemoryPostCatalog};
pub use postgres::{create_pool, run_migrations, DbPool, PgAssetCatalog, PgPostCatalog};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Catalog call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Catalog unavailable: {0}")]
    Unavailable(String),
}

impl From<CatalogError> for murmur_error::AppError {
    fn from(e: CatalogError) -> Self {
        murmur_error::AppError::Catalog(e.to_string())
    }
}

#[async_trait]
pub trait PostCatalog: Send + Sync {
    async fn insert(&self, post: &Post) -> Result<(), CatalogError>;

    async fn find_by_id(&self, id: &PostId) -> Result<Option<Post>, CatalogError>;

    /// Posts newest first, skipping `offset`
    async fn find_page(&self, offset: u64, limit: u32) -> Result<Vec<Post>, CatalogError>;

    async fn count(&self) -> Result<u64, CatalogError>;

    /// Returns false if the post did not exist
    async fn delete(&self, id: &PostId) -> Result<bool, CatalogError>;
}

#[async_trait]
pub trait AssetCatalog: Send + Sync {
    async fn insert(&self, asset: &AssetRecord) -> Result<(), CatalogError>;

    async fn find_by_id(&self, id: &AssetId) -> Result<Option<AssetRecord>, CatalogError>;

    /// Every asset owned by `owner`, ordered by id
    async fn find_by_owner(&self, owner: &UserId) -> Result<Vec<AssetRecord>, CatalogError>;

    /// Returns false if the record was already gone
    async fn delete(&self, id: &AssetId) -> Result<bool, CatalogError>;
}

/// Run a catalog call under `limit`
pub async fn bounded<T, F>(limit: Duration, f: F) -> Result<T, CatalogError>
where
    F: std::future::Future<Output = Result<T, CatalogError>>,
{
    tokio::time::timeout(limit, f)
        .await
        .map_err(|_| CatalogError::Timeout(limit))?
}
