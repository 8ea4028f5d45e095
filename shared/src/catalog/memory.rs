use async_trait::async_trait;
use dashmap::DashMap;
use murmur_types::{AssetId, AssetRecord, Post, PostId, UserId};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use super::{AssetCatalog, CatalogError, PostCatalog};

/// In-process post catalog
#[derive(Default)]
pub struct MemoryPostCatalog {
    posts: DashMap<String, (u64, Post)>,
    seq: AtomicU64,
    reads: AtomicUsize,
}

impl MemoryPostCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of find_by_id / find_page calls served
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}

#[async_trait]
impl PostCatalog for MemoryPostCatalog {
    async fn insert(&self, post: &Post) -> Result<(), CatalogError> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        self.posts
            .insert(post.id.to_string(), (seq, post.clone()));
        Ok(())
    }

    async fn find_by_id(&self, id: &PostId) -> Result<Option<Post>, CatalogError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.posts.get(id.as_str()).map(|entry| entry.1.clone()))
    }

    async fn find_page(&self, offset: u64, limit: u32) -> Result<Vec<Post>, CatalogError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let mut all: Vec<(u64, Post)> = self.posts.iter().map(|e| e.value().clone()).collect();
        // Newest first; insertion order breaks timestamp ties.
        all.sort_by(|a, b| b.1.created_at.cmp(&a.1.created_at).then(b.0.cmp(&a.0)));

        Ok(all
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(limit as usize)
            .map(|(_, post)| post)
            .collect())
    }

    async fn count(&self) -> Result<u64, CatalogError> {
        Ok(self.posts.len() as u64)
    }

    async fn delete(&self, id: &PostId) -> Result<bool, CatalogError> {
        Ok(self.posts.remove(id.as_str()).is_some())
    }
}

/// In-process asset catalog with failure injection
#[derive(Default)]
pub struct MemoryAssetCatalog {
    assets: DashMap<String, AssetRecord>,
    failing: AtomicBool,
}

impl MemoryAssetCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_assets(assets: impl IntoIterator<Item = AssetRecord>) -> Self {
        let catalog = Self::new();
        for asset in assets {
            catalog.assets.insert(asset.id.to_string(), asset);
        }
        catalog
    }

    /// Make every call fail with `Unavailable` until reset
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.assets.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    fn check(&self) -> Result<(), CatalogError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CatalogError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AssetCatalog for MemoryAssetCatalog {
    async fn insert(&self, asset: &AssetRecord) -> Result<(), CatalogError> {
        self.check()?;
        self.assets
            .entry(asset.id.to_string())
            .or_insert_with(|| asset.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &AssetId) -> Result<Option<AssetRecord>, CatalogError> {
        self.check()?;
        Ok(self.assets.get(id.as_str()).map(|e| e.value().clone()))
    }

    async fn find_by_owner(&self, owner: &UserId) -> Result<Vec<AssetRecord>, CatalogError> {
        self.check()?;
        let mut owned: Vec<AssetRecord> = self
            .assets
            .iter()
            .filter(|e| e.value().owner_id == *owner)
            .map(|e| e.value().clone())
            .collect();
        owned.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        Ok(owned)
    }

    async fn delete(&self, id: &AssetId) -> Result<bool, CatalogError> {
        self.check()?;
        Ok(self.assets.remove(id.as_str()).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_page_is_newest_first() {
        let catalog = MemoryPostCatalog::new();
        let mut ids = Vec::new();
        for i in 0..5 {
            let post = Post::new(UserId::new("u1"), format!("post {}", i), vec![]);
            ids.push(post.id.clone());
            catalog.insert(&post).await.unwrap();
        }

        let page = catalog.find_page(1, 2).await.unwrap();
        let got: Vec<_> = page.into_iter().map(|p| p.id).collect();
        assert_eq!(got, vec![ids[3].clone(), ids[2].clone()]);
        assert_eq!(catalog.count().await.unwrap(), 5);
        assert!(catalog.find_page(10, 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_asset_delete_reports_absence() {
        let catalog = MemoryAssetCatalog::with_assets([AssetRecord {
            id: AssetId::new("a1"),
            external_storage_key: "k/a1".into(),
            owner_id: UserId::new("u1"),
        }]);

        assert!(catalog.delete(&AssetId::new("a1")).await.unwrap());
        assert!(!catalog.delete(&AssetId::new("a1")).await.unwrap());

        catalog.set_failing(true);
        assert!(matches!(
            catalog.find_by_id(&AssetId::new("a1")).await,
            Err(CatalogError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_find_by_owner_filters_and_orders() {
        let asset = |id: &str, owner: &str| AssetRecord {
            id: AssetId::new(id),
            external_storage_key: format!("k/{}", id),
            owner_id: UserId::new(owner),
        };
        let catalog =
            MemoryAssetCatalog::with_assets([asset("b2", "u1"), asset("a1", "u1"), asset("c3", "u2")]);

        let owned = catalog.find_by_owner(&UserId::new("u1")).await.unwrap();
        let ids: Vec<&str> = owned.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "b2"]);
        assert!(catalog.find_by_owner(&UserId::new("u9")).await.unwrap().is_empty());
    }
}
