// ============================================================================
// Asset Cleanup Handler
// ============================================================================
//
// Runs once per delivery of `post.deleted`. Per asset id, in any order:
//
//   record absent          -> already cleaned, continue
//   owner differs          -> skipped (never deleted), continue
//   record present        -> delete remote object (not found is fine),
//                             then delete the catalog record
//
// Every step is safe to repeat, so a redelivered event converges on the same
// end state. A failure on one asset does not stop the others; the handler
// reports failure afterwards so the event comes back for the remainder.
//
// ============================================================================

use async_trait::async_trait;
use murmur_metrics::ASSETS_CLEANED_TOTAL;
use murmur_types::{AssetId, PostDeletedEvent};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{DeleteOutcome, ObjectStore, StorageError};
use crate::broker::{EventHandler, HandlerError};
use crate::catalog::{bounded, AssetCatalog, CatalogError};
use crate::utils::log_safe_id;

/// What happened to the assets named by one event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: u32,
    pub already_cleaned: u32,
    pub skipped: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssetOutcome {
    Removed,
    AlreadyCleaned,
    Skipped,
}

impl AssetOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            AssetOutcome::Removed => "removed",
            AssetOutcome::AlreadyCleaned => "already_cleaned",
            AssetOutcome::Skipped => "skipped",
        }
    }
}

/// Why one asset could not be cleaned
#[derive(Debug, thiserror::Error)]
enum CleanupError {
    #[error("catalog: {0}")]
    Catalog(#[from] CatalogError),

    #[error("storage: {0}")]
    Storage(#[from] StorageError),
}

pub struct AssetCleanupHandler {
    catalog: Arc<dyn AssetCatalog>,
    store: Arc<dyn ObjectStore>,
    catalog_timeout: Duration,
    storage_timeout: Duration,
    log_salt: String,
}

impl AssetCleanupHandler {
    pub fn new(
        catalog: Arc<dyn AssetCatalog>,
        store: Arc<dyn ObjectStore>,
        catalog_timeout: Duration,
        storage_timeout: Duration,
        log_salt: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            store,
            catalog_timeout,
            storage_timeout,
            log_salt: log_salt.into(),
        }
    }

    pub async fn cleanup(&self, event: &PostDeletedEvent) -> Result<CleanupReport, HandlerError> {
        let mut report = CleanupReport::default();
        if event.asset_ids.is_empty() {
            debug!(post_id = %event.content_id, "No assets to clean up");
            return Ok(report);
        }

        let mut seen = HashSet::new();
        let mut failures = Vec::new();

        for asset_id in event.asset_ids.iter().filter(|id| seen.insert(*id)) {
            match self.clean_one(event, asset_id).await {
                Ok(outcome) => {
                    ASSETS_CLEANED_TOTAL
                        .with_label_values(&[outcome.as_str()])
                        .inc();
                    match outcome {
                        AssetOutcome::Removed => report.removed += 1,
                        AssetOutcome::AlreadyCleaned => report.already_cleaned += 1,
                        AssetOutcome::Skipped => report.skipped += 1,
                    }
                }
                Err(reason) => {
                    ASSETS_CLEANED_TOTAL.with_label_values(&["failed"]).inc();
                    warn!(
                        post_id = %event.content_id,
                        asset_id = %asset_id,
                        error = %reason,
                        "Asset cleanup failed"
                    );
                    failures.push(format!("{}: {}", asset_id, reason));
                }
            }
        }

        if !failures.is_empty() {
            return Err(HandlerError::retryable(format!(
                "{} of {} assets not cleaned ({})",
                failures.len(),
                seen.len(),
                failures.join("; ")
            )));
        }

        info!(
            post_id = %event.content_id,
            removed = report.removed,
            already_cleaned = report.already_cleaned,
            skipped = report.skipped,
            "Asset cleanup complete"
        );
        Ok(report)
    }

    async fn clean_one(
        &self,
        event: &PostDeletedEvent,
        asset_id: &AssetId,
    ) -> Result<AssetOutcome, CleanupError> {
        let record = bounded(self.catalog_timeout, self.catalog.find_by_id(asset_id)).await?;

        let Some(record) = record else {
            debug!(asset_id = %asset_id, "Asset already cleaned");
            return Ok(AssetOutcome::AlreadyCleaned);
        };

        if record.owner_id != event.owner_id {
            warn!(
                post_id = %event.content_id,
                asset_id = %asset_id,
                asset_owner = %log_safe_id(record.owner_id.as_str(), &self.log_salt),
                event_owner = %log_safe_id(event.owner_id.as_str(), &self.log_salt),
                "Asset belongs to another owner, skipping"
            );
            return Ok(AssetOutcome::Skipped);
        }

        let outcome = tokio::time::timeout(
            self.storage_timeout,
            self.store.delete(&record.external_storage_key),
        )
        .await
        .map_err(|_| StorageError::Timeout(self.storage_timeout))
        .and_then(|r| r)?;

        if outcome == DeleteOutcome::NotFound {
            debug!(
                asset_id = %asset_id,
                storage_key = %record.external_storage_key,
                backend = self.store.backend(),
                "Remote object already gone"
            );
        }

        // A concurrent delivery may have removed the record in between;
        // either way it is gone now.
        bounded(self.catalog_timeout, self.catalog.delete(asset_id)).await?;

        info!(post_id = %event.content_id, asset_id = %asset_id, "Asset removed");
        Ok(AssetOutcome::Removed)
    }
}

#[async_trait]
impl EventHandler for AssetCleanupHandler {
    type Event = PostDeletedEvent;

    async fn handle(&self, event: PostDeletedEvent) -> Result<(), HandlerError> {
        self.cleanup(&event).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryObjectStore;
    use crate::catalog::MemoryAssetCatalog;
    use murmur_types::{AssetRecord, PostId, UserId};

    fn asset(id: &str, owner: &str) -> AssetRecord {
        AssetRecord {
            id: AssetId::new(id),
            external_storage_key: format!("uploads/{}", id),
            owner_id: UserId::new(owner),
        }
    }

    fn event(owner: &str, ids: &[&str]) -> PostDeletedEvent {
        PostDeletedEvent {
            content_id: PostId::new("p1"),
            owner_id: UserId::new(owner),
            asset_ids: ids.iter().map(|id| AssetId::new(*id)).collect(),
        }
    }

    fn handler(
        catalog: Arc<MemoryAssetCatalog>,
        store: Arc<MemoryObjectStore>,
    ) -> AssetCleanupHandler {
        AssetCleanupHandler::new(
            catalog,
            store,
            Duration::from_secs(1),
            Duration::from_secs(1),
            "test-salt",
        )
    }

    #[tokio::test]
    async fn test_empty_event_is_trivial_success() {
        let store = Arc::new(MemoryObjectStore::new());
        let handler = handler(Arc::new(MemoryAssetCatalog::new()), store.clone());

        let report = handler.cleanup(&event("u1", &[])).await.unwrap();

        assert_eq!(report, CleanupReport::default());
        assert!(store.delete_calls().is_empty());
    }

    #[tokio::test]
    async fn test_other_owner_is_skipped() {
        let catalog = Arc::new(MemoryAssetCatalog::with_assets([
            asset("a1", "u1"),
            asset("a2", "u2"),
        ]));
        let store = Arc::new(MemoryObjectStore::with_objects(["uploads/a1", "uploads/a2"]));
        let handler = handler(catalog.clone(), store.clone());

        let report = handler.cleanup(&event("u1", &["a1", "a2"])).await.unwrap();

        assert_eq!(report.removed, 1);
        assert_eq!(report.skipped, 1);
        assert!(catalog.contains("a2"));
        assert!(store.contains("uploads/a2"));
    }

    #[tokio::test]
    async fn test_missing_remote_object_still_removes_record() {
        let catalog = Arc::new(MemoryAssetCatalog::with_assets([asset("a1", "u1")]));
        let store = Arc::new(MemoryObjectStore::new());
        let handler = handler(catalog.clone(), store);

        let report = handler.cleanup(&event("u1", &["a1"])).await.unwrap();

        assert_eq!(report.removed, 1);
        assert!(catalog.is_empty());
    }

    #[tokio::test]
    async fn test_failure_keeps_record_and_continues() {
        let catalog = Arc::new(MemoryAssetCatalog::with_assets([
            asset("a1", "u1"),
            asset("a2", "u1"),
        ]));
        let store = Arc::new(MemoryObjectStore::with_objects(["uploads/a1", "uploads/a2"]));
        store.fail_next("uploads/a1", 1);
        let handler = handler(catalog.clone(), store.clone());

        let err = handler.cleanup(&event("u1", &["a1", "a2"])).await.unwrap_err();

        assert!(matches!(err, HandlerError::Retryable(_)));
        assert!(catalog.contains("a1"));
        assert!(!catalog.contains("a2"));

        let report = handler.cleanup(&event("u1", &["a1", "a2"])).await.unwrap();
        assert_eq!(report.removed, 1);
        assert_eq!(report.already_cleaned, 1);
        assert!(catalog.is_empty());
    }

    #[tokio::test]
    async fn test_failure_reason_names_the_failing_side() {
        let catalog = Arc::new(MemoryAssetCatalog::with_assets([asset("a1", "u1")]));
        let store = Arc::new(MemoryObjectStore::with_objects(["uploads/a1"]));
        store.fail_next("uploads/a1", 1);
        let handler = handler(catalog.clone(), store);

        let err = handler.cleanup(&event("u1", &["a1"])).await.unwrap_err();
        assert!(err.to_string().contains("a1: storage:"), "{}", err);

        catalog.set_failing(true);
        let err = handler.cleanup(&event("u1", &["a1"])).await.unwrap_err();
        assert!(err.to_string().contains("a1: catalog:"), "{}", err);
    }

    #[tokio::test]
    async fn test_catalog_outage_is_retryable() {
        let catalog = Arc::new(MemoryAssetCatalog::with_assets([asset("a1", "u1")]));
        catalog.set_failing(true);
        let store = Arc::new(MemoryObjectStore::with_objects(["uploads/a1"]));
        let handler = handler(catalog, store.clone());

        assert!(handler.handle(event("u1", &["a1"])).await.is_err());
        assert!(store.contains("uploads/a1"));
    }

    #[tokio::test]
    async fn test_duplicate_ids_are_processed_once() {
        let catalog = Arc::new(MemoryAssetCatalog::with_assets([asset("a1", "u1")]));
        let store = Arc::new(MemoryObjectStore::with_objects(["uploads/a1"]));
        let handler = handler(catalog, store.clone());

        let report = handler.cleanup(&event("u1", &["a1", "a1"])).await.unwrap();

        assert_eq!(report.removed, 1);
        assert_eq!(store.attempts_for("uploads/a1"), 1);
    }
}
