// ============================================================================
// Content Service
// ============================================================================
//
// Post service operations. Reads go through the read cache; writes follow
// mutate-then-invalidate and then announce the change on the topic exchange:
//
//   create: insert  -> invalidate -> publish post.created
//   delete: delete  -> invalidate -> publish post.deleted
//
// Publishing is fire-and-forget: a broker outage is logged and counted, the
// write still succeeds. Asset cleanup for that post then never runs, which is
// the accepted cost of not coupling the write path to the broker.
//
// ============================================================================

use murmur_config::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT, MAX_POST_CONTENT_LEN, MIN_POST_CONTENT_LEN};
use murmur_error::{AppError, AppResult};
use murmur_types::{
    AssetId, ListingEnvelope, Pagination, Post, PostCreatedEvent, PostDeletedEvent, PostId,
    UserId, POST_CREATED, POST_DELETED,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::broker::{publish_or_log, Publish};
use crate::cache::{item_key, listing_key, CacheInvalidator, KeyFamily, ReadThrough};
use crate::catalog::{bounded, PostCatalog};
use crate::utils::log_safe_id;

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePostRequest {
    pub content: String,
    #[serde(default)]
    pub media_ids: Option<Vec<AssetId>>,
}

/// `?page=&limit=` of the listing endpoint
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl ListQuery {
    /// Page starts at 1; limit defaults to 10 and is clamped to 1..=100
    pub fn normalize(self) -> (u32, u32) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT);
        (page, limit)
    }
}

#[derive(Clone)]
pub struct ContentService {
    posts: Arc<dyn PostCatalog>,
    reads: ReadThrough,
    invalidator: CacheInvalidator,
    events: Arc<dyn Publish>,
    catalog_timeout: Duration,
    log_salt: String,
}

impl ContentService {
    pub fn new(
        posts: Arc<dyn PostCatalog>,
        reads: ReadThrough,
        invalidator: CacheInvalidator,
        events: Arc<dyn Publish>,
        catalog_timeout: Duration,
        log_salt: impl Into<String>,
    ) -> Self {
        Self {
            posts,
            reads,
            invalidator,
            events,
            catalog_timeout,
            log_salt: log_salt.into(),
        }
    }

    pub async fn create(&self, owner: UserId, request: CreatePostRequest) -> AppResult<Post> {
        validate_content(&request.content)?;

        let post = Post::new(owner, request.content, request.media_ids.unwrap_or_default());
        bounded(self.catalog_timeout, self.posts.insert(&post)).await?;
        self.invalidator.after_write(&post.id).await;

        info!(
            post_id = %post.id,
            owner = %log_safe_id(post.owner_id.as_str(), &self.log_salt),
            assets = post.asset_ids.len(),
            "Post created"
        );

        let event = PostCreatedEvent {
            content_id: post.id.clone(),
            owner_id: post.owner_id.clone(),
            asset_ids: post.asset_ids.clone(),
        };
        publish_or_log(self.events.as_ref(), POST_CREATED, &event).await;

        Ok(post)
    }

    pub async fn get(&self, id: &PostId) -> AppResult<Post> {
        let key = item_key(id);
        if let Some(post) = self.reads.get_json::<Post>(KeyFamily::Item, &key).await {
            return Ok(post);
        }

        let post = bounded(self.catalog_timeout, self.posts.find_by_id(id))
            .await?
            .ok_or_else(|| AppError::not_found(format!("post {}", id)))?;

        self.reads.put_json(KeyFamily::Item, &key, &post).await;
        Ok(post)
    }

    pub async fn list(&self, query: ListQuery) -> AppResult<ListingEnvelope> {
        let (page, limit) = query.normalize();
        let key = listing_key(page, limit);
        if let Some(listing) = self
            .reads
            .get_json::<ListingEnvelope>(KeyFamily::Listing, &key)
            .await
        {
            return Ok(listing);
        }

        let offset = u64::from(page - 1) * u64::from(limit);
        let total = bounded(self.catalog_timeout, self.posts.count()).await?;
        let items = bounded(self.catalog_timeout, self.posts.find_page(offset, limit)).await?;

        let listing = ListingEnvelope {
            items,
            pagination: Pagination::new(total, page, limit),
        };
        debug!(cache_key = %key, items = listing.items.len(), "Listing loaded from catalog");

        self.reads.put_json(KeyFamily::Listing, &key, &listing).await;
        Ok(listing)
    }

    /// Delete a post owned by `caller`. Nothing is published unless the
    /// catalog delete happened.
    pub async fn delete(&self, caller: &UserId, id: &PostId) -> AppResult<()> {
        // Ownership is checked against the catalog, never a cached copy.
        let post = bounded(self.catalog_timeout, self.posts.find_by_id(id))
            .await?
            .ok_or_else(|| AppError::not_found(format!("post {}", id)))?;

        if &post.owner_id != caller {
            return Err(AppError::forbidden("post belongs to another user"));
        }

        if !bounded(self.catalog_timeout, self.posts.delete(id)).await? {
            return Err(AppError::not_found(format!("post {}", id)));
        }
        self.invalidator.after_write(id).await;

        info!(
            post_id = %id,
            owner = %log_safe_id(caller.as_str(), &self.log_salt),
            assets = post.asset_ids.len(),
            "Post deleted"
        );

        let event = PostDeletedEvent {
            content_id: post.id,
            owner_id: post.owner_id,
            asset_ids: post.asset_ids,
        };
        publish_or_log(self.events.as_ref(), POST_DELETED, &event).await;

        Ok(())
    }
}

fn validate_content(content: &str) -> AppResult<()> {
    let len = content.chars().count();
    if len < MIN_POST_CONTENT_LEN {
        return Err(AppError::validation(format!(
            "content must be at least {} characters",
            MIN_POST_CONTENT_LEN
        )));
    }
    if len > MAX_POST_CONTENT_LEN {
        return Err(AppError::validation(format!(
            "content must be at most {} characters",
            MAX_POST_CONTENT_LEN
        )));
    }
    Ok(())
}
