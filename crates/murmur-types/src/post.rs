// ============================================================================
// Posts, assets and listings
// ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AssetId, PostId, UserId};

/// A content item owned by the post service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub owner_id: UserId,
    pub content: String,
    /// Assets attached at creation; they belong to the media service
    #[serde(default)]
    pub asset_ids: Vec<AssetId>,
    pub created_at: DateTime<Utc>,
}

impl Post {
    pub fn new(owner_id: UserId, content: impl Into<String>, asset_ids: Vec<AssetId>) -> Self {
        Self {
            id: PostId::generate(),
            owner_id,
            content: content.into(),
            asset_ids,
            created_at: Utc::now(),
        }
    }
}

/// Catalog row for a stored asset, owned by the media service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: AssetId,
    /// Key of the object in remote storage
    pub external_storage_key: String,
    pub owner_id: UserId,
}

/// Pagination block of a listing response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub pages: u64,
}

impl Pagination {
    pub fn new(total: u64, page: u32, limit: u32) -> Self {
        let pages = if limit == 0 {
            0
        } else {
            total.div_ceil(limit as u64)
        };
        Self {
            total,
            page,
            limit,
            pages,
        }
    }
}

/// One page of posts, newest first. This is the value cached under
/// `listing:<page>:<limit>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingEnvelope {
    pub items: Vec<Post>,
    pub pagination: Pagination,
}
