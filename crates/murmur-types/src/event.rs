// ============================================================================
// Events
// ============================================================================
//
// Routing keys follow `<aggregate>.<event>`. Payloads are UTF-8 JSON and
// decoders ignore unknown fields, so producers may add fields freely.
//
// ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::{AssetId, PostId, UserId};

/// Default exchange for post events
pub const POSTS_EXCHANGE: &str = "posts_exchange";

pub const POST_CREATED: &str = "post.created";
pub const POST_DELETED: &str = "post.deleted";

/// Prefix for dead-letter routing keys: `dead_letter.<routing_key>`
pub const DEAD_LETTER_PREFIX: &str = "dead_letter";

pub fn dead_letter_routing_key(routing_key: &str) -> String {
    format!("{}.{}", DEAD_LETTER_PREFIX, routing_key)
}

/// A serialized event as it crosses the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainEvent {
    pub event_id: String,
    pub routing_key: String,
    pub payload: Vec<u8>,
}

impl DomainEvent {
    pub fn new(routing_key: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            routing_key: routing_key.into(),
            payload,
        }
    }

    /// Serialize `value` as JSON under `routing_key`
    pub fn json<T: Serialize>(
        routing_key: impl Into<String>,
        value: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(routing_key, serde_json::to_vec(value)?))
    }
}

/// Published on `post.deleted`. `asset_ids` may be empty and may name assets
/// that are already gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostDeletedEvent {
    #[serde(alias = "post_id")]
    pub content_id: PostId,
    #[serde(alias = "user_id")]
    pub owner_id: UserId,
    #[serde(alias = "media_ids")]
    pub asset_ids: Vec<AssetId>,
}

/// Published on `post.created`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostCreatedEvent {
    pub content_id: PostId,
    pub owner_id: UserId,
    #[serde(default)]
    pub asset_ids: Vec<AssetId>,
}

/// Body published under `dead_letter.<routing_key>` once an event has
/// exhausted its deliveries or could not be decoded at all
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    pub event_id: String,
    pub routing_key: String,
    /// Original payload, lossily decoded as UTF-8
    pub payload: String,
    pub delivery_count: u32,
    pub failure_reason: String,
    pub dead_lettered_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deleted_event_ignores_unknown_fields() {
        let json = r#"{
            "content_id": "p1",
            "owner_id": "u1",
            "asset_ids": ["a1", "a2"],
            "schema": 3,
            "trace": {"span": "x"}
        }"#;
        let event: PostDeletedEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.asset_ids, vec![AssetId::new("a1"), AssetId::new("a2")]);
    }

    #[test]
    fn test_deleted_event_accepts_legacy_field_names() {
        let json = r#"{"post_id": "p1", "user_id": "u1", "media_ids": []}"#;
        let event: PostDeletedEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.content_id, PostId::new("p1"));
        assert!(event.asset_ids.is_empty());
    }

    #[test]
    fn test_deleted_event_requires_asset_ids() {
        let json = r#"{"content_id": "p1", "owner_id": "u1"}"#;
        assert!(serde_json::from_str::<PostDeletedEvent>(json).is_err());
    }

    #[test]
    fn test_dead_letter_routing_key() {
        assert_eq!(dead_letter_routing_key(POST_DELETED), "dead_letter.post.deleted");
    }
}
