// ============================================================================
// Dead-lettering for the consumer
// ============================================================================
//
// Without a bound, a handler that keeps failing on one event makes the broker
// redeliver it forever. The consumer counts failed deliveries per event_id
// within its subscription and, once the count reaches `max_deliveries`,
// publishes the event as a dead-letter record under
// `dead_letter.<routing_key>` and acks the original.
//
// Redis key: retry_count:{subscription}:{event_id} -> u32, TTL one day,
// refreshed per failure
//
// ============================================================================

use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use murmur_config::SECONDS_PER_DAY;
use murmur_redis::RedisClient;
use murmur_types::{dead_letter_routing_key, DeadLetterRecord, DomainEvent};
use std::time::Duration;
use tracing::{error, info, warn};

use super::error::BrokerError;
use super::publisher::Publish;

const REDIS_MAX_ATTEMPTS: u32 = 3;
const REDIS_INITIAL_BACKOFF_MS: u64 = 100;

/// Counts failed deliveries per event. `subscription` namespaces the count so
/// queues receiving their own copy of an event never share a budget.
#[async_trait]
pub trait RedeliveryTracker: Send + Sync {
    /// Record one failed delivery and return the failure count so far
    async fn record_failure(&self, subscription: &str, event_id: &str) -> Result<u32>;

    /// Forget an event once it has been handled
    async fn clear(&self, subscription: &str, event_id: &str) -> Result<()>;
}

fn retry_key(subscription: &str, event_id: &str) -> String {
    format!("retry_count:{}:{}", subscription, event_id)
}

/// Redelivery counter in Redis, shared by every consumer process
#[derive(Clone)]
pub struct RedisRedeliveryTracker {
    client: RedisClient,
    ttl_secs: i64,
}

impl RedisRedeliveryTracker {
    pub fn new(client: RedisClient) -> Self {
        Self {
            client,
            ttl_secs: SECONDS_PER_DAY as i64,
        }
    }
}

#[async_trait]
impl RedeliveryTracker for RedisRedeliveryTracker {
    async fn record_failure(&self, subscription: &str, event_id: &str) -> Result<u32> {
        let key = retry_key(subscription, event_id);
        let mut backoff = Duration::from_millis(REDIS_INITIAL_BACKOFF_MS);
        let mut attempt = 1;

        loop {
            let mut client = self.client.clone();
            match client.incr_with_expiry(&key, self.ttl_secs).await {
                Ok(count) => return Ok(count.max(0) as u32),
                Err(e) if attempt < REDIS_MAX_ATTEMPTS => {
                    warn!(
                        subscription = %subscription,
                        event_id = %event_id,
                        attempt,
                        error = %e,
                        "Redis retry counter update failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e).context("Failed to increment retry count"),
            }
        }
    }

    async fn clear(&self, subscription: &str, event_id: &str) -> Result<()> {
        let mut client = self.client.clone();
        client
            .del(retry_key(subscription, event_id))
            .await
            .context("Failed to clear retry count")?;
        Ok(())
    }
}

/// Process-local redelivery counter (tests, single-instance deployments)
#[derive(Default)]
pub struct MemoryRedeliveryTracker {
    counts: DashMap<String, u32>,
}

impl MemoryRedeliveryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failures(&self, subscription: &str, event_id: &str) -> u32 {
        self.counts
            .get(&retry_key(subscription, event_id))
            .map(|c| *c)
            .unwrap_or(0)
    }
}

#[async_trait]
impl RedeliveryTracker for MemoryRedeliveryTracker {
    async fn record_failure(&self, subscription: &str, event_id: &str) -> Result<u32> {
        let mut entry = self
            .counts
            .entry(retry_key(subscription, event_id))
            .or_insert(0);
        *entry += 1;
        Ok(*entry)
    }

    async fn clear(&self, subscription: &str, event_id: &str) -> Result<()> {
        self.counts.remove(&retry_key(subscription, event_id));
        Ok(())
    }
}

/// Publish `event` as a dead-letter record.
///
/// The record is also written to the `dlq` log target so it can be
/// recovered from logs if nobody consumes `dead_letter.#`.
pub async fn send_to_dead_letter(
    publisher: &dyn Publish,
    event: &DomainEvent,
    delivery_count: u32,
    failure_reason: &str,
) -> Result<(), BrokerError> {
    let record = DeadLetterRecord {
        event_id: event.event_id.clone(),
        routing_key: event.routing_key.clone(),
        payload: String::from_utf8_lossy(&event.payload).into_owned(),
        delivery_count,
        failure_reason: failure_reason.to_string(),
        dead_lettered_at: chrono::Utc::now(),
    };

    let routing_key = dead_letter_routing_key(&event.routing_key);
    let mut dead_letter = DomainEvent::json(routing_key.clone(), &record)?;
    dead_letter.event_id = format!("dlq-{}", event.event_id);

    error!(
        target: "dlq",
        event_id = %event.event_id,
        routing_key = %event.routing_key,
        delivery_count,
        failure_reason = %failure_reason,
        payload = %record.payload,
        "DLQ_MESSAGE: event moved to dead letter"
    );

    publisher.publish(&dead_letter).await?;

    info!(
        event_id = %event.event_id,
        dead_letter_routing_key = %routing_key,
        delivery_count,
        "Event dead-lettered"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingPublisher {
        events: Mutex<Vec<DomainEvent>>,
    }

    #[async_trait]
    impl Publish for RecordingPublisher {
        async fn publish(&self, event: &DomainEvent) -> Result<(), BrokerError> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_memory_tracker_counts_and_clears() {
        let tracker = MemoryRedeliveryTracker::new();
        assert_eq!(tracker.record_failure("q", "e1").await.unwrap(), 1);
        assert_eq!(tracker.record_failure("q", "e1").await.unwrap(), 2);
        assert_eq!(tracker.record_failure("q", "e2").await.unwrap(), 1);

        tracker.clear("q", "e1").await.unwrap();
        assert_eq!(tracker.failures("q", "e1"), 0);
        assert_eq!(tracker.failures("q", "e2"), 1);
    }

    #[tokio::test]
    async fn test_counts_are_per_subscription() {
        let tracker = MemoryRedeliveryTracker::new();
        tracker.record_failure("a", "e1").await.unwrap();
        tracker.record_failure("a", "e1").await.unwrap();
        assert_eq!(tracker.record_failure("b", "e1").await.unwrap(), 1);

        tracker.clear("b", "e1").await.unwrap();
        assert_eq!(tracker.failures("a", "e1"), 2);
        assert_eq!(tracker.failures("b", "e1"), 0);
    }

    #[tokio::test]
    async fn test_dead_letter_record_shape() {
        let publisher = RecordingPublisher::default();
        let event = DomainEvent::new("post.deleted", br#"{"content_id":"p1"}"#.to_vec());

        send_to_dead_letter(&publisher, &event, 5, "storage unavailable")
            .await
            .unwrap();

        let events = publisher.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].routing_key, "dead_letter.post.deleted");

        let record: DeadLetterRecord = serde_json::from_slice(&events[0].payload).unwrap();
        assert_eq!(record.event_id, event.event_id);
        assert_eq!(record.delivery_count, 5);
        assert_eq!(record.failure_reason, "storage unavailable");
        assert!(record.payload.contains("p1"));
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    #[serial_test::serial]
    async fn test_redis_tracker() {
        let client = RedisClient::connect("redis://localhost:6379").await.unwrap();
        let tracker = RedisRedeliveryTracker::new(client);
        let id = format!("test-{}", uuid::Uuid::new_v4());

        assert_eq!(tracker.record_failure("q1", &id).await.unwrap(), 1);
        assert_eq!(tracker.record_failure("q1", &id).await.unwrap(), 2);
        assert_eq!(tracker.record_failure("q2", &id).await.unwrap(), 1);
        tracker.clear("q1", &id).await.unwrap();
        assert_eq!(tracker.record_failure("q1", &id).await.unwrap(), 1);
        tracker.clear("q1", &id).await.unwrap();
        tracker.clear("q2", &id).await.unwrap();
    }
}
