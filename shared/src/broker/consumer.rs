// ============================================================================
// Event Consumer
// ============================================================================
//
// Ack contract:
// - ack exactly once, only after the handler returned Ok
// - never ack a failed delivery; it is nacked with requeue so the broker
//   redelivers it (handlers must therefore be idempotent)
//
// Per message: Delivered -> Processing -> {Acked | RedeliveryPending}
//
// Bounded redelivery: failures are counted per (subscription, event_id), so
// every queue bound to the exchange spends its own budget on its own copy.
// When the count reaches `max_deliveries` the event is published as a
// dead-letter record and only then acked; if that publish fails the event is
// requeued instead.
// Payloads that do not decode can never succeed and are dead-lettered on
// first sight.
//
// Subscription lifecycle: when the delivery stream ends (connection lost)
// the worker re-subscribes through the connection manager with exponential
// backoff until the shutdown token is cancelled.
//
// ============================================================================

use async_trait::async_trait;
use futures_util::StreamExt;
use murmur_config::BrokerConfig;
use murmur_metrics::{CONSUMER_RESUBSCRIBES_TOTAL, DELIVERIES_TOTAL};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::channel::{
    BrokerChannel, Connector, Delivery, DeliveryStream, QueueIdentity, SubscriptionSpec,
};
use super::connection::ConnectionManager;
use super::dead_letter::{send_to_dead_letter, RedeliveryTracker};
use super::error::{BrokerError, HandlerError};
use super::publisher::Publish;

const INITIAL_RESUBSCRIBE_BACKOFF: Duration = Duration::from_millis(100);
const MAX_RESUBSCRIBE_BACKOFF: Duration = Duration::from_secs(30);
const MAX_REDELIVERY_BACKOFF: Duration = Duration::from_secs(5);

/// Idempotent handler for one event type
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Payload type, decoded from the JSON body
    type Event: DeserializeOwned + Send + 'static;

    /// `Ok` means the event may be acked. Any error leads to redelivery.
    async fn handle(&self, event: Self::Event) -> Result<(), HandlerError>;
}

#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    pub prefetch: u16,
    pub handler_timeout: Duration,
    /// Deliveries before dead-lettering (0 = unbounded redelivery)
    pub max_deliveries: u32,
    /// Delay before requeueing, doubled per failure of the same event
    pub redelivery_backoff: Duration,
    pub initial_resubscribe_backoff: Duration,
    pub max_resubscribe_backoff: Duration,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self::from(&BrokerConfig::default())
    }
}

impl From<&BrokerConfig> for SubscriberConfig {
    fn from(config: &BrokerConfig) -> Self {
        Self {
            prefetch: config.prefetch.max(1),
            handler_timeout: config.handler_timeout(),
            max_deliveries: config.max_deliveries,
            redelivery_backoff: config.redelivery_backoff(),
            initial_resubscribe_backoff: INITIAL_RESUBSCRIBE_BACKOFF,
            max_resubscribe_backoff: MAX_RESUBSCRIBE_BACKOFF,
        }
    }
}

/// How a delivery was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Handler succeeded and the delivery was acked
    Acked,
    /// Not acked; the broker will deliver it again
    RedeliveryPending,
    /// Published as a dead-letter record, then acked
    DeadLettered,
    /// Undecodable payload acked without handling (dead-lettering disabled)
    Discarded,
}

impl DeliveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryOutcome::Acked => "acked",
            DeliveryOutcome::RedeliveryPending => "redelivery",
            DeliveryOutcome::DeadLettered => "dead_lettered",
            DeliveryOutcome::Discarded => "discarded",
        }
    }
}

/// Subscribes handlers to the topic exchange through the shared connection
/// manager
pub struct Subscriber<C: Connector> {
    connections: Arc<ConnectionManager<C>>,
    dead_letters: Arc<dyn Publish>,
    tracker: Arc<dyn RedeliveryTracker>,
    config: SubscriberConfig,
}

impl<C: Connector> Subscriber<C> {
    pub fn new(
        connections: Arc<ConnectionManager<C>>,
        dead_letters: Arc<dyn Publish>,
        tracker: Arc<dyn RedeliveryTracker>,
        config: SubscriberConfig,
    ) -> Self {
        Self {
            connections,
            dead_letters,
            tracker,
            config,
        }
    }

    /// Declare and bind the subscription queue, then process deliveries on a
    /// background task until `shutdown` is cancelled.
    ///
    /// The queue exists when this returns, so events published afterwards
    /// are captured. Call once per subscription at start-up.
    pub async fn subscribe<H: EventHandler>(
        &self,
        spec: SubscriptionSpec,
        handler: Arc<H>,
        shutdown: CancellationToken,
    ) -> Result<JoinHandle<()>, BrokerError> {
        let (channel, stream) = open_stream(&self.connections, &spec, self.config.prefetch).await?;
        let scope = redelivery_scope(&spec);

        info!(
            subscription = %spec.describe(),
            redelivery_scope = %scope,
            prefetch = self.config.prefetch,
            max_deliveries = self.config.max_deliveries,
            "Consuming events"
        );

        let worker = Worker {
            connections: self.connections.clone(),
            dead_letters: self.dead_letters.clone(),
            tracker: self.tracker.clone(),
            config: self.config.clone(),
            spec,
            scope,
            handler,
            shutdown,
        };
        Ok(tokio::spawn(worker.run(channel, stream)))
    }
}

/// Namespace for the redelivery counter of one subscription. Consumers of
/// the same durable queue share the copy and so share the count; every
/// exclusive queue is its own copy.
fn redelivery_scope(spec: &SubscriptionSpec) -> String {
    match &spec.queue {
        QueueIdentity::Durable(name) => name.clone(),
        QueueIdentity::Exclusive => format!("exclusive-{}", Uuid::new_v4().simple()),
    }
}

async fn open_stream<C: Connector>(
    connections: &ConnectionManager<C>,
    spec: &SubscriptionSpec,
    prefetch: u16,
) -> Result<(C::Channel, DeliveryStream), BrokerError> {
    let channel = connections.ensure_channel().await?;
    match channel
        .subscribe(connections.exchange(), spec, prefetch)
        .await
    {
        Ok(stream) => Ok((channel, stream)),
        Err(e) => {
            connections.invalidate(&channel).await;
            Err(e)
        }
    }
}

struct Worker<C: Connector, H: EventHandler> {
    connections: Arc<ConnectionManager<C>>,
    dead_letters: Arc<dyn Publish>,
    tracker: Arc<dyn RedeliveryTracker>,
    config: SubscriberConfig,
    spec: SubscriptionSpec,
    scope: String,
    handler: Arc<H>,
    shutdown: CancellationToken,
}

impl<C: Connector, H: EventHandler> Worker<C, H> {
    async fn run(self, mut channel: C::Channel, mut stream: DeliveryStream) {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                next = stream.next() => next,
            };

            match next {
                Some(Ok(delivery)) => {
                    self.process(delivery).await;
                }
                Some(Err(e)) => {
                    warn!(subscription = %self.spec.describe(), error = %e, "Delivery stream error");
                    self.connections.invalidate(&channel).await;
                    match self.resubscribe().await {
                        Some(fresh) => (channel, stream) = fresh,
                        None => break,
                    }
                }
                None => {
                    warn!(subscription = %self.spec.describe(), "Delivery stream ended");
                    match self.resubscribe().await {
                        Some(fresh) => (channel, stream) = fresh,
                        None => break,
                    }
                }
            }
        }

        info!(subscription = %self.spec.describe(), "Subscription stopped");
    }

    /// Re-establish the subscription, backing off between attempts.
    /// Returns None if shutdown was requested first.
    async fn resubscribe(&self) -> Option<(C::Channel, DeliveryStream)> {
        let mut backoff = self.config.initial_resubscribe_backoff;

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return None,
                _ = tokio::time::sleep(backoff) => {}
            }

            match open_stream(&self.connections, &self.spec, self.config.prefetch).await {
                Ok(opened) => {
                    CONSUMER_RESUBSCRIBES_TOTAL.inc();
                    info!(subscription = %self.spec.describe(), "Re-subscribed");
                    return Some(opened);
                }
                Err(e) => {
                    backoff = (backoff * 2).min(self.config.max_resubscribe_backoff);
                    warn!(
                        subscription = %self.spec.describe(),
                        error = %e,
                        retry_in_ms = backoff.as_millis() as u64,
                        "Re-subscribe failed"
                    );
                }
            }
        }
    }

    async fn process(&self, delivery: Delivery) -> DeliveryOutcome {
        let routing_key = delivery.event.routing_key.clone();
        let event_id = delivery.event.event_id.clone();
        debug!(
            event_id = %event_id,
            routing_key = %routing_key,
            redelivered = delivery.redelivered,
            "Processing delivery"
        );

        let outcome = match serde_json::from_slice::<H::Event>(&delivery.event.payload) {
            Err(e) => self.reject_poison(delivery, e).await,
            Ok(event) => match self.invoke(event).await {
                Ok(()) => self.acknowledge(delivery).await,
                Err(e) => self.handle_failure(delivery, e).await,
            },
        };

        DELIVERIES_TOTAL
            .with_label_values(&[routing_key.as_str(), outcome.as_str()])
            .inc();
        outcome
    }

    async fn invoke(&self, event: H::Event) -> Result<(), HandlerError> {
        match tokio::time::timeout(self.config.handler_timeout, self.handler.handle(event)).await {
            Ok(result) => result,
            Err(_) => Err(HandlerError::Timeout(self.config.handler_timeout)),
        }
    }

    async fn acknowledge(&self, delivery: Delivery) -> DeliveryOutcome {
        let event_id = delivery.event.event_id.clone();
        let redelivered = delivery.redelivered;

        if let Err(e) = delivery.ack().await {
            // The broker requeues unacked messages when the channel closes;
            // the handler will see this event again.
            warn!(event_id = %event_id, error = %e, "Ack failed, event will be redelivered");
            return DeliveryOutcome::RedeliveryPending;
        }

        if redelivered && self.config.max_deliveries > 0 {
            if let Err(e) = self.tracker.clear(&self.scope, &event_id).await {
                debug!(event_id = %event_id, error = %e, "Could not clear retry count");
            }
        }

        info!(event_id = %event_id, "Event handled");
        DeliveryOutcome::Acked
    }

    async fn handle_failure(&self, delivery: Delivery, error: HandlerError) -> DeliveryOutcome {
        let event_id = delivery.event.event_id.clone();
        let reason = error.to_string();

        if self.config.max_deliveries == 0 {
            warn!(event_id = %event_id, error = %reason, "Handler failed, requeueing");
            return self.requeue(delivery, 1).await;
        }

        let failures = match self.tracker.record_failure(&self.scope, &event_id).await {
            Ok(count) => count,
            Err(e) => {
                warn!(
                    event_id = %event_id,
                    error = %e,
                    "Retry count unavailable, requeueing without a bound"
                );
                return self.requeue(delivery, 1).await;
            }
        };

        if failures >= self.config.max_deliveries {
            error!(
                event_id = %event_id,
                failures,
                max_deliveries = self.config.max_deliveries,
                error = %reason,
                "Event exceeded max deliveries"
            );
            return self.dead_letter(delivery, failures, &reason).await;
        }

        warn!(
            event_id = %event_id,
            failures,
            max_deliveries = self.config.max_deliveries,
            error = %reason,
            "Handler failed, event will be redelivered"
        );
        self.requeue(delivery, failures).await
    }

    async fn reject_poison(&self, delivery: Delivery, error: serde_json::Error) -> DeliveryOutcome {
        let reason = format!("undecodable payload: {}", error);

        if self.config.max_deliveries == 0 {
            error!(
                target: "dlq",
                event_id = %delivery.event.event_id,
                routing_key = %delivery.event.routing_key,
                payload = %String::from_utf8_lossy(&delivery.event.payload),
                reason = %reason,
                "Undecodable event discarded"
            );
            return match delivery.ack().await {
                Ok(()) => DeliveryOutcome::Discarded,
                Err(_) => DeliveryOutcome::RedeliveryPending,
            };
        }

        self.dead_letter(delivery, 1, &reason).await
    }

    async fn dead_letter(&self, delivery: Delivery, failures: u32, reason: &str) -> DeliveryOutcome {
        let event_id = delivery.event.event_id.clone();

        if let Err(e) =
            send_to_dead_letter(self.dead_letters.as_ref(), &delivery.event, failures, reason).await
        {
            error!(
                event_id = %event_id,
                error = %e,
                "Dead-letter publish failed, requeueing original"
            );
            return self.requeue(delivery, failures).await;
        }

        if let Err(e) = delivery.ack().await {
            // The count stays, so the redelivered copy goes straight back to
            // the dead-letter path on its next failure.
            warn!(event_id = %event_id, error = %e, "Ack after dead-letter failed");
            return DeliveryOutcome::RedeliveryPending;
        }
        if let Err(e) = self.tracker.clear(&self.scope, &event_id).await {
            debug!(event_id = %event_id, error = %e, "Could not clear retry count");
        }
        DeliveryOutcome::DeadLettered
    }

    async fn requeue(&self, delivery: Delivery, failures: u32) -> DeliveryOutcome {
        let delay = redelivery_delay(self.config.redelivery_backoff, failures);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let event_id = delivery.event.event_id.clone();
        if let Err(e) = delivery.nack_requeue().await {
            warn!(event_id = %event_id, error = %e, "Nack failed, broker will redeliver on reconnect");
        }
        DeliveryOutcome::RedeliveryPending
    }
}

fn redelivery_delay(base: Duration, failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exponent)
        .min(MAX_REDELIVERY_BACKOFF)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::dead_letter::MemoryRedeliveryTracker;
    use crate::broker::memory::InMemoryBroker;
    use crate::broker::publisher::EventPublisher;
    use crate::broker::channel::Acker;
    use crate::broker::CircuitBreakerConfig;
    use murmur_types::{DeadLetterRecord, DomainEvent};
    use serde::Deserialize;
    use std::sync::atomic::{AtomicU32, Ordering};

    const QUEUE: &str = "test.queue";

    #[derive(Deserialize)]
    struct Ping {
        n: u32,
    }

    /// Fails the first `fail_times` invocations
    struct Flaky {
        fail_times: u32,
        calls: AtomicU32,
    }

    impl Flaky {
        fn new(fail_times: u32) -> Arc<Self> {
            Arc::new(Self {
                fail_times,
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EventHandler for Flaky {
        type Event = Ping;

        async fn handle(&self, event: Ping) -> Result<(), HandlerError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.fail_times {
                return Err(HandlerError::retryable(format!("attempt {} for {}", call, event.n)));
            }
            Ok(())
        }
    }

    struct Harness {
        broker: InMemoryBroker,
        connections: Arc<ConnectionManager<InMemoryBroker>>,
        publisher: Arc<EventPublisher<InMemoryBroker>>,
        tracker: Arc<MemoryRedeliveryTracker>,
        subscriber: Subscriber<InMemoryBroker>,
        shutdown: CancellationToken,
    }

    fn harness(max_deliveries: u32) -> Harness {
        let broker = InMemoryBroker::new();
        let connections = Arc::new(ConnectionManager::new(
            broker.clone(),
            "posts_exchange",
            Duration::from_millis(200),
        ));
        let publisher = Arc::new(EventPublisher::new(
            connections.clone(),
            CircuitBreakerConfig::default(),
        ));
        let tracker = Arc::new(MemoryRedeliveryTracker::new());
        let subscriber = Subscriber::new(
            connections.clone(),
            publisher.clone(),
            tracker.clone(),
            SubscriberConfig {
                prefetch: 1,
                handler_timeout: Duration::from_millis(500),
                max_deliveries,
                redelivery_backoff: Duration::ZERO,
                initial_resubscribe_backoff: Duration::from_millis(10),
                max_resubscribe_backoff: Duration::from_millis(50),
            },
        );
        Harness {
            broker,
            connections,
            publisher,
            tracker,
            subscriber,
            shutdown: CancellationToken::new(),
        }
    }

    /// Settles with a fixed answer
    struct StubAcker {
        accept: bool,
    }

    #[async_trait]
    impl Acker for StubAcker {
        async fn ack(&self) -> Result<(), BrokerError> {
            if self.accept {
                Ok(())
            } else {
                Err(BrokerError::Channel("channel closed before ack".to_string()))
            }
        }

        async fn nack(&self, _requeue: bool) -> Result<(), BrokerError> {
            self.ack().await
        }
    }

    fn worker(h: &Harness) -> Worker<InMemoryBroker, Flaky> {
        Worker {
            connections: h.connections.clone(),
            dead_letters: h.publisher.clone(),
            tracker: h.tracker.clone(),
            config: h.subscriber.config.clone(),
            spec: SubscriptionSpec::durable("ping", QUEUE),
            scope: QUEUE.to_string(),
            handler: Flaky::new(0),
            shutdown: h.shutdown.clone(),
        }
    }

    fn delivery(event_id: &str, accept: bool) -> Delivery {
        let mut event = DomainEvent::new("ping", br#"{"n":1}"#.to_vec());
        event.event_id = event_id.to_string();
        Delivery::new(event, true, Box::new(StubAcker { accept }))
    }

    async fn settle(broker: &InMemoryBroker) {
        for _ in 0..100 {
            if broker.queue_depth(QUEUE) == Some(0) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("queue {} did not drain", QUEUE);
    }

    #[tokio::test]
    async fn test_success_acks_once() {
        let h = harness(5);
        let handler = Flaky::new(0);
        h.subscriber
            .subscribe(SubscriptionSpec::durable("ping", QUEUE), handler.clone(), h.shutdown.clone())
            .await
            .unwrap();

        h.publisher.publish(&DomainEvent::new("ping", br#"{"n":1}"#.to_vec())).await.unwrap();
        settle(&h.broker).await;

        assert_eq!(handler.calls(), 1);
        h.shutdown.cancel();
    }

    #[tokio::test]
    async fn test_failure_is_redelivered_until_success() {
        let h = harness(5);
        let handler = Flaky::new(2);
        h.subscriber
            .subscribe(SubscriptionSpec::durable("ping", QUEUE), handler.clone(), h.shutdown.clone())
            .await
            .unwrap();

        h.publisher.publish(&DomainEvent::new("ping", br#"{"n":1}"#.to_vec())).await.unwrap();
        settle(&h.broker).await;

        assert_eq!(handler.calls(), 3);
        assert!(h.broker.published_with_key("dead_letter.ping").is_empty());
        h.shutdown.cancel();
    }

    #[tokio::test]
    async fn test_dead_letter_after_max_deliveries() {
        let h = harness(3);
        let handler = Flaky::new(u32::MAX);
        h.subscriber
            .subscribe(SubscriptionSpec::durable("ping", QUEUE), handler.clone(), h.shutdown.clone())
            .await
            .unwrap();

        h.publisher.publish(&DomainEvent::new("ping", br#"{"n":7}"#.to_vec())).await.unwrap();
        settle(&h.broker).await;

        assert_eq!(handler.calls(), 3);
        let dead = h.broker.published_with_key("dead_letter.ping");
        assert_eq!(dead.len(), 1);
        let record: DeadLetterRecord = serde_json::from_slice(&dead[0].payload).unwrap();
        assert_eq!(record.delivery_count, 3);
        assert!(record.failure_reason.contains("attempt 3"));
        h.shutdown.cancel();
    }

    #[tokio::test]
    async fn test_poison_payload_dead_lettered_immediately() {
        let h = harness(5);
        let handler = Flaky::new(0);
        h.subscriber
            .subscribe(SubscriptionSpec::durable("ping", QUEUE), handler.clone(), h.shutdown.clone())
            .await
            .unwrap();

        h.publisher.publish(&DomainEvent::new("ping", b"not json".to_vec())).await.unwrap();
        settle(&h.broker).await;

        assert_eq!(handler.calls(), 0);
        assert_eq!(h.broker.published_with_key("dead_letter.ping").len(), 1);
        h.shutdown.cancel();
    }

    #[tokio::test]
    async fn test_dead_letter_clears_count_after_ack() {
        let h = harness(3);
        let worker = worker(&h);
        for _ in 0..3 {
            h.tracker.record_failure(QUEUE, "e1").await.unwrap();
        }

        let outcome = worker.dead_letter(delivery("e1", true), 3, "storage down").await;

        assert_eq!(outcome, DeliveryOutcome::DeadLettered);
        assert_eq!(h.tracker.failures(QUEUE, "e1"), 0);
    }

    #[tokio::test]
    async fn test_failed_ack_after_dead_letter_keeps_count() {
        let h = harness(3);
        let worker = worker(&h);
        for _ in 0..3 {
            h.tracker.record_failure(QUEUE, "e1").await.unwrap();
        }

        let outcome = worker.dead_letter(delivery("e1", false), 3, "storage down").await;

        assert_eq!(outcome, DeliveryOutcome::RedeliveryPending);
        assert_eq!(h.tracker.failures(QUEUE, "e1"), 3);
        assert_eq!(h.broker.published_with_key("dead_letter.ping").len(), 1);
    }

    #[test]
    fn test_redelivery_scope() {
        assert_eq!(redelivery_scope(&SubscriptionSpec::durable("ping", QUEUE)), QUEUE);
        let a = redelivery_scope(&SubscriptionSpec::exclusive("ping"));
        let b = redelivery_scope(&SubscriptionSpec::exclusive("ping"));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_handler_timeout_counts_as_failure() {
        struct Slow;

        #[async_trait]
        impl EventHandler for Slow {
            type Event = Ping;
            async fn handle(&self, _event: Ping) -> Result<(), HandlerError> {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            }
        }

        let h = harness(1);
        h.subscriber
            .subscribe(SubscriptionSpec::durable("ping", QUEUE), Arc::new(Slow), h.shutdown.clone())
            .await
            .unwrap();

        h.publisher.publish(&DomainEvent::new("ping", br#"{"n":1}"#.to_vec())).await.unwrap();
        settle(&h.broker).await;

        let dead = h.broker.published_with_key("dead_letter.ping");
        assert_eq!(dead.len(), 1);
        let record: DeadLetterRecord = serde_json::from_slice(&dead[0].payload).unwrap();
        assert!(record.failure_reason.contains("timed out"));
        h.shutdown.cancel();
    }

    #[tokio::test]
    async fn test_resubscribes_after_connection_drop() {
        let h = harness(5);
        let handler = Flaky::new(0);
        let task = h
            .subscriber
            .subscribe(SubscriptionSpec::durable("ping", QUEUE), handler.clone(), h.shutdown.clone())
            .await
            .unwrap();

        h.broker.drop_connections();
        h.publisher.publish(&DomainEvent::new("ping", br#"{"n":2}"#.to_vec())).await.unwrap();
        settle(&h.broker).await;

        assert_eq!(handler.calls(), 1);
        h.shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_stops_worker() {
        let h = harness(5);
        let task = h
            .subscriber
            .subscribe(SubscriptionSpec::durable("ping", QUEUE), Flaky::new(0), h.shutdown.clone())
            .await
            .unwrap();

        h.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("worker stops on shutdown")
            .unwrap();
    }

    #[test]
    fn test_redelivery_delay_doubles_and_caps() {
        let base = Duration::from_millis(200);
        assert_eq!(redelivery_delay(base, 1), Duration::from_millis(200));
        assert_eq!(redelivery_delay(base, 2), Duration::from_millis(400));
        assert_eq!(redelivery_delay(base, 30), MAX_REDELIVERY_BACKOFF);
        assert_eq!(redelivery_delay(Duration::ZERO, 4), Duration::ZERO);
    }
}
