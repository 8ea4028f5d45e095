// ============================================================================
// Broker seams
// ============================================================================
//
// Connector     - opens a channel (AMQP via lapin, or the in-process broker)
// BrokerChannel - declare / publish / subscribe on one open channel
// Delivery      - one received message; ack or nack consumes it, so a
//                 delivery is settled at most once
//
// ============================================================================

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use murmur_types::DomainEvent;

use super::error::BrokerError;

/// Opens broker channels
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Channel: BrokerChannel;

    async fn connect(&self) -> Result<Self::Channel, BrokerError>;
}

/// An open channel. Clones share the same underlying channel.
#[async_trait]
pub trait BrokerChannel: Clone + Send + Sync + 'static {
    /// False once the channel or its connection has closed
    fn is_open(&self) -> bool;

    /// Whether `other` is a clone of this same channel
    fn same_channel(&self, other: &Self) -> bool;

    /// Close the underlying connection. Errors are logged, not returned.
    async fn close(&self);

    /// Declare the durable topic exchange (idempotent)
    async fn declare_exchange(&self, exchange: &str) -> Result<(), BrokerError>;

    /// Publish to `exchange` under `event.routing_key`. Success means the
    /// broker accepted the frame, not that any queue received it.
    async fn publish(&self, exchange: &str, event: &DomainEvent) -> Result<(), BrokerError>;

    /// Declare and bind the queue described by `spec` and start consuming
    async fn subscribe(
        &self,
        exchange: &str,
        spec: &SubscriptionSpec,
        prefetch: u16,
    ) -> Result<DeliveryStream, BrokerError>;
}

/// Stream of deliveries for one subscription. It ends when the channel does.
pub type DeliveryStream = BoxStream<'static, Result<Delivery, BrokerError>>;

/// Identity of a subscription queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueIdentity {
    /// Server-named, exclusive, auto-deleted with the connection. Events
    /// published while no consumer is bound are lost.
    Exclusive,
    /// Named durable queue that buffers while no consumer is bound
    Durable(String),
}

/// What a consumer subscribes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSpec {
    /// Topic patterns bound to the queue (`post.deleted`, `post.*`, ...)
    pub patterns: Vec<String>,
    pub queue: QueueIdentity,
}

impl SubscriptionSpec {
    pub fn exclusive(pattern: impl Into<String>) -> Self {
        Self {
            patterns: vec![pattern.into()],
            queue: QueueIdentity::Exclusive,
        }
    }

    pub fn durable(pattern: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            patterns: vec![pattern.into()],
            queue: QueueIdentity::Durable(queue.into()),
        }
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.push(pattern.into());
        self
    }

    /// Label used in logs and metrics
    pub fn describe(&self) -> String {
        match &self.queue {
            QueueIdentity::Exclusive => format!("exclusive[{}]", self.patterns.join(",")),
            QueueIdentity::Durable(name) => format!("{}[{}]", name, self.patterns.join(",")),
        }
    }
}

/// Settles a delivery with the broker
#[async_trait]
pub trait Acker: Send + Sync {
    async fn ack(&self) -> Result<(), BrokerError>;
    async fn nack(&self, requeue: bool) -> Result<(), BrokerError>;
}

/// One message received from a subscription queue
pub struct Delivery {
    pub event: DomainEvent,
    /// Set by the broker when this message was delivered before and not acked
    pub redelivered: bool,
    acker: Box<dyn Acker>,
}

impl Delivery {
    pub fn new(event: DomainEvent, redelivered: bool, acker: Box<dyn Acker>) -> Self {
        Self {
            event,
            redelivered,
            acker,
        }
    }

    /// Acknowledge: the broker drops the message
    pub async fn ack(self) -> Result<(), BrokerError> {
        self.acker.ack().await
    }

    /// Reject and put the message back on its queue for redelivery
    pub async fn nack_requeue(self) -> Result<(), BrokerError> {
        self.acker.nack(true).await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("event_id", &self.event.event_id)
            .field("routing_key", &self.event.routing_key)
            .field("redelivered", &self.redelivered)
            .finish()
    }
}
