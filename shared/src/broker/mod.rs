// Broker module: durable topic exchange plumbing shared by publisher and
// consumer.
//
// One ConnectionManager per process owns the broker connection and channel.
// The publisher and consumer both go through it, so a dropped connection is
// noticed by whichever side touches it first and re-established lazily.

pub mod amqp;
pub mod channel;
pub mod circuit_breaker;
pub mod connection;
pub mod consumer;
pub mod dead_letter;
pub mod error;
pub mod memory;
pub mod publisher;
pub mod topic;

// Re-export commonly used types
pub use amqp::AmqpConnector;
pub use channel::{Acker, BrokerChannel, Connector, Delivery, DeliveryStream, QueueIdentity, SubscriptionSpec};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};
pub use connection::ConnectionManager;
pub use consumer::{DeliveryOutcome, EventHandler, Subscriber, SubscriberConfig};
pub use dead_letter::{MemoryRedeliveryTracker, RedeliveryTracker, RedisRedeliveryTracker};
pub use error::{BrokerError, HandlerError};
pub use memory::InMemoryBroker;
pub use publisher::{publish_or_log, EventPublisher, Publish};
pub use topic::topic_matches;
