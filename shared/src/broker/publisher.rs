// ============================================================================
// Event Publisher
// ============================================================================
//
// Serializes a domain event and hands it to the exchange under its routing
// key. Transport success is the only confirmation: an event whose routing
// key matches no bound queue is accepted by the broker and dropped.
//
// `publish_or_log` is the fire-and-forget entry point used after catalog
// writes. The write has already happened, so a broker outage must not fail
// the request; it is logged and counted instead.
//
// ============================================================================

use async_trait::async_trait;
use murmur_metrics::{EVENTS_PUBLISHED_TOTAL, EVENTS_PUBLISH_FAILED_TOTAL, EVENT_PUBLISH_LATENCY};
use murmur_types::DomainEvent;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error};

use super::channel::{BrokerChannel, Connector};
use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};
use super::connection::ConnectionManager;
use super::error::BrokerError;

/// Anything that can put an event on the exchange
#[async_trait]
pub trait Publish: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> Result<(), BrokerError>;
}

/// Publisher over the process-wide connection manager
pub struct EventPublisher<C: Connector> {
    connections: Arc<ConnectionManager<C>>,
    circuit_breaker: CircuitBreaker,
}

impl<C: Connector> EventPublisher<C> {
    pub fn new(connections: Arc<ConnectionManager<C>>, breaker: CircuitBreakerConfig) -> Self {
        Self {
            connections,
            circuit_breaker: CircuitBreaker::new("publisher", breaker),
        }
    }

    async fn publish_once(&self, event: &DomainEvent) -> Result<(), BrokerError> {
        let channel = self.connections.ensure_channel().await?;
        if let Err(e) = channel.publish(self.connections.exchange(), event).await {
            self.connections.invalidate(&channel).await;
            return Err(e);
        }
        Ok(())
    }
}

#[async_trait]
impl<C: Connector> Publish for EventPublisher<C> {
    async fn publish(&self, event: &DomainEvent) -> Result<(), BrokerError> {
        let timer = EVENT_PUBLISH_LATENCY.start_timer();
        let result = self
            .circuit_breaker
            .call(self.publish_once(event))
            .await
            .map_err(|e| match e {
                CircuitBreakerError::Open(since) => BrokerError::CircuitOpen(since),
                CircuitBreakerError::Timeout { timeout } => BrokerError::Timeout(timeout),
                CircuitBreakerError::Inner(inner) => inner,
            });
        timer.observe_duration();

        match &result {
            Ok(()) => {
                EVENTS_PUBLISHED_TOTAL
                    .with_label_values(&[event.routing_key.as_str()])
                    .inc();
                debug!(
                    routing_key = %event.routing_key,
                    event_id = %event.event_id,
                    bytes = event.payload.len(),
                    "Event published"
                );
            }
            Err(_) => {
                EVENTS_PUBLISH_FAILED_TOTAL
                    .with_label_values(&[event.routing_key.as_str()])
                    .inc();
            }
        }
        result
    }
}

/// Serialize `payload` as JSON and publish it under `routing_key`, logging
/// instead of failing. Returns the event id when the broker accepted it.
pub async fn publish_or_log<T>(publisher: &dyn Publish, routing_key: &str, payload: &T) -> Option<String>
where
    T: Serialize + Sync,
{
    let event = match DomainEvent::json(routing_key, payload) {
        Ok(event) => event,
        Err(e) => {
            error!(routing_key = %routing_key, error = %e, "Failed to encode event");
            return None;
        }
    };

    match publisher.publish(&event).await {
        Ok(()) => Some(event.event_id),
        Err(e) => {
            error!(
                routing_key = %routing_key,
                event_id = %event.event_id,
                error = %e,
                "Event not published, downstream cleanup will not run for it"
            );
            None
        }
    }
}
