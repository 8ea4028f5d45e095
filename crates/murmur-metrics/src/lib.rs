//! Prometheus metrics for the murmur services
//!
//! Provides centralized metrics collection for monitoring:
//! - Event publishing (post service)
//! - Event delivery outcomes (media service consumer)
//! - Asset cleanup
//! - Read cache hits, misses and invalidation failures
//! - Broker circuit breaker state

use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, GaugeVec, Histogram, IntCounter, IntCounterVec, TextEncoder, opts,
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
};

// ============================================================================
// Publisher Metrics
// ============================================================================

/// Events handed to the broker without a transport error (by routing key)
pub static EVENTS_PUBLISHED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "murmur_events_published_total",
            "Events published to the topic exchange"
        ),
        &["routing_key"]
    )
    .expect("Failed to register EVENTS_PUBLISHED_TOTAL metric")
});

/// Events that could not be published (by routing key)
pub static EVENTS_PUBLISH_FAILED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "murmur_events_publish_failed_total",
            "Events dropped because the broker was unavailable"
        ),
        &["routing_key"]
    )
    .expect("Failed to register EVENTS_PUBLISH_FAILED_TOTAL metric")
});

/// Publish latency in seconds
pub static EVENT_PUBLISH_LATENCY: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "murmur_event_publish_latency_seconds",
        "Latency of a single publish call"
    )
    .expect("Failed to register EVENT_PUBLISH_LATENCY metric")
});

/// Broker circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)
pub static BROKER_CIRCUIT_BREAKER_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        opts!(
            "murmur_broker_circuit_breaker_state",
            "Broker circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)"
        ),
        &["component"]
    )
    .expect("Failed to register BROKER_CIRCUIT_BREAKER_STATE metric")
});

// ============================================================================
// Consumer Metrics
// ============================================================================

/// Deliveries by outcome: acked, redelivery, dead_lettered
pub static DELIVERIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "murmur_deliveries_total",
            "Deliveries processed by the consumer, by outcome"
        ),
        &["routing_key", "outcome"]
    )
    .expect("Failed to register DELIVERIES_TOTAL metric")
});

/// Consumer re-subscriptions after a dropped connection
pub static CONSUMER_RESUBSCRIBES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "murmur_consumer_resubscribes_total",
        "Times the consumer re-established its subscription"
    ))
    .expect("Failed to register CONSUMER_RESUBSCRIBES_TOTAL metric")
});

// ============================================================================
// Asset Cleanup Metrics
// ============================================================================

/// Assets by cleanup result: removed, already_cleaned, skipped, failed
pub static ASSETS_CLEANED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "murmur_assets_cleaned_total",
            "Assets processed by the cleanup handler, by result"
        ),
        &["result"]
    )
    .expect("Failed to register ASSETS_CLEANED_TOTAL metric")
});

// ============================================================================
// Read Cache Metrics
// ============================================================================

/// Cache lookups by key family and result (hit, miss, corrupt, error)
pub static CACHE_LOOKUPS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!("murmur_cache_lookups_total", "Read cache lookups"),
        &["family", "result"]
    )
    .expect("Failed to register CACHE_LOOKUPS_TOTAL metric")
});

/// Invalidations that could not reach the cache (divergence risk)
pub static CACHE_INVALIDATION_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "murmur_cache_invalidation_failures_total",
        "Cache invalidations that failed after a successful catalog write"
    ))
    .expect("Failed to register CACHE_INVALIDATION_FAILURES_TOTAL metric")
});

// ============================================================================
// Metrics Collection
// ============================================================================

/// Gather all registered metrics and encode as Prometheus text format
pub fn gather_metrics() -> Result<String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode(&metric_families, &mut buffer)?;

    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_metrics() {
        EVENTS_PUBLISHED_TOTAL.with_label_values(&["post.deleted"]).inc();

        let result = gather_metrics();
        assert!(result.is_ok());

        let metrics_text = result.unwrap();
        assert!(metrics_text.contains("murmur_events_published_total"));
    }
}
