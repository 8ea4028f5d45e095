// ============================================================================
// Murmur Shared
// ============================================================================
//
// Building blocks of the content/asset consistency pipeline:
//
// - broker:   durable topic exchange, connection manager, publisher, consumer
// - cache:    read cache backends and the mutate-then-invalidate discipline
// - catalog:  post and asset catalogs (Postgres, in-memory)
// - content:  post service operations (create, get, list, delete)
// - assets:   remote object stores and the idempotent cleanup handler
// - metrics:  /metrics endpoint
//
// ============================================================================

pub mod assets;
pub mod broker;
pub mod cache;
pub mod catalog;
pub mod content;
pub mod extractors;
pub mod metrics;
pub mod utils;
