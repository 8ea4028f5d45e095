// ============================================================================
// Murmur Types - Core Data Types
// ============================================================================
//
// Data structures shared by the post and media services. This crate has NO
// dependencies on business logic, databases, brokers or caches.
//
// Contents:
// - Identifiers (posts, assets, users)
// - Post and asset records
// - Event payloads and routing keys
// - Listing envelope returned by the paginated read path
//
// ============================================================================

pub mod event;
pub mod ids;
pub mod post;

// Re-exports for convenience
pub use event::*;
pub use ids::*;
pub use post::*;
