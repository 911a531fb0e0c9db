//! Cache Module
//!
//! The expiring key-value store underneath the lazy layer: per-entry
//! expiration, LRU capacity eviction and eviction notification.

mod entry;
mod lru;
mod policy;
mod stats;
mod store;


// Re-export public types
pub use entry::StoreEntry;
pub use lru::LruTracker;
pub use policy::{CachePolicy, EvictionCallback, EvictionReason, Expiration};
pub use stats::{CacheStats, ComputationCounters};
pub use store::ExpiringStore;
