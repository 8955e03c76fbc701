//! Cache Module
//!
//! Eviction layers (TTL expiry, approximate LRU), the null cache and the
//! thread-safe wrapper. Every cache implements `Backend`, so layers stack.

mod lru;
mod null;
mod stats;
mod sync;
mod ttl;


// Re-export public types
pub use lru::LruCache;
pub use null::NullCache;
pub use stats::CacheStats;
pub use sync::Synchronized;
pub use ttl::{TtlCache, TtlPolicy};
