//! Shove - A storage-agnostic key/value facade
//!
//! Buffered frontends over pluggable stores, fronted by TTL and approximate
//! LRU caches.

pub mod backend;
pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod frontend;
pub mod registry;
pub mod tasks;

pub use backend::{Backend, BoxedBackend, MemoryStore};
pub use codec::{Codec, EncodedStore};
pub use config::ShoveConfig;
pub use error::{Result, ShoveError};
pub use frontend::{CopyDispatcher, Dispatcher, MultiShove, RoundRobinDispatcher, Shove};
