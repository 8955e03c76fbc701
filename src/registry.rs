//! Registry Module
//!
//! Static mapping from URI scheme to store and cache constructors.
//!
//! # Stores
//! - `simple://` - single-owner in-memory store
//! - `memory://` - thread-safe in-memory store
//!
//! # Caches
//! - `null://` - caching disabled
//! - `simple://` - TTL cache with random cull
//! - `memory://` - thread-safe TTL cache
//! - `simplelru://` - approximate LRU over a TTL cache
//! - `memlru://` - thread-safe approximate LRU over a TTL cache
//!
//! Every cache scheme except `null://` starts a purge task and therefore has
//! to be opened inside a tokio runtime.

use crate::backend::{BoxedBackend, MemoryStore};
use crate::cache::{LruCache, NullCache, Synchronized, TtlCache, TtlPolicy};
use crate::config::ShoveConfig;
use crate::error::{Result, ShoveError};

pub const STORE_SCHEMES: &[&str] = &["simple", "memory"];

pub const CACHE_SCHEMES: &[&str] = &["null", "simple", "memory", "simplelru", "memlru"];

/// Returns the scheme part of `uri`; a bare name is its own scheme.
pub fn scheme(uri: &str) -> &str {
    match uri.split_once("://") {
        Some((scheme, _)) => scheme,
        None => uri,
    }
}

// == Open Store ==
/// Builds the store registered for `uri`'s scheme.
pub fn open_store<V>(uri: &str, config: &ShoveConfig) -> Result<BoxedBackend<V>>
where
    V: Clone + Send + Sync + 'static,
{
    config.validate()?;

    let store: BoxedBackend<V> = match scheme(uri) {
        "simple" => Box::new(MemoryStore::new()),
        "memory" => Box::new(Synchronized::new(MemoryStore::new())),
        _ => return Err(ShoveError::UnknownScheme(uri.to_string())),
    };
    Ok(store)
}

// == Open Cache ==
/// Builds the cache registered for `uri`'s scheme.
pub fn open_cache<V>(uri: &str, config: &ShoveConfig) -> Result<BoxedBackend<V>>
where
    V: Clone + Send + Sync + 'static,
{
    config.validate()?;
    let policy = TtlPolicy::from_config(config);

    let cache: BoxedBackend<V> = match scheme(uri) {
        "null" => Box::new(NullCache::new()),
        "simple" => Box::new(TtlCache::new(MemoryStore::new(), policy)?),
        "memory" => Box::new(Synchronized::new(TtlCache::new(
            MemoryStore::new(),
            policy,
        )?)),
        "simplelru" => Box::new(lru_over_ttl::<V>(config, policy)?),
        "memlru" => Box::new(Synchronized::new(lru_over_ttl::<V>(config, policy)?)),
        _ => return Err(ShoveError::UnknownScheme(uri.to_string())),
    };
    Ok(cache)
}

type LruOverTtl<V> = LruCache<TtlCache<MemoryStore<V>, V>, V>;

/// The LRU layer owns the capacity bound, so the TTL layer below never culls.
fn lru_over_ttl<V>(config: &ShoveConfig, policy: TtlPolicy) -> Result<LruOverTtl<V>>
where
    V: Clone + Send + Sync + 'static,
{
    let ttl = TtlCache::new(MemoryStore::new(), policy.unbounded())?;
    Ok(LruCache::new(ttl, config.max_entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_parsing() {
        assert_eq!(scheme("simple://"), "simple");
        assert_eq!(scheme("memlru://anything"), "memlru");
        assert_eq!(scheme("null"), "null");
    }

    #[test]
    fn test_open_known_stores() {
        let config = ShoveConfig::default();
        for uri in ["simple://", "memory://"] {
            let mut store = open_store::<i32>(uri, &config).unwrap();
            store.set("a".to_string(), 1).unwrap();
            assert_eq!(store.get("a").unwrap(), 1);
        }
    }

    #[test]
    fn test_unknown_scheme_is_config_error() {
        let config = ShoveConfig::default();
        assert!(matches!(
            open_store::<i32>("ftp://host", &config),
            Err(ShoveError::UnknownScheme(_))
        ));
        assert!(matches!(
            open_cache::<i32>("memcache://host", &config),
            Err(ShoveError::UnknownScheme(_))
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ShoveConfig {
            max_entries: 0,
            ..ShoveConfig::default()
        };
        assert!(matches!(
            open_store::<i32>("simple://", &config),
            Err(ShoveError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_null_cache_needs_no_runtime() {
        let mut cache = open_cache::<i32>("null://", &ShoveConfig::default()).unwrap();
        cache.set("a".to_string(), 1).unwrap();
        assert!(cache.get("a").is_err());
    }

    #[test]
    fn test_ttl_cache_outside_runtime_fails() {
        assert!(matches!(
            open_cache::<i32>("simple://", &ShoveConfig::default()),
            Err(ShoveError::Initialization(_))
        ));
    }

    #[tokio::test]
    async fn test_open_every_cache_scheme() {
        let config = ShoveConfig {
            max_entries: 2,
            ..ShoveConfig::default()
        };
        for uri in CACHE_SCHEMES.iter().filter(|s| **s != "null") {
            let mut cache = open_cache::<i32>(uri, &config).unwrap();
            for i in 0..5 {
                cache.set(format!("k{}", i), i).unwrap();
            }
            assert!(cache.count().unwrap() <= 2, "{} exceeded capacity", uri);
            cache.close().unwrap();
        }
    }
}
