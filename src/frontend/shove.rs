//! Single-Store Frontend
//!
//! A cache in front of one store, with writes buffered until `sync`.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::backend::{Backend, BoxedBackend};
use crate::config::ShoveConfig;
use crate::error::{tolerate_missing, Result, ShoveError};
use crate::frontend::buffer::WriteBuffer;
use crate::registry;

// == Shove ==
/// Buffered key/value facade over one store and one cache.
///
/// Writes land in the cache and in a pending buffer. The buffer is flushed
/// to the store in one `update` once it holds `sync` entries, or on any
/// operation that has to see the store (`delete`, `keys`, `len`, a cache
/// miss) and on `close`.
pub struct Shove<V>
where
    V: Clone + Send + 'static,
{
    store: Option<BoxedBackend<V>>,
    cache: Option<BoxedBackend<V>>,
    buffer: WriteBuffer<V>,
    sync_threshold: usize,
}

impl<V> Shove<V>
where
    V: Clone + Send + 'static,
{
    // == Constructors ==
    pub fn new(store: BoxedBackend<V>, cache: BoxedBackend<V>, config: &ShoveConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store: Some(store),
            cache: Some(cache),
            buffer: WriteBuffer::new(),
            sync_threshold: config.sync,
        })
    }

    /// Opens the store and cache registered for the two URIs.
    pub fn open(store_uri: &str, cache_uri: &str, config: &ShoveConfig) -> Result<Self>
    where
        V: Sync,
    {
        let store = registry::open_store(store_uri, config)?;
        let cache = registry::open_cache(cache_uri, config)?;
        info!("Opened shove: store={} cache={}", store_uri, cache_uri);
        Self::new(store, cache, config)
    }

    /// Number of writes waiting for the next sync.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_closed(&self) -> bool {
        self.store.is_none()
    }

    // == Reads ==
    pub fn get(&mut self, key: &str) -> Result<V> {
        let cache = self.cache.as_mut().ok_or(ShoveError::Closed)?;
        match cache.get(key) {
            Ok(value) => return Ok(value),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        self.sync()?;
        let store = self.store.as_mut().ok_or(ShoveError::Closed)?;
        let value = store.get(key)?;
        if let Some(cache) = self.cache.as_mut() {
            cache.set(key.to_string(), value.clone())?;
        }
        Ok(value)
    }

    pub fn contains(&mut self, key: &str) -> Result<bool> {
        let cache = self.cache.as_mut().ok_or(ShoveError::Closed)?;
        if cache.contains(key)? {
            return Ok(true);
        }
        self.sync()?;
        self.store.as_mut().ok_or(ShoveError::Closed)?.contains(key)
    }

    pub fn keys(&mut self) -> Result<Vec<String>> {
        self.sync()?;
        self.store.as_mut().ok_or(ShoveError::Closed)?.keys()
    }

    pub fn len(&mut self) -> Result<usize> {
        self.sync()?;
        self.store.as_mut().ok_or(ShoveError::Closed)?.count()
    }

    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Every key/value pair in the store.
    pub fn items(&mut self) -> Result<Vec<(String, V)>> {
        let keys = self.keys()?;
        let store = self.store.as_mut().ok_or(ShoveError::Closed)?;
        let mut items = Vec::with_capacity(keys.len());
        for key in keys {
            let value = store.get(&key)?;
            items.push((key, value));
        }
        Ok(items)
    }

    /// Every value in the store.
    pub fn values(&mut self) -> Result<Vec<V>> {
        Ok(self.items()?.into_iter().map(|(_, value)| value).collect())
    }

    /// Like `get`, but an absent key yields `default`.
    pub fn get_or(&mut self, key: &str, default: V) -> Result<V> {
        match self.get(key) {
            Err(e) if e.is_not_found() => Ok(default),
            other => other,
        }
    }

    // == Writes ==
    /// Returns the value under `key`, writing `default` first when absent.
    pub fn setdefault(&mut self, key: &str, default: V) -> Result<V> {
        match self.get(key) {
            Err(e) if e.is_not_found() => {
                self.set(key.to_string(), default.clone())?;
                Ok(default)
            }
            other => other,
        }
    }

    pub fn set(&mut self, key: String, value: V) -> Result<()> {
        let cache = self.cache.as_mut().ok_or(ShoveError::Closed)?;
        cache.set(key.clone(), value.clone())?;
        self.buffer.insert(key, value);
        if self.buffer.len() >= self.sync_threshold {
            self.sync()?;
        }
        Ok(())
    }

    pub fn update(&mut self, entries: HashMap<String, V>) -> Result<()> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }

    /// Removes `key` everywhere. Fails with `NotFound` when the store never had it.
    pub fn delete(&mut self, key: &str) -> Result<()> {
        self.sync()?;
        let cache = self.cache.as_mut().ok_or(ShoveError::Closed)?;
        tolerate_missing(cache.delete(key))?;
        self.store.as_mut().ok_or(ShoveError::Closed)?.delete(key)
    }

    /// Removes `key` and returns its value.
    pub fn pop(&mut self, key: &str) -> Result<V> {
        let value = self.get(key)?;
        self.delete(key)?;
        Ok(value)
    }

    /// Removes and returns an arbitrary entry. Fails with `Empty` when
    /// there is nothing to remove.
    pub fn popitem(&mut self) -> Result<(String, V)> {
        let key = self.keys()?.into_iter().next().ok_or(ShoveError::Empty)?;
        let value = self.pop(&key)?;
        Ok((key, value))
    }

    pub fn clear(&mut self) -> Result<()> {
        let store = self.store.as_mut().ok_or(ShoveError::Closed)?;
        store.clear()?;
        self.buffer.clear();
        if let Some(cache) = self.cache.as_mut() {
            cache.clear()?;
        }
        Ok(())
    }

    // == Sync ==
    /// Flushes buffered writes to the store in one batch.
    ///
    /// Does nothing when the buffer is empty. When the store rejects the
    /// batch the buffer is kept so the next sync retries it.
    pub fn sync(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let store = self.store.as_mut().ok_or(ShoveError::Closed)?;
        store.update(self.buffer.as_map())?;
        debug!("Synced {} buffered entries", self.buffer.len());
        self.buffer.clear();
        Ok(())
    }

    // == Close ==
    /// Syncs and releases the store and cache. Safe to call repeatedly;
    /// every other operation fails with `Closed` afterwards.
    pub fn close(&mut self) -> Result<()> {
        if self.store.is_none() {
            return Ok(());
        }

        let synced = self.sync();
        if synced.is_err() {
            self.buffer.clear();
        }
        let store_closed = match self.store.take() {
            Some(mut store) => store.close(),
            None => Ok(()),
        };
        let cache_closed = match self.cache.take() {
            Some(mut cache) => cache.close(),
            None => Ok(()),
        };
        info!("Closed shove");

        synced.and(store_closed).and(cache_closed)
    }
}

impl<V> Drop for Shove<V>
where
    V: Clone + Send + 'static,
{
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Error while closing shove: {}", e);
        }
    }
}

impl<V> std::fmt::Debug for Shove<V>
where
    V: Clone + Send + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shove")
            .field("pending", &self.buffer.len())
            .field("sync_threshold", &self.sync_threshold)
            .field("closed", &self.is_closed())
            .finish()
    }
}
