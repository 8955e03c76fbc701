//! Multi-Store Frontend
//!
//! One cache in front of several stores. A dispatcher decides which stores
//! receive each buffered entry when the buffer is flushed, and a placement
//! record remembers the outcome per key so reads and deletes go to the
//! right stores first. Keys without a record are looked up by scanning
//! every store in index order.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, info, warn};

use crate::backend::{Backend, BoxedBackend};
use crate::config::ShoveConfig;
use crate::error::{tolerate_missing, Result, ShoveError};
use crate::frontend::dispatch::{CopyDispatcher, Dispatcher};
use crate::frontend::buffer::WriteBuffer;
use crate::frontend::fanout::{merge_failures, partition, FanOut};
use crate::registry;

// == Multi Shove ==
/// Buffered key/value facade over several stores.
pub struct MultiShove<V>
where
    V: Clone + Send + Sync + 'static,
{
    stores: Option<Vec<BoxedBackend<V>>>,
    cache: Option<BoxedBackend<V>>,
    buffer: WriteBuffer<V>,
    sync_threshold: usize,
    dispatcher: Box<dyn Dispatcher<V>>,
    /// Store indices holding each synced key
    placement: HashMap<String, Vec<usize>>,
    fanout: FanOut,
}

impl<V> MultiShove<V>
where
    V: Clone + Send + Sync + 'static,
{
    // == Constructors ==
    /// Visits stores one after another.
    pub fn new<D>(
        stores: Vec<BoxedBackend<V>>,
        cache: BoxedBackend<V>,
        dispatcher: D,
        config: &ShoveConfig,
    ) -> Result<Self>
    where
        D: Dispatcher<V> + 'static,
    {
        Self::build(stores, cache, Box::new(dispatcher), config, FanOut::Sequential)
    }

    /// Fans out to stores on a pool of `config.max_workers` threads.
    pub fn threaded<D>(
        stores: Vec<BoxedBackend<V>>,
        cache: BoxedBackend<V>,
        dispatcher: D,
        config: &ShoveConfig,
    ) -> Result<Self>
    where
        D: Dispatcher<V> + 'static,
    {
        config.validate()?;
        let fanout = FanOut::pooled(config.max_workers)?;
        Self::build(stores, cache, Box::new(dispatcher), config, fanout)
    }

    /// Replicating frontend over the stores registered for `store_uris`.
    pub fn open(store_uris: &[&str], cache_uri: &str, config: &ShoveConfig) -> Result<Self> {
        let stores = store_uris
            .iter()
            .map(|uri| registry::open_store(uri, config))
            .collect::<Result<Vec<_>>>()?;
        let cache = registry::open_cache(cache_uri, config)?;
        info!("Opened multi-store shove over {} stores", stores.len());
        Self::new(stores, cache, CopyDispatcher, config)
    }

    fn build(
        stores: Vec<BoxedBackend<V>>,
        cache: BoxedBackend<V>,
        dispatcher: Box<dyn Dispatcher<V>>,
        config: &ShoveConfig,
        fanout: FanOut,
    ) -> Result<Self> {
        config.validate()?;
        if stores.is_empty() {
            return Err(ShoveError::InvalidConfig(
                "at least one store is required".to_string(),
            ));
        }
        Ok(Self {
            stores: Some(stores),
            cache: Some(cache),
            buffer: WriteBuffer::new(),
            sync_threshold: config.sync,
            dispatcher,
            placement: HashMap::new(),
            fanout,
        })
    }

    pub fn store_count(&self) -> usize {
        self.stores.as_ref().map_or(0, Vec::len)
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Stores recorded as holding `key`, if it was synced through this frontend.
    pub fn placement(&self, key: &str) -> Option<&[usize]> {
        self.placement.get(key).map(Vec::as_slice)
    }

    pub fn is_closed(&self) -> bool {
        self.stores.is_none()
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
        let stores = self.stores.as_mut().ok_or(ShoveError::Closed)?;
        let order = read_order(self.placement.get(key), stores.len());

        let mut last_error = ShoveError::NotFound(key.to_string());
        for index in order {
            match stores[index].get(key) {
                Ok(value) => {
                    if let Some(cache) = self.cache.as_mut() {
                        cache.set(key.to_string(), value.clone())?;
                    }
                    return Ok(value);
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    warn!("Store {} failed reading {}: {}", index, key, e);
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    pub fn contains(&mut self, key: &str) -> Result<bool> {
        let cache = self.cache.as_mut().ok_or(ShoveError::Closed)?;
        if cache.contains(key)? {
            return Ok(true);
        }
        self.sync()?;
        let stores = self.stores.as_mut().ok_or(ShoveError::Closed)?;
        let order = read_order(self.placement.get(key), stores.len());
        for index in order {
            if stores[index].contains(key)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Union of the keys of every store, without duplicates.
    pub fn keys(&mut self) -> Result<Vec<String>> {
        self.sync()?;
        let stores = self.stores.as_mut().ok_or(ShoveError::Closed)?;
        let mut keys = BTreeSet::new();
        for store in stores.iter_mut() {
            keys.extend(store.keys()?);
        }
        Ok(keys.into_iter().collect())
    }

    pub fn len(&mut self) -> Result<usize> {
        Ok(self.keys()?.len())
    }

    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn items(&mut self) -> Result<Vec<(String, V)>> {
        let keys = self.keys()?;
        let mut items = Vec::with_capacity(keys.len());
        for key in keys {
            let value = self.get(&key)?;
            items.push((key, value));
        }
        Ok(items)
    }

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

    /// Removes `key` from every store that holds it.
    ///
    /// Fails with `NotFound` only when no store held the key. The cache entry
    /// and placement record are dropped either way.
    pub fn delete(&mut self, key: &str) -> Result<()> {
        self.sync()?;
        let stores = self.stores.as_mut().ok_or(ShoveError::Closed)?;
        let targets: Vec<usize> = match self.placement.remove(key) {
            Some(placed) => placed,
            None => (0..stores.len()).collect(),
        };

        let outcomes = self.fanout.run(stores.as_mut_slice(), |index, store| {
            if targets.contains(&index) {
                tolerate_missing(store.delete(key))
            } else {
                Ok(false)
            }
        });
        if let Some(cache) = self.cache.as_mut() {
            tolerate_missing(cache.delete(key))?;
        }

        let (held, error) = partition(outcomes);
        if let Some(e) = error {
            return Err(e);
        }
        if held.into_iter().flatten().any(|found| found) {
            Ok(())
        } else {
            Err(ShoveError::NotFound(key.to_string()))
        }
    }

    pub fn pop(&mut self, key: &str) -> Result<V> {
        let value = self.get(key)?;
        self.delete(key)?;
        Ok(value)
    }

    /// Removes and returns the entry with the smallest key.
    pub fn popitem(&mut self) -> Result<(String, V)> {
        let key = self.keys()?.into_iter().next().ok_or(ShoveError::Empty)?;
        let value = self.pop(&key)?;
        Ok((key, value))
    }

    pub fn clear(&mut self) -> Result<()> {
        let stores = self.stores.as_mut().ok_or(ShoveError::Closed)?;
        let outcomes = self.fanout.run(stores.as_mut_slice(), |_, store| store.clear());
        self.buffer.clear();
        self.placement.clear();
        if let Some(cache) = self.cache.as_mut() {
            cache.clear()?;
        }
        match partition(outcomes) {
            (_, Some(e)) => Err(e),
            (_, None) => Ok(()),
        }
    }

    // == Sync ==
    /// Dispatches every buffered entry and writes each store's batch.
    ///
    /// Placements are validated before any store is written. Once writing
    /// starts, stores succeed or fail independently; the buffer is cleared
    /// regardless and the failures come back together as `FanOut`.
    pub fn sync(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let stores = self.stores.as_mut().ok_or(ShoveError::Closed)?;
        let store_count = stores.len();

        let mut targets = Vec::with_capacity(self.buffer.len());
        for (key, value) in self.buffer.iter() {
            let mut indices = self.dispatcher.dispatch(key, value, store_count);
            indices.sort_unstable();
            indices.dedup();
            validate_placement(key, &indices, store_count)?;
            targets.push((key.as_str(), value, indices));
        }

        let mut batches: Vec<HashMap<String, V>> = vec![HashMap::new(); store_count];
        for (key, value, indices) in &targets {
            for &index in indices {
                batches[index].insert(key.to_string(), (*value).clone());
            }
        }

        let outcomes = self.fanout.run(stores.as_mut_slice(), |index, store| {
            let batch = &batches[index];
            if batch.is_empty() {
                Ok(())
            } else {
                store.update(batch)
            }
        });
        let (written, write_error) = partition(outcomes);

        let placements: Vec<(&str, Vec<usize>)> = targets
            .into_iter()
            .map(|(key, _, indices)| {
                let placed = indices
                    .into_iter()
                    .filter(|&index| written[index].is_some())
                    .collect();
                (key, placed)
            })
            .collect();

        // A key moved to new stores leaves its old replicas behind; they are
        // removed once the new copy is in place.
        let mut stale: Vec<Vec<&str>> = vec![Vec::new(); store_count];
        for (key, placed) in &placements {
            if placed.is_empty() {
                continue;
            }
            if let Some(previous) = self.placement.get(*key) {
                for &index in previous {
                    if index < store_count && !placed.contains(&index) {
                        stale[index].push(*key);
                    }
                }
            }
        }

        let mut lingering: HashMap<&str, Vec<usize>> = HashMap::new();
        let mut removal_error = None;
        if stale.iter().any(|keys| !keys.is_empty()) {
            let outcomes = self.fanout.run(stores.as_mut_slice(), |index, store| {
                for key in &stale[index] {
                    tolerate_missing(store.delete(key))?;
                }
                Ok(())
            });
            let (removed, error) = partition(outcomes);
            for (index, keys) in stale.iter().enumerate() {
                if removed[index].is_none() {
                    for key in keys {
                        lingering.entry(*key).or_default().push(index);
                    }
                }
            }
            removal_error = error;
        }

        for (key, mut placed) in placements {
            if placed.is_empty() {
                continue;
            }
            if let Some(extra) = lingering.remove(key) {
                placed.extend(extra);
                placed.sort_unstable();
            }
            self.placement.insert(key.to_string(), placed);
        }
        debug!(
            "Synced {} buffered entries across {} stores",
            self.buffer.len(),
            store_count
        );
        self.buffer.clear();

        match merge_failures(write_error, removal_error) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // == Close ==
    /// Syncs, then closes every store and the cache. Safe to call repeatedly.
    pub fn close(&mut self) -> Result<()> {
        if self.stores.is_none() {
            return Ok(());
        }

        let synced = self.sync();
        self.buffer.clear();
        let stores_closed = match self.stores.take() {
            Some(mut stores) => {
                let outcomes = self.fanout.run(stores.as_mut_slice(), |_, store| store.close());
                match partition(outcomes) {
                    (_, Some(e)) => Err(e),
                    (_, None) => Ok(()),
                }
            }
            None => Ok(()),
        };
        let cache_closed = match self.cache.take() {
            Some(mut cache) => cache.close(),
            None => Ok(()),
        };
        self.placement.clear();
        info!("Closed multi-store shove");

        synced.and(stores_closed).and(cache_closed)
    }
}

/// Placed stores first, then the remaining stores in index order.
fn read_order(placed: Option<&Vec<usize>>, store_count: usize) -> Vec<usize> {
    let mut order: Vec<usize> = placed
        .map(|p| p.iter().copied().filter(|&i| i < store_count).collect())
        .unwrap_or_default();
    for index in 0..store_count {
        if !order.contains(&index) {
            order.push(index);
        }
    }
    order
}

fn validate_placement(key: &str, indices: &[usize], store_count: usize) -> Result<()> {
    if indices.is_empty() {
        return Err(ShoveError::InvalidPlacement {
            key: key.to_string(),
            reason: "dispatcher selected no stores".to_string(),
        });
    }
    if let Some(index) = indices.iter().find(|&&i| i >= store_count) {
        return Err(ShoveError::InvalidPlacement {
            key: key.to_string(),
            reason: format!("store {} out of range for {} stores", index, store_count),
        });
    }
    Ok(())
}

impl<V> Drop for MultiShove<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Error while closing multi-store shove: {}", e);
        }
    }
}

impl<V> std::fmt::Debug for MultiShove<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiShove")
            .field("stores", &self.store_count())
            .field("pending", &self.buffer.len())
            .field("fanout", &self.fanout)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryStore;
    use crate::cache::{NullCache, Synchronized};
    use crate::frontend::RoundRobinDispatcher;

    type Shared = Synchronized<MemoryStore<i32>>;

    fn config(sync: usize) -> ShoveConfig {
        ShoveConfig {
            sync,
            ..ShoveConfig::default()
        }
    }

    fn shared_stores(n: usize) -> (Vec<BoxedBackend<i32>>, Vec<Shared>) {
        let handles: Vec<Shared> = (0..n).map(|_| Synchronized::new(MemoryStore::new())).collect();
        let boxed = handles
            .iter()
            .map(|h| Box::new(h.clone()) as BoxedBackend<i32>)
            .collect();
        (boxed, handles)
    }

    fn null_cache() -> BoxedBackend<i32> {
        Box::new(NullCache::new())
    }

    #[test]
    fn test_requires_a_store() {
        let result = MultiShove::new(Vec::new(), null_cache(), CopyDispatcher, &config(1));
        assert!(matches!(result, Err(ShoveError::InvalidConfig(_))));
    }

    #[test]
    fn test_copy_dispatch_replicates() {
        let (stores, handles) = shared_stores(3);
        let mut shove = MultiShove::new(stores, null_cache(), CopyDispatcher, &config(1)).unwrap();
        shove.set("a".to_string(), 1).unwrap();

        for handle in &handles {
            assert_eq!(handle.with(|s| s.get("a").unwrap()), 1);
        }
        assert_eq!(shove.placement("a"), Some(&[0, 1, 2][..]));
        assert_eq!(shove.len().unwrap(), 1);
    }

    #[test]
    fn test_round_robin_shards() {
        let (stores, handles) = shared_stores(2);
        let mut shove =
            MultiShove::new(stores, null_cache(), RoundRobinDispatcher::new(), &config(1)).unwrap();
        for (i, key) in ["k1", "k2", "k3", "k4"].iter().enumerate() {
            shove.set(key.to_string(), i as i32).unwrap();
        }

        assert_eq!(handles[0].with(|s| s.len()), 2);
        assert_eq!(handles[1].with(|s| s.len()), 2);
        assert_eq!(shove.len().unwrap(), 4);
        assert_eq!(shove.get("k3").unwrap(), 2);
    }

    #[test]
    fn test_round_robin_follows_write_order_across_batches() {
        for _ in 0..20 {
            let (stores, handles) = shared_stores(2);
            let mut shove = MultiShove::new(
                stores,
                null_cache(),
                RoundRobinDispatcher::new(),
                &ShoveConfig::default(),
            )
            .unwrap();
            for (i, key) in ["k1", "k2", "k3", "k4"].iter().enumerate() {
                shove.set(key.to_string(), i as i32).unwrap();
            }

            assert!(handles[0].with(|s| s.contains("k1").unwrap() && s.contains("k3").unwrap()));
            assert!(handles[1].with(|s| s.contains("k2").unwrap() && s.contains("k4").unwrap()));
        }
    }

    #[test]
    fn test_moved_key_leaves_no_replica_behind() {
        let (stores, handles) = shared_stores(2);
        let mut shove =
            MultiShove::new(stores, null_cache(), RoundRobinDispatcher::new(), &config(1)).unwrap();
        shove.set("a".to_string(), 1).unwrap();
        shove.set("a".to_string(), 2).unwrap();

        assert!(!handles[0].with(|s| s.contains("a").unwrap()));
        assert_eq!(shove.placement("a"), Some(&[1][..]));
        assert_eq!(shove.get("a").unwrap(), 2);

        shove.delete("a").unwrap();
        assert!(matches!(shove.get("a"), Err(ShoveError::NotFound(_))));
        assert!(shove.keys().unwrap().is_empty());
    }

    #[test]
    fn test_defaults_and_popitem() {
        let (stores, _) = shared_stores(2);
        let mut shove = MultiShove::new(stores, null_cache(), CopyDispatcher, &config(1)).unwrap();
        assert_eq!(shove.get_or("a", 5).unwrap(), 5);
        assert_eq!(shove.setdefault("b", 2).unwrap(), 2);
        assert_eq!(shove.setdefault("b", 3).unwrap(), 2);
        shove.set("a".to_string(), 1).unwrap();
        assert_eq!(shove.values().unwrap(), vec![1, 2]);

        assert_eq!(shove.popitem().unwrap(), ("a".to_string(), 1));
        assert_eq!(shove.popitem().unwrap(), ("b".to_string(), 2));
        assert_eq!(shove.popitem(), Err(ShoveError::Empty));
    }

    #[test]
    fn test_get_falls_back_to_scan() {
        let (stores, handles) = shared_stores(2);
        let mut shove = MultiShove::new(stores, null_cache(), CopyDispatcher, &config(1)).unwrap();
        shove.set("a".to_string(), 7).unwrap();

        handles[0].with(|s| s.delete("a")).unwrap();
        assert_eq!(shove.get("a").unwrap(), 7);

        handles[1].with(|s| s.set("unplaced".to_string(), 9)).unwrap();
        assert_eq!(shove.get("unplaced").unwrap(), 9);
        assert!(matches!(shove.get("missing"), Err(ShoveError::NotFound(_))));
    }

    #[test]
    fn test_invalid_placement_writes_nothing() {
        let (stores, handles) = shared_stores(2);
        let out_of_range = |_: &str, _: &i32, stores: usize| vec![stores];
        let mut shove = MultiShove::new(stores, null_cache(), out_of_range, &config(10)).unwrap();
        shove.set("a".to_string(), 1).unwrap();

        assert!(matches!(
            shove.sync(),
            Err(ShoveError::InvalidPlacement { .. })
        ));
        assert_eq!(shove.pending(), 1);
        assert!(handles.iter().all(|h| h.with(|s| s.is_empty())));

        let nowhere = |_: &str, _: &i32, _: usize| -> Vec<usize> { Vec::new() };
        let (stores, _) = shared_stores(1);
        let mut shove = MultiShove::new(stores, null_cache(), nowhere, &config(10)).unwrap();
        shove.set("a".to_string(), 1).unwrap();
        assert!(matches!(
            shove.sync(),
            Err(ShoveError::InvalidPlacement { .. })
        ));
        shove.clear().unwrap();
    }

    #[test]
    fn test_delete_semantics() {
        let (stores, handles) = shared_stores(2);
        let mut shove =
            MultiShove::new(stores, null_cache(), RoundRobinDispatcher::new(), &config(1)).unwrap();
        shove.set("a".to_string(), 1).unwrap();
        shove.set("b".to_string(), 2).unwrap();

        shove.delete("a").unwrap();
        assert_eq!(shove.placement("a"), None);
        assert!(!handles[0].with(|s| s.contains("a").unwrap()));
        assert!(matches!(shove.delete("a"), Err(ShoveError::NotFound(_))));
        assert_eq!(shove.keys().unwrap(), vec!["b"]);
    }

    #[test]
    fn test_keys_are_deduplicated() {
        let (stores, _) = shared_stores(3);
        let mut shove = MultiShove::new(stores, null_cache(), CopyDispatcher, &config(5)).unwrap();
        shove.set("b".to_string(), 1).unwrap();
        shove.set("a".to_string(), 2).unwrap();

        assert_eq!(shove.keys().unwrap(), vec!["a", "b"]);
        assert!(shove.contains("a").unwrap());
        assert!(!shove.is_empty().unwrap());
    }

    #[test]
    fn test_threaded_sync_matches_sequential() {
        let config = ShoveConfig {
            sync: 4,
            max_workers: 3,
            ..ShoveConfig::default()
        };
        let (stores, handles) = shared_stores(5);
        let mut shove = MultiShove::threaded(stores, null_cache(), CopyDispatcher, &config).unwrap();
        for i in 0..8 {
            shove.set(format!("k{}", i), i).unwrap();
        }

        for handle in &handles {
            assert_eq!(handle.with(|s| s.len()), 8);
        }
        shove.delete("k0").unwrap();
        assert!(handles.iter().all(|h| !h.with(|s| s.contains("k0").unwrap())));
    }

    #[test]
    fn test_close_is_idempotent() {
        let (stores, handles) = shared_stores(2);
        let mut shove = MultiShove::new(stores, null_cache(), CopyDispatcher, &config(10)).unwrap();
        shove.set("a".to_string(), 1).unwrap();
        shove.close().unwrap();
        shove.close().unwrap();

        assert_eq!(handles[1].with(|s| s.get("a").unwrap()), 1);
        assert_eq!(shove.keys(), Err(ShoveError::Closed));
    }

    #[test]
    fn test_open_from_uris() {
        let mut shove: MultiShove<String> =
            MultiShove::open(&["simple://", "memory://"], "null://", &config(1)).unwrap();
        shove.set("a".to_string(), "x".to_string()).unwrap();
        assert_eq!(shove.store_count(), 2);
        assert_eq!(shove.get("a").unwrap(), "x");
    }
}
