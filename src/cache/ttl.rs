//! TTL Cache Module
//!
//! Expiring cache layer: every access pushes a key's expiry forward, a
//! background task sweeps keys whose expiry has passed, and overflow past
//! `max_entries` is culled at random.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::seq::index;
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::cache::CacheStats;
use crate::config::ShoveConfig;
use crate::error::{tolerate_missing, Result, ShoveError};
use crate::tasks::{spawn_purge_task, Purge, PurgeHandle};

// == TTL Policy ==
/// Expiry and capacity settings for a `TtlCache`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    /// Lifetime granted by each access
    pub timeout: Duration,
    /// Delay between purge sweeps
    pub purge_interval: Duration,
    /// Random-cull bound; `None` leaves capacity to an outer layer
    pub max_entries: Option<usize>,
}

impl TtlPolicy {
    pub fn from_config(config: &ShoveConfig) -> Self {
        Self {
            timeout: config.ttl(),
            purge_interval: config.purge_interval(),
            max_entries: Some(config.max_entries),
        }
    }

    /// Same policy with the random cull disabled.
    pub fn unbounded(self) -> Self {
        Self {
            max_entries: None,
            ..self
        }
    }
}

// == TTL State ==
/// Everything the foreground calls and the purge task share.
struct TtlState<B, V> {
    inner: B,
    /// Absolute expiry per key
    expiry: HashMap<String, Instant>,
    timeout: Duration,
    max_entries: Option<usize>,
    stats: CacheStats,
    closed: bool,
    _value: PhantomData<fn() -> V>,
}

impl<B, V> TtlState<B, V>
where
    B: Backend<V>,
{
    fn reset_timeout(&mut self, key: &str) {
        let deadline = Instant::now() + self.timeout;
        match self.expiry.get_mut(key) {
            Some(expires_at) => *expires_at = deadline,
            None => {
                self.expiry.insert(key.to_string(), deadline);
            }
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(ShoveError::Closed)
        } else {
            Ok(())
        }
    }

    /// Drops `key` right away when its expiry has already passed.
    fn expire_if_due(&mut self, key: &str) -> Result<bool> {
        let due = match self.expiry.get(key) {
            Some(expires_at) => *expires_at <= Instant::now(),
            None => false,
        };
        if due {
            self.expiry.remove(key);
            tolerate_missing(self.inner.delete(key))?;
            self.stats.record_expirations(1);
        }
        Ok(due)
    }

    /// Removes uniformly chosen keys until the count is back under the bound.
    fn cull(&mut self) -> Result<()> {
        let Some(max_entries) = self.max_entries else {
            return Ok(());
        };
        let count = self.inner.count()?;
        if count <= max_entries {
            return Ok(());
        }

        let keys = self.inner.keys()?;
        let amount = keys.len().saturating_sub(max_entries);
        let mut rng = rand::thread_rng();
        let mut removed = 0;
        for i in index::sample(&mut rng, keys.len(), amount).into_iter() {
            let key = &keys[i];
            if tolerate_missing(self.inner.delete(key))? {
                removed += 1;
            }
            self.expiry.remove(key);
        }

        self.stats.record_evictions(removed);
        debug!("TTL cull: removed {} entries over capacity {}", removed, max_entries);
        Ok(())
    }
}

impl<B, V> Purge for TtlState<B, V>
where
    B: Backend<V> + 'static,
    V: 'static,
{
    fn purge_expired(&mut self) -> usize {
        if self.closed {
            return 0;
        }

        let now = Instant::now();
        let expired: Vec<String> = self
            .expiry
            .iter()
            .filter(|(_, expires_at)| **expires_at < now)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.expiry.remove(key);
            if let Err(e) = tolerate_missing(self.inner.delete(key)) {
                warn!("TTL purge: failed to remove {}: {}", key, e);
            }
        }

        self.stats.record_expirations(expired.len());
        expired.len()
    }
}

// == TTL Cache ==
/// Cache layer that expires keys `timeout` after their last access.
///
/// The layer wraps any backend `B`. Expiry is enforced lazily on access and
/// eagerly by a purge task on the ambient tokio runtime; a key can outlive
/// its nominal expiry by at most one purge interval before the task removes
/// it, but it is never returned after that point.
pub struct TtlCache<B, V> {
    state: Arc<Mutex<TtlState<B, V>>>,
    purge: Option<PurgeHandle>,
}

impl<B, V> TtlCache<B, V>
where
    B: Backend<V> + 'static,
    V: 'static,
{
    // == Constructor ==
    /// Wraps `inner` and starts the purge task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(inner: B, policy: TtlPolicy) -> Result<Self> {
        let mut cache = Self::without_purge(inner, policy);
        cache.purge = Some(spawn_purge_task(cache.state.clone(), policy.purge_interval)?);
        Ok(cache)
    }

    /// Wraps `inner` with lazy expiry only; no background task is started.
    pub fn without_purge(inner: B, policy: TtlPolicy) -> Self {
        let state = TtlState {
            inner,
            expiry: HashMap::new(),
            timeout: policy.timeout,
            max_entries: policy.max_entries,
            stats: CacheStats::new(),
            closed: false,
            _value: PhantomData,
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            purge: None,
        }
    }

    /// Runs one purge sweep on the calling thread.
    pub fn purge_expired(&self) -> usize {
        self.state.lock().purge_expired()
    }

    pub fn stats(&self) -> CacheStats {
        self.state.lock().stats.clone()
    }

    fn stop_purge(&mut self) {
        if let Some(purge) = self.purge.take() {
            purge.stop();
        }
    }
}

impl<B, V> Backend<V> for TtlCache<B, V>
where
    B: Backend<V> + 'static,
    V: 'static,
{
    fn get(&mut self, key: &str) -> Result<V> {
        let mut state = self.state.lock();
        state.ensure_open()?;

        if state.expire_if_due(key)? {
            state.stats.record_miss();
            return Err(ShoveError::NotFound(key.to_string()));
        }

        match state.inner.get(key) {
            Ok(value) => {
                state.reset_timeout(key);
                state.stats.record_hit();
                Ok(value)
            }
            Err(e) => {
                state.expiry.remove(key);
                state.stats.record_miss();
                Err(e)
            }
        }
    }

    fn set(&mut self, key: String, value: V) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;

        state.inner.set(key.clone(), value)?;
        state.reset_timeout(&key);
        state.cull()
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;

        state.expiry.remove(key);
        state.inner.delete(key)
    }

    fn contains(&mut self, key: &str) -> Result<bool> {
        let mut state = self.state.lock();
        state.ensure_open()?;

        if state.expire_if_due(key)? {
            return Ok(false);
        }
        state.inner.contains(key)
    }

    fn keys(&mut self) -> Result<Vec<String>> {
        let mut state = self.state.lock();
        state.ensure_open()?;

        state.purge_expired();
        state.inner.keys()
    }

    /// Counts without sweeping, so keys that expired since the last purge
    /// are still included. Layers above call this on every write.
    fn count(&mut self) -> Result<usize> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.inner.count()
    }

    fn clear(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;

        state.expiry.clear();
        state.inner.clear()
    }

    fn close(&mut self) -> Result<()> {
        self.stop_purge();

        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        state.closed = true;
        state.expiry.clear();
        state.inner.close()
    }
}

impl<B, V> Drop for TtlCache<B, V> {
    fn drop(&mut self) {
        if let Some(purge) = self.purge.take() {
            purge.stop();
        }
    }
}
