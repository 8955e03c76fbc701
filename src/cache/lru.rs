//! LRU Cache Module
//!
//! Approximate least-recently-used bounding without moving list nodes.
//!
//! Every successful access appends a token for the key to a queue and bumps
//! the key's reference count. Eviction consumes tokens from the front; a key
//! is only removed when its last token is consumed, so any key touched after
//! the consumed token survives. When the queue grows past four times the
//! capacity it is compacted down to one token per key.
//!
//! Tokens carry the generation of the key they were issued for. Deleting a
//! key drops its generation, and tokens left behind in the queue are skipped
//! when they reach the front.

use std::collections::{HashMap, VecDeque};
use std::marker::PhantomData;

use tracing::debug;

use crate::backend::Backend;
use crate::cache::CacheStats;
use crate::error::{tolerate_missing, Result};

/// Queue length, as a multiple of capacity, that triggers compaction.
const COMPACTION_FACTOR: usize = 4;

#[derive(Debug)]
struct Token {
    key: String,
    generation: u64,
}

#[derive(Debug, Clone, Copy)]
struct Tracked {
    tokens: usize,
    generation: u64,
}

// == LRU Cache ==
/// Capacity-bounded cache layer over any backend `B`.
#[derive(Debug)]
pub struct LruCache<B, V> {
    inner: B,
    max_entries: usize,
    /// Access history, oldest at the front
    queue: VecDeque<Token>,
    /// Outstanding tokens per live key
    tracked: HashMap<String, Tracked>,
    next_generation: u64,
    stats: CacheStats,
    _value: PhantomData<fn() -> V>,
}

impl<B, V> LruCache<B, V>
where
    B: Backend<V>,
{
    // == Constructor ==
    /// Wraps `inner`, keeping at most `max_entries` keys in it.
    pub fn new(inner: B, max_entries: usize) -> Self {
        Self {
            inner,
            max_entries: max_entries.max(1),
            queue: VecDeque::new(),
            tracked: HashMap::new(),
            next_generation: 0,
            stats: CacheStats::new(),
            _value: PhantomData,
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.clone()
    }

    /// Number of tokens currently queued, stale ones included.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Outstanding tokens for `key`, 0 when untracked.
    pub fn refcount(&self, key: &str) -> usize {
        self.tracked.get(key).map_or(0, |t| t.tokens)
    }

    /// Bookkeeping for the key `token` was issued to, if it is still current.
    fn live(&mut self, token: &Token) -> Option<&mut Tracked> {
        self.tracked
            .get_mut(&token.key)
            .filter(|t| t.generation == token.generation)
    }

    // == Housekeep ==
    /// Records an access to `key`.
    fn housekeep(&mut self, key: &str) {
        let generation = match self.tracked.get_mut(key) {
            Some(tracked) => {
                tracked.tokens += 1;
                tracked.generation
            }
            None => {
                let generation = self.next_generation;
                self.next_generation += 1;
                self.tracked.insert(
                    key.to_string(),
                    Tracked {
                        tokens: 1,
                        generation,
                    },
                );
                generation
            }
        };
        self.queue.push_back(Token {
            key: key.to_string(),
            generation,
        });

        if self.queue.len() > self.max_entries * COMPACTION_FACTOR {
            self.compact();
        }
    }

    // == Compact ==
    /// Drops stale tokens and every token except the newest one of each key.
    fn compact(&mut self) {
        let before = self.queue.len();
        for _ in 0..before {
            let Some(token) = self.queue.pop_front() else {
                break;
            };
            let Some(tracked) = self.live(&token) else {
                continue;
            };
            if tracked.tokens == 1 {
                // Keys that left the inner backend on their own (e.g. expired)
                // stop being tracked here.
                if self.inner.contains(&token.key).unwrap_or(true) {
                    self.queue.push_back(token);
                } else {
                    self.tracked.remove(&token.key);
                }
            } else {
                tracked.tokens -= 1;
            }
        }
        debug!("LRU compaction: queue {} -> {}", before, self.queue.len());
    }

    // == Evict ==
    /// Consumes tokens until the inner backend is back within capacity.
    fn evict(&mut self) -> Result<()> {
        let mut evicted = 0;
        while self.inner.count()? > self.max_entries {
            let Some(token) = self.queue.pop_front() else {
                break;
            };
            let Some(tracked) = self.live(&token) else {
                continue;
            };
            tracked.tokens -= 1;
            if tracked.tokens == 0 {
                self.tracked.remove(&token.key);
                if tolerate_missing(self.inner.delete(&token.key))? {
                    evicted += 1;
                }
            }
        }
        self.stats.record_evictions(evicted);
        Ok(())
    }

    // == Forget ==
    /// Drops the bookkeeping for `key`; its queued tokens go stale.
    fn forget(&mut self, key: &str) {
        self.tracked.remove(key);
    }
}

impl<B, V> Backend<V> for LruCache<B, V>
where
    B: Backend<V>,
{
    fn get(&mut self, key: &str) -> Result<V> {
        match self.inner.get(key) {
            Ok(value) => {
                self.stats.record_hit();
                self.housekeep(key);
                Ok(value)
            }
            Err(e) => {
                self.stats.record_miss();
                Err(e)
            }
        }
    }

    fn set(&mut self, key: String, value: V) -> Result<()> {
        self.inner.set(key.clone(), value)?;
        self.housekeep(&key);
        self.evict()
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.forget(key);
        self.inner.delete(key)
    }

    fn contains(&mut self, key: &str) -> Result<bool> {
        self.inner.contains(key)
    }

    fn keys(&mut self) -> Result<Vec<String>> {
        self.inner.keys()
    }

    fn count(&mut self) -> Result<usize> {
        self.inner.count()
    }

    fn clear(&mut self) -> Result<()> {
        self.queue.clear();
        self.tracked.clear();
        self.inner.clear()
    }

    fn close(&mut self) -> Result<()> {
        self.queue.clear();
        self.tracked.clear();
        self.inner.close()
    }
}
