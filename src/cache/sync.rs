//! Synchronized Cache Module
//!
//! Mutex wrapper that lets several callers share one cache or store.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::Backend;
use crate::error::Result;

// == Synchronized ==
/// Thread-safe handle around a backend.
///
/// Each operation runs as one critical section, including any eviction
/// bookkeeping the wrapped cache does. Cloning the handle shares the same
/// backend. `get` hands out a `Clone` of the value made under the lock.
///
/// The copy is only as deep as `V::clone`. For owned data such as `String`
/// or `Vec<u8>` callers never observe the cached value itself; for shared
/// handles such as `Arc<T>` the clone points at the same `T`, so mutations
/// through interior mutability are visible to every reader.
pub struct Synchronized<B> {
    inner: Arc<Mutex<B>>,
}

impl<B> Synchronized<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Runs `f` with exclusive access to the wrapped backend.
    pub fn with<R>(&self, f: impl FnOnce(&mut B) -> R) -> R {
        f(&mut self.inner.lock())
    }
}

impl<B> Clone for Synchronized<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V, B> Backend<V> for Synchronized<B>
where
    V: Clone,
    B: Backend<V>,
{
    fn get(&mut self, key: &str) -> Result<V> {
        self.inner.lock().get(key)
    }

    fn set(&mut self, key: String, value: V) -> Result<()> {
        self.inner.lock().set(key, value)
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.inner.lock().delete(key)
    }

    fn contains(&mut self, key: &str) -> Result<bool> {
        self.inner.lock().contains(key)
    }

    fn keys(&mut self) -> Result<Vec<String>> {
        self.inner.lock().keys()
    }

    fn count(&mut self) -> Result<usize> {
        self.inner.lock().count()
    }

    fn update(&mut self, entries: &HashMap<String, V>) -> Result<()> {
        self.inner.lock().update(entries)
    }

    fn clear(&mut self) -> Result<()> {
        self.inner.lock().clear()
    }

    fn close(&mut self) -> Result<()> {
        self.inner.lock().close()
    }
}
