//! Backend Module
//!
//! The capability every store and cache implements, plus the in-memory store.

mod memory;

use std::collections::HashMap;

use crate::error::Result;

pub use memory::MemoryStore;

// == Backend Capability ==
/// Key/value mapping contract shared by stores and caches.
///
/// Methods take `&mut self` because caches keep bookkeeping on reads.
/// `get` and `delete` on an absent key fail with `ShoveError::NotFound`.
pub trait Backend<V>: Send {
    /// Returns the value stored under `key`.
    fn get(&mut self, key: &str) -> Result<V>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&mut self, key: String, value: V) -> Result<()>;

    /// Removes `key`.
    fn delete(&mut self, key: &str) -> Result<()>;

    /// Checks whether `key` is present.
    fn contains(&mut self, key: &str) -> Result<bool>;

    /// Lists every key currently held.
    fn keys(&mut self) -> Result<Vec<String>>;

    /// Number of keys currently held.
    fn count(&mut self) -> Result<usize>;

    /// Bulk set. Adapters with a native batch write should override this.
    fn update(&mut self, entries: &HashMap<String, V>) -> Result<()>
    where
        V: Clone,
    {
        for (key, value) in entries {
            self.set(key.clone(), value.clone())?;
        }
        Ok(())
    }

    /// Removes every key.
    fn clear(&mut self) -> Result<()>;

    /// Releases underlying resources. Must be safe to call more than once.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<V, B> Backend<V> for Box<B>
where
    B: Backend<V> + ?Sized,
{
    fn get(&mut self, key: &str) -> Result<V> {
        (**self).get(key)
    }

    fn set(&mut self, key: String, value: V) -> Result<()> {
        (**self).set(key, value)
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        (**self).delete(key)
    }

    fn contains(&mut self, key: &str) -> Result<bool> {
        (**self).contains(key)
    }

    fn keys(&mut self) -> Result<Vec<String>> {
        (**self).keys()
    }

    fn count(&mut self) -> Result<usize> {
        (**self).count()
    }

    fn update(&mut self, entries: &HashMap<String, V>) -> Result<()>
    where
        V: Clone,
    {
        (**self).update(entries)
    }

    fn clear(&mut self) -> Result<()> {
        (**self).clear()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Type-erased backend handle used by the frontends and the registry.
pub type BoxedBackend<V> = Box<dyn Backend<V>>;
