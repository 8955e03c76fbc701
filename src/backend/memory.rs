//! Memory Store Module
//!
//! HashMap-backed store used as the `simple://` backend and as cache storage.

use std::collections::HashMap;

use crate::backend::Backend;
use crate::error::{Result, ShoveError};

// == Memory Store ==
/// Single-owner in-memory store.
#[derive(Debug, Clone)]
pub struct MemoryStore<V> {
    entries: HashMap<String, V>,
}

impl<V> MemoryStore<V> {
    // == Constructor ==
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send> Backend<V> for MemoryStore<V> {
    fn get(&mut self, key: &str) -> Result<V> {
        self.entries
            .get(key)
            .cloned()
            .ok_or_else(|| ShoveError::NotFound(key.to_string()))
    }

    fn set(&mut self, key: String, value: V) -> Result<()> {
        self.entries.insert(key, value);
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        match self.entries.remove(key) {
            Some(_) => Ok(()),
            None => Err(ShoveError::NotFound(key.to_string())),
        }
    }

    fn contains(&mut self, key: &str) -> Result<bool> {
        Ok(self.entries.contains_key(key))
    }

    fn keys(&mut self) -> Result<Vec<String>> {
        Ok(self.entries.keys().cloned().collect())
    }

    fn count(&mut self) -> Result<usize> {
        Ok(self.entries.len())
    }

    fn update(&mut self, entries: &HashMap<String, V>) -> Result<()> {
        self.entries
            .extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        Ok(())
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_set_and_get() {
        let mut store = MemoryStore::new();
        store.set("key1".to_string(), 1).unwrap();

        assert_eq!(store.get("key1").unwrap(), 1);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_memory_get_nonexistent() {
        let mut store: MemoryStore<i32> = MemoryStore::new();
        assert!(matches!(store.get("missing"), Err(ShoveError::NotFound(_))));
    }

    #[test]
    fn test_memory_delete() {
        let mut store = MemoryStore::new();
        store.set("key1".to_string(), 1).unwrap();
        store.delete("key1").unwrap();

        assert!(store.is_empty());
        assert!(matches!(store.delete("key1"), Err(ShoveError::NotFound(_))));
    }

    #[test]
    fn test_memory_update_overwrites() {
        let mut store = MemoryStore::new();
        store.set("a".to_string(), 1).unwrap();

        let batch = HashMap::from([("a".to_string(), 10), ("b".to_string(), 20)]);
        store.update(&batch).unwrap();

        assert_eq!(store.get("a").unwrap(), 10);
        assert_eq!(store.get("b").unwrap(), 20);
        let mut keys = store.keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_memory_clear_and_close() {
        let mut store = MemoryStore::new();
        store.set("a".to_string(), 1).unwrap();
        store.clear().unwrap();
        assert!(!store.contains("a").unwrap());

        store.close().unwrap();
        store.close().unwrap();
    }

    #[test]
    fn test_boxed_backend_delegates() {
        let mut store: Box<dyn Backend<i32>> = Box::new(MemoryStore::new());
        store.set("a".to_string(), 7).unwrap();
        assert_eq!(store.get("a").unwrap(), 7);
        assert!(store.contains("a").unwrap());
    }
}
