//! Write Buffer
//!
//! Pending writes, kept in the order their keys were first written.

use std::collections::HashMap;

/// Last-write-wins buffer that remembers first-insertion order.
///
/// Rewriting a buffered key replaces its value in place, so a dispatcher
/// walking the buffer sees keys in the order the caller introduced them.
#[derive(Debug, Clone)]
pub(crate) struct WriteBuffer<V> {
    entries: HashMap<String, V>,
    order: Vec<String>,
}

impl<V> WriteBuffer<V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn insert(&mut self, key: String, value: V) {
        if let Some(slot) = self.entries.get_mut(&key) {
            *slot = value;
        } else {
            self.order.push(key.clone());
            self.entries.insert(key, value);
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Entries in first-insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &V)> {
        self.order
            .iter()
            .filter_map(move |key| self.entries.get_key_value(key.as_str()))
    }

    /// The batch handed to a store's `update`.
    pub fn as_map(&self) -> &HashMap<String, V> {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iterates_in_first_write_order() {
        let mut buffer = WriteBuffer::new();
        for key in ["k3", "k1", "k4", "k2"] {
            buffer.insert(key.to_string(), 0);
        }
        buffer.insert("k1".to_string(), 9);

        let keys: Vec<&str> = buffer.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["k3", "k1", "k4", "k2"]);
        assert_eq!(buffer.as_map()["k1"], 9);
        assert_eq!(buffer.len(), 4);
    }

    #[test]
    fn test_clear() {
        let mut buffer = WriteBuffer::new();
        buffer.insert("a".to_string(), 1);
        buffer.clear();

        assert!(buffer.is_empty());
        assert_eq!(buffer.iter().count(), 0);
        assert_eq!(buffer.as_map().len(), 0);
    }
}
