//! Null Cache Module
//!
//! Cache that never holds anything, used when caching is disabled.

use std::marker::PhantomData;

use crate::backend::Backend;
use crate::error::{Result, ShoveError};

/// Every read misses; writes and deletes are discarded.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCache<V> {
    _value: PhantomData<fn() -> V>,
}

impl<V> NullCache<V> {
    pub fn new() -> Self {
        Self {
            _value: PhantomData,
        }
    }
}

impl<V> Backend<V> for NullCache<V> {
    fn get(&mut self, key: &str) -> Result<V> {
        Err(ShoveError::NotFound(key.to_string()))
    }

    fn set(&mut self, _key: String, _value: V) -> Result<()> {
        Ok(())
    }

    fn delete(&mut self, _key: &str) -> Result<()> {
        Ok(())
    }

    fn contains(&mut self, _key: &str) -> Result<bool> {
        Ok(false)
    }

    fn keys(&mut self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn count(&mut self) -> Result<usize> {
        Ok(0)
    }

    fn clear(&mut self) -> Result<()> {
        Ok(())
    }
}
