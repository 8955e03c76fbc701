//! Dispatch Module
//!
//! Placement policies deciding which stores receive a buffered entry.

/// Chooses the store indices that receive `key`.
///
/// Indices must be below `stores`. Closures of the same shape are
/// dispatchers too.
pub trait Dispatcher<V>: Send {
    fn dispatch(&mut self, key: &str, value: &V, stores: usize) -> Vec<usize>;
}

// == Copy Dispatcher ==
/// Full replication: every entry goes to every store.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyDispatcher;

impl<V> Dispatcher<V> for CopyDispatcher {
    fn dispatch(&mut self, _key: &str, _value: &V, stores: usize) -> Vec<usize> {
        (0..stores).collect()
    }
}

// == Round-Robin Dispatcher ==
/// Sharding: each entry goes to exactly one store, rotating through them.
#[derive(Debug, Clone, Default)]
pub struct RoundRobinDispatcher {
    next: usize,
}

impl RoundRobinDispatcher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<V> Dispatcher<V> for RoundRobinDispatcher {
    fn dispatch(&mut self, _key: &str, _value: &V, stores: usize) -> Vec<usize> {
        if stores == 0 {
            return Vec::new();
        }
        let index = self.next % stores;
        self.next = (index + 1) % stores;
        vec![index]
    }
}

impl<V, F> Dispatcher<V> for F
where
    F: FnMut(&str, &V, usize) -> Vec<usize> + Send,
{
    fn dispatch(&mut self, key: &str, value: &V, stores: usize) -> Vec<usize> {
        self(key, value, stores)
    }
}
