//! Error types for the shove facade
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Shove Error Enum ==
/// Unified error type for stores, caches and frontends.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShoveError {
    /// Key absent from the cache or store that was queried
    #[error("Key not found: {0}")]
    NotFound(String),

    /// A backend or cache could not be constructed
    #[error("Initialization failed: {0}")]
    Initialization(String),

    /// URI scheme has no entry in the registry
    #[error("Unknown backend scheme: {0}")]
    UnknownScheme(String),

    /// Configuration value out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Dispatcher returned an unusable set of store indices
    #[error("Invalid placement for key {key}: {reason}")]
    InvalidPlacement { key: String, reason: String },

    /// Value could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(String),

    /// Failure reported by a backend adapter
    #[error("Backend error: {0}")]
    Backend(String),

    /// One or more stores failed during a fan-out operation
    #[error("{} of the stores failed during fan-out", failures.len())]
    FanOut { failures: Vec<(usize, ShoveError)> },

    /// Nothing left to pop
    #[error("Store is empty")]
    Empty,

    /// The frontend or cache has already been closed
    #[error("Store is closed")]
    Closed,
}

impl ShoveError {
    /// Returns true for the `NotFound` kind.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ShoveError::NotFound(_))
    }
}

// == Result Type Alias ==
/// Convenience Result type for the crate.
pub type Result<T> = std::result::Result<T, ShoveError>;

/// Turns a `NotFound` into `Ok(false)` and success into `Ok(true)`.
///
/// Used wherever a delete is best-effort bookkeeping.
pub(crate) fn tolerate_missing(result: Result<()>) -> Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(ShoveError::NotFound(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tolerate_missing() {
        assert_eq!(tolerate_missing(Ok(())), Ok(true));
        assert_eq!(
            tolerate_missing(Err(ShoveError::NotFound("k".into()))),
            Ok(false)
        );
        assert_eq!(
            tolerate_missing(Err(ShoveError::Closed)),
            Err(ShoveError::Closed)
        );
    }

    #[test]
    fn test_fan_out_message() {
        let err = ShoveError::FanOut {
            failures: vec![(1, ShoveError::Backend("disk full".into()))],
        };
        assert_eq!(err.to_string(), "1 of the stores failed during fan-out");
    }
}
