//! Background Tasks Module
//!
//! Contains background tasks that run alongside cache instances.
//!
//! # Tasks
//! - TTL Purge: removes expired cache entries at the configured interval

mod purge;

pub use purge::{spawn_purge_task, Purge, PurgeHandle};
