//! TTL Purge Task
//!
//! Background task that periodically removes expired cache entries.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{Result, ShoveError};

/// State that knows how to drop its own expired entries.
pub trait Purge: Send + 'static {
    /// Removes every expired entry and returns how many were removed.
    fn purge_expired(&mut self) -> usize;
}

// == Purge Handle ==
/// Owner-side handle of a running purge task.
///
/// Dropping the handle also stops the task, since the stop channel closes.
#[derive(Debug)]
pub struct PurgeHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PurgeHandle {
    /// Signals the task to stop and aborts it at its next suspension point.
    pub fn stop(&self) {
        let _ = self.stop.send(true);
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the task and waits until it has exited.
    pub async fn join(self) {
        let _ = self.stop.send(true);
        let _ = self.task.await;
    }
}

/// Spawns a background task that periodically purges expired entries.
///
/// The task sleeps for `interval` between sweeps. A zero interval only yields
/// to the scheduler between sweeps. It runs until the returned handle is
/// stopped or dropped.
///
/// Fails with `ShoveError::Initialization` outside a tokio runtime.
///
/// # Example
/// ```ignore
/// let state = Arc::new(Mutex::new(state));
/// let handle = spawn_purge_task(state.clone(), Duration::from_millis(200))?;
/// // Later, during shutdown:
/// handle.stop();
/// ```
pub fn spawn_purge_task<S: Purge>(state: Arc<Mutex<S>>, interval: Duration) -> Result<PurgeHandle> {
    let runtime = Handle::try_current().map_err(|e| {
        ShoveError::Initialization(format!("TTL purge task needs a tokio runtime: {}", e))
    })?;
    let (stop, mut stop_rx) = watch::channel(false);

    let task = runtime.spawn(async move {
        info!("Starting TTL purge task with interval of {:?}", interval);

        loop {
            if interval.is_zero() {
                tokio::task::yield_now().await;
                if stop_rx.has_changed().unwrap_or(true) {
                    break;
                }
            } else {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }

            let removed = state.lock().purge_expired();
            if removed > 0 {
                debug!("TTL purge: removed {} expired entries", removed);
            }
        }

        info!("TTL purge task stopped");
    });

    Ok(PurgeHandle { stop, task })
}
