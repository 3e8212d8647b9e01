//! Background cleanup task for per-key registries.
//!
//! Each strategy instance owns one [`CleanupTask`] that periodically
//! sweeps stale entries so registries do not grow without bound under
//! high-cardinality traffic. The task runs on a fixed interval and
//! terminates on a stop signal; stopping is idempotent, and dropping
//! the owning strategy closes the signal channel so the task winds
//! down on its own.

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Default interval between cleanup passes.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Handle to a strategy's background cleanup task.
///
/// Created at strategy construction. When no interval is configured,
/// or no tokio runtime is running (plain unit tests constructing a
/// strategy directly), the handle is inert and all operations are
/// no-ops.
#[derive(Debug)]
pub struct CleanupTask {
    stop: Option<watch::Sender<bool>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl CleanupTask {
    /// Spawns a cleanup task that invokes `sweep` every `interval`.
    ///
    /// `sweep` performs one pass over the owning registry and returns
    /// the number of entries it evicted; `name` identifies the owning
    /// strategy in log output. Outside a tokio runtime the task is not
    /// spawned and cleanup is disabled for this instance.
    pub(crate) fn spawn<F>(name: &'static str, interval: Duration, sweep: F) -> Self
    where
        F: Fn() -> usize + Send + 'static,
    {
        if tokio::runtime::Handle::try_current().is_err() {
            debug!(strategy = name, "no tokio runtime, cleanup disabled");
            return Self::disabled();
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; skip it so a fresh
            // strategy is not swept before it has served a request.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let pruned = sweep();
                        if pruned > 0 {
                            info!(strategy = name, pruned, "rate limit cleanup completed");
                        }
                    }
                    changed = stop_rx.changed() => {
                        // A stop signal or a dropped sender both end the task.
                        if changed.is_err() || *stop_rx.borrow() {
                            debug!(strategy = name, "cleanup task stopping");
                            break;
                        }
                    }
                }
            }
        });

        Self {
            stop: Some(stop_tx),
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Returns an inert handle for strategies with cleanup disabled.
    pub(crate) fn disabled() -> Self {
        Self {
            stop: None,
            handle: Mutex::new(None),
        }
    }

    /// Signals the task to stop. Safe to call any number of times.
    pub fn stop(&self) {
        if let Some(stop) = &self.stop {
            let _ = stop.send(true);
        }
    }

    /// Signals the task to stop and waits for it to finish.
    ///
    /// Idempotent: a second call finds no handle left to join and
    /// returns immediately.
    pub async fn shutdown(&self) {
        self.stop();
        let handle = self.handle.lock().expect("cleanup handle lock poisoned").take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}
